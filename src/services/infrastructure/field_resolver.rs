/// 字段解析器
///
/// 把逻辑上的工作表名/列名解析成数据源中实际存在的标签。
/// 现场点表的表头书写很不统一（全半角括号、空格、简写、英文名混用），
/// 解析按固定的五步顺序进行，先命中者胜：
///
/// 1. 精确相等
/// 2. 忽略大小写相等
/// 3. 规范化后相等（去除全/半角括号与空白，工作表名再去除少量标点）
/// 4. 别名表查找（规范名→别名、别名→规范名双向）
/// 5. 规范化形式的双向子串包含（模糊兜底，按候选项迭代顺序取第一个）
///
/// 这一顺序是其他组件依赖的契约，调整顺序会改变可观察的匹配结果。
use once_cell::sync::Lazy;

use crate::error::{AppError, AppResult};

/// 工作表名别名表：规范名 → 已知同义写法
static SHEET_ALIASES: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "IO点表",
            vec!["IO", "IO表", "Points", "点位表", "点表", "IO清单"],
        ),
        (
            "设备分类表",
            vec!["设备分类", "分类表", "设备表", "设备清单", "Devices"],
        ),
    ]
});

/// 列名别名表：规范名 → 已知同义写法
static COLUMN_ALIASES: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "变量名称（HMI）",
            vec!["变量名称", "HMI标签", "TagName", "变量名", "HMI变量名"],
        ),
        ("设备位号", vec!["位号", "设备标签", "设备编号", "DeviceTag"]),
        ("点类型", vec!["点位类型", "PointType"]),
        ("模板名称", vec!["模板", "程序模板", "Template"]),
        ("变量描述", vec!["描述", "变量说明", "Description"]),
        ("场站名", vec!["场站", "站名", "场站名称"]),
        ("模块名称", vec!["模块名"]),
        ("模块类型", vec!["IO类型"]),
        ("通道位号", vec!["通道号", "通道"]),
        ("供电类型", vec!["供电类型（有源/无源）", "供电"]),
        ("单位", vec!["工程单位"]),
        ("量程低限", vec!["量程下限"]),
        ("量程高限", vec!["量程上限"]),
        ("PLC绝对地址", vec!["PLC地址", "绝对地址"]),
        (
            "上位机通讯地址",
            vec!["通讯地址", "通信地址", "Modbus地址"],
        ),
        ("掉电保护", vec!["断电保护"]),
        ("保存历史", vec!["历史保存"]),
        ("SLL设定值", vec!["低低报设定值"]),
        ("SLL设定点位", vec!["低低报设定点位"]),
        ("SL设定值", vec!["低报设定值"]),
        ("SL设定点位", vec!["低报设定点位"]),
        ("SH设定值", vec!["高报设定值"]),
        ("SH设定点位", vec!["高报设定点位"]),
        ("SHH设定值", vec!["高高报设定值"]),
        ("SHH设定点位", vec!["高高报设定点位"]),
    ]
});

/// 解析域：工作表名与列名的规范化规则略有差异
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveDomain {
    /// 工作表名
    Sheet,
    /// 列名
    Column,
}

/// 字段解析器
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver {
    domain: ResolveDomain,
}

impl FieldResolver {
    /// 创建工作表名解析器
    pub fn sheets() -> Self {
        Self {
            domain: ResolveDomain::Sheet,
        }
    }

    /// 创建列名解析器
    pub fn columns() -> Self {
        Self {
            domain: ResolveDomain::Column,
        }
    }

    /// 规范化：去除全/半角括号与空白后转小写；
    /// 工作表名额外去除常见连接标点
    fn normalize(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            let drop = matches!(c, '（' | '）' | '(' | ')') || c.is_whitespace();
            let drop_sheet =
                self.domain == ResolveDomain::Sheet && matches!(c, '-' | '_' | '/' | '、' | '·');
            if !drop && !drop_sheet {
                out.push(c);
            }
        }
        out.to_lowercase()
    }

    fn alias_table(&self) -> &'static [(&'static str, Vec<&'static str>)] {
        match self.domain {
            ResolveDomain::Sheet => &SHEET_ALIASES,
            ResolveDomain::Column => &COLUMN_ALIASES,
        }
    }

    /// 在候选项中按规范化忽略大小写相等查找
    fn find_normalized(&self, available: &[String], target: &str) -> Option<String> {
        let target_norm = self.normalize(target);
        available
            .iter()
            .find(|k| self.normalize(k) == target_norm)
            .cloned()
    }

    /// 解析逻辑字段名，返回数据源中的实际标签；找不到返回None
    pub fn resolve(&self, available: &[String], logical: &str) -> Option<String> {
        // 1. 精确相等
        if let Some(hit) = available.iter().find(|k| k.as_str() == logical) {
            return Some(hit.clone());
        }

        // 2. 忽略大小写相等
        let logical_lower = logical.to_lowercase();
        if let Some(hit) = available.iter().find(|k| k.to_lowercase() == logical_lower) {
            return Some(hit.clone());
        }

        // 3. 规范化后相等
        if let Some(hit) = self.find_normalized(available, logical) {
            return Some(hit);
        }

        // 4. 别名表查找，规范名→别名与别名→规范名双向尝试
        let logical_norm = self.normalize(logical);
        for (canonical, aliases) in self.alias_table() {
            if self.normalize(canonical) == logical_norm {
                // 调用方给的是规范名，按别名顺序在数据源中查找
                for alias in aliases {
                    if let Some(hit) = self.find_normalized(available, alias) {
                        return Some(hit);
                    }
                }
            } else if aliases.iter().any(|a| self.normalize(a) == logical_norm) {
                // 调用方给的是别名，回查规范名
                if let Some(hit) = self.find_normalized(available, canonical) {
                    return Some(hit);
                }
            }
        }

        // 5. 规范化形式的双向子串包含，按候选项迭代顺序取第一个
        if !logical_norm.is_empty() {
            for key in available {
                let key_norm = self.normalize(key);
                if key_norm.is_empty() {
                    continue;
                }
                if key_norm.contains(&logical_norm) || logical_norm.contains(&key_norm) {
                    return Some(key.clone());
                }
            }
        }

        None
    }

    /// 解析必需字段，失败时错误信息携带全部可用标签供排查
    pub fn resolve_required(&self, available: &[String], logical: &str) -> AppResult<String> {
        self.resolve(available, logical).ok_or_else(|| {
            let kind = match self.domain {
                ResolveDomain::Sheet => "工作表",
                ResolveDomain::Column => "列",
            };
            AppError::not_found_error(
                kind,
                format!("无法识别{}\"{}\"，可用项: {:?}", kind, logical, available),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avail(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_first() {
        let r = FieldResolver::sheets();
        assert_eq!(r.resolve(&avail(&["IO点表"]), "IO点表"), Some("IO点表".to_string()));
    }

    #[test]
    fn test_case_insensitive_match() {
        let r = FieldResolver::sheets();
        assert_eq!(r.resolve(&avail(&["io点表"]), "IO点表"), Some("io点表".to_string()));
    }

    #[test]
    fn test_normalized_match() {
        let r = FieldResolver::sheets();
        assert_eq!(
            r.resolve(&avail(&["IO 点 表"]), "IO点表"),
            Some("IO 点 表".to_string())
        );
    }

    #[test]
    fn test_alias_match() {
        let r = FieldResolver::sheets();
        // 数据源只有别名"IO"时按别名表命中
        assert_eq!(r.resolve(&avail(&["IO"]), "IO点表"), Some("IO".to_string()));
        // 反方向：按别名询问，命中数据源中的规范名
        assert_eq!(r.resolve(&avail(&["IO点表"]), "点位表"), Some("IO点表".to_string()));
    }

    #[test]
    fn test_resolution_failure_lists_available() {
        let r = FieldResolver::sheets();
        assert_eq!(r.resolve(&avail(&["Foobar"]), "IO点表"), None);
        let err = r.resolve_required(&avail(&["Foobar"]), "IO点表").unwrap_err();
        assert!(err.to_string().contains("Foobar"));
    }

    #[test]
    fn test_column_fullwidth_parentheses() {
        let r = FieldResolver::columns();
        assert_eq!(
            r.resolve(&avail(&["变量名称(HMI)"]), "变量名称（HMI）"),
            Some("变量名称(HMI)".to_string())
        );
    }

    #[test]
    fn test_column_alias_and_substring() {
        let r = FieldResolver::columns();
        // 别名命中
        assert_eq!(
            r.resolve(&avail(&["通讯地址"]), "上位机通讯地址"),
            Some("通讯地址".to_string())
        );
        // 子串兜底：列名带额外后缀
        assert_eq!(
            r.resolve(&avail(&["序号", "模块类型说明"]), "模块类型"),
            Some("模块类型说明".to_string())
        );
    }

    #[test]
    fn test_substring_first_in_iteration_order() {
        let r = FieldResolver::columns();
        // 两个候选都包含目标，取迭代顺序中的第一个
        assert_eq!(
            r.resolve(&avail(&["通道位号A", "通道位号B"]), "通道位号"),
            Some("通道位号A".to_string())
        );
    }
}
