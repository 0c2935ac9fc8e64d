/// 模板元数据解析器
///
/// 读取模板头部指令与可选的伴生初值文件，判定模板是否有资格
/// 参与变量表生成。只用于ST渲染的模板不要求携带这些指令。
///
/// 头部指令取模板前两个非空行：
/// ```text
/// 程序名称: MOV_CTRL(PRG)
/// 变量类型: BOOL
/// ```
/// 任一行不匹配只是字段留空，解析继续。
///
/// 伴生初值文件定位规则：
/// (a) 变量类型非空且 <模板目录>/<变量类型>.TXT 存在 → 取之；
/// (b) 否则取 <模板目录>/<模板文件主名>.TXT；
///     模板主名是"默认"哨兵名时改取 <所在文件夹名>.TXT。
///
/// **资格门槛**：程序名称非空 且 变量类型非空 且 伴生文件存在，
/// 三者缺一即返回None（静默排除出变量表输出，不算错误）。
///
/// 解析结果按规范化绝对路径缓存，进程生命期内不失效
/// （运行期间模板视为静态）。
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::TemplateMetadata;
use crate::services::infrastructure::excel::TextTableReader;

/// 程序名称指令
static PROGRAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^程序名称[:：]\s*(.+)$").expect("固定正则有效"));

/// 变量类型指令
static VARIABLE_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^变量类型[:：]\s*(.+)$").expect("固定正则有效"));

/// "默认"模板的哨兵文件主名
const DEFAULT_TEMPLATE_STEM: &str = "默认";

/// 伴生文件中设置默认初始值的前缀哨兵
const DEFAULT_PREFIX_SENTINEL: &str = "*";

/// 模板元数据解析器（带进程级缓存）
pub struct TemplateMetadataParser {
    cache: Mutex<HashMap<PathBuf, Option<TemplateMetadata>>>,
}

impl TemplateMetadataParser {
    /// 创建新解析器（空缓存）
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 解析模板元数据；不满足资格门槛时返回Ok(None)
    pub fn parse(&self, template_path: &Path) -> AppResult<Option<TemplateMetadata>> {
        let cache_key = template_path
            .canonicalize()
            .unwrap_or_else(|_| template_path.to_path_buf());

        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let parsed = self.parse_inner(template_path)?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(cache_key, parsed.clone());
        }
        Ok(parsed)
    }

    fn parse_inner(&self, template_path: &Path) -> AppResult<Option<TemplateMetadata>> {
        if !template_path.exists() {
            return Err(AppError::not_found_error(
                "模板",
                format!("模板文件不存在: {}", template_path.display()),
            ));
        }

        let content = TextTableReader::read_text(template_path)?;
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());

        let program_name = lines
            .next()
            .and_then(|l| PROGRAM_NAME_RE.captures(l.trim()))
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        let variable_type = lines
            .next()
            .and_then(|l| VARIABLE_TYPE_RE.captures(l.trim()))
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        let companion = Self::locate_companion(template_path, &variable_type);

        // 资格门槛：三项齐备才有资格生成变量表
        let companion = match companion {
            Some(c) if !program_name.is_empty() && !variable_type.is_empty() => c,
            _ => {
                log::info!(
                    "模板\"{}\"不满足变量表生成条件，已排除",
                    template_path.display()
                );
                return Ok(None);
            }
        };

        let mut metadata = TemplateMetadata {
            program_name,
            variable_type,
            ..Default::default()
        };
        Self::load_companion(&companion, &mut metadata)?;
        Ok(Some(metadata))
    }

    /// 定位伴生初值文件，不存在时返回None
    fn locate_companion(template_path: &Path, variable_type: &str) -> Option<PathBuf> {
        let dir = template_path.parent()?;

        if !variable_type.is_empty() {
            let by_type = dir.join(format!("{}.TXT", variable_type));
            if by_type.exists() {
                return Some(by_type);
            }
        }

        let stem = template_path.file_stem()?.to_string_lossy().to_string();
        let name = if stem == DEFAULT_TEMPLATE_STEM {
            // "默认"模板的伴生文件随所在文件夹命名
            format!("{}.TXT", dir.file_name()?.to_string_lossy())
        } else {
            format!("{}.TXT", stem)
        };
        let candidate = dir.join(name);
        candidate.exists().then_some(candidate)
    }

    /// 解析伴生文件：每行 前缀,类型,初始值；
    /// 前缀为"*"的行提供默认初始值；//和#开头的行跳过
    fn load_companion(path: &Path, metadata: &mut TemplateMetadata) -> AppResult<()> {
        let content = TextTableReader::read_text(path)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line
                .split(|c| c == ',' || c == '，' || c == '\t')
                .map(|f| f.trim())
                .collect();
            let prefix = fields.first().copied().unwrap_or_default();
            if prefix.is_empty() {
                continue;
            }
            let var_type = fields.get(1).copied().unwrap_or_default();
            let initial = fields.get(2).copied().unwrap_or_default();

            if prefix == DEFAULT_PREFIX_SENTINEL {
                metadata.initialization_value = initial.to_string();
                continue;
            }
            metadata
                .variable_meta_map
                .entry(prefix.to_string())
                .or_insert_with(|| (var_type.to_string(), initial.to_string()));
        }
        Ok(())
    }
}

impl Default for TemplateMetadataParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_template(dir: &Path, name: &str, program: &str, var_type: &str) -> PathBuf {
        let path = dir.join(name);
        let mut content = String::new();
        if !program.is_empty() {
            content.push_str(&format!("程序名称: {}\n", program));
        }
        if !var_type.is_empty() {
            content.push_str(&format!("变量类型: {}\n", var_type));
        }
        content.push_str("{{device_tag}}();\n");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_eligible_template_with_companion() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "MOV_CTRL.txt", "MOV_CTRL(PRG)", "BOOL");
        fs::write(dir.path().join("BOOL.TXT"), "*,BOOL,FALSE\nMOV_,MOV_CTRL,\n").unwrap();

        let parser = TemplateMetadataParser::new();
        let metadata = parser.parse(&template).unwrap().unwrap();
        assert_eq!(metadata.program_name, "MOV_CTRL(PRG)");
        assert_eq!(metadata.variable_type, "BOOL");
        assert_eq!(metadata.initialization_value, "FALSE");
        assert_eq!(
            metadata.variable_meta_map.get("MOV_"),
            Some(&("MOV_CTRL".to_string(), String::new()))
        );
    }

    #[test]
    fn test_missing_companion_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "ESDV_CTRL.txt", "ESDV_CTRL(PRG)", "BOOL");
        // 程序名称与变量类型齐备，但没有伴生.TXT文件

        let parser = TemplateMetadataParser::new();
        assert!(parser.parse(&template).unwrap().is_none());
    }

    #[test]
    fn test_missing_program_name_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "NO_HEADER.txt", "", "BOOL");
        fs::write(dir.path().join("BOOL.TXT"), "*,BOOL,FALSE\n").unwrap();

        let parser = TemplateMetadataParser::new();
        assert!(parser.parse(&template).unwrap().is_none());
    }

    #[test]
    fn test_companion_by_template_stem() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "PID_CTRL.txt", "PID_CTRL(PRG)", "REAL");
        // 没有REAL.TXT，回退按模板主名定位
        fs::write(dir.path().join("PID_CTRL.TXT"), "*,REAL,0.0\n").unwrap();

        let parser = TemplateMetadataParser::new();
        let metadata = parser.parse(&template).unwrap().unwrap();
        assert_eq!(metadata.initialization_value, "0.0");
    }

    #[test]
    fn test_default_sentinel_uses_folder_name() {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join("阀门");
        fs::create_dir_all(&folder).unwrap();
        let template = write_template(&folder, "默认.txt", "MOV_CTRL(PRG)", "BOOL");
        fs::write(folder.join("阀门.TXT"), "*,BOOL,FALSE\n").unwrap();

        let parser = TemplateMetadataParser::new();
        assert!(parser.parse(&template).unwrap().is_some());
    }

    #[test]
    fn test_result_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "MOV_CTRL.txt", "MOV_CTRL(PRG)", "BOOL");
        fs::write(dir.path().join("BOOL.TXT"), "*,BOOL,FALSE\n").unwrap();

        let parser = TemplateMetadataParser::new();
        let first = parser.parse(&template).unwrap();
        // 删掉伴生文件后仍命中缓存
        fs::remove_file(dir.path().join("BOOL.TXT")).unwrap();
        let second = parser.parse(&template).unwrap();
        assert_eq!(first, second);
        assert!(second.is_some());
    }
}
