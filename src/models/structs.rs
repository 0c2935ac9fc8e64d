use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use super::enums::{CellValue, GenerationCategory, ModuleType, PointType};

/// 行记录结构体
/// 表格抽取层返回的一行数据：按列顺序保存"实际表头标签 → 单元格值"的映射。
/// 标签是数据源中的原始表头，尚未解析为规范字段名。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    /// 按表头顺序排列的(标签, 值)对
    pub cells: Vec<(String, CellValue)>,
}

impl RowRecord {
    /// 创建空行记录
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// 追加一列
    pub fn push(&mut self, label: impl Into<String>, value: CellValue) {
        self.cells.push((label.into(), value));
    }

    /// 当前行的全部表头标签（保持列顺序）
    pub fn labels(&self) -> Vec<String> {
        self.cells.iter().map(|(label, _)| label.clone()).collect()
    }

    /// 按实际表头标签取值
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    /// 按实际表头标签取文本值，缺失时返回空字符串
    pub fn text(&self, label: &str) -> String {
        self.get(label).map(|v| v.as_text()).unwrap_or_default()
    }

    /// 按实际表头标签取数值
    pub fn number(&self, label: &str) -> Option<f64> {
        self.get(label).and_then(|v| v.as_number())
    }

    /// 整行是否没有任何非空单元格
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_empty())
    }
}

/// 报警设定组结构体
/// 一档报警阈值及其设定点位的三个地址（SLL/SL/SH/SHH各一组）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmSetting {
    /// 报警设定值
    pub set_value: Option<f64>,
    /// 设定点位（子位号）
    pub set_point: String,
    /// 设定点位PLC绝对地址
    pub set_point_plc_address: String,
    /// 设定点位上位机通讯地址
    pub set_point_comm_address: String,
}

impl AlarmSetting {
    /// 报警组是否完全为空
    pub fn is_empty(&self) -> bool {
        self.set_value.is_none()
            && self.set_point.is_empty()
            && self.set_point_plc_address.is_empty()
            && self.set_point_comm_address.is_empty()
    }
}

/// 点位定义结构体
/// 描述一个被监视/被控制的信号，全局唯一标识是HMI变量名。
/// 首次出现于IO点表时创建，或在分类表中首次出现时现场合成；
/// 后续表格补充属性时原地更新，整个运行期内不会被删除。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointDefinition {
    /// 变量名称（HMI），全局唯一标识
    pub hmi_tag_name: String,
    /// 变量描述
    pub description: String,
    /// 场站名
    pub station_name: String,
    /// 模块名称
    pub module_name: String,
    /// 模块类型（AI/AO/DI/DO）
    pub module_type: Option<ModuleType>,
    /// 模块类型原始文本（词汇表之外的取值也保留）
    pub module_type_text: String,
    /// 通道位号
    pub channel_number: String,
    /// 线制
    pub wire_system: String,
    /// 供电类型
    pub power_supply_type: String,
    /// 数据类型原始文本（BOOL/REAL等）
    pub data_type: String,
    /// PLC绝对地址（如%MD100，可为空）
    pub plc_absolute_address: String,
    /// 上位机通讯地址
    pub communication_address: String,
    /// 量程低限
    pub range_low_limit: Option<f64>,
    /// 量程高限
    pub range_high_limit: Option<f64>,
    /// 工程单位
    pub engineering_unit: String,
    /// 低低报设定组
    pub sll: AlarmSetting,
    /// 低报设定组
    pub sl: AlarmSetting,
    /// 高报设定组
    pub sh: AlarmSetting,
    /// 高高报设定组
    pub shh: AlarmSetting,
    /// 点位类型（硬点/软点/通讯点），留空表示尚未归类
    pub point_type: Option<PointType>,
    /// 是否掉电保护
    pub power_failure_protection: Option<bool>,
    /// 是否保存历史
    pub save_history: Option<bool>,
}

impl PointDefinition {
    /// 创建仅有标识的点位定义，其余字段留待后续表格补充
    pub fn new(hmi_tag_name: impl Into<String>) -> Self {
        Self {
            hmi_tag_name: hmi_tag_name.into(),
            ..Default::default()
        }
    }
}

/// 设备结构体
/// 一个受控单元（设备位号），绑定且仅绑定一个代码生成模板。
/// 持有两个互不相交的点位集合：
/// - `io_points`: 硬点快照，赋值时按值拷贝，主表后续变化不会回溯影响
/// - `device_points`: 软点/推导点，带占位字段创建并随明细表扫描逐步充实
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// 设备位号，运行期内唯一
    pub device_tag: String,
    /// 模板名称，首次赋值后固定（仅在为空时允许更新）
    pub template_name: String,
    /// 硬点快照集合，键为变量名
    pub io_points: HashMap<String, PointDefinition>,
    /// 软点集合，键为变量名
    pub device_points: HashMap<String, PointDefinition>,
}

impl Device {
    /// 创建新设备
    pub fn new(device_tag: impl Into<String>) -> Self {
        Self {
            device_tag: device_tag.into(),
            ..Default::default()
        }
    }

    /// 仅在模板名尚未设置时赋值
    pub fn set_template_if_empty(&mut self, template_name: &str) {
        if self.template_name.is_empty() && !template_name.is_empty() {
            self.template_name = template_name.to_string();
        }
    }

    /// 两个点位集合的变量名并集，排序后返回（保证推断结果可复现）
    pub fn point_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .io_points
            .keys()
            .chain(self.device_points.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// 按变量名查找点位（先硬点后软点）
    pub fn find_point(&self, name: &str) -> Option<&PointDefinition> {
        self.io_points
            .get(name)
            .or_else(|| self.device_points.get(name))
    }
}

/// 模板元数据结构体
/// 从模板前两行指令与伴生初值文件解析得到，按模板绝对路径缓存。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// 程序名称（模板首行"程序名称:"指令）
    pub program_name: String,
    /// 变量类型标记（模板次行"变量类型:"指令）
    pub variable_type: String,
    /// 默认初始值（伴生文件中前缀为"*"的行提供）
    pub initialization_value: String,
    /// 变量名前缀 → (变量类型, 初始值) 查找表
    pub variable_meta_map: HashMap<String, (String, String)>,
}

/// 生成结果值对象
/// 由生成编排器产出，仅供外部导出器消费
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// 输出类别
    pub category: GenerationCategory,
    /// 目标文件名
    pub file_name: String,
    /// 渲染后的ST文本
    pub content: String,
    /// 来源模板路径（变量表分析阶段需要其元数据）
    pub template_path: PathBuf,
}

/// 变量表行值对象
/// 变量声明表中的一行，按程序分组写入工作簿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableTableEntry {
    /// 所属程序名称
    pub program_name: String,
    /// 变量名
    pub variable_name: String,
    /// 变量类型
    pub variable_type: String,
    /// 初始值
    pub initial_value: String,
    /// 直接地址（通常为空）
    pub direct_address: String,
    /// 变量说明（通常为空）
    pub description: String,
    /// 掉电保护标志（"TRUE"/"FALSE"）
    pub power_failure_protection: String,
    /// SOE使能标志（"TRUE"/"FALSE"）
    pub soe_enable: String,
}

impl VariableTableEntry {
    /// 创建默认标志位的变量表行
    pub fn new(
        program_name: impl Into<String>,
        variable_name: impl Into<String>,
        variable_type: impl Into<String>,
        initial_value: impl Into<String>,
    ) -> Self {
        Self {
            program_name: program_name.into(),
            variable_name: variable_name.into(),
            variable_type: variable_type.into(),
            initial_value: initial_value.into(),
            direct_address: String::new(),
            description: String::new(),
            power_failure_protection: "FALSE".to_string(),
            soe_enable: "FALSE".to_string(),
        }
    }
}

/// 导入模型结构体
/// 单次导入运行的全部点位/设备状态。每次运行重新创建，运行之间不共享。
/// 主点位表与已分配集合是"归属关系"的唯一事实来源；
/// 设备内部的点位是快照拷贝而非指向主表的引用。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportModel {
    /// 主点位表，键为HMI变量名
    pub points: HashMap<String, PointDefinition>,
    /// 已分配给设备的点位标识集合
    pub assigned_tags: HashSet<String>,
    /// 设备表，键为设备位号
    pub devices: HashMap<String, Device>,
    /// 独立硬点池（未被任何设备占有）
    pub standalone_hard: Vec<String>,
    /// 独立软点池
    pub standalone_soft: Vec<String>,
    /// 独立通讯点池
    pub standalone_comm: Vec<String>,
}

impl ImportModel {
    /// 创建空模型
    pub fn new() -> Self {
        Self::default()
    }

    /// 按排序后的设备位号遍历设备（输出顺序稳定）
    pub fn devices_sorted(&self) -> Vec<&Device> {
        let mut tags: Vec<&String> = self.devices.keys().collect();
        tags.sort();
        tags.into_iter().map(|t| &self.devices[t]).collect()
    }
}

/// 导入汇总结构体
/// 一次运行的计数与逐项警告清单，随输出一起呈现给用户
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    /// 主表总行数
    pub total_rows: usize,
    /// 成功导入的点位数
    pub imported_points: usize,
    /// 跳过的行数（缺失标识等）
    pub skipped_rows: usize,
    /// 重复标识数
    pub duplicate_tags: usize,
    /// 未匹配的明细表行数
    pub unmatched_detail_rows: usize,
    /// 未解析的占位符数
    pub unresolved_placeholders: usize,
    /// 缺失模板的设备/分组数
    pub missing_templates: usize,
    /// 逐项警告信息
    pub warnings: Vec<String>,
}

impl ImportSummary {
    /// 创建空汇总
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条警告并同步输出到日志
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// 是否存在任何警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::CellValue;

    #[test]
    fn test_row_record_lookup() {
        let mut row = RowRecord::new();
        row.push("变量名称（HMI）", CellValue::Text("FV_101".to_string()));
        row.push("通讯地址", CellValue::Number(40001.0));
        row.push("备用", CellValue::Empty);

        assert_eq!(row.text("变量名称（HMI）"), "FV_101");
        assert_eq!(row.text("通讯地址"), "40001");
        assert_eq!(row.number("通讯地址"), Some(40001.0));
        assert_eq!(row.get("不存在"), None);
        assert!(!row.is_blank());
    }

    #[test]
    fn test_device_template_fixed_on_first_assignment() {
        let mut device = Device::new("XV-1001");
        device.set_template_if_empty("MOV_CTRL");
        device.set_template_if_empty("OTHER");
        assert_eq!(device.template_name, "MOV_CTRL");

        let mut blank = Device::new("XV-1002");
        blank.set_template_if_empty("");
        assert!(blank.template_name.is_empty());
        blank.set_template_if_empty("ESDV_CTRL");
        assert_eq!(blank.template_name, "ESDV_CTRL");
    }

    #[test]
    fn test_device_point_names_union() {
        let mut device = Device::new("XV-1001");
        device
            .io_points
            .insert("XV1001_XS".to_string(), PointDefinition::new("XV1001_XS"));
        device
            .device_points
            .insert("XV1001_C_AM".to_string(), PointDefinition::new("XV1001_C_AM"));
        assert_eq!(device.point_names(), vec!["XV1001_C_AM", "XV1001_XS"]);
    }
}
