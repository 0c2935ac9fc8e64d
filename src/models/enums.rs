//! # 模型枚举类型模块
//!
//! 定义点表生成流程中使用的封闭枚举类型：
//! - **点位类型**: 硬点/软点/通讯点三类点位的分类
//! - **模块类型**: AI/AO/DI/DO四种IO模块
//! - **生成类别**: 生成结果归属的输出类别
//! - **单元格值**: 表格抽取层的封闭单元格变体类型
//!
//! 所有从文本解析的枚举都提供明确的解析函数，避免散落在各处的字符串比较。

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 点位类型枚举
/// 对应分类表"点类型"列中的硬点/软点/通讯点三种取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointType {
    /// 硬点：在IO点表中具有物理PLC地址的点位
    Hard,
    /// 软点：仅由分类表/设备明细表推导出的点位
    Soft,
    /// 通讯点：通过上位通讯链路映射的点位
    Comm,
}

impl PointType {
    /// 从点表文本解析点位类型，无法识别时返回None
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "硬点" => Some(PointType::Hard),
            "软点" => Some(PointType::Soft),
            "通讯点" | "通信点" => Some(PointType::Comm),
            _ => None,
        }
    }
}

impl Display for PointType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PointType::Hard => "硬点",
            PointType::Soft => "软点",
            PointType::Comm => "通讯点",
        };
        write!(f, "{}", s)
    }
}

/// 模块类型枚举
/// 表示不同类型的PLC IO模块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    /// 模拟量输入
    AI,
    /// 模拟量输出
    AO,
    /// 数字量输入
    DI,
    /// 数字量输出
    DO,
}

impl ModuleType {
    /// 从模块类型文本解析，兼容大小写与前后空白
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "AI" => Some(ModuleType::AI),
            "AO" => Some(ModuleType::AO),
            "DI" => Some(ModuleType::DI),
            "DO" => Some(ModuleType::DO),
            _ => None,
        }
    }

    /// 全部模块类型，按固定顺序排列（用于稳定的分组输出）
    pub fn all() -> [ModuleType; 4] {
        [ModuleType::AI, ModuleType::AO, ModuleType::DI, ModuleType::DO]
    }
}

impl Display for ModuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleType::AI => "AI",
            ModuleType::AO => "AO",
            ModuleType::DI => "DI",
            ModuleType::DO => "DO",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::parse(s).ok_or_else(|| format!("Invalid ModuleType: {}", s))
    }
}

/// 生成结果类别枚举
/// 决定生成的ST文件写入哪个输出子目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationCategory {
    /// 设备程序
    Device,
    /// IO映射程序
    IoMapping,
    /// 通讯程序
    Communication,
    /// 其他
    Other,
}

impl GenerationCategory {
    /// 输出子目录名称
    pub fn folder_name(&self) -> &'static str {
        match self {
            GenerationCategory::Device => "设备程序",
            GenerationCategory::IoMapping => "IO映射",
            GenerationCategory::Communication => "通讯程序",
            GenerationCategory::Other => "其他",
        }
    }
}

impl Display for GenerationCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.folder_name())
    }
}

/// 单元格值枚举
/// 表格抽取层返回的封闭变体类型，屏蔽底层文件格式差异
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// 文本
    Text(String),
    /// 数值
    Number(f64),
    /// 布尔值
    Boolean(bool),
    /// 空单元格
    Empty,
}

impl CellValue {
    /// 是否为空单元格（纯空白文本也视为空）
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 转为文本表示
    /// 整数值的数值单元格不带小数点输出（通讯地址等列依赖该行为）
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Empty => String::new(),
        }
    }

    /// 转为数值，文本单元格尝试解析
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => {
                let t = s.trim();
                if t.is_empty() || t == "/" {
                    None
                } else {
                    t.parse::<f64>().ok()
                }
            }
            _ => None,
        }
    }
}
