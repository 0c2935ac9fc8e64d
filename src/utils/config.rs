use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// 提供给 serde 的默认模板目录
fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

/// 提供给 serde 的默认模板名称映射文件
fn default_template_mapping_file() -> PathBuf {
    PathBuf::from("templates/模板映射.json")
}

/// 提供给 serde 的默认输出目录
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// 提供给 serde 的默认设备明细表清单
/// 这些工作表仅用于软点充实，顺序即扫描顺序
fn default_detail_sheets() -> Vec<String> {
    [
        "阀门",
        "调节阀",
        "可燃气体探测器",
        "低压开关柜",
        "撬装机柜",
        "加臭",
        "恒电位仪",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 应用程序主配置结构
/// 包含生成流程运行所需的路径与工作表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 模板文件目录
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    /// 模板名称映射配置文件（平面 键→文件名 JSON对象）
    #[serde(default = "default_template_mapping_file")]
    pub template_mapping_file: PathBuf,
    /// 输出根目录
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// 设备明细表清单（固定枚举，仅用于点位充实）
    #[serde(default = "default_detail_sheets")]
    pub detail_sheets: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            template_mapping_file: default_template_mapping_file(),
            output_dir: default_output_dir(),
            detail_sheets: default_detail_sheets(),
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置，文件不存在时报配置错误
    pub fn load_from_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::configuration_error(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::configuration_error(format!("读取配置文件失败: {}", e)))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::configuration_error(format!("解析配置文件失败: {}", e)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.template_dir, PathBuf::from("templates"));
        assert_eq!(config.detail_sheets.len(), 7);
        assert_eq!(config.detail_sheets[0], "阀门");
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"output_dir": "out/st"}"#).unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out/st"));
        // 未给出的字段取默认值
        assert_eq!(config.template_dir, PathBuf::from("templates"));
    }

    #[test]
    fn test_load_missing_config() {
        let result = AppConfig::load_from_file(Path::new("/不存在/config.json"));
        assert!(result.is_err());
    }
}
