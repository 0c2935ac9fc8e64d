/// 导出服务
///
/// 把生成结果落盘：
/// - 渲染的ST文本按类别写入输出子目录（设备程序/IO映射/通讯程序/其他），
///   UTF-8编码；命中变量声明标记模式的行在写出前剔除
///   （模板头部的"程序名称:"/"变量类型:"指令行属于模板前言，不是ST代码）
/// - 变量声明表经变量表输出器写成单个多工作表工作簿
///
/// 最终导出阶段的磁盘I/O失败（磁盘满、权限不足、文件占用）
/// 向调用方传播为致命错误。
use std::path::{Path, PathBuf};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::{GenerationResult, VariableTableEntry};
use crate::services::application::variable_table_service::VariableTableWriter;

/// 变量声明标记行：模板元数据指令，写出ST文件前剔除
static VAR_DECL_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(程序名称|变量类型)\s*[:：]").expect("固定正则有效"));

/// 导出服务
pub struct ExportService;

impl ExportService {
    /// 写出全部ST文件，返回实际写入的文件路径
    pub fn export_st_files(
        results: &[GenerationResult],
        output_dir: &Path,
    ) -> AppResult<Vec<PathBuf>> {
        let mut written = Vec::new();

        for result in results {
            let folder = output_dir.join(result.category.folder_name());
            std::fs::create_dir_all(&folder).map_err(|e| {
                AppError::io_error(
                    format!("创建输出目录失败: {}", folder.display()),
                    e.kind().to_string(),
                )
            })?;

            let file_path = folder.join(&result.file_name);
            let content = strip_marker_lines(&result.content);
            std::fs::write(&file_path, content.as_bytes()).map_err(|e| {
                AppError::io_error(
                    format!("写出ST文件失败: {}", file_path.display()),
                    e.kind().to_string(),
                )
            })?;
            written.push(file_path);
        }

        log::info!("ST文件导出完成，共{}个", written.len());
        Ok(written)
    }

    /// 写出变量声明表工作簿，文件名带时间戳，返回实际路径
    pub fn export_variable_table(
        entries: &[VariableTableEntry],
        output_dir: &Path,
    ) -> AppResult<PathBuf> {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            AppError::io_error(
                format!("创建输出目录失败: {}", output_dir.display()),
                e.kind().to_string(),
            )
        })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M").to_string();
        let file_path = output_dir.join(format!("变量声明表_{}.xlsx", timestamp));
        VariableTableWriter::write_workbook(entries, &file_path)?;
        Ok(file_path)
    }
}

/// 剔除命中变量声明标记模式的行
fn strip_marker_lines(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        if VAR_DECL_MARKER_RE.is_match(line.trim_start()) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationCategory;

    #[test]
    fn test_strip_marker_lines() {
        let content = "程序名称: MOV_CTRL(PRG)\n变量类型: BOOL\nMOV_CTRL_V101(\n);\n";
        assert_eq!(strip_marker_lines(content), "MOV_CTRL_V101(\n);\n");
    }

    #[test]
    fn test_export_writes_into_category_folders() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            GenerationResult {
                category: GenerationCategory::Device,
                file_name: "XV-1001.ST".to_string(),
                content: "程序名称: MOV_CTRL(PRG)\nXV1001();\n".to_string(),
                template_path: PathBuf::from("MOV_CTRL.txt"),
            },
            GenerationResult {
                category: GenerationCategory::IoMapping,
                file_name: "AI_MAPPING.ST".to_string(),
                content: "TT_2001 := %MD100;\n".to_string(),
                template_path: PathBuf::from("AI_MAPPING.txt"),
            },
        ];

        let written = ExportService::export_st_files(&results, dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("设备程序/XV-1001.ST").exists());
        assert!(dir.path().join("IO映射/AI_MAPPING.ST").exists());

        let device_st =
            std::fs::read_to_string(dir.path().join("设备程序/XV-1001.ST")).unwrap();
        // 元数据指令行在写出前剔除
        assert_eq!(device_st, "XV1001();\n");
    }
}
