/// Excel点表读取器
///
/// 把工作表读成行记录序列：每行是"实际表头标签 → 单元格值"的有序映射。
/// 表头固定取第1行；表头跨度内全空的行静默丢弃；
/// 日期格式的数值单元格转成文本表示；公式单元格优先取缓存计算结果，
/// 取不到时回退公式原文。调用方拿到的始终是封闭的CellValue类型，
/// 不会泄漏底层文件格式。
use std::path::Path;

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use crate::error::{AppError, AppResult};
use crate::models::{CellValue, RowRecord};

/// Excel读取器
pub struct SpreadsheetReader;

impl SpreadsheetReader {
    /// 列出工作簿中的全部工作表名
    pub fn sheet_names(file_path: &Path) -> AppResult<Vec<String>> {
        if !file_path.exists() {
            return Err(AppError::validation_error(format!(
                "文件不存在: {}",
                file_path.display()
            )));
        }

        let workbook: Xlsx<_> = open_workbook(file_path)
            .map_err(|e| AppError::excel_error(format!("无法打开Excel文件: {}", e)))?;
        let names = workbook.sheet_names().to_owned();
        if names.is_empty() {
            return Err(AppError::excel_error("Excel文件中没有工作表"));
        }
        Ok(names)
    }

    /// 读取指定工作表为行记录序列
    ///
    /// # 参数
    /// * `file_path` - Excel文件路径
    /// * `sheet_name` - 实际工作表名（应已经过字段解析器解析）
    pub fn read_sheet(file_path: &Path, sheet_name: &str) -> AppResult<Vec<RowRecord>> {
        let mut workbook: Xlsx<_> = open_workbook(file_path)
            .map_err(|e| AppError::excel_error(format!("无法打开Excel文件: {}", e)))?;

        let range = match workbook.worksheet_range(sheet_name) {
            Some(Ok(range)) => range,
            Some(Err(e)) => {
                return Err(AppError::excel_error(format!("无法读取工作表: {}", e)))
            }
            None => {
                return Err(AppError::not_found_error(
                    "工作表",
                    format!("工作表不存在: {}", sheet_name),
                ))
            }
        };

        // 公式单元格缓存值缺失时回退公式原文
        let formulas = match workbook.worksheet_formula(sheet_name) {
            Some(Ok(f)) => Some(f),
            _ => None,
        };

        let Some(start) = range.start() else {
            return Ok(Vec::new());
        };

        let mut rows = range.rows().enumerate();

        // 表头固定为第1行
        let Some((_, header_row)) = rows.next() else {
            return Ok(Vec::new());
        };
        let labels: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (row_idx, row) in rows {
            let mut record = RowRecord::new();
            for (col_idx, label) in labels.iter().enumerate() {
                if label.is_empty() {
                    continue;
                }
                let abs_pos = (start.0 + row_idx as u32, start.1 + col_idx as u32);
                let cell = row.get(col_idx).unwrap_or(&DataType::Empty);
                let value = Self::convert_cell(cell, formulas.as_ref(), abs_pos);
                record.push(label.clone(), value);
            }
            // 表头跨度内全空的行静默丢弃
            if record.is_blank() {
                continue;
            }
            records.push(record);
        }

        log::info!(
            "读取工作表\"{}\"完成，共{}行数据",
            sheet_name,
            records.len()
        );
        Ok(records)
    }

    /// 单元格类型转换
    fn convert_cell(
        cell: &DataType,
        formulas: Option<&calamine::Range<String>>,
        abs_pos: (u32, u32),
    ) -> CellValue {
        match cell {
            DataType::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(t.to_string())
                }
            }
            DataType::Float(f) => CellValue::Number(*f),
            DataType::Int(i) => CellValue::Number(*i as f64),
            DataType::Bool(b) => CellValue::Boolean(*b),
            // 日期格式的数值单元格转文本表示，而不是暴露序列号
            DataType::DateTime(serial) => CellValue::Text(Self::serial_to_text(*serial)),
            _ => {
                // 空值或错误值：尝试回退公式原文
                if let Some(formula_range) = formulas {
                    if let Some(formula) = formula_range.get_value(abs_pos) {
                        if !formula.trim().is_empty() {
                            return CellValue::Text(format!("={}", formula.trim()));
                        }
                    }
                }
                CellValue::Empty
            }
        }
    }

    /// Excel日期序列号转文本（1900日期系统，基准1899-12-30）
    fn serial_to_text(serial: f64) -> String {
        let base = NaiveDate::from_ymd_opt(1899, 12, 30)
            .expect("固定基准日期有效")
            .and_hms_opt(0, 0, 0)
            .expect("固定基准时间有效");
        let seconds = (serial * 86_400.0).round() as i64;
        let datetime = base + Duration::seconds(seconds);
        if seconds % 86_400 == 0 {
            datetime.format("%Y-%m-%d").to_string()
        } else {
            datetime.format("%Y-%m-%d %H:%M:%S").to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_to_text_date_only() {
        // 2024-01-01 对应序列号45292
        assert_eq!(SpreadsheetReader::serial_to_text(45292.0), "2024-01-01");
    }

    #[test]
    fn test_serial_to_text_with_time() {
        // 半天即12:00:00
        assert_eq!(
            SpreadsheetReader::serial_to_text(45292.5),
            "2024-01-01 12:00:00"
        );
    }

    #[test]
    fn test_missing_file() {
        let result = SpreadsheetReader::sheet_names(Path::new("/不存在/点表.xlsx"));
        assert!(result.is_err());
    }
}
