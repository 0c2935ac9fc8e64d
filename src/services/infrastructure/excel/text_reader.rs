/// 文本点表读取器
///
/// 读取以分隔符组织的纯文本点表（现场常见从Excel另存的txt/csv），
/// 输出与Excel读取器一致的行记录序列。
///
/// 编码按固定顺序探测：UTF-8 → GB2312 → GBK → 平台默认，
/// 取第一个解码后不含替换符(U+FFFD)的结果；全部失败时强制按UTF-8有损解码。
/// 带引号字段内嵌分隔符由csv解析器处理。
use std::path::Path;

use encoding_rs::Encoding;

use crate::error::{AppError, AppResult};
use crate::models::{CellValue, RowRecord};

/// 编码探测候选顺序
/// GB2312在编码标准中映射到GBK解码器；平台默认按UTF-8处理，由强制回退覆盖
const ENCODING_CANDIDATES: [&str; 3] = ["utf-8", "gb2312", "gbk"];

/// 文本表格读取器
pub struct TextTableReader;

impl TextTableReader {
    /// 读取文本点表为行记录序列，首行为表头
    pub fn read_table(file_path: &Path) -> AppResult<Vec<RowRecord>> {
        if !file_path.exists() {
            return Err(AppError::validation_error(format!(
                "文件不存在: {}",
                file_path.display()
            )));
        }

        let bytes = std::fs::read(file_path)?;
        let text = Self::decode_with_probe(&bytes);
        Self::parse_text(&text)
    }

    /// 按候选顺序探测编码解码字节流
    pub fn decode_with_probe(bytes: &[u8]) -> String {
        for label in ENCODING_CANDIDATES {
            let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
                continue;
            };
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if !had_errors && !decoded.contains('\u{FFFD}') {
                return decoded.into_owned();
            }
        }
        // 全部候选失败：强制UTF-8有损解码
        log::warn!("编码探测失败，强制按UTF-8解码");
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// 读取文本文件内容（供模板等非表格文本复用同一探测逻辑）
    pub fn read_text(file_path: &Path) -> AppResult<String> {
        let bytes = std::fs::read(file_path)?;
        Ok(Self::decode_with_probe(&bytes))
    }

    /// 解析分隔文本：首行表头，分隔符从表头行自动识别（制表符优先于逗号）
    fn parse_text(text: &str) -> AppResult<Vec<RowRecord>> {
        let header_line = text.lines().next().unwrap_or_default();
        let delimiter = if header_line.contains('\t') { b'\t' } else { b',' };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = reader.records();
        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };
        let header = header.map_err(|e| AppError::validation_error(format!("解析表头失败: {}", e)))?;
        let labels: Vec<String> = header.iter().map(|s| s.trim().to_string()).collect();

        let mut records = Vec::new();
        for row in rows {
            let row = match row {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("跳过无法解析的行: {}", e);
                    continue;
                }
            };

            let mut record = RowRecord::new();
            for (idx, label) in labels.iter().enumerate() {
                if label.is_empty() {
                    continue;
                }
                let raw = row.get(idx).unwrap_or("").trim();
                record.push(label.clone(), Self::convert_field(raw));
            }
            if record.is_blank() {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// 字段类型化：空→Empty，可解析数值→Number，其余→Text
    fn convert_field(raw: &str) -> CellValue {
        if raw.is_empty() {
            return CellValue::Empty;
        }
        if let Ok(n) = raw.parse::<f64>() {
            return CellValue::Number(n);
        }
        CellValue::Text(raw.to_string())
    }
}
