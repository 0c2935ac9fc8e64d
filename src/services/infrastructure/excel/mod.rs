/// 表格抽取模块
///
/// 把点表文件读成行记录序列，对调用方屏蔽底层文件格式：
/// - `excel_reader`: Excel工作簿（calamine）
/// - `text_reader`: 分隔文本文件（编码探测 + csv解析）
pub mod excel_reader;
pub mod text_reader;

pub use excel_reader::SpreadsheetReader;
pub use text_reader::TextTableReader;
