/// 错误处理模块
///
/// 统一入口：重新导出utils::error中的所有错误类型，
/// 其他模块可通过 use crate::error::{AppError, AppResult} 使用。
pub use crate::utils::error::*;
