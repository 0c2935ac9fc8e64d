/// 应用层服务模块，协调导入、生成与导出流程

/// 数据导入服务模块
pub mod data_import_service;

/// 代码生成编排模块
pub mod generation_service;

/// 变量抽取与变量表输出模块
pub mod variable_table_service;

/// 导出服务模块
pub mod export_service;

// 重新导出应用层服务
pub use data_import_service::DataImportService;
pub use export_service::ExportService;
pub use generation_service::{load_template_mapping, GenerationOrchestrator};
pub use variable_table_service::{VariableExtractor, VariableTableWriter};
