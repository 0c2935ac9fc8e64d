/// 服务层模块，包含应用层和领域层的服务定义
///
/// 按照清洁架构原则组织：
/// - Application Layer: 应用服务，协调业务流程
/// - Domain Layer: 领域服务，包含核心业务逻辑
/// - Infrastructure Layer: 基础设施服务，处理外部依赖

/// 应用层服务模块
pub mod application;

/// 领域层服务模块
pub mod domain;

/// 基础设施层服务模块
pub mod infrastructure;

// 重新导出应用层服务
pub use application::{
    load_template_mapping, DataImportService, ExportService, GenerationOrchestrator,
    VariableExtractor, VariableTableWriter,
};

// 重新导出领域层服务
pub use domain::{
    BindingOutcome, ModelBuilder, PlaceholderBindingResolver, TemplateMetadataParser,
};

// 重新导出基础设施层的主要类型
pub use infrastructure::{FieldResolver, SpreadsheetReader, TextTableReader};
