/// 领域层服务模块，包含核心业务逻辑

/// 点位/设备模型构建模块
pub mod model_builder;

/// 模板元数据解析模块
pub mod template_metadata;

/// 占位符绑定推断模块
pub mod placeholder_binding;

// 重新导出领域层服务
pub use model_builder::ModelBuilder;
pub use placeholder_binding::{BindingOutcome, PlaceholderBindingResolver};
pub use template_metadata::TemplateMetadataParser;
