/// 点表→ST代码生成系统 - Rust核心库
///
/// 从点表工作簿与设备分类出发，经模板渲染生成PLC结构化文本(ST)源文件，
/// 并静态分析生成结果产出变量声明工作簿。
pub mod models;
pub mod utils;
pub mod services;
pub mod error;

// 重新导出常用类型，方便使用
pub use models::*;
pub use services::*;
pub use utils::{AppConfig, AppError, AppResult};

use std::path::{Path, PathBuf};

/// 一次完整流水线运行的产物
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// 写出的ST文件路径
    pub st_files: Vec<PathBuf>,
    /// 变量声明表路径（没有合格条目时为None）
    pub variable_table: Option<PathBuf>,
    /// 导入/生成汇总（含逐项警告）
    pub summary: ImportSummary,
}

/// 执行完整流水线：导入 → 生成 → 分析 → 导出
///
/// 单次运行在一个逻辑管线内顺序完成各阶段；
/// 两次运行之间不共享点位/设备状态。
pub async fn run_pipeline(input_path: &Path, config: &AppConfig) -> AppResult<PipelineOutput> {
    // 导入点表，构建点位/设备模型
    let import_service = DataImportService::new(config.clone());
    let (model, mut summary) = import_service.import_point_table(input_path).await?;

    // 模板名称映射缺失时降级为空映射（逐设备报缺模板）
    let mapping = match load_template_mapping(&config.template_mapping_file) {
        Ok(mapping) => mapping,
        Err(e) => {
            summary.add_warning(format!("模板映射加载失败，按空映射继续: {}", e));
            Default::default()
        }
    };

    // 三种生成模式
    let orchestrator = GenerationOrchestrator::new(config.template_dir.clone(), mapping);
    let mut results = orchestrator.generate_for_devices(&model, &mut summary).await;
    results.extend(orchestrator.generate_for_io_groups(&model, &mut summary).await);
    results.extend(orchestrator.generate_for_comm_points(&model, &mut summary).await);

    // 静态分析生成结果，恢复变量声明行
    let metadata_parser = TemplateMetadataParser::new();
    let mut entries = Vec::new();
    for result in &results {
        let metadata = match metadata_parser.parse(&result.template_path) {
            Ok(m) => m,
            Err(e) => {
                summary.add_warning(format!(
                    "模板\"{}\"元数据解析失败: {}",
                    result.template_path.display(),
                    e
                ));
                None
            }
        };
        entries.extend(VariableExtractor::extract(
            &result.content,
            metadata.as_ref(),
        ));
    }

    // 导出：I/O失败向调用方传播为致命错误
    let st_files = ExportService::export_st_files(&results, &config.output_dir)?;
    let variable_table = if entries.is_empty() {
        None
    } else {
        Some(ExportService::export_variable_table(
            &entries,
            &config.output_dir,
        )?)
    };

    log::info!(
        "流水线完成: ST文件{}个，变量行{}条，警告{}条",
        st_files.len(),
        entries.len(),
        summary.warnings.len()
    );
    Ok(PipelineOutput {
        st_files,
        variable_table,
        summary,
    })
}
