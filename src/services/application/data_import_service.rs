/// 数据导入服务
///
/// 负责从点表工作簿导入点位/设备模型：
/// 解析工作表名，驱动模型构建器的四个阶段，返回模型与导入汇总。
/// 主表"IO点表"缺失对整次运行是致命的；
/// 分类表"设备分类表"缺失只降级为"全部点位独立"。
use std::path::Path;

use log::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ImportModel, ImportSummary};
use crate::services::domain::model_builder::ModelBuilder;
use crate::services::infrastructure::excel::SpreadsheetReader;
use crate::services::infrastructure::field_resolver::FieldResolver;
use crate::utils::config::AppConfig;

/// 主点位表的规范工作表名
const SHEET_MASTER: &str = "IO点表";
/// 设备分类表的规范工作表名
const SHEET_CLASSIFICATION: &str = "设备分类表";

/// 数据导入服务
pub struct DataImportService {
    config: AppConfig,
}

impl DataImportService {
    /// 创建新的数据导入服务实例
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 从点表工作簿导入点位/设备模型
    ///
    /// # 参数
    /// * `file_path` - 点表工作簿路径
    ///
    /// # 返回
    /// * `AppResult<(ImportModel, ImportSummary)>` - 构建好的模型与导入汇总
    pub async fn import_point_table(
        &self,
        file_path: &Path,
    ) -> AppResult<(ImportModel, ImportSummary)> {
        info!("开始导入点表: {}", file_path.display());

        if !file_path.exists() {
            return Err(AppError::validation_error(format!(
                "文件不存在: {}",
                file_path.display()
            )));
        }

        let sheet_names = SpreadsheetReader::sheet_names(file_path)?;
        let sheet_resolver = FieldResolver::sheets();
        let mut builder = ModelBuilder::new();

        // 阶段1：主表必需，缺失即致命
        let master_sheet = sheet_resolver.resolve_required(&sheet_names, SHEET_MASTER)?;
        let master_rows = SpreadsheetReader::read_sheet(file_path, &master_sheet)?;
        builder.build_master(&master_rows)?;

        // 阶段2：分类表可选，缺失降级为全部点位独立
        match sheet_resolver.resolve(&sheet_names, SHEET_CLASSIFICATION) {
            Some(classification_sheet) => {
                let rows = SpreadsheetReader::read_sheet(file_path, &classification_sheet)?;
                builder.apply_classification(&rows);
            }
            None => {
                warn!("未找到设备分类表，全部点位按独立点处理");
            }
        }

        // 阶段3：固定清单的设备明细表，逐张充实软点
        for detail_sheet in &self.config.detail_sheets {
            let Some(actual) = sheet_resolver.resolve(&sheet_names, detail_sheet) else {
                continue;
            };
            let rows = SpreadsheetReader::read_sheet(file_path, &actual)?;
            builder.enrich_from_detail(detail_sheet, &rows);
        }

        // 阶段4：独立点归集
        builder.resolve_standalone();

        let (model, summary) = builder.finish();
        info!(
            "点表导入完成: 点位{}个，设备{}个，警告{}条",
            model.points.len(),
            model.devices.len(),
            summary.warnings.len()
        );
        Ok((model, summary))
    }
}
