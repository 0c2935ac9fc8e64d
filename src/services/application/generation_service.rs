/// 代码生成编排服务
///
/// 驱动两种生成模式，产出GenerationResult值对象：
/// - **按设备**: 每台设备经模板名称映射选定模板文件，
///   用设备身份、点位计数、两个点位集合与占位符绑定构建上下文渲染；
///   单台设备的模板缺失或渲染失败只跳过该设备，批次继续。
/// - **按IO分组**: 主表中带PLC绝对地址的硬点按模块类型分组，
///   映射键为"{模块}_MAPPING"，每组渲染一次；缺失只告警该组。
///
/// 另有独立通讯点池的整组渲染（映射键COMM_MAPPING）。
/// 结果按设备位号/模块类型排序，保证输出可复现对比。
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::{Context, Tera};

use crate::error::{AppError, AppResult};
use crate::models::{
    Device, GenerationCategory, GenerationResult, ImportModel, ImportSummary, ModuleType,
    PointDefinition,
};
use crate::services::domain::placeholder_binding::PlaceholderBindingResolver;
use crate::services::infrastructure::excel::TextTableReader;

/// 独立通讯点整组渲染的映射键
const COMM_MAPPING_KEY: &str = "COMM_MAPPING";

/// 加载模板名称映射配置
///
/// 平面的 键→模板文件名 JSON对象；下划线开头的键视为注释忽略，
/// 值为空的条目忽略。
pub fn load_template_mapping(path: &Path) -> AppResult<HashMap<String, String>> {
    if !path.exists() {
        return Err(AppError::configuration_error(format!(
            "模板映射文件不存在: {}",
            path.display()
        )));
    }
    let content = TextTableReader::read_text(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let object = value.as_object().ok_or_else(|| {
        AppError::configuration_error("模板映射文件必须是平面JSON对象".to_string())
    })?;

    let mut mapping = HashMap::new();
    for (key, value) in object {
        // 下划线开头的键是注释条目
        if key.starts_with('_') {
            continue;
        }
        let file_name = value.as_str().unwrap_or_default().trim();
        if file_name.is_empty() {
            continue;
        }
        mapping.insert(key.clone(), file_name.to_string());
    }
    log::info!("模板映射加载完成，共{}条有效条目", mapping.len());
    Ok(mapping)
}

/// 代码生成编排器
pub struct GenerationOrchestrator {
    template_dir: PathBuf,
    mapping: HashMap<String, String>,
    binding_resolver: PlaceholderBindingResolver,
}

impl GenerationOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// * `template_dir` - 模板文件目录
    /// * `mapping` - 预加载的 模板名→文件名 映射
    pub fn new(template_dir: PathBuf, mapping: HashMap<String, String>) -> Self {
        Self {
            template_dir,
            mapping,
            binding_resolver: PlaceholderBindingResolver::new(),
        }
    }

    /// 按映射键定位模板文件
    fn template_path(&self, mapping_key: &str) -> Option<PathBuf> {
        let file_name = self.mapping.get(mapping_key)?;
        let path = self.template_dir.join(file_name);
        path.exists().then_some(path)
    }

    /// 按设备生成：每台设备渲染一个ST文件
    pub async fn generate_for_devices(
        &self,
        model: &ImportModel,
        summary: &mut ImportSummary,
    ) -> Vec<GenerationResult> {
        let mut results = Vec::new();

        for device in model.devices_sorted() {
            // 单台设备的任何失败只跳过该设备
            match self.render_device(device, summary) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => {
                    log::error!("设备\"{}\"模板渲染失败: {}", device.device_tag, e);
                    summary
                        .warnings
                        .push(format!("设备\"{}\"模板渲染失败: {}", device.device_tag, e));
                }
            }
        }

        log::info!("设备程序生成完成，共{}个", results.len());
        results
    }

    fn render_device(
        &self,
        device: &Device,
        summary: &mut ImportSummary,
    ) -> AppResult<Option<GenerationResult>> {
        if device.template_name.is_empty() {
            summary.missing_templates += 1;
            log::error!("设备\"{}\"未指定模板名称，已跳过", device.device_tag);
            summary
                .warnings
                .push(format!("设备\"{}\"未指定模板名称，已跳过", device.device_tag));
            return Ok(None);
        }

        let Some(template_path) = self.template_path(&device.template_name) else {
            summary.missing_templates += 1;
            log::error!(
                "设备\"{}\"的模板\"{}\"缺失（无映射或文件不存在），已跳过",
                device.device_tag,
                device.template_name
            );
            summary.warnings.push(format!(
                "设备\"{}\"的模板\"{}\"缺失，已跳过",
                device.device_tag, device.template_name
            ));
            return Ok(None);
        };

        let template_text = TextTableReader::read_text(&template_path)?;

        // 自由占位符经绑定解析器推断
        let outcome = self.binding_resolver.bind(device, &template_text);
        summary.unresolved_placeholders += outcome.unresolved.len();
        for name in &outcome.unresolved {
            summary.warnings.push(format!(
                "设备\"{}\"的占位符\"{}\"未解析，输出含哨兵标记",
                device.device_tag, name
            ));
        }

        let mut context = Context::new();
        let mut binding_keys: Vec<&String> = outcome.bindings.keys().collect();
        binding_keys.sort();
        for key in binding_keys {
            context.insert(key.as_str(), &outcome.bindings[key]);
        }

        let io_points = sorted_points(device.io_points.values());
        let device_points = sorted_points(device.device_points.values());
        context.insert("device_tag", &device.device_tag);
        context.insert("io_point_count", &io_points.len());
        context.insert("device_point_count", &device_points.len());
        context.insert("io_points", &io_points);
        context.insert("device_points", &device_points);

        let rendered = Tera::one_off(&template_text, &context, false)?;
        Ok(Some(GenerationResult {
            category: GenerationCategory::Device,
            file_name: format!("{}.ST", device.device_tag),
            content: rendered,
            template_path,
        }))
    }

    /// 按IO分组生成：带PLC绝对地址的硬点按模块类型各渲染一次
    pub async fn generate_for_io_groups(
        &self,
        model: &ImportModel,
        summary: &mut ImportSummary,
    ) -> Vec<GenerationResult> {
        let mut results = Vec::new();

        for module_type in ModuleType::all() {
            let points: Vec<&PointDefinition> = {
                let mut points: Vec<&PointDefinition> = model
                    .points
                    .values()
                    .filter(|p| {
                        p.point_type == Some(crate::models::PointType::Hard)
                            && !p.plc_absolute_address.is_empty()
                            && p.module_type == Some(module_type)
                    })
                    .collect();
                points.sort_by(|a, b| a.hmi_tag_name.cmp(&b.hmi_tag_name));
                points
            };
            if points.is_empty() {
                continue;
            }

            let mapping_key = format!("{}_MAPPING", module_type);
            match self.render_group(
                &mapping_key,
                &points,
                GenerationCategory::IoMapping,
                Some(module_type),
            ) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {
                    summary.missing_templates += 1;
                    summary.add_warning(format!(
                        "模块类型{}的映射模板\"{}\"缺失，该组已跳过",
                        module_type, mapping_key
                    ));
                }
                Err(e) => {
                    summary.add_warning(format!("IO分组\"{}\"渲染失败: {}", mapping_key, e));
                }
            }
        }

        log::info!("IO映射程序生成完成，共{}个", results.len());
        results
    }

    /// 独立通讯点整组生成
    pub async fn generate_for_comm_points(
        &self,
        model: &ImportModel,
        summary: &mut ImportSummary,
    ) -> Vec<GenerationResult> {
        let points: Vec<&PointDefinition> = model
            .standalone_comm
            .iter()
            .filter_map(|tag| model.points.get(tag))
            .collect();
        if points.is_empty() {
            return Vec::new();
        }

        match self.render_group(
            COMM_MAPPING_KEY,
            &points,
            GenerationCategory::Communication,
            None,
        ) {
            Ok(Some(result)) => vec![result],
            Ok(None) => {
                summary.missing_templates += 1;
                summary.add_warning(format!(
                    "通讯点映射模板\"{}\"缺失，通讯程序已跳过",
                    COMM_MAPPING_KEY
                ));
                Vec::new()
            }
            Err(e) => {
                summary.add_warning(format!("通讯程序渲染失败: {}", e));
                Vec::new()
            }
        }
    }

    /// 整组渲染的公共路径：映射缺失返回Ok(None)由调用方决定告警措辞
    fn render_group(
        &self,
        mapping_key: &str,
        points: &[&PointDefinition],
        category: GenerationCategory,
        module_type: Option<ModuleType>,
    ) -> AppResult<Option<GenerationResult>> {
        let Some(template_path) = self.template_path(mapping_key) else {
            return Ok(None);
        };
        let template_text = TextTableReader::read_text(&template_path)?;

        let mut context = Context::new();
        context.insert("points", points);
        context.insert("point_count", &points.len());
        if let Some(mt) = module_type {
            context.insert("module_type", &mt.to_string());
        }

        let rendered = Tera::one_off(&template_text, &context, false)?;
        Ok(Some(GenerationResult {
            category,
            file_name: format!("{}.ST", mapping_key),
            content: rendered,
            template_path,
        }))
    }
}

/// 点位集合按变量名排序成列表（渲染上下文用）
fn sorted_points<'a>(points: impl Iterator<Item = &'a PointDefinition>) -> Vec<&'a PointDefinition> {
    let mut list: Vec<&PointDefinition> = points.collect();
    list.sort_by(|a, b| a.hmi_tag_name.cmp(&b.hmi_tag_name));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PointDefinition, PointType};
    use std::fs;

    fn setup_templates(dir: &Path) -> HashMap<String, String> {
        fs::write(
            dir.join("MOV_CTRL.txt"),
            "程序名称: MOV_CTRL(PRG)\n变量类型: BOOL\n{{device_tag}}_CTRL(\n  IN := {{xs}}\n);\n",
        )
        .unwrap();
        fs::write(
            dir.join("AI_MAPPING.txt"),
            "{% for p in points %}{{ p.hmi_tag_name }} := {{ p.plc_absolute_address }};\n{% endfor %}",
        )
        .unwrap();
        let mut mapping = HashMap::new();
        mapping.insert("MOV_CTRL".to_string(), "MOV_CTRL.txt".to_string());
        mapping.insert("AI_MAPPING".to_string(), "AI_MAPPING.txt".to_string());
        mapping
    }

    fn model_with_device() -> ImportModel {
        let mut model = ImportModel::new();
        let mut device = Device::new("XV-1001");
        device.template_name = "MOV_CTRL".to_string();
        let mut xs = PointDefinition::new("XV1001_XS");
        xs.description = "开到位".to_string();
        device.io_points.insert(xs.hmi_tag_name.clone(), xs);
        model.devices.insert(device.device_tag.clone(), device);
        model
    }

    #[tokio::test]
    async fn test_generate_for_devices() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = setup_templates(dir.path());
        let orchestrator = GenerationOrchestrator::new(dir.path().to_path_buf(), mapping);

        let model = model_with_device();
        let mut summary = ImportSummary::new();
        let results = orchestrator.generate_for_devices(&model, &mut summary).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "XV-1001.ST");
        assert_eq!(results[0].category, GenerationCategory::Device);
        assert!(results[0].content.contains("XV-1001_CTRL("));
        assert!(results[0].content.contains("IN := XV1001_XS"));
        assert_eq!(summary.missing_templates, 0);
    }

    #[tokio::test]
    async fn test_missing_template_skips_device_but_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = setup_templates(dir.path());
        let orchestrator = GenerationOrchestrator::new(dir.path().to_path_buf(), mapping);

        let mut model = model_with_device();
        let mut orphan = Device::new("AA-0001");
        orphan.template_name = "不存在的模板".to_string();
        model.devices.insert(orphan.device_tag.clone(), orphan);

        let mut summary = ImportSummary::new();
        let results = orchestrator.generate_for_devices(&model, &mut summary).await;

        // 缺模板的设备被跳过，另一台正常生成
        assert_eq!(results.len(), 1);
        assert_eq!(summary.missing_templates, 1);
        assert!(summary.has_warnings());
    }

    #[tokio::test]
    async fn test_generate_for_io_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = setup_templates(dir.path());
        let orchestrator = GenerationOrchestrator::new(dir.path().to_path_buf(), mapping);

        let mut model = ImportModel::new();
        let mut tt = PointDefinition::new("TT_2001");
        tt.module_type = Some(ModuleType::AI);
        tt.point_type = Some(PointType::Hard);
        tt.plc_absolute_address = "%MD100".to_string();
        model.points.insert(tt.hmi_tag_name.clone(), tt);
        // 无PLC地址的硬点不参与IO映射
        let mut no_addr = PointDefinition::new("TT_2002");
        no_addr.module_type = Some(ModuleType::AI);
        no_addr.point_type = Some(PointType::Hard);
        model.points.insert(no_addr.hmi_tag_name.clone(), no_addr);

        let mut summary = ImportSummary::new();
        let results = orchestrator.generate_for_io_groups(&model, &mut summary).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "AI_MAPPING.ST");
        assert!(results[0].content.contains("TT_2001 := %MD100;"));
        assert!(!results[0].content.contains("TT_2002"));
    }

    #[tokio::test]
    async fn test_io_group_missing_mapping_warns_per_group() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = setup_templates(dir.path());
        let orchestrator = GenerationOrchestrator::new(dir.path().to_path_buf(), mapping);

        let mut model = ImportModel::new();
        let mut di = PointDefinition::new("XV1001_XS");
        di.module_type = Some(ModuleType::DI);
        di.point_type = Some(PointType::Hard);
        di.plc_absolute_address = "%IX0.0".to_string();
        model.points.insert(di.hmi_tag_name.clone(), di);

        let mut summary = ImportSummary::new();
        let results = orchestrator.generate_for_io_groups(&model, &mut summary).await;

        // DI组没有DI_MAPPING映射：整组跳过并告警
        assert!(results.is_empty());
        assert_eq!(summary.missing_templates, 1);
    }

    #[test]
    fn test_load_template_mapping_filters_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("映射.json");
        fs::write(
            &path,
            r#"{"_comment": "说明条目", "MOV_CTRL": "MOV_CTRL.txt", "EMPTY": ""}"#,
        )
        .unwrap();

        let mapping = load_template_mapping(&path).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["MOV_CTRL"], "MOV_CTRL.txt");
    }
}
