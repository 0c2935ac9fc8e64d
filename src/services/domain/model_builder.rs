/// 点位/设备模型构建器
///
/// 在一次导入运行内，按固定的四个阶段把多张互有重叠的点表
/// 构建成一致的点位/设备模型：
///
/// 1. **主表构建**: IO点表逐行建点，重复标识保留首条并告警
/// 2. **分类归属**: 设备分类表建立设备并把点位归属到设备
/// 3. **明细充实**: 固定清单的设备明细表整体覆盖软点记录
/// 4. **独立点归集**: 主表与已分配集合做差，按点类型分池
///
/// 构建器不可跨运行复用：每次运行持有全新的主表、已分配集合与设备表。
/// 归属关系以主表+已分配集合为唯一事实来源，设备内的点位是按值快照。
use crate::error::{AppError, AppResult};
use crate::models::{
    AlarmSetting, Device, ImportModel, ImportSummary, ModuleType, PointDefinition, PointType,
    RowRecord,
};
use crate::services::infrastructure::field_resolver::FieldResolver;

/// 标题行关键列规范名常量
const COL_HMI_NAME: &str = "变量名称（HMI）";
const COL_DESCRIPTION: &str = "变量描述";
const COL_STATION: &str = "场站名";
const COL_MODULE_NAME: &str = "模块名称";
const COL_MODULE_TYPE: &str = "模块类型";
const COL_CHANNEL: &str = "通道位号";
const COL_WIRE_SYSTEM: &str = "线制";
const COL_POWER_TYPE: &str = "供电类型";
const COL_DATA_TYPE: &str = "数据类型";
const COL_PLC_ADDR: &str = "PLC绝对地址";
const COL_COMM_ADDR: &str = "上位机通讯地址";
const COL_UNIT: &str = "单位";
const COL_RANGE_LOW: &str = "量程低限";
const COL_RANGE_HIGH: &str = "量程高限";
const COL_POWER_FAILURE: &str = "掉电保护";
const COL_SAVE_HISTORY: &str = "保存历史";
const COL_DEVICE_TAG: &str = "设备位号";
const COL_POINT_TYPE: &str = "点类型";
const COL_TEMPLATE_NAME: &str = "模板名称";

/// 主表解析错误数上限，超过即判定点表严重畸形并放弃整次运行
const MASTER_ERROR_CEILING: usize = 50;

/// 点位/设备模型构建器
pub struct ModelBuilder {
    resolver: FieldResolver,
    model: ImportModel,
    summary: ImportSummary,
    master_error_count: usize,
}

impl ModelBuilder {
    /// 创建新构建器（全新的运行状态）
    pub fn new() -> Self {
        Self {
            resolver: FieldResolver::columns(),
            model: ImportModel::new(),
            summary: ImportSummary::new(),
            master_error_count: 0,
        }
    }

    /// 阶段1：从IO点表行记录构建主点位表
    ///
    /// 重复标识保留首次出现的属性值；缺失标识的行跳过并告警；
    /// 错误数超过上限时判定整个点表畸形，返回致命错误。
    pub fn build_master(&mut self, rows: &[RowRecord]) -> AppResult<()> {
        self.summary.total_rows = rows.len();

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 2; // 表头占第1行
            let labels = row.labels();

            let tag = self
                .resolver
                .resolve(&labels, COL_HMI_NAME)
                .map(|l| row.text(&l))
                .unwrap_or_default();
            if tag.is_empty() {
                self.summary.skipped_rows += 1;
                self.summary
                    .add_warning(format!("IO点表第{}行缺少变量名称，已跳过", row_number));
                self.bump_master_errors()?;
                continue;
            }

            if self.model.points.contains_key(&tag) {
                self.summary.duplicate_tags += 1;
                self.summary.add_warning(format!(
                    "IO点表第{}行变量名称\"{}\"重复，保留首次出现的数据",
                    row_number, tag
                ));
                self.bump_master_errors()?;
                continue;
            }

            let point = self.point_from_row(&tag, row);
            self.model.points.insert(tag, point);
            self.summary.imported_points += 1;
        }

        log::info!(
            "主表构建完成：共{}行，导入{}个点位，跳过{}行，重复{}个",
            self.summary.total_rows,
            self.summary.imported_points,
            self.summary.skipped_rows,
            self.summary.duplicate_tags
        );
        Ok(())
    }

    /// 阶段2：应用设备分类表，建立设备并归属点位
    ///
    /// 标识已存在于主表则复用（行内给出点类型时覆盖）；
    /// 否则按行合成新点并插入主表。点类型文本为空的行不做归属，
    /// 点位留待独立点归集；否则记入已分配集合，并按"是否已在主表"
    /// 分流到设备的硬点快照或软点集合。
    pub fn apply_classification(&mut self, rows: &[RowRecord]) {
        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 2;
            let labels = row.labels();

            let tag = self
                .resolver
                .resolve(&labels, COL_HMI_NAME)
                .map(|l| row.text(&l))
                .unwrap_or_default();
            if tag.is_empty() {
                self.summary
                    .add_warning(format!("设备分类表第{}行缺少变量名称，已跳过", row_number));
                continue;
            }

            let device_tag = self
                .resolver
                .resolve(&labels, COL_DEVICE_TAG)
                .map(|l| row.text(&l))
                .unwrap_or_default();
            if device_tag.is_empty() {
                self.summary
                    .add_warning(format!("设备分类表第{}行缺少设备位号，已跳过", row_number));
                continue;
            }

            let point_type_text = self
                .resolver
                .resolve(&labels, COL_POINT_TYPE)
                .map(|l| row.text(&l))
                .unwrap_or_default();
            let template_name = self
                .resolver
                .resolve(&labels, COL_TEMPLATE_NAME)
                .map(|l| row.text(&l))
                .unwrap_or_default();

            // 主表已有则复用，否则按行合成软点并登记进主表
            let existed_in_master = self.model.points.contains_key(&tag);
            if existed_in_master {
                if let Some(pt) = PointType::parse(&point_type_text) {
                    if let Some(point) = self.model.points.get_mut(&tag) {
                        point.point_type = Some(pt);
                    }
                }
            } else {
                let point = self.point_from_row(&tag, row);
                self.model.points.insert(tag.clone(), point);
            }

            // 点类型为空：不归属，点位进入独立点候选
            let snapshot = if point_type_text.is_empty() {
                None
            } else {
                Some(self.model.points[&tag].clone())
            };

            let device = self
                .model
                .devices
                .entry(device_tag.clone())
                .or_insert_with(|| Device::new(device_tag.clone()));
            device.set_template_if_empty(&template_name);

            if let Some(snapshot) = snapshot {
                self.model.assigned_tags.insert(tag.clone());
                if existed_in_master {
                    device.io_points.insert(tag, snapshot);
                } else {
                    device.device_points.insert(tag, snapshot);
                }
            }
        }

        log::info!(
            "分类归属完成：设备{}个，已分配点位{}个",
            self.model.devices.len(),
            self.model.assigned_tags.len()
        );
    }

    /// 阶段3：用设备明细表充实软点
    ///
    /// 对每行按变量名线性扫描全部设备的软点集合，
    /// 命中第一个后用该行字段整体覆盖原记录（不做合并）。
    /// 无匹配只告警不报错。
    pub fn enrich_from_detail(&mut self, sheet_name: &str, rows: &[RowRecord]) {
        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 2;
            let labels = row.labels();

            let tag = self
                .resolver
                .resolve(&labels, COL_HMI_NAME)
                .map(|l| row.text(&l))
                .unwrap_or_default();
            if tag.is_empty() {
                self.summary.add_warning(format!(
                    "明细表\"{}\"第{}行缺少变量名称，已跳过",
                    sheet_name, row_number
                ));
                continue;
            }

            // 设备位号排序后扫描，保证同名冲突时命中结果可复现
            let mut device_tags: Vec<String> = self.model.devices.keys().cloned().collect();
            device_tags.sort();

            let mut fresh = self.point_from_row(&tag, row);
            if fresh.point_type.is_none() {
                fresh.point_type = Some(PointType::Soft);
            }

            let target = device_tags
                .into_iter()
                .find(|dt| self.model.devices[dt].device_points.contains_key(&tag));

            match target.and_then(|dt| self.model.devices.get_mut(&dt)) {
                Some(device) => {
                    device.device_points.insert(tag.clone(), fresh);
                }
                None => {
                    self.summary.unmatched_detail_rows += 1;
                    self.summary.add_warning(format!(
                        "明细表\"{}\"第{}行变量\"{}\"未匹配到任何设备软点",
                        sheet_name, row_number, tag
                    ));
                }
            }
        }
    }

    /// 阶段4：归集独立点
    ///
    /// 独立点 = 主表 − 已分配集合（按标识做差），再按点类型分池。
    /// 点类型为空但模块类型属于AI/AO/DI/DO词汇表的，推断为硬点
    /// 并把推断结果写回主表点位。
    pub fn resolve_standalone(&mut self) {
        let mut standalone: Vec<String> = self
            .model
            .points
            .keys()
            .filter(|tag| !self.model.assigned_tags.contains(*tag))
            .cloned()
            .collect();
        standalone.sort();

        for tag in standalone {
            let point = self.model.points.get_mut(&tag).expect("标识来自键集");
            let point_type = match point.point_type {
                Some(pt) => pt,
                None => {
                    let inferred = point
                        .module_type
                        .or_else(|| ModuleType::parse(&point.module_type_text));
                    if inferred.is_some() {
                        point.point_type = Some(PointType::Hard);
                        PointType::Hard
                    } else {
                        PointType::Soft
                    }
                }
            };
            match point_type {
                PointType::Hard => self.model.standalone_hard.push(tag),
                PointType::Soft => self.model.standalone_soft.push(tag),
                PointType::Comm => self.model.standalone_comm.push(tag),
            }
        }

        log::info!(
            "独立点归集完成：硬点{}个，软点{}个，通讯点{}个",
            self.model.standalone_hard.len(),
            self.model.standalone_soft.len(),
            self.model.standalone_comm.len()
        );
    }

    /// 取出构建结果与汇总，消耗构建器本身（运行状态不可复用）
    pub fn finish(self) -> (ImportModel, ImportSummary) {
        (self.model, self.summary)
    }

    /// 主表错误计数，超过上限判定点表畸形
    fn bump_master_errors(&mut self) -> AppResult<()> {
        self.master_error_count += 1;
        if self.master_error_count > MASTER_ERROR_CEILING {
            return Err(AppError::validation_error(format!(
                "IO点表解析错误超过{}条，点表格式严重异常，中止本次导入",
                MASTER_ERROR_CEILING
            )));
        }
        Ok(())
    }

    /// 按行记录构造点位定义：每个已知逻辑属性经字段解析器取值
    fn point_from_row(&self, tag: &str, row: &RowRecord) -> PointDefinition {
        let labels = row.labels();
        let text = |logical: &str| -> String {
            self.resolver
                .resolve(&labels, logical)
                .map(|l| clean_placeholder(row.text(&l)))
                .unwrap_or_default()
        };
        let number = |logical: &str| -> Option<f64> {
            self.resolver
                .resolve(&labels, logical)
                .and_then(|l| row.number(&l))
        };
        let flag = |logical: &str| -> Option<bool> {
            let t = text(logical);
            match t.as_str() {
                "是" => Some(true),
                "否" => Some(false),
                _ => None,
            }
        };
        let alarm = |prefix: &str| -> AlarmSetting {
            AlarmSetting {
                set_value: number(&format!("{}设定值", prefix)),
                set_point: text(&format!("{}设定点位", prefix)),
                set_point_plc_address: text(&format!("{}设定点位_PLC地址", prefix)),
                set_point_comm_address: text(&format!("{}设定点位_通讯地址", prefix)),
            }
        };

        let module_type_text = text(COL_MODULE_TYPE);
        let mut point = PointDefinition::new(tag);
        point.description = text(COL_DESCRIPTION);
        point.station_name = text(COL_STATION);
        point.module_name = text(COL_MODULE_NAME);
        point.module_type = ModuleType::parse(&module_type_text);
        point.module_type_text = module_type_text;
        point.channel_number = text(COL_CHANNEL);
        point.wire_system = text(COL_WIRE_SYSTEM);
        point.power_supply_type = text(COL_POWER_TYPE);
        point.data_type = text(COL_DATA_TYPE);
        point.plc_absolute_address = text(COL_PLC_ADDR);
        point.communication_address = text(COL_COMM_ADDR);
        point.range_low_limit = number(COL_RANGE_LOW);
        point.range_high_limit = number(COL_RANGE_HIGH);
        point.engineering_unit = text(COL_UNIT);
        point.sll = alarm("SLL");
        point.sl = alarm("SL");
        point.sh = alarm("SH");
        point.shh = alarm("SHH");
        point.point_type = PointType::parse(&text(COL_POINT_TYPE));
        point.power_failure_protection = flag(COL_POWER_FAILURE);
        point.save_history = flag(COL_SAVE_HISTORY);
        point
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 现场点表用"/"表示无值，读取时按空处理
fn clean_placeholder(value: String) -> String {
    if value == "/" {
        String::new()
    } else {
        value
    }
}

/// 校验归属不变式：独立点数 + 已分配点数 == 主表点数
pub fn ownership_invariant_holds(model: &ImportModel) -> bool {
    let standalone_total =
        model.standalone_hard.len() + model.standalone_soft.len() + model.standalone_comm.len();
    standalone_total + model.assigned_tags.len() == model.points.len()
}
