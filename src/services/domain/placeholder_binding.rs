/// 占位符绑定解析器
///
/// 对给定设备与模板文本，推断每个未显式命名的占位符应绑定到
/// 设备的哪个信号。占位符是`{{名称}}`形式的纯标识符记号；
/// 注释(`{# #}`)、循环/控制指令(`{% %}`)、带点号的记号以及
/// 控制字不参与绑定。`device_tag`始终直接绑定设备位号。
///
/// 其余占位符按固定顺序推断：
/// 1. 取设备硬点/软点变量名并集
/// 2. 变量名忽略大小写包含占位符文本：恰好一个 → 取之
/// 3. 多个 → 取长度最接近占位符的，长度并列按字典序
/// 4. 没有 → 扫描各点位描述字段找忽略大小写子串
/// 5. 仍没有 → 查静态语义关键词表（常见工程缩写 → 关键词清单），
///    先试变量名再试描述，先命中者胜
///
/// 推断失败的占位符绑定为字面哨兵`<名称>`并记录告警，
/// 渲染结果中会明显可见。
///
/// 绑定结果按(设备位号, 模板内容哈希)缓存5分钟；同一键在1分钟
/// 滚动窗口内超过10次调用会被限流，改发最近缓存（或仅含
/// device_tag的最小映射）。限流防的是病态的重复渲染循环，
/// 不是正常的并发调用方。
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Device;

/// 占位符记号：双花括号内的纯标识符
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("固定正则有效"));

/// 模板引擎控制字，不参与绑定
const CONTROL_WORDS: [&str; 8] = [
    "else", "endif", "endfor", "end", "loop", "include", "block", "macro",
];

/// 由渲染上下文直接提供的结构化键，不参与推断
const CONTEXT_KEYS: [&str; 7] = [
    "io_points",
    "device_points",
    "io_point_count",
    "device_point_count",
    "points",
    "point_count",
    "module_type",
];

/// 语义关键词表：常见工程缩写 → 依次尝试的关键词
static SEMANTIC_KEYWORDS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("xs", vec!["开到位", "开限位", "open", "XS_"]);
    map.insert("zs", vec!["关到位", "关限位", "close", "ZS_"]);
    map.insert("c_am", vec!["自动", "auto", "C_AM_"]);
    map.insert("c_open", vec!["开阀", "开指令", "C_OPEN"]);
    map.insert("c_close", vec!["关阀", "关指令", "C_CLOSE"]);
    map.insert("c_stop", vec!["停阀", "停指令", "C_STOP"]);
    map.insert("gz", vec!["故障", "fault", "GZ_"]);
    map.insert("yc", vec!["远程", "remote", "YC_"]);
    map.insert("yx", vec!["运行", "running", "YX_"]);
    map.insert("pv", vec!["测量值", "过程值", "PV_"]);
    map.insert("sp", vec!["设定值", "setpoint", "SP_"]);
    map.insert("av", vec!["阀位反馈", "开度", "position"]);
    map
});

/// 缓存有效期
const CACHE_TTL_SECONDS: i64 = 300;
/// 限流滚动窗口
const THROTTLE_WINDOW_SECONDS: i64 = 60;
/// 窗口内调用次数上限
const THROTTLE_CALL_CEILING: usize = 10;

/// 绑定结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingOutcome {
    /// 占位符 → 解析到的变量名（或字面哨兵）
    pub bindings: HashMap<String, String>,
    /// 未能解析、以哨兵兜底的占位符
    pub unresolved: Vec<String>,
}

/// 缓存内部状态：结果缓存 + 调用频率台账
#[derive(Debug, Default)]
struct CacheState {
    results: HashMap<(String, u64), (BindingOutcome, DateTime<Utc>)>,
    calls: HashMap<(String, u64), Vec<DateTime<Utc>>>,
}

/// 占位符绑定解析器
///
/// 缓存与限流计数是唯一跨调用存续的状态；
/// 并发处理设备时必须经由本互斥锁访问。
pub struct PlaceholderBindingResolver {
    cache: Mutex<CacheState>,
}

impl PlaceholderBindingResolver {
    /// 创建新解析器（空缓存）
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(CacheState::default()),
        }
    }

    /// 解析模板文本中全部占位符对设备信号的绑定
    pub fn bind(&self, device: &Device, template_text: &str) -> BindingOutcome {
        let key = (device.device_tag.clone(), content_hash(template_text));
        let now = Utc::now();

        let mut state = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // 调用频率台账：1分钟滚动窗口
        let calls = state.calls.entry(key.clone()).or_default();
        calls.retain(|t| now - *t <= Duration::seconds(THROTTLE_WINDOW_SECONDS));
        calls.push(now);
        let throttled = calls.len() > THROTTLE_CALL_CEILING;

        // 新鲜缓存直接命中
        if let Some((outcome, created_at)) = state.results.get(&key) {
            if now - *created_at <= Duration::seconds(CACHE_TTL_SECONDS) {
                return outcome.clone();
            }
        }

        if throttled {
            log::warn!(
                "设备\"{}\"的绑定请求触发限流，改发最小绑定结果",
                device.device_tag
            );
            let mut minimal = BindingOutcome::default();
            minimal
                .bindings
                .insert("device_tag".to_string(), device.device_tag.clone());
            return minimal;
        }

        let outcome = Self::compute(device, template_text);
        state.results.insert(key, (outcome.clone(), now));
        outcome
    }

    /// 实际推断逻辑（无缓存副作用）
    fn compute(device: &Device, template_text: &str) -> BindingOutcome {
        let mut outcome = BindingOutcome::default();
        outcome
            .bindings
            .insert("device_tag".to_string(), device.device_tag.clone());

        for placeholder in extract_placeholders(template_text) {
            if placeholder == "device_tag" {
                continue;
            }
            match resolve_placeholder(&placeholder, device) {
                Some(variable) => {
                    outcome.bindings.insert(placeholder, variable);
                }
                None => {
                    log::warn!(
                        "设备\"{}\"的占位符\"{}\"无法解析，输出将包含哨兵标记",
                        device.device_tag,
                        placeholder
                    );
                    let sentinel = format!("<{}>", placeholder);
                    outcome.bindings.insert(placeholder.clone(), sentinel);
                    outcome.unresolved.push(placeholder);
                }
            }
        }
        outcome
    }
}

impl Default for PlaceholderBindingResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 提取模板中参与绑定的占位符（按出现顺序去重）
pub fn extract_placeholders(template_text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in PLACEHOLDER_RE.captures_iter(template_text) {
        let name = cap[1].to_string();
        if CONTROL_WORDS.contains(&name.as_str()) || CONTEXT_KEYS.contains(&name.as_str()) {
            continue;
        }
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// 单个占位符的五步推断
fn resolve_placeholder(placeholder: &str, device: &Device) -> Option<String> {
    let names = device.point_names();
    let ph_lower = placeholder.to_lowercase();

    // 变量名包含占位符文本
    let containing: Vec<&String> = names
        .iter()
        .filter(|n| n.to_lowercase().contains(&ph_lower))
        .collect();
    match containing.len() {
        1 => return Some(containing[0].clone()),
        n if n > 1 => {
            // 长度最接近者胜；names已排序，并列时min_by_key保留字典序靠前者
            return containing
                .into_iter()
                .min_by_key(|n| (n.chars().count() as i64 - placeholder.chars().count() as i64).abs())
                .cloned();
        }
        _ => {}
    }

    // 描述字段子串扫描
    for name in &names {
        if let Some(point) = device.find_point(name) {
            if point.description.to_lowercase().contains(&ph_lower) {
                return Some(name.clone());
            }
        }
    }

    // 语义关键词表：先变量名后描述
    if let Some(keywords) = SEMANTIC_KEYWORDS.get(ph_lower.as_str()) {
        for keyword in keywords {
            let kw_lower = keyword.to_lowercase();
            if let Some(name) = names.iter().find(|n| n.to_lowercase().contains(&kw_lower)) {
                return Some(name.clone());
            }
        }
        for keyword in keywords {
            let kw_lower = keyword.to_lowercase();
            for name in &names {
                if let Some(point) = device.find_point(name) {
                    if point.description.to_lowercase().contains(&kw_lower) {
                        return Some(name.clone());
                    }
                }
            }
        }
    }

    None
}

/// 模板内容哈希（缓存键的一部分）
fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointDefinition;

    fn valve_device() -> Device {
        let mut device = Device::new("XV-1001");
        let mut xs = PointDefinition::new("XV1001_XS");
        xs.description = "开到位反馈".to_string();
        device.io_points.insert(xs.hmi_tag_name.clone(), xs);

        let mut zs = PointDefinition::new("XV1001_ZS");
        zs.description = "关到位反馈".to_string();
        device.io_points.insert(zs.hmi_tag_name.clone(), zs);

        let mut am = PointDefinition::new("XV1001_AUTO_SW");
        am.description = "自动/手动切换".to_string();
        device.device_points.insert(am.hmi_tag_name.clone(), am);
        device
    }

    #[test]
    fn test_extract_excludes_control_tokens() {
        let text = "{% for p in io_points %}{{ xs }}{% endfor %}{# 注释 #}{{ device_tag }}{{ loop }}";
        assert_eq!(extract_placeholders(text), vec!["xs", "device_tag"]);
    }

    #[test]
    fn test_device_tag_always_bound() {
        let resolver = PlaceholderBindingResolver::new();
        let outcome = resolver.bind(&valve_device(), "无占位符的模板");
        assert_eq!(outcome.bindings["device_tag"], "XV-1001");
    }

    #[test]
    fn test_unique_containment_match() {
        let resolver = PlaceholderBindingResolver::new();
        let outcome = resolver.bind(&valve_device(), "{{xs}}");
        assert_eq!(outcome.bindings["xs"], "XV1001_XS");
    }

    #[test]
    fn test_multiple_matches_prefer_closest_length() {
        let mut device = valve_device();
        let long = PointDefinition::new("XV1001_XS_DELAYED");
        device.io_points.insert(long.hmi_tag_name.clone(), long);

        let resolver = PlaceholderBindingResolver::new();
        let outcome = resolver.bind(&device, "{{xs}}");
        // "XV1001_XS"比"XV1001_XS_DELAYED"更接近占位符长度
        assert_eq!(outcome.bindings["xs"], "XV1001_XS");
    }

    #[test]
    fn test_semantic_keyword_fallback() {
        let resolver = PlaceholderBindingResolver::new();
        // "c_am"不是任何变量名的子串，经语义表关键词"自动"在描述中命中
        let outcome = resolver.bind(&valve_device(), "{{c_am}}");
        assert_eq!(outcome.bindings["c_am"], "XV1001_AUTO_SW");
        assert!(outcome.unresolved.is_empty());
    }

    #[test]
    fn test_unresolved_placeholder_gets_sentinel() {
        let resolver = PlaceholderBindingResolver::new();
        let outcome = resolver.bind(&valve_device(), "{{no_such_signal}}");
        assert_eq!(outcome.bindings["no_such_signal"], "<no_such_signal>");
        assert_eq!(outcome.unresolved, vec!["no_such_signal"]);
    }

    #[test]
    fn test_repeated_calls_served_from_cache() {
        let resolver = PlaceholderBindingResolver::new();
        let device = valve_device();
        let first = resolver.bind(&device, "{{xs}}");
        for _ in 0..20 {
            // 超过限流上限的调用仍拿到与首轮一致的缓存结果
            let again = resolver.bind(&device, "{{xs}}");
            assert_eq!(again, first);
        }
    }
}
