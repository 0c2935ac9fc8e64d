/// 生成代码变量抽取与变量表输出服务
///
/// 静态分析渲染后的ST文本，恢复出目标PLC工具需要的变量声明表：
///
/// 1. 文本含中括号块(`[...]`，可跨行)时，各块交给专用的块结构
///    解析器，其输出即最终结果。该路径权威，跳过下述全部启发式。
/// 2. 否则元数据变量类型为空 → 模板无资格，零行。
/// 3. 否则逐行扫描两类正则：行首标识符紧跟`(`的调用头、
///    任意以`_MID`结尾的标识符；按名字取并集。候选丢弃条件：
///    长度不足3、ST保留字、不符合标识符形状、首次出现位置落在
///    `(* *)`块注释内或所在行`//`之后。按名字去重，首次出现者胜。
/// 4. 每个入选名字按元数据前缀表做最长前缀匹配求类型与初始值，
///    无前缀命中回退元数据默认值。
///
/// 批量输出：按所属程序分组，组内去重并按变量名排序，每组写入
/// 工作簿的一个工作表。第1行程序名，第2行固定7列表头，数据单元格
/// 一律按文本写入以保留精确表示。工作表名清洗：去掉尾部"(PRG)"，
/// 非法字符替换为下划线，截断到31字符。
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};

use crate::error::AppResult;
use crate::models::{TemplateMetadata, VariableTableEntry};

/// 中括号声明块（可跨行，非贪婪）
static BRACKET_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[(.*?)\]").expect("固定正则有效"));

/// 行首调用头：标识符紧跟左括号
static FN_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([A-Za-z][A-Za-z0-9_]*)\(").expect("固定正则有效"));

/// _MID结尾的中间变量
static MID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z][A-Za-z0-9_]*_MID)\b").expect("固定正则有效"));

/// 标识符形状校验
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("固定正则有效"));

/// ST保留字/标准算子名排除表（统一大写比较）
static ST_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "IF", "THEN", "ELSE", "ELSIF", "END_IF", "CASE", "END_CASE", "FOR", "END_FOR", "WHILE",
        "END_WHILE", "REPEAT", "UNTIL", "END_REPEAT", "VAR", "VAR_INPUT", "VAR_OUTPUT",
        "VAR_IN_OUT", "VAR_GLOBAL", "END_VAR", "FUNCTION", "END_FUNCTION", "FUNCTION_BLOCK",
        "END_FUNCTION_BLOCK", "PROGRAM", "END_PROGRAM", "TYPE", "END_TYPE", "STRUCT",
        "END_STRUCT", "ARRAY", "AND", "XOR", "NOT", "MOD", "RETURN", "EXIT", "TRUE", "FALSE",
        "ABS", "SQRT", "SIN", "COS", "TAN", "EXP", "LOG", "MIN", "MAX", "SEL", "MUX", "LIMIT",
        "TON", "TOF", "CTU", "CTD", "CTUD", "R_TRIG", "F_TRIG", "BOOL", "INT", "DINT", "UINT",
        "UDINT", "WORD", "DWORD", "BYTE", "REAL", "LREAL", "TIME", "DATE", "STRING",
    ]
    .into_iter()
    .collect()
});

/// 变量表固定表头（7列）
const TABLE_HEADERS: [&str; 7] = [
    "变量名",
    "直接地址",
    "变量说明",
    "变量类型",
    "初始值",
    "掉电保护",
    "SOE使能",
];

/// 工作表名长度上限
const SHEET_NAME_LIMIT: usize = 31;

/// 变量抽取器
pub struct VariableExtractor;

impl VariableExtractor {
    /// 从渲染文本恢复变量声明行
    pub fn extract(text: &str, metadata: Option<&TemplateMetadata>) -> Vec<VariableTableEntry> {
        let program_name = metadata.map(|m| m.program_name.clone()).unwrap_or_default();

        // 路径1：中括号声明块权威，跳过全部启发式
        if BRACKET_BLOCK_RE.is_match(text) {
            return Self::extract_from_blocks(text, &program_name, metadata);
        }

        // 路径2：无变量类型的模板没有资格参与变量表
        let Some(metadata) = metadata.filter(|m| !m.variable_type.is_empty()) else {
            return Vec::new();
        };

        // 路径3：调用头与_MID两类正则取并集
        let comment_mask = build_comment_mask(text);
        let mut first_occurrence: BTreeMap<usize, String> = BTreeMap::new();
        let mut earliest: HashMap<String, usize> = HashMap::new();
        for re in [&*FN_CALL_RE, &*MID_RE] {
            for cap in re.captures_iter(text) {
                let m = cap.get(1).expect("正则捕获组存在");
                let name = m.as_str().to_string();
                let pos = m.start();
                let entry = earliest.entry(name).or_insert(pos);
                if pos < *entry {
                    *entry = pos;
                }
            }
        }
        for (name, pos) in earliest {
            first_occurrence.insert(pos, name);
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for (pos, name) in first_occurrence {
            if name.chars().count() < 3 {
                continue;
            }
            if ST_KEYWORDS.contains(name.to_uppercase().as_str()) {
                continue;
            }
            if !IDENT_RE.is_match(&name) {
                continue;
            }
            // 首次出现落在注释内的候选整体丢弃
            if comment_mask.get(pos).copied().unwrap_or(false) {
                continue;
            }
            if !seen.insert(name.clone()) {
                continue;
            }

            // 路径4：最长前缀匹配求类型与初始值
            let (var_type, initial) = resolve_type(&name, metadata);
            entries.push(VariableTableEntry::new(
                program_name.clone(),
                name,
                var_type,
                initial,
            ));
        }
        entries
    }

    /// 块结构解析：每行 名称[,类型[,初始值]]，缺省回退元数据默认
    fn extract_from_blocks(
        text: &str,
        program_name: &str,
        metadata: Option<&TemplateMetadata>,
    ) -> Vec<VariableTableEntry> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for block in BRACKET_BLOCK_RE.captures_iter(text) {
            for line in block[1].lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with("//") {
                    continue;
                }
                let fields: Vec<&str> = line
                    .split(|c| c == ',' || c == '，')
                    .map(|f| f.trim())
                    .collect();
                let name = fields.first().copied().unwrap_or_default();
                if name.is_empty() || !IDENT_RE.is_match(name) {
                    continue;
                }
                if !seen.insert(name.to_string()) {
                    continue;
                }

                let fallback = metadata
                    .map(|m| (m.variable_type.clone(), m.initialization_value.clone()))
                    .unwrap_or_default();
                let var_type = fields
                    .get(1)
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string())
                    .unwrap_or(fallback.0);
                let initial = fields
                    .get(2)
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string())
                    .unwrap_or(fallback.1);
                entries.push(VariableTableEntry::new(program_name, name, var_type, initial));
            }
        }
        entries
    }
}

/// 最长前缀匹配：无命中回退元数据默认类型/初始值
fn resolve_type(name: &str, metadata: &TemplateMetadata) -> (String, String) {
    let hit = metadata
        .variable_meta_map
        .iter()
        .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len());
    match hit {
        Some((_, (var_type, initial))) => (var_type.clone(), initial.clone()),
        None => (
            metadata.variable_type.clone(),
            metadata.initialization_value.clone(),
        ),
    }
}

/// 按字节标记注释区域：(* *)块注释与//行尾注释
fn build_comment_mask(text: &str) -> Vec<bool> {
    let bytes = text.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut i = 0;
    let mut in_block = false;
    let mut in_line = false;

    while i < bytes.len() {
        if in_block {
            mask[i] = true;
            if i + 1 < bytes.len() && bytes[i] == b'*' && bytes[i + 1] == b')' {
                mask[i + 1] = true;
                in_block = false;
                i += 2;
                continue;
            }
            i += 1;
        } else if in_line {
            if bytes[i] == b'\n' {
                in_line = false;
            } else {
                mask[i] = true;
            }
            i += 1;
        } else if i + 1 < bytes.len() && bytes[i] == b'(' && bytes[i + 1] == b'*' {
            mask[i] = true;
            mask[i + 1] = true;
            in_block = true;
            i += 2;
        } else if i + 1 < bytes.len() && bytes[i] == b'/' && bytes[i + 1] == b'/' {
            mask[i] = true;
            mask[i + 1] = true;
            in_line = true;
            i += 2;
        } else {
            i += 1;
        }
    }
    mask
}

/// 清洗工作表名：去尾部"(PRG)"，非法字符换下划线，截断31字符
pub fn sanitize_sheet_name(program_name: &str) -> String {
    let mut name = program_name.trim().to_string();
    if let Some(stripped) = name.strip_suffix("(PRG)") {
        name = stripped.trim_end().to_string();
    }
    let cleaned: String = name
        .chars()
        .map(|c| {
            if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\' | '\'') {
                '_'
            } else {
                c
            }
        })
        .take(SHEET_NAME_LIMIT)
        .collect();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

/// 变量表工作簿输出器
pub struct VariableTableWriter;

impl VariableTableWriter {
    /// 把变量行按程序分组写入单个工作簿
    ///
    /// 每组一个工作表：第1行程序名，第2行固定表头，随后为数据行，
    /// 全部单元格按文本写入
    pub fn write_workbook(entries: &[VariableTableEntry], output_path: &Path) -> AppResult<()> {
        let mut groups: BTreeMap<&str, Vec<&VariableTableEntry>> = BTreeMap::new();
        for entry in entries {
            groups.entry(&entry.program_name).or_default().push(entry);
        }

        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let mut used_names: HashSet<String> = HashSet::new();

        for (program_name, group) in groups {
            // 组内按变量名去重（保留先出现者）并排序
            let mut deduped: Vec<&VariableTableEntry> = Vec::new();
            let mut seen = HashSet::new();
            for entry in group {
                if seen.insert(entry.variable_name.clone()) {
                    deduped.push(entry);
                }
            }
            deduped.sort_by(|a, b| a.variable_name.cmp(&b.variable_name));

            let mut sheet_name = sanitize_sheet_name(program_name);
            // 清洗后的同名工作表追加序号避免冲突
            let mut counter = 2;
            while used_names.contains(&sheet_name) {
                let base: String = sheet_name.chars().take(SHEET_NAME_LIMIT - 3).collect();
                sheet_name = format!("{}_{}", base, counter);
                counter += 1;
            }
            used_names.insert(sheet_name.clone());

            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet_name.as_str())?;
            worksheet.write_string(0, 0, program_name)?;
            for (col, header) in TABLE_HEADERS.iter().enumerate() {
                worksheet.write_string_with_format(1, col as u16, *header, &header_format)?;
            }
            for (row_idx, entry) in deduped.iter().enumerate() {
                let row = (row_idx + 2) as u32;
                worksheet.write_string(row, 0, entry.variable_name.as_str())?;
                worksheet.write_string(row, 1, entry.direct_address.as_str())?;
                worksheet.write_string(row, 2, entry.description.as_str())?;
                worksheet.write_string(row, 3, entry.variable_type.as_str())?;
                worksheet.write_string(row, 4, entry.initial_value.as_str())?;
                worksheet.write_string(row, 5, entry.power_failure_protection.as_str())?;
                worksheet.write_string(row, 6, entry.soe_enable.as_str())?;
            }
        }

        workbook.save(output_path)?;
        log::info!("变量声明表已写入: {}", output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TemplateMetadata {
        let mut m = TemplateMetadata {
            program_name: "MOV_CTRL(PRG)".to_string(),
            variable_type: "MOV_CTRL".to_string(),
            initialization_value: "FALSE".to_string(),
            ..Default::default()
        };
        m.variable_meta_map.insert(
            "MOV_CTRL_".to_string(),
            ("MOV_CTRL".to_string(), String::new()),
        );
        m.variable_meta_map
            .insert("SPEED_".to_string(), ("REAL".to_string(), "0.0".to_string()));
        m
    }

    #[test]
    fn test_comment_exclusion() {
        let text = "MOV_CTRL_V101(\nIN:=1\n);\n// MOV_CTRL_FAKE(\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].variable_name, "MOV_CTRL_V101");
    }

    #[test]
    fn test_block_comment_exclusion() {
        let text = "(*\nMOV_CTRL_OLD(\n*)\nMOV_CTRL_V101(\n);\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].variable_name, "MOV_CTRL_V101");
    }

    #[test]
    fn test_bracket_block_is_authoritative() {
        let text = "[\nPUMP_RUN,BOOL,FALSE\n]\nMOV_CTRL_V101(\n);\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        // 块解析路径权威：括号外的调用头不产生行
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].variable_name, "PUMP_RUN");
        assert_eq!(entries[0].variable_type, "BOOL");
        assert_eq!(entries[0].initial_value, "FALSE");
    }

    #[test]
    fn test_bracket_block_falls_back_to_metadata_defaults() {
        let text = "[\nPUMP_RUN\n]\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries[0].variable_type, "MOV_CTRL");
        assert_eq!(entries[0].initial_value, "FALSE");
    }

    #[test]
    fn test_no_metadata_yields_no_entries() {
        let text = "MOV_CTRL_V101(\n);\n";
        assert!(VariableExtractor::extract(text, None).is_empty());
    }

    #[test]
    fn test_keyword_and_short_name_exclusion() {
        let text = "IF(\nTON(\nAB(\nMOV_CTRL_V101(\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].variable_name, "MOV_CTRL_V101");
    }

    #[test]
    fn test_mid_family_and_longest_prefix() {
        let text = "SPEED_MID := RAW * 0.1;\nMOV_CTRL_V101(\n);\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries.len(), 2);

        let speed = entries
            .iter()
            .find(|e| e.variable_name == "SPEED_MID")
            .unwrap();
        assert_eq!(speed.variable_type, "REAL");
        assert_eq!(speed.initial_value, "0.0");

        let mov = entries
            .iter()
            .find(|e| e.variable_name == "MOV_CTRL_V101")
            .unwrap();
        // "MOV_CTRL_"前缀命中，胜过默认变量类型
        assert_eq!(mov.variable_type, "MOV_CTRL");
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let text = "MOV_CTRL_V101(\n);\nMOV_CTRL_V101(\n);\n";
        let entries = VariableExtractor::extract(text, Some(&metadata()));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("ESDV_CTRL(PRG)"), "ESDV_CTRL");
        assert_eq!(sanitize_sheet_name("A/B:C*D"), "A_B_C_D");
        let long = "X".repeat(40);
        assert_eq!(sanitize_sheet_name(&long).chars().count(), 31);
    }

    #[test]
    fn test_write_workbook() {
        use calamine::{open_workbook, Reader, Xlsx};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("变量表.xlsx");
        let entries = vec![
            VariableTableEntry::new("MOV_CTRL(PRG)", "MOV_CTRL_V101", "MOV_CTRL", ""),
            VariableTableEntry::new("MOV_CTRL(PRG)", "MOV_CTRL_V101", "MOV_CTRL", ""),
            VariableTableEntry::new("MOV_CTRL(PRG)", "MOV_CTRL_A001", "MOV_CTRL", ""),
            VariableTableEntry::new("PID_CTRL(PRG)", "SPEED_MID", "REAL", "0.0"),
        ];
        VariableTableWriter::write_workbook(&entries, &path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let names = workbook.sheet_names().to_owned();
        assert_eq!(names, vec!["MOV_CTRL", "PID_CTRL"]);

        let range = workbook.worksheet_range("MOV_CTRL").unwrap().unwrap();
        // 第1行程序名
        assert_eq!(range.get_value((0, 0)).unwrap().to_string(), "MOV_CTRL(PRG)");
        // 第2行表头
        assert_eq!(range.get_value((1, 0)).unwrap().to_string(), "变量名");
        // 数据按变量名排序且去重
        assert_eq!(
            range.get_value((2, 0)).unwrap().to_string(),
            "MOV_CTRL_A001"
        );
        assert_eq!(
            range.get_value((3, 0)).unwrap().to_string(),
            "MOV_CTRL_V101"
        );
        assert_eq!(range.get_value((4, 0)), None);
    }
}
