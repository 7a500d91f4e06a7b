//! 结构校验：对任意 SMBP 文本（包括手改的、AI 生成的）做纯文本扫描。
//!
//! 所有检查相互独立、全部执行（空内容除外，空内容直接短路），
//! 一次给出完整的问题列表。会让目标工具直接拒收的问题为 error，仅可疑的为 warning；
//! `valid` 只看 error。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::adapters::smbp::protocol::{BALANCED_TAGS, BOM, ROOT, TAG_TYPOS};
use crate::adapters::smbp::SmbpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    EmptyContent,
    MissingBom,
    UndefinedPlaceholder,
    EmptyTimerAddress,
    DuplicateTimer,
    DuplicateCounter,
    TagTypo,
    UnbalancedTags,
    ExcessEmptyFields,
    MissingXmlDeclaration,
    MissingRootElement,
    NanValue,
    NullValue,
    ObjectStringification,
}

impl FindingCode {
    pub fn severity(self) -> Severity {
        match self {
            FindingCode::MissingBom | FindingCode::ExcessEmptyFields => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FindingCode::EmptyContent => "EMPTY_CONTENT",
            FindingCode::MissingBom => "MISSING_BOM",
            FindingCode::UndefinedPlaceholder => "UNDEFINED_PLACEHOLDER",
            FindingCode::EmptyTimerAddress => "EMPTY_TIMER_ADDRESS",
            FindingCode::DuplicateTimer => "DUPLICATE_TIMER",
            FindingCode::DuplicateCounter => "DUPLICATE_COUNTER",
            FindingCode::TagTypo => "TAG_TYPO",
            FindingCode::UnbalancedTags => "UNBALANCED_TAGS",
            FindingCode::ExcessEmptyFields => "EXCESS_EMPTY_FIELDS",
            FindingCode::MissingXmlDeclaration => "MISSING_XML_DECLARATION",
            FindingCode::MissingRootElement => "MISSING_ROOT_ELEMENT",
            FindingCode::NanValue => "NAN_VALUE",
            FindingCode::NullValue => "NULL_VALUE",
            FindingCode::ObjectStringification => "OBJECT_STRINGIFICATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub code: FindingCode,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    fn new(code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.severity(),
            count: None,
            suggestion: None,
        }
    }

    fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationResult {
    fn from_findings(findings: Vec<Finding>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|f| f.severity == Severity::Error);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.errors.iter().chain(&self.warnings)
    }

    pub fn has(&self, code: FindingCode) -> bool {
        self.findings().any(|f| f.code == code)
    }
}

struct Patterns {
    placeholder: Regex,
    nan: Regex,
    null: Regex,
    object: Regex,
    timer_block: Regex,
    counter_block: Regex,
    address: Regex,
    root: Regex,
    empty_fields: Vec<Regex>,
    typos: Vec<(Regex, &'static str, &'static str)>,
    balanced: Vec<(&'static str, Regex, Regex)>,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static validator pattern")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        placeholder: compile(r">\s*undefined\s*<"),
        nan: compile(r">\s*NaN\s*<"),
        null: compile(r">\s*null\s*<"),
        object: compile(r"\[object Object\]"),
        // 允许带属性，不匹配自闭合形式
        timer_block: compile(r"(?s)<TimerTM(?:\s[^>]*[^/>])?\s*>(.*?)</TimerTM>"),
        counter_block: compile(r"(?s)<Counter(?:\s[^>]*[^/>])?\s*>(.*?)</Counter>"),
        address: compile(r"<Address>\s*([^<]*?)\s*</Address>"),
        root: compile(&format!(r"<{ROOT}[\s>/]")),
        empty_fields: ["Descriptor", "ElementType", "Symbol"]
            .iter()
            .map(|tag| compile(&format!(r"<{tag}\s*/>|<{tag}>\s*</{tag}>")))
            .collect(),
        typos: TAG_TYPOS
            .iter()
            .map(|(typo, correct)| (compile(&format!(r"</?{typo}[\s>/]")), *typo, *correct))
            .collect(),
        balanced: BALANCED_TAGS
            .iter()
            .map(|tag| {
                (
                    *tag,
                    compile(&format!(r"<{tag}\b[^>]*>")),
                    compile(&format!(r"</{tag}\s*>")),
                )
            })
            .collect(),
    })
}

/// 结构校验器
#[derive(Debug, Clone)]
pub struct Validator {
    max_empty_fields: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&SmbpConfig::m221())
    }
}

impl Validator {
    pub fn new(config: &SmbpConfig) -> Self {
        Self {
            max_empty_fields: config.max_empty_fields,
        }
    }

    pub fn with_max_empty_fields(max_empty_fields: usize) -> Self {
        Self { max_empty_fields }
    }

    pub fn validate(&self, text: &str) -> ValidationResult {
        let body = text.strip_prefix(BOM).unwrap_or(text);
        if body.trim().is_empty() {
            return ValidationResult::from_findings(vec![Finding::new(
                FindingCode::EmptyContent,
                "Document is empty",
            )]);
        }

        let p = patterns();
        let mut findings = Vec::new();

        if !text.starts_with(BOM) {
            findings.push(
                Finding::new(FindingCode::MissingBom, "Document has no UTF-8 byte-order mark")
                    .with_suggestion("prefix the file with U+FEFF"),
            );
        }

        for (code, regex, label) in [
            (FindingCode::UndefinedPlaceholder, &p.placeholder, "'undefined' placeholder"),
            (FindingCode::NanValue, &p.nan, "'NaN' value"),
            (FindingCode::NullValue, &p.null, "'null' value"),
            (FindingCode::ObjectStringification, &p.object, "'[object Object]' value"),
        ] {
            let count = regex.find_iter(body).count();
            if count > 0 {
                findings.push(
                    Finding::new(code, format!("Found {count} {label}(s) in element text"))
                        .with_count(count),
                );
            }
        }

        let (empty_timers, timers) = block_addresses(&p.timer_block, &p.address, body);
        if empty_timers > 0 {
            findings.push(
                Finding::new(
                    FindingCode::EmptyTimerAddress,
                    format!("{empty_timers} timer(s) have an empty address"),
                )
                .with_count(empty_timers),
            );
        }
        findings.extend(duplicates(FindingCode::DuplicateTimer, "Timer", &timers));
        let (_, counters) = block_addresses(&p.counter_block, &p.address, body);
        findings.extend(duplicates(FindingCode::DuplicateCounter, "Counter", &counters));

        for (regex, typo, correct) in &p.typos {
            let count = regex.find_iter(body).count();
            if count > 0 {
                findings.push(
                    Finding::new(
                        FindingCode::TagTypo,
                        format!("Mistyped tag <{typo}> found {count} time(s)"),
                    )
                    .with_count(count)
                    .with_suggestion(format!("<{correct}>")),
                );
            }
        }

        for (tag, open, close) in &p.balanced {
            let opening = open
                .find_iter(body)
                .filter(|m| !m.as_str().ends_with("/>"))
                .count();
            let closing = close.find_iter(body).count();
            if opening != closing {
                findings.push(
                    Finding::new(
                        FindingCode::UnbalancedTags,
                        format!("Unbalanced <{tag}> tags: {opening} opening, {closing} closing"),
                    )
                    .with_count(opening.abs_diff(closing)),
                );
            }
        }

        let empty_fields: usize = p.empty_fields.iter().map(|r| r.find_iter(body).count()).sum();
        if empty_fields > self.max_empty_fields {
            findings.push(
                Finding::new(
                    FindingCode::ExcessEmptyFields,
                    format!(
                        "{empty_fields} empty Descriptor/ElementType/Symbol fields (more than {})",
                        self.max_empty_fields
                    ),
                )
                .with_count(empty_fields),
            );
        }

        if !body.trim_start().starts_with("<?xml") {
            findings.push(
                Finding::new(FindingCode::MissingXmlDeclaration, "Missing XML declaration")
                    .with_suggestion(r#"<?xml version="1.0" encoding="utf-8"?>"#),
            );
        }
        if !p.root.is_match(body) {
            findings.push(Finding::new(
                FindingCode::MissingRootElement,
                format!("Missing <{ROOT}> root element"),
            ));
        }

        ValidationResult::from_findings(findings)
    }
}

/// 某类功能块声明里的地址：(空地址数, 地址 → 出现次数)
fn block_addresses(block: &Regex, address: &Regex, text: &str) -> (usize, BTreeMap<String, usize>) {
    let mut empty = 0;
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for captures in block.captures_iter(text) {
        let inner = captures.get(1).map_or("", |m| m.as_str());
        match address.captures(inner).and_then(|c| c.get(1)) {
            Some(m) if !m.as_str().is_empty() => {
                *seen.entry(m.as_str().to_ascii_uppercase()).or_default() += 1;
            }
            _ => empty += 1,
        }
    }
    (empty, seen)
}

fn duplicates<'a>(
    code: FindingCode,
    label: &'a str,
    seen: &'a BTreeMap<String, usize>,
) -> impl Iterator<Item = Finding> + 'a {
    seen.iter().filter(|(_, n)| **n > 1).map(move |(address, n)| {
        Finding::new(code, format!("{label} address {address} is declared {n} times"))
            .with_count(*n)
            .with_suggestion(format!("give each {} its own address", label.to_lowercase()))
    })
}

/// 使用默认阈值校验
pub fn validate(text: &str) -> ValidationResult {
    Validator::default().validate(text)
}
