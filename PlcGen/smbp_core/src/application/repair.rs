//! 修复流程：宽松解析 → 在模型上修正 → 重新装配 → 规范序列化 → 重新校验。
//!
//! 从不在序列化文本上做字符串替换；无法映射的片段原样保留在 `dropped` 中供人工处理。

use log::info;
use serde::Serialize;

use crate::adapters::smbp::parser::{parse_lenient, DroppedFragment, ParseError};
use crate::adapters::smbp::protocol::BOM;
use crate::adapters::smbp::serialize_document;
use crate::domain::Document;

use super::validator::{validate, ValidationResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    #[serde(skip)]
    pub document: Document,
    /// 规范化后的文本
    pub text: String,
    pub fixes: Vec<String>,
    pub dropped: Vec<DroppedFragment>,
    /// 修复前的校验结果
    pub before: ValidationResult,
    /// 修复后的校验结果
    pub validation: ValidationResult,
}

pub fn repair(text: &str) -> Result<RepairReport, ParseError> {
    let before = validate(text);
    let parsed = parse_lenient(text)?;

    let mut fixes = Vec::new();
    if !text.starts_with(BOM) {
        fixes.push("added UTF-8 byte-order mark".to_string());
    }
    if has_bare_line_feeds(text) {
        fixes.push("normalized line endings to CRLF".to_string());
    }
    fixes.extend(parsed.tag_fixes.iter().map(|fix| {
        format!("renamed <{}> to <{}> ({}x)", fix.found, fix.corrected, fix.count)
    }));
    fixes.extend(parsed.notes);
    fixes.extend(
        parsed
            .dropped
            .iter()
            .map(|d| format!("dropped {} #{}: {}", d.section, d.index, d.reason)),
    );

    let repaired = serialize_document(&parsed.document);
    let validation = validate(&repaired);
    info!(
        "repaired document: {} fixes, {} dropped fragments, valid={}",
        fixes.len(),
        parsed.dropped.len(),
        validation.valid
    );
    Ok(RepairReport {
        document: parsed.document,
        text: repaired,
        fixes,
        dropped: parsed.dropped,
        before,
        validation,
    })
}

fn has_bare_line_feeds(text: &str) -> bool {
    text.match_indices('\n')
        .any(|(at, _)| at == 0 || text.as_bytes()[at - 1] != b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::assembler::assemble;
    use crate::application::builder::{build_hysteresis_rung, build_timer_rung};
    use crate::application::validator::FindingCode;

    fn broken_text() -> String {
        let rungs = vec![
            build_hysteresis_rung("%I0.1".parse().unwrap(), "%I0.2".parse().unwrap(), "%Q0.0".parse().unwrap())
                .unwrap(),
            build_timer_rung(
                "%I0.3".parse().unwrap(),
                "%TM0".parse().unwrap(),
                "%Q0.1".parse().unwrap(),
                2,
            )
            .unwrap(),
        ];
        let text = serialize_document(&assemble("TM221CE24T", rungs, Vec::new()).unwrap());
        text.trim_start_matches(BOM)
            .replace("\r\n", "\n")
            .replace("RungEntity>", "RungEntry>")
            .replacen("<Descriptor>%I0.3</Descriptor>", "<Descriptor>undefined</Descriptor>", 1)
    }

    #[test]
    fn repairs_through_the_model() {
        let text = broken_text();
        let report = repair(&text).unwrap();

        assert!(!report.before.valid);
        assert!(report.before.has(FindingCode::TagTypo));
        assert!(report.before.has(FindingCode::UndefinedPlaceholder));

        assert!(report.validation.valid, "{:?}", report.validation);
        assert!(report.validation.warnings.is_empty());
        assert_eq!(report.document.rungs().len(), 1);
        assert_eq!(report.dropped.len(), 1);
        assert!(report.text.starts_with(BOM));
        assert!(report.fixes.iter().any(|f| f.contains("<RungEntry> to <RungEntity>")));
        assert!(report.fixes.iter().any(|f| f.contains("CRLF")));
    }

    #[test]
    fn repairing_twice_is_stable() {
        let once = repair(&broken_text()).unwrap();
        let twice = repair(&once.text).unwrap();
        assert_eq!(once.text, twice.text);
        assert!(twice.fixes.is_empty());
    }

    #[test]
    fn unparseable_text_is_an_error() {
        assert!(repair("not xml at all <").is_err());
    }
}
