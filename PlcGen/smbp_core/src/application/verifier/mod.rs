//! 逻辑等价校验：把每个梯级还原成布尔赋值，与期望描述逐条比对。
//!
//! 结论分三类：Match / Mismatch / Inconclusive。
//! Inconclusive 只表示"无法判定"（引用了文档中不存在的地址、超出布尔模型的指令或运算符、
//! 变量过多无法穷举……），不代表逻辑错误。

pub mod expected;
pub mod il;

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::adapters::smbp::parser::parse_document;
use crate::domain::ladder::ladder_inputs;
use crate::domain::{equivalence, Address, Comparison, Document, Equivalence, Expr, Rung};

pub use expected::{parse_expected, parse_statements, ExpectedError, ParsedStatement, Statement};
pub use il::{parse_instructions, Assignment, IlError};

/// 真值表穷举的默认变量上限
pub const DEFAULT_VAR_LIMIT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VerificationOutcome {
    Match,
    #[serde(rename_all = "camelCase")]
    Mismatch {
        rung_index: usize,
        rung_name: String,
        target: String,
        expected: String,
        actual: String,
    },
    Inconclusive { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub target: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RungStatus {
    Match,
    Mismatch { differences: Vec<Difference> },
    Inconclusive { reason: String },
    /// 没有任何期望语句落在该梯级上
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RungReport {
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: RungStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StatementStatus {
    Match,
    #[serde(rename_all = "camelCase")]
    Mismatch { rung_index: usize, actual: String },
    Inconclusive { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementReport {
    pub source: String,
    pub target: String,
    pub expected: String,
    pub rung_index: Option<usize>,
    #[serde(flatten)]
    pub status: StatementStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub outcome: VerificationOutcome,
    pub rungs: Vec<RungReport>,
    pub statements: Vec<StatementReport>,
}

impl VerificationReport {
    fn inconclusive(reason: String, rungs: Vec<RungReport>) -> Self {
        Self {
            outcome: VerificationOutcome::Inconclusive { reason },
            rungs,
            statements: Vec::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.outcome == VerificationOutcome::Match
    }
}

/// 梯级的布尔模型：目标 → 表达式；不可用时记录原因
struct RungModel {
    targets: Vec<String>,
    assignments: Result<BTreeMap<String, Expr>, String>,
}

pub fn verify(expected: &str, document: &Document) -> VerificationReport {
    verify_with_limit(expected, document, DEFAULT_VAR_LIMIT)
}

/// 先把文档文本解析成模型；解析失败时整体 Inconclusive
pub fn verify_text(expected: &str, text: &str, limit: usize) -> VerificationReport {
    match parse_document(text) {
        Ok(document) => verify_with_limit(expected, &document, limit),
        Err(err) => VerificationReport::inconclusive(
            format!("document could not be parsed: {err}"),
            Vec::new(),
        ),
    }
}

pub fn verify_with_limit(expected: &str, document: &Document, limit: usize) -> VerificationReport {
    let models: Vec<RungModel> = document.rungs().iter().map(|r| rung_model(r, limit)).collect();
    let unchecked = || {
        document
            .rungs()
            .iter()
            .enumerate()
            .map(|(index, rung)| RungReport {
                index,
                name: rung.name().to_string(),
                status: RungStatus::Unchecked,
            })
            .collect::<Vec<_>>()
    };

    let statements = parse_statements(expected);
    if statements.is_empty() {
        return VerificationReport::inconclusive(
            format!("expected logic could not be parsed: {}", ExpectedError::Empty),
            unchecked(),
        );
    }

    // 无法解析的语句单独记为 Inconclusive，其余照常比对
    let reports: Vec<StatementReport> = statements
        .iter()
        .map(|parsed| match &parsed.result {
            Ok(statement) => check_statement(statement, document, &models, limit),
            Err(err) => StatementReport {
                source: parsed.source.clone(),
                target: String::new(),
                expected: String::new(),
                rung_index: None,
                status: StatementStatus::Inconclusive {
                    reason: format!("statement could not be parsed: {err}"),
                },
            },
        })
        .collect();

    let rungs = document
        .rungs()
        .iter()
        .enumerate()
        .map(|(index, rung)| RungReport {
            index,
            name: rung.name().to_string(),
            status: rung_status(index, &reports),
        })
        .collect();

    let outcome = aggregate(document, &reports);
    debug!("verification outcome: {outcome:?}");
    VerificationReport {
        outcome,
        rungs,
        statements: reports,
    }
}

fn rung_model(rung: &Rung, limit: usize) -> RungModel {
    let coils: Vec<String> = rung
        .coils()
        .filter_map(|c| c.address())
        .map(|a| a.to_string())
        .collect();

    if rung.instructions().is_empty() {
        // 只有梯形图：按真值表展开成最小项之和
        return match ladder_expressions(rung, limit) {
            Ok(assignments) => RungModel {
                targets: assignments.keys().cloned().collect(),
                assignments: Ok(assignments),
            },
            Err(reason) => RungModel {
                targets: coils,
                assignments: Err(reason),
            },
        };
    }

    match parse_instructions(rung.instructions()) {
        Ok(list) => {
            let mut assignments = BTreeMap::new();
            for Assignment { target, expr } in list {
                assignments.insert(target, expr);
            }
            RungModel {
                targets: assignments.keys().cloned().collect(),
                assignments: Ok(assignments),
            }
        }
        Err(err) => RungModel {
            targets: coils,
            assignments: Err(format!("instruction list cannot be modelled: {err}")),
        },
    }
}

fn ladder_expressions(rung: &Rung, limit: usize) -> Result<BTreeMap<String, Expr>, String> {
    let inputs: Vec<String> = rung.ladder_inputs().into_iter().collect();
    if inputs.len() > limit || inputs.len() >= u64::BITS as usize {
        return Err(format!("ladder reads {} variables, limit is {limit}", inputs.len()));
    }
    let mut minterms: BTreeMap<String, Vec<Expr>> = BTreeMap::new();
    for bits in 0u64..(1u64 << inputs.len()) {
        let env = |name: &str| {
            inputs
                .iter()
                .position(|n| n == name)
                .is_some_and(|i| bits & (1 << i) != 0)
        };
        for (target, on) in rung.evaluate_ladder(&env) {
            let terms = minterms.entry(target).or_default();
            if on {
                let literals = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let var = Expr::var(name.clone());
                        if bits & (1 << i) != 0 {
                            var
                        } else {
                            Expr::not(var)
                        }
                    })
                    .collect();
                terms.push(Expr::and(literals));
            }
        }
    }
    Ok(minterms
        .into_iter()
        .map(|(target, terms)| (target, Expr::or(terms).normalize()))
        .collect())
}

/// 期望语句中的名字 → 文档变量名；地址不在文档中时返回原因
fn resolve_name(name: &str, document: &Document) -> Result<String, String> {
    if name.starts_with('[') {
        let comparison: Comparison = name.parse().map_err(|_| format!("invalid comparison {name}"))?;
        for address in comparison.addresses() {
            if !document.contains_address(&address) {
                return Err(format!("address {address} is not present in the document"));
            }
        }
        return Ok(name.to_string());
    }
    if name.starts_with('%') {
        let base = match name.parse::<Address>() {
            Ok(address) => address,
            Err(_) => name
                .rsplit_once('.')
                .and_then(|(base, _)| base.parse::<Address>().ok())
                .ok_or_else(|| format!("invalid address {name}"))?,
        };
        if !document.contains_address(&base) {
            return Err(format!("address {base} is not present in the document"));
        }
        return Ok(name.to_string());
    }
    document
        .resolve_symbol(name)
        .map(|a| a.to_string())
        .ok_or_else(|| format!("symbol {name} is not declared in the document"))
}

fn resolve_expr(expr: &Expr, document: &Document) -> Result<Expr, String> {
    Ok(match expr {
        Expr::Const(value) => Expr::Const(*value),
        Expr::Var(name) => Expr::Var(resolve_name(name, document)?),
        Expr::Not(inner) => Expr::not(resolve_expr(inner, document)?),
        Expr::And(items) => Expr::and(
            items
                .iter()
                .map(|i| resolve_expr(i, document))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Or(items) => Expr::or(
            items
                .iter()
                .map(|i| resolve_expr(i, document))
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn check_statement(
    statement: &Statement,
    document: &Document,
    models: &[RungModel],
    limit: usize,
) -> StatementReport {
    let mut report = StatementReport {
        source: statement.source.clone(),
        target: statement.target.clone(),
        expected: statement.expr.to_string(),
        rung_index: None,
        status: StatementStatus::Match,
    };
    let inconclusive = |mut report: StatementReport, reason: String| {
        report.status = StatementStatus::Inconclusive { reason };
        report
    };

    let target = match resolve_name(&statement.target, document) {
        Ok(target) => target,
        Err(reason) => return inconclusive(report, reason),
    };
    let expected = match resolve_expr(&statement.expr, document) {
        Ok(expr) => expr,
        Err(reason) => return inconclusive(report, reason),
    };
    report.target = target.clone();
    report.expected = expected.to_string();

    let drivers: Vec<usize> = models
        .iter()
        .enumerate()
        .filter(|(_, m)| m.targets.contains(&target))
        .map(|(i, _)| i)
        .collect();
    let index = match drivers.as_slice() {
        [] => return inconclusive(report, format!("no rung drives {target}")),
        [index] => *index,
        many => {
            return inconclusive(
                report,
                format!("{target} is driven by {} rungs, cannot isolate one", many.len()),
            )
        }
    };
    report.rung_index = Some(index);

    let actual = match &models[index].assignments {
        Ok(assignments) => match assignments.get(&target) {
            Some(actual) => actual,
            None => return inconclusive(report, format!("no rung drives {target}")),
        },
        Err(reason) => return inconclusive(report, reason.clone()),
    };

    report.status = match equivalence(&expected, actual, limit) {
        Equivalence::Equivalent => StatementStatus::Match,
        Equivalence::Different { .. } => StatementStatus::Mismatch {
            rung_index: index,
            actual: actual.normalize().to_string(),
        },
        Equivalence::TooManyVariables(n) => StatementStatus::Inconclusive {
            reason: format!("{n} variables exceed the truth-table limit of {limit}"),
        },
    };
    report
}

fn rung_status(index: usize, reports: &[StatementReport]) -> RungStatus {
    let mine: Vec<&StatementReport> = reports.iter().filter(|r| r.rung_index == Some(index)).collect();
    if mine.is_empty() {
        return RungStatus::Unchecked;
    }
    let differences: Vec<Difference> = mine
        .iter()
        .filter_map(|r| match &r.status {
            StatementStatus::Mismatch { actual, .. } => Some(Difference {
                target: r.target.clone(),
                expected: r.expected.clone(),
                actual: actual.clone(),
            }),
            _ => None,
        })
        .collect();
    if !differences.is_empty() {
        return RungStatus::Mismatch { differences };
    }
    if let Some(reason) = mine.iter().find_map(|r| match &r.status {
        StatementStatus::Inconclusive { reason } => Some(reason.clone()),
        _ => None,
    }) {
        return RungStatus::Inconclusive { reason };
    }
    RungStatus::Match
}

fn aggregate(document: &Document, reports: &[StatementReport]) -> VerificationOutcome {
    for report in reports {
        if let StatementStatus::Mismatch { rung_index, actual } = &report.status {
            let rung_name = document
                .rungs()
                .get(*rung_index)
                .map(|r| r.name().to_string())
                .unwrap_or_default();
            return VerificationOutcome::Mismatch {
                rung_index: *rung_index,
                rung_name,
                target: report.target.clone(),
                expected: report.expected.clone(),
                actual: actual.clone(),
            };
        }
    }
    for report in reports {
        if let StatementStatus::Inconclusive { reason } = &report.status {
            return VerificationOutcome::Inconclusive {
                reason: reason.clone(),
            };
        }
    }
    if reports.is_empty() {
        return VerificationOutcome::Inconclusive {
            reason: "no statements to check".to_string(),
        };
    }
    VerificationOutcome::Match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::assembler::assemble;
    use crate::application::builder::{build_hysteresis_rung, build_simple_rung};
    use crate::domain::Declaration;

    fn addr(text: &str) -> Address {
        text.parse().unwrap()
    }

    fn motor_document() -> Document {
        let rungs = vec![
            build_hysteresis_rung(addr("%I0.1"), addr("%I0.2"), addr("%Q0.0")).unwrap(),
            build_simple_rung(addr("%I0.3"), addr("%Q0.1"), false).unwrap(),
        ];
        let declared = vec![
            Declaration::new(addr("%I0.1")).with_symbol("Start"),
            Declaration::new(addr("%I0.2")).with_symbol("Stop"),
            Declaration::new(addr("%Q0.0")).with_symbol("Motor"),
        ];
        assemble("TM221CE24T", rungs, declared).unwrap()
    }

    #[test]
    fn seal_in_phrase_matches_hysteresis_rung() {
        let doc = motor_document();
        let report = verify("%Q0.0 stays on once %I0.1 triggers it, until %I0.2 stops it", &doc);
        assert_eq!(report.outcome, VerificationOutcome::Match);
        assert_eq!(report.rungs[0].status, RungStatus::Match);
        assert_eq!(report.rungs[1].status, RungStatus::Unchecked);
    }

    #[test]
    fn symbols_resolve_through_declarations() {
        let doc = motor_document();
        let report = verify("Motor = NOT Stop AND (Motor OR Start)", &doc);
        assert!(report.is_match());
    }

    #[test]
    fn wrong_negation_is_a_mismatch_on_that_rung_only() {
        let doc = motor_document();
        let report = verify(
            "%Q0.0 = (%I0.2 OR %Q0.0) AND NOT %I0.1; %Q0.1 = %I0.3",
            &doc,
        );
        match &report.outcome {
            VerificationOutcome::Mismatch {
                rung_index, target, ..
            } => {
                assert_eq!(*rung_index, 0);
                assert_eq!(target, "%Q0.0");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert!(matches!(report.rungs[0].status, RungStatus::Mismatch { .. }));
        assert_eq!(report.rungs[1].status, RungStatus::Match);
    }

    #[test]
    fn unknown_address_is_inconclusive_not_mismatch() {
        let doc = motor_document();
        let report = verify("%Q0.0 = %I0.7 AND NOT %I0.2", &doc);
        assert!(matches!(report.outcome, VerificationOutcome::Inconclusive { .. }));
        assert!(matches!(
            report.statements[0].status,
            StatementStatus::Inconclusive { .. }
        ));
    }

    #[test]
    fn unsupported_operator_and_undriven_target_are_inconclusive() {
        let doc = motor_document();
        let report = verify("%Q0.0 = %I0.1 XOR %I0.2", &doc);
        assert!(matches!(report.outcome, VerificationOutcome::Inconclusive { .. }));
        assert!(report.rungs.iter().all(|r| r.status == RungStatus::Unchecked));
        assert_eq!(report.statements.len(), 1);

        let report = verify("%I0.1 = %I0.2", &doc);
        assert!(matches!(report.outcome, VerificationOutcome::Inconclusive { .. }));
    }

    #[test]
    fn variable_limit_turns_into_inconclusive() {
        let doc = motor_document();
        let report = verify_with_limit("%Q0.0 = %I0.1 AND NOT %I0.2", &doc, 1);
        assert!(matches!(report.outcome, VerificationOutcome::Inconclusive { .. }));
    }

    #[test]
    fn ladder_only_rung_is_expanded_from_the_grid() {
        let rung = build_simple_rung(addr("%I0.0"), addr("%Q0.0"), true).unwrap();
        let ladder_only = Rung::new("grid", "", rung.elements().to_vec(), Vec::new()).unwrap();
        let doc = assemble("TM221CE24T", vec![ladder_only], Vec::new()).unwrap();
        assert!(verify("%Q0.0 = NOT %I0.0", &doc).is_match());
    }

    #[test]
    fn unparseable_statement_does_not_hide_other_rungs() {
        let doc = motor_document();
        let report = verify(
            "%Q0.0 = (%I0.2 OR %Q0.0) AND NOT %I0.1; %Q0.1 = %I0.3 XOR %I0.4",
            &doc,
        );
        assert!(matches!(
            report.outcome,
            VerificationOutcome::Mismatch { rung_index: 0, .. }
        ));
        assert!(matches!(report.rungs[0].status, RungStatus::Mismatch { .. }));
        assert_eq!(report.rungs[1].status, RungStatus::Unchecked);
        assert_eq!(report.statements.len(), 2);
        assert_eq!(report.statements[1].source, "%Q0.1 = %I0.3 XOR %I0.4");
        assert!(matches!(
            report.statements[1].status,
            StatementStatus::Inconclusive { .. }
        ));
    }
}
