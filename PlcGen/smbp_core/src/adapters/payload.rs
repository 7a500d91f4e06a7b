/*
AI 输出的梯级描述（JSON）→ 梯级 + 声明
说明：
- 严格解析：未知字段、未知 pattern、非法地址一律整体拒绝，不做“猜测式”部分接收。
- 梯级只经由构建器生成，保证网格与指令表一致。
*/
use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::application::assembler::{check_block_placement, AssemblyError};
use crate::application::builder::{
    build_compare_rung, build_counter_rung, build_hysteresis_rung, build_simple_rung, build_timer_rung,
};
use crate::domain::{
    Address, AddressError, Comparison, CounterSettings, Declaration, DeclarationSettings, LayoutError,
    Rung, TimeBase, TimerSettings, TimerType,
};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON for the rung schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload contains no rungs")]
    Empty,

    #[error("invalid address '{text}' in {field}: {source}")]
    Address {
        field: String,
        text: String,
        source: AddressError,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// 顶层结构
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PayloadDto {
    #[serde(default)]
    pub controller: Option<String>,
    pub rungs: Vec<RungDto>,
    #[serde(default)]
    pub symbols: Vec<SymbolDto>,
    #[serde(default)]
    pub timers: Vec<TimerDto>,
    #[serde(default)]
    pub counters: Vec<CounterDto>,
}

fn default_block_column() -> u16 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "pattern", rename_all = "camelCase", deny_unknown_fields)]
pub enum RungDto {
    Simple {
        input: String,
        output: String,
        #[serde(default)]
        negated: bool,
        #[serde(default)]
        comment: String,
    },
    Hysteresis {
        trigger: String,
        stop: String,
        output: String,
        #[serde(default)]
        comment: String,
    },
    Timer {
        input: String,
        timer: String,
        output: String,
        #[serde(default = "default_block_column")]
        column: u16,
        #[serde(default)]
        comment: String,
    },
    Compare {
        comparison: String,
        output: String,
        #[serde(default)]
        column: u16,
        #[serde(default)]
        comment: String,
    },
    Counter {
        input: String,
        counter: String,
        output: String,
        #[serde(default = "default_block_column")]
        column: u16,
        #[serde(default)]
        comment: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SymbolDto {
    pub address: String,
    pub symbol: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimerDto {
    pub address: String,
    pub preset: u32,
    #[serde(default)]
    pub base: TimeBase,
    #[serde(default)]
    pub timer_type: TimerType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CounterDto {
    pub address: String,
    pub preset: u32,
}

/// 映射结果（尚未装配）
#[derive(Debug, Clone)]
pub struct ParsedPayload {
    pub controller: Option<String>,
    pub rungs: Vec<Rung>,
    pub declarations: Vec<Declaration>,
}

fn parse_address(field: &str, text: &str) -> Result<Address, PayloadError> {
    text.parse().map_err(|source| PayloadError::Address {
        field: field.to_string(),
        text: text.to_string(),
        source,
    })
}

/// 去掉 ```json 围栏（生成器常见的包装），内容本身不做修补
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

impl RungDto {
    fn build(&self) -> Result<Rung, PayloadError> {
        let (rung, comment) = match self {
            RungDto::Simple {
                input,
                output,
                negated,
                comment,
            } => (
                build_simple_rung(parse_address("input", input)?, parse_address("output", output)?, *negated)?,
                comment,
            ),
            RungDto::Hysteresis {
                trigger,
                stop,
                output,
                comment,
            } => (
                build_hysteresis_rung(
                    parse_address("trigger", trigger)?,
                    parse_address("stop", stop)?,
                    parse_address("output", output)?,
                )?,
                comment,
            ),
            RungDto::Timer {
                input,
                timer,
                output,
                column,
                comment,
            } => (
                build_timer_rung(
                    parse_address("input", input)?,
                    parse_address("timer", timer)?,
                    parse_address("output", output)?,
                    *column,
                )?,
                comment,
            ),
            RungDto::Compare {
                comparison,
                output,
                column,
                comment,
            } => (
                build_compare_rung(comparison.parse::<Comparison>()?, parse_address("output", output)?, *column)?,
                comment,
            ),
            RungDto::Counter {
                input,
                counter,
                output,
                column,
                comment,
            } => (
                build_counter_rung(
                    parse_address("input", input)?,
                    parse_address("counter", counter)?,
                    parse_address("output", output)?,
                    *column,
                )?,
                comment,
            ),
        };
        Ok(rung.with_comment(comment.as_str()))
    }
}

impl PayloadDto {
    /// 映射为梯级与声明；同一张表内重复的地址直接拒绝
    pub fn into_parsed(self) -> Result<ParsedPayload, PayloadError> {
        if self.rungs.is_empty() {
            return Err(PayloadError::Empty);
        }
        let rungs = self.rungs.iter().map(RungDto::build).collect::<Result<Vec<_>, _>>()?;
        check_block_placement(&rungs)?;

        let mut declarations: BTreeMap<Address, Declaration> = BTreeMap::new();
        for entry in &self.symbols {
            let address = parse_address("symbols", &entry.address)?;
            if declarations.contains_key(&address) {
                return Err(AssemblyError::DuplicateDeclaration(address).into());
            }
            declarations.insert(
                address,
                Declaration::new(address)
                    .with_symbol(entry.symbol.as_str())
                    .with_comment(entry.comment.as_str()),
            );
        }

        let mut settings: BTreeMap<Address, DeclarationSettings> = BTreeMap::new();
        let timers = self.timers.iter().map(|t| {
            let settings = DeclarationSettings::Timer(TimerSettings {
                timer_type: t.timer_type,
                base: t.base,
                preset: t.preset,
            });
            (t.address.as_str(), "timers", settings)
        });
        let counters = self.counters.iter().map(|c| {
            let settings = DeclarationSettings::Counter(CounterSettings { preset: c.preset });
            (c.address.as_str(), "counters", settings)
        });
        for (text, field, value) in timers.chain(counters) {
            let address = parse_address(field, text)?;
            if settings.insert(address, value).is_some() {
                return Err(AssemblyError::DuplicateDeclaration(address).into());
            }
        }
        for (address, value) in settings {
            if !value.fits(address.kind()) {
                return Err(AssemblyError::SettingsMismatch(address).into());
            }
            declarations
                .entry(address)
                .or_insert_with(|| Declaration::new(address))
                .settings = value;
        }

        Ok(ParsedPayload {
            controller: self.controller.filter(|c| !c.trim().is_empty()),
            rungs,
            declarations: declarations.into_values().collect(),
        })
    }
}

/// 严格解析入口：文本 → 梯级 + 声明
pub fn parse_payload(text: &str) -> Result<ParsedPayload, PayloadError> {
    let dto: PayloadDto = serde_json::from_str(strip_fence(text))?;
    dto.into_parsed()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOTOR: &str = r#"{
        "rungs": [
            {"pattern": "hysteresis", "trigger": "%I0.1", "stop": "%I0.2", "output": "%Q0.0", "comment": "Motor"},
            {"pattern": "timer", "input": "%Q0.0", "timer": "%TM0", "output": "%Q0.1", "column": 3}
        ],
        "symbols": [{"address": "%I0.1", "symbol": "Start"}, {"address": "%TM0", "symbol": "Delay"}],
        "timers": [{"address": "%TM0", "preset": 5, "base": "HundredMs"}]
    }"#;

    #[test]
    fn maps_rungs_and_merges_declarations() {
        let parsed = parse_payload(MOTOR).unwrap();
        assert_eq!(parsed.rungs.len(), 2);
        assert_eq!(parsed.rungs[0].comment(), "Motor");
        assert_eq!(parsed.controller, None);

        let timer = parsed
            .declarations
            .iter()
            .find(|d| d.address.to_string() == "%TM0")
            .unwrap();
        assert_eq!(timer.symbol, "Delay");
        assert_eq!(timer.timer().map(|t| (t.preset, t.base)), Some((5, TimeBase::HundredMs)));
    }

    #[test]
    fn accepts_fenced_json() {
        let fenced = format!("```json\n{MOTOR}\n```");
        assert_eq!(parse_payload(&fenced).unwrap().rungs.len(), 2);
    }

    #[test]
    fn rejects_unknown_fields_and_patterns() {
        let extra = r#"{"rungs":[{"pattern":"simple","input":"%I0.0","output":"%Q0.0","color":"red"}]}"#;
        assert!(matches!(parse_payload(extra), Err(PayloadError::Json(_))));

        let pattern = r#"{"rungs":[{"pattern":"xor","input":"%I0.0","output":"%Q0.0"}]}"#;
        assert!(matches!(parse_payload(pattern), Err(PayloadError::Json(_))));

        let top = r#"{"rungs":[],"symbolsJson":"..."}"#;
        assert!(matches!(parse_payload(top), Err(PayloadError::Json(_))));
    }

    #[test]
    fn rejects_unmappable_content() {
        assert!(matches!(parse_payload(r#"{"rungs":[]}"#), Err(PayloadError::Empty)));

        let bad = r#"{"rungs":[{"pattern":"simple","input":"undefined","output":"%Q0.0"}]}"#;
        assert!(matches!(parse_payload(bad), Err(PayloadError::Address { .. })));

        let layout = r#"{"rungs":[{"pattern":"compare","comparison":"[%MW0>1]","output":"%M0","column":9}]}"#;
        assert!(matches!(parse_payload(layout), Err(PayloadError::Layout(_))));

        let mismatch = r#"{"rungs":[{"pattern":"simple","input":"%I0.0","output":"%Q0.0"}],
                           "counters":[{"address":"%TM1","preset":3}]}"#;
        assert!(matches!(
            parse_payload(mismatch),
            Err(PayloadError::Assembly(AssemblyError::SettingsMismatch(_)))
        ));
    }

    #[test]
    fn rejects_a_timer_shared_by_two_rungs() {
        let shared = r#"{"rungs":[
            {"pattern":"timer","input":"%I0.0","timer":"%TM0","output":"%Q0.1"},
            {"pattern":"timer","input":"%I0.1","timer":"%TM0","output":"%Q0.2","column":4}
        ]}"#;
        let err = parse_payload(shared).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Assembly(AssemblyError::DuplicateBlock(address)) if address.to_string() == "%TM0"
        ));
    }
}
