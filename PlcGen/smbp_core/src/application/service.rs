use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;

use crate::adapters::payload::parse_payload;
use crate::adapters::smbp::{SmbpCodec, SmbpConfig};
use crate::domain::{Declaration, DeclarationSettings, Document};
use crate::ports::{DocumentCodec, TextGenerator};

use super::assembler::Assembler;
use super::validator::{ValidationResult, Validator};
use super::verifier::{verify_with_limit, VerificationReport};

/// 生成梯级 JSON 时的系统指令
pub const RUNG_SYSTEM_PROMPT: &str = "You translate PLC control requirements into ladder rungs. \
Answer with one JSON object and nothing else: \
{\"controller\"?: string, \"rungs\": [rung], \"symbols\"?: [{\"address\", \"symbol\", \"comment\"?}], \
\"timers\"?: [{\"address\", \"preset\", \"base\"?, \"timerType\"?}], \"counters\"?: [{\"address\", \"preset\"}]}. \
A rung is one of: {\"pattern\":\"simple\",\"input\",\"output\",\"negated\"?}, \
{\"pattern\":\"hysteresis\",\"trigger\",\"stop\",\"output\"}, \
{\"pattern\":\"timer\",\"input\",\"timer\",\"output\",\"column\"?}, \
{\"pattern\":\"compare\",\"comparison\",\"output\",\"column\"?}, \
{\"pattern\":\"counter\",\"input\",\"counter\",\"output\",\"column\"?}; every rung may carry a \"comment\". \
Addresses use M221 syntax (%I0.1, %Q0.0, %M0, %MW0, %TM0, %C0); comparisons look like [%MW0>100].";

/// 推导期望逻辑时的系统指令
pub const EXPECTED_SYSTEM_PROMPT: &str = "Restate the control requirements as boolean statements, one per line, \
in the form `OUTPUT = expression` using AND, OR, NOT and parentheses over the addresses or symbols mentioned. \
Answer with the statements only.";

/// 上层入口给出的生成请求
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub requirements: String,
    /// 为空时依次取生成结果中的型号、已有文档的型号、配置中的型号
    pub controller: Option<String>,
    /// 追加到已有文档之后
    pub existing_document: Option<String>,
    pub expected_logic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub file_name: String,
    pub document_text: String,
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

/// Application layer use case: requirements → validated (and optionally verified) document.
/// The generator and codec are injected; the service keeps no state between calls.
#[derive(Debug, Clone)]
pub struct GenerationService<G: TextGenerator, C: DocumentCodec = SmbpCodec> {
    generator: G,
    codec: C,
    config: SmbpConfig,
    validator: Validator,
}

impl<G: TextGenerator> GenerationService<G, SmbpCodec> {
    /// Create a service writing SMBP files with the given configuration.
    pub fn smbp(generator: G, config: SmbpConfig) -> Self {
        let codec = SmbpCodec::new(config.clone());
        Self::new(generator, codec, config)
    }
}

impl<G: TextGenerator, C: DocumentCodec> GenerationService<G, C> {
    pub fn new(generator: G, codec: C, config: SmbpConfig) -> Self {
        let validator = Validator::new(&config);
        Self {
            generator,
            codec,
            config,
            validator,
        }
    }

    pub fn config(&self) -> &SmbpConfig {
        &self.config
    }

    /// Run the whole pipeline for one request.
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let raw = self
            .generator
            .generate(RUNG_SYSTEM_PROMPT, &request.requirements)
            .context("text generator failed to produce rungs")?;
        debug!("generator returned {} bytes of rung payload", raw.len());

        let payload = parse_payload(&raw).context("generator returned an unusable rung payload")?;
        let requested = request.controller.clone().or(payload.controller);

        let document = match &request.existing_document {
            Some(existing) => {
                let existing = self
                    .codec
                    .decode(existing.as_bytes())
                    .context("existing document could not be parsed")?;
                let controller = requested.unwrap_or_else(|| existing.controller().to_string());
                let assembler = Assembler::with_project(existing.project().clone());
                let (mut rungs, declarations) = existing.into_parts();
                rungs.extend(payload.rungs);
                assembler.assemble(&controller, rungs, merge_declarations(declarations, payload.declarations))?
            }
            None => {
                let controller = requested.unwrap_or_else(|| self.config.controller.clone());
                Assembler::new(&self.config).assemble(&controller, payload.rungs, payload.declarations)?
            }
        };
        debug!("assembled {document}");

        let bytes = self.codec.encode(&document)?;
        let document_text = String::from_utf8(bytes).context("codec produced non UTF-8 text")?;
        let validation = self.validator.validate(&document_text);
        let verification = self.verify(request, &document)?;

        info!(
            "generated {} rungs for {}: valid={} errors={} warnings={}",
            document.rungs().len(),
            document.controller(),
            validation.valid,
            validation.errors.len(),
            validation.warnings.len()
        );
        Ok(GenerationOutcome {
            file_name: format!("{}{}", document.project().name, self.codec.file_extension()),
            document_text,
            validation,
            verification,
        })
    }

    fn verify(&self, request: &GenerationRequest, document: &Document) -> Result<Option<VerificationReport>> {
        let expected = match &request.expected_logic {
            Some(expected) => expected.clone(),
            None if self.config.derive_expected_logic => self
                .generator
                .generate(EXPECTED_SYSTEM_PROMPT, &request.requirements)
                .context("text generator failed to restate the expected logic")?,
            None => return Ok(None),
        };
        Ok(Some(verify_with_limit(
            &expected,
            document,
            self.config.equivalence_var_limit,
        )))
    }
}

/// 已有声明优先；新声明只补空别名/注释，或带来非默认的功能块参数
fn merge_declarations(mut existing: Vec<Declaration>, incoming: Vec<Declaration>) -> Vec<Declaration> {
    for declaration in incoming {
        match existing.iter_mut().find(|d| d.address == declaration.address) {
            Some(current) => {
                if current.symbol.is_empty() {
                    current.symbol = declaration.symbol;
                }
                if current.comment.is_empty() {
                    current.comment = declaration.comment;
                }
                if declaration.settings != DeclarationSettings::default_for(declaration.address.kind()) {
                    current.settings = declaration.settings;
                }
            }
            None => existing.push(declaration),
        }
    }
    existing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// 按顺序返回预置回答的生成器
    struct Scripted {
        answers: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().rev().map(|a| a.to_string()).collect()),
            }
        }
    }

    impl TextGenerator for Scripted {
        fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.answers
                .borrow_mut()
                .pop()
                .context("no scripted answer left")
        }
    }

    const MOTOR: &str = r#"{"rungs":[{"pattern":"hysteresis","trigger":"%I0.1","stop":"%I0.2","output":"%Q0.0"}],
        "symbols":[{"address":"%I0.1","symbol":"Start"},{"address":"%I0.2","symbol":"Stop"},{"address":"%Q0.0","symbol":"Motor"}]}"#;

    fn request(expected: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            requirements: "motor start/stop with seal-in".to_string(),
            expected_logic: expected.map(str::to_string),
            ..GenerationRequest::default()
        }
    }

    #[test]
    fn generates_validates_and_verifies() {
        let service = GenerationService::smbp(Scripted::new(&[MOTOR]), SmbpConfig::m221());
        let outcome = service
            .generate(&request(Some("Motor stays on once Start triggers it, until Stop stops it")))
            .unwrap();

        assert!(outcome.validation.valid);
        assert_eq!(outcome.file_name, "Project.smbp");
        assert!(outcome.verification.unwrap().is_match());
    }

    #[test]
    fn asks_the_generator_for_expected_logic_when_configured() {
        let config = SmbpConfig {
            derive_expected_logic: true,
            ..SmbpConfig::m221()
        };
        let generator = Scripted::new(&[MOTOR, "Motor = (Start OR Motor) AND NOT Stop"]);
        let outcome = GenerationService::smbp(generator, config).generate(&request(None)).unwrap();
        assert!(outcome.verification.unwrap().is_match());
    }

    #[test]
    fn appends_to_an_existing_document() {
        let service = GenerationService::smbp(Scripted::new(&[MOTOR]), SmbpConfig::new("TM221CE40R"));
        let first = service.generate(&request(None)).unwrap();
        assert!(first.verification.is_none());

        let lamp = r#"{"rungs":[{"pattern":"simple","input":"%Q0.0","output":"%Q0.1"}],
            "symbols":[{"address":"%Q0.1","symbol":"Lamp"}]}"#;
        let service = GenerationService::smbp(Scripted::new(&[lamp]), SmbpConfig::m221());
        let second = service
            .generate(&GenerationRequest {
                existing_document: Some(first.document_text),
                ..request(Some("Lamp = Motor"))
            })
            .unwrap();

        let document = SmbpCodec::m221().decode(second.document_text.as_bytes()).unwrap();
        assert_eq!(document.rungs().len(), 2);
        assert_eq!(document.controller(), "TM221CE40R");
        assert_eq!(document.resolve_symbol("lamp").map(|a| a.to_string()).as_deref(), Some("%Q0.1"));
        assert!(second.verification.unwrap().is_match());
    }

    #[test]
    fn rejects_untrusted_payloads() {
        let service = GenerationService::smbp(Scripted::new(&["Sure! Here is your program."]), SmbpConfig::m221());
        let err = service.generate(&request(None)).unwrap_err();
        assert!(err.to_string().contains("unusable rung payload"));
    }
}
