pub mod assembler;
pub mod builder;
pub mod repair;
pub mod service;
pub mod validator;
pub mod verifier;

pub use assembler::{assemble, Assembler, AssemblyError};
pub use builder::{
    build_compare_rung, build_counter_rung, build_hysteresis_rung, build_simple_rung, build_timer_rung,
    RungBuilder, Step,
};
pub use repair::{repair, RepairReport};
pub use service::{GenerationOutcome, GenerationRequest, GenerationService};
pub use validator::{validate, Finding, FindingCode, Severity, ValidationResult, Validator};
pub use verifier::{verify, verify_text, VerificationOutcome, VerificationReport};
