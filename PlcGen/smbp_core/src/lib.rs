//! SMBP ladder-logic core crate.
//! Responsibilities: grid/element model, rung builder, document assembler,
//! structural validator and logic-equivalence verifier for M221 `.smbp` programs.
//! Non-goals: UI, AI calls (injected via `TextGenerator`), persistence (handled by upper layers).

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod application;

pub use domain::{Address, AddressKind, Document, Element, ElementKind, LayoutError, Rung};
pub use ports::{DocumentCodec, TextGenerator};
pub use adapters::smbp::{parse_document, serialize_document, SmbpCodec, SmbpConfig};
pub use application::{
    assemble, repair, validate, verify, Assembler, GenerationService, RungBuilder, ValidationResult,
    VerificationOutcome, VerificationReport,
};
