//! Document Generation
//!
//! Readme, API and per-component documents, each produced by the same
//! bounded draft/check/revise loop with kind-specific prompts and checks.

pub mod document;
pub mod generator;
pub mod prompts;
pub mod quality;
pub mod task;

pub use document::{GeneratedDocument, Rejection};
pub use generator::{DocumentGenerator, Generator};
pub use quality::{Checker, Issue, QualityChecker, QualityVerdict, Severity};
pub use task::{DocScope, GenerationTask};
