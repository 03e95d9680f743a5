//! docpilot - Repository Documentation Pipeline
//!
//! Scans a repository, infers its structure, and generates README, API and
//! per-component documents through a generation service, each checked by a
//! deterministic quality checker and revised a bounded number of times.
//!
//! ## Core Features
//!
//! - **Staged Workflow**: scan → analyze → generate → check, with stage-by-stage entry points
//! - **Partial Failure**: one failed document kind never blocks its siblings
//! - **Bounded Revision**: at most `max_revisions + 1` service calls per document
//! - **Cancellation**: cooperative, checked at stage boundaries and mid-generation
//! - **Checkpoint/Resume**: persisted scan and analysis under `<output>/.docpilot/`
//! - **Metrics**: versioned per-stage timing, token and cost record
//!
//! ## Quick Start
//!
//! ```ignore
//! use docpilot::{Config, DocKind, Orchestrator};
//!
//! let orchestrator = Orchestrator::from_config(Config::default())?;
//! let outcome = orchestrator
//!     .run_workflow(&repo, &output_dir, &[], &[DocKind::Readme, DocKind::Api])
//!     .await;
//! println!("{}", outcome.status);
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: generation-service capability, providers, retry and throttling
//! - [`analyzer`]: repository scanning and structural analysis
//! - [`docs`]: generation tasks, the revise loop and the quality checker
//! - [`pipeline`]: orchestrator, workflow state, checkpoints and metrics
//! - [`config`]: layered configuration

pub mod ai;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod constants;
pub mod docs;
pub mod pipeline;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{DocKind, DocpilotError, ErrorCategory, Result, ServiceError};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    MetricsArtifact, Orchestrator, OutcomeStatus, StageName, StageStatus, WorkflowOutcome,
    WorkflowState,
};

// =============================================================================
// Capability Re-exports
// =============================================================================

pub use ai::{GenerationService, SharedService, create_service};
pub use analyzer::{AnalysisReport, Analyzer, CodeAnalyzer, RepositoryScanner, RepositorySnapshot, Scanner};
pub use docs::{Checker, DocumentGenerator, GeneratedDocument, Generator, QualityChecker, QualityVerdict};
