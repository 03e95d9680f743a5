//! Workflow State
//!
//! The orchestrator's running record: machine phase plus one record per
//! stage. Records are replaced whole, never edited field by field, so a
//! reader holding the lock always sees a consistent stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::ai::TokenUsage;
use crate::types::{DocKind, DocpilotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Scan,
    Analyze,
    Readme,
    Api,
    Component,
    Check,
}

impl StageName {
    pub const ALL: [StageName; 6] = [
        StageName::Scan,
        StageName::Analyze,
        StageName::Readme,
        StageName::Api,
        StageName::Component,
        StageName::Check,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Analyze => "analyze",
            Self::Readme => "readme",
            Self::Api => "api",
            Self::Component => "component",
            Self::Check => "check",
        }
    }

    pub fn for_kind(kind: DocKind) -> Self {
        match kind {
            DocKind::Readme => Self::Readme,
            DocKind::Api => Self::Api,
            DocKind::Component => Self::Component,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine phase of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Scanning,
    Analyzing,
    Generating,
    Checking,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Checking => "checking",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    /// Short description of what the stage produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why a stage was skipped, or which parts of it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub metrics: StageMetrics,
}

impl StageRecord {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: StageStatus::Running,
            metrics: StageMetrics {
                started_at: Some(started_at),
                ..StageMetrics::default()
            },
            ..Self::default()
        }
    }

    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            note: Some(note.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: StageName,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<PathBuf>,
    pub phase: Phase,
    pub stages: BTreeMap<StageName, StageRecord>,
    /// Stage-indexed errors in the order they happened
    pub error_trail: Vec<StageError>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl WorkflowState {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            repo_root: None,
            phase: Phase::Idle,
            stages: StageName::ALL
                .into_iter()
                .map(|s| (s, StageRecord::default()))
                .collect(),
            error_trail: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn stage(&self, name: StageName) -> &StageRecord {
        // every stage is inserted by `new`; a deserialized state may lack one
        static PENDING: StageRecord = StageRecord {
            status: StageStatus::Pending,
            result_ref: None,
            error: None,
            note: None,
            metrics: StageMetrics {
                started_at: None,
                duration_ms: 0,
                token_usage: None,
                cost_usd: 0.0,
            },
        };
        self.stages.get(&name).unwrap_or(&PENDING)
    }

    pub fn status(&self, name: StageName) -> StageStatus {
        self.stage(name).status
    }

    /// `Sequence` error unless `requires` succeeded (or was restored from a checkpoint)
    pub fn require(&self, stage: StageName, requires: StageName) -> Result<()> {
        match self.status(requires) {
            StageStatus::Succeeded | StageStatus::Skipped => Ok(()),
            _ => Err(DocpilotError::sequence(stage.as_str(), requires.as_str())),
        }
    }

    pub fn begin(&mut self, stage: StageName, phase: Phase) {
        self.phase = phase;
        self.stages.insert(stage, StageRecord::running(Utc::now()));
    }

    /// Replace the record for `stage`; failures are also appended to the error trail
    pub fn finish(&mut self, stage: StageName, record: StageRecord) {
        if let Some(message) = &record.error
            && matches!(record.status, StageStatus::Failed | StageStatus::Cancelled)
        {
            self.error_trail.push(StageError {
                stage,
                message: message.clone(),
                at: Utc::now(),
            });
        }
        self.stages.insert(stage, record);
    }

    /// Reset `stage` and every stage after it to pending
    pub fn reset_from(&mut self, stage: StageName) {
        for name in StageName::ALL.into_iter().filter(|s| *s >= stage) {
            self.stages.insert(name, StageRecord::default());
        }
        self.error_trail.retain(|e| e.stage < stage);
        self.finished_at = None;
    }

    pub fn terminate(&mut self, phase: Phase) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
    }

    pub fn total_usage(&self) -> TokenUsage {
        self.stages
            .values()
            .filter_map(|r| r.metrics.token_usage)
            .fold(TokenUsage::default(), |acc, u| acc + u)
    }

    pub fn total_cost(&self) -> f64 {
        self.stages.values().map(|r| r.metrics.cost_usd).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle_and_pending() {
        let state = WorkflowState::default();
        assert_eq!(state.phase, Phase::Idle);
        assert!(StageName::ALL.iter().all(|s| state.status(*s) == StageStatus::Pending));
    }

    #[test]
    fn test_require_is_sequence_error() {
        let mut state = WorkflowState::default();
        let err = state.require(StageName::Analyze, StageName::Scan).unwrap_err();
        assert!(matches!(err, DocpilotError::Sequence { ref stage, ref requires } if stage == "analyze" && requires == "scan"));

        state.finish(
            StageName::Scan,
            StageRecord {
                status: StageStatus::Succeeded,
                ..StageRecord::default()
            },
        );
        assert!(state.require(StageName::Analyze, StageName::Scan).is_ok());

        state.finish(StageName::Analyze, StageRecord::skipped("resumed"));
        assert!(state.require(StageName::Readme, StageName::Analyze).is_ok());
    }

    #[test]
    fn test_failures_enter_error_trail() {
        let mut state = WorkflowState::default();
        state.begin(StageName::Readme, Phase::Generating);
        assert_eq!(state.status(StageName::Readme), StageStatus::Running);
        state.finish(
            StageName::Readme,
            StageRecord {
                status: StageStatus::Failed,
                error: Some("quota".into()),
                ..StageRecord::default()
            },
        );
        assert_eq!(state.error_trail.len(), 1);
        assert_eq!(state.error_trail[0].stage, StageName::Readme);

        state.reset_from(StageName::Analyze);
        assert!(state.error_trail.is_empty());
        assert_eq!(state.status(StageName::Readme), StageStatus::Pending);
    }

    #[test]
    fn test_totals() {
        let mut state = WorkflowState::default();
        for (stage, tokens, cost) in [(StageName::Readme, 10, 0.5), (StageName::Api, 5, 0.25)] {
            state.finish(
                stage,
                StageRecord {
                    status: StageStatus::Succeeded,
                    metrics: StageMetrics {
                        token_usage: Some(TokenUsage::new(tokens, tokens)),
                        cost_usd: cost,
                        ..StageMetrics::default()
                    },
                    ..StageRecord::default()
                },
            );
        }
        assert_eq!(state.total_usage(), TokenUsage::new(15, 15));
        assert!((state.total_cost() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_state_serializes_with_stage_keys() {
        let state = WorkflowState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["stages"]["scan"]["status"], "pending");
        assert_eq!(json["phase"], "idle");
        let back: WorkflowState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
