//! Aggregate result of a workflow run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::metrics::MetricsArtifact;
use super::state::{StageName, StageStatus, WorkflowState};
use crate::docs::GeneratedDocument;
use crate::types::{DocKind, DocpilotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every requested kind succeeded
    Completed,
    /// Some requested kinds failed, at least one succeeded
    Partial,
    /// A mandatory stage failed, or every requested kind did
    Failed,
    Cancelled,
}

impl OutcomeStatus {
    /// Derive the overall status from stage records
    pub fn from_state(state: &WorkflowState, requested: &[DocKind]) -> Self {
        if state
            .stages
            .values()
            .any(|r| r.status == StageStatus::Cancelled)
        {
            return Self::Cancelled;
        }

        let prepared = [StageName::Scan, StageName::Analyze]
            .into_iter()
            .all(|s| matches!(state.status(s), StageStatus::Succeeded | StageStatus::Skipped));
        if !prepared {
            return Self::Failed;
        }

        let statuses: Vec<StageStatus> = requested
            .iter()
            .map(|k| state.status(StageName::for_kind(*k)))
            .collect();
        let failed = statuses.iter().filter(|s| **s == StageStatus::Failed).count();
        let succeeded = statuses.iter().any(|s| *s == StageStatus::Succeeded);

        match failed {
            0 => Self::Completed,
            _ if succeeded => Self::Partial,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind summary
#[derive(Debug, Clone, PartialEq)]
pub struct KindOutcome {
    pub status: StageStatus,
    pub documents: usize,
    pub error: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub run_id: Uuid,
    pub status: OutcomeStatus,
    /// Accepted documents, in kind then target order
    pub documents: Vec<GeneratedDocument>,
    pub per_kind: BTreeMap<DocKind, KindOutcome>,
    pub state: WorkflowState,
    pub metrics: Option<MetricsArtifact>,
    /// Error that stopped the run early (mandatory stage failure or cancellation)
    pub error: Option<DocpilotError>,
}

impl WorkflowOutcome {
    pub fn documents_of(&self, kind: DocKind) -> impl Iterator<Item = &GeneratedDocument> {
        self.documents.iter().filter(move |d| d.kind == kind)
    }

    /// Process exit code: partial results still exit 0
    pub fn exit_code(&self) -> u8 {
        match self.status {
            OutcomeStatus::Completed | OutcomeStatus::Partial => 0,
            OutcomeStatus::Cancelled => 130,
            OutcomeStatus::Failed => self.error.as_ref().map_or(1, DocpilotError::exit_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::StageRecord;

    fn with(stages: &[(StageName, StageStatus)]) -> WorkflowState {
        let mut state = WorkflowState::default();
        for (stage, status) in stages {
            state.finish(
                *stage,
                StageRecord {
                    status: *status,
                    ..StageRecord::default()
                },
            );
        }
        state
    }

    #[test]
    fn test_status_from_state() {
        use StageName::*;
        use StageStatus::*;
        let kinds = [DocKind::Readme, DocKind::Api];

        let ok = with(&[(Scan, Succeeded), (Analyze, Succeeded), (Readme, Succeeded), (Api, Succeeded)]);
        assert_eq!(OutcomeStatus::from_state(&ok, &kinds), OutcomeStatus::Completed);

        let partial = with(&[(Scan, Succeeded), (Analyze, Skipped), (Readme, Succeeded), (Api, Failed)]);
        assert_eq!(OutcomeStatus::from_state(&partial, &kinds), OutcomeStatus::Partial);

        let all_failed = with(&[(Scan, Succeeded), (Analyze, Succeeded), (Readme, Failed), (Api, Failed)]);
        assert_eq!(OutcomeStatus::from_state(&all_failed, &kinds), OutcomeStatus::Failed);

        let scan_failed = with(&[(Scan, Failed)]);
        assert_eq!(OutcomeStatus::from_state(&scan_failed, &kinds), OutcomeStatus::Failed);

        let cancelled = with(&[(Scan, Succeeded), (Analyze, Succeeded), (Readme, Cancelled)]);
        assert_eq!(OutcomeStatus::from_state(&cancelled, &kinds), OutcomeStatus::Cancelled);
    }

    #[test]
    fn test_skipped_components_do_not_fail_the_run() {
        use StageName::*;
        use StageStatus::*;
        let state = with(&[(Scan, Succeeded), (Analyze, Succeeded), (Component, Skipped)]);
        assert_eq!(
            OutcomeStatus::from_state(&state, &[DocKind::Component]),
            OutcomeStatus::Completed
        );
    }

    #[test]
    fn test_exit_codes() {
        let outcome = |status, error| WorkflowOutcome {
            run_id: Uuid::new_v4(),
            status,
            documents: Vec::new(),
            per_kind: BTreeMap::new(),
            state: WorkflowState::default(),
            metrics: None,
            error,
        };
        assert_eq!(outcome(OutcomeStatus::Partial, None).exit_code(), 0);
        assert_eq!(outcome(OutcomeStatus::Cancelled, None).exit_code(), 130);
        assert_eq!(outcome(OutcomeStatus::Failed, None).exit_code(), 1);
        let not_found = DocpilotError::NotFound {
            path: "/nope".into(),
        };
        assert_eq!(outcome(OutcomeStatus::Failed, Some(not_found)).exit_code(), 2);
    }
}
