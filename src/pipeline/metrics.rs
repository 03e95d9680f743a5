//! Metrics Artifact
//!
//! Versioned record of one workflow run, written next to the generated
//! documents and read back by the `metrics` command. Files written before
//! versioning (a flat `workflows` map) are upgraded in memory on load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use super::state::{StageStatus, WorkflowState};
use super::OutcomeStatus;
use crate::ai::{CallStats, TokenUsage};
use crate::docs::GeneratedDocument;
use crate::types::{DocKind, DocpilotError, Result};

pub const METRICS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub duration_ms: u64,
    pub success: bool,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub kind: DocKind,
    pub target: String,
    pub path: String,
    pub revision: u32,
    pub score: f32,
    pub passed: bool,
    pub accepted_without_pass: bool,
    pub stalled: bool,
    pub tokens: u32,
    pub cost_usd: f64,
}

impl From<&GeneratedDocument> for DocumentEntry {
    fn from(doc: &GeneratedDocument) -> Self {
        Self {
            kind: doc.kind,
            target: doc.target.label().to_string(),
            path: doc.output_path().to_string_lossy().replace('\\', "/"),
            revision: doc.revision,
            score: doc.verdict.score,
            passed: doc.verdict.passed,
            accepted_without_pass: doc.accepted_without_pass,
            stalled: doc.stalled,
            tokens: doc.usage.total(),
            cost_usd: doc.cost_usd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsArtifact {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: OutcomeStatus,
    pub total_duration_ms: u64,
    pub total_tokens: TokenUsage,
    pub total_cost_usd: f64,
    pub stages: BTreeMap<String, StageEntry>,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
    /// Generation-service call counters, when a service was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<CallStats>,
    /// Set when the file was upgraded from the unversioned layout
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub legacy: bool,
}

impl MetricsArtifact {
    pub fn from_run(
        state: &WorkflowState,
        project_name: &str,
        status: OutcomeStatus,
        documents: &[GeneratedDocument],
        service: Option<CallStats>,
    ) -> Self {
        let stages = state
            .stages
            .iter()
            .filter(|(_, record)| record.status.is_finished())
            .map(|(name, record)| {
                (
                    name.to_string(),
                    StageEntry {
                        duration_ms: record.metrics.duration_ms,
                        success: matches!(record.status, StageStatus::Succeeded | StageStatus::Skipped),
                        status: record.status,
                        error: record.error.clone(),
                        token_usage: record.metrics.token_usage,
                        cost_usd: record.metrics.cost_usd,
                    },
                )
            })
            .collect();

        let finished_at = state.finished_at.unwrap_or_else(Utc::now);
        Self {
            schema_version: METRICS_SCHEMA_VERSION,
            run_id: Some(state.run_id),
            project_name: project_name.to_string(),
            repo_root: state.repo_root.as_ref().map(|p| p.display().to_string()),
            started_at: Some(state.started_at),
            finished_at: Some(finished_at),
            status,
            total_duration_ms: (finished_at - state.started_at).num_milliseconds().max(0) as u64,
            total_tokens: state.total_usage(),
            total_cost_usd: state.total_cost(),
            stages,
            documents: documents.iter().map(DocumentEntry::from).collect(),
            service,
            legacy: false,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DocpilotError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse either layout
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;

        if let Some(version) = value.get("schema_version").and_then(Value::as_u64) {
            if version > METRICS_SCHEMA_VERSION as u64 {
                return Err(DocpilotError::Validation(format!(
                    "metrics schema version {version} is newer than supported version {METRICS_SCHEMA_VERSION}"
                )));
            }
            return Ok(serde_json::from_value(value)?);
        }

        if value.get("workflows").is_some() {
            let legacy: LegacyMetrics = serde_json::from_value(value)?;
            return Ok(legacy.upgrade());
        }

        Err(DocpilotError::Validation(
            "not a metrics file: neither `schema_version` nor `workflows` present".to_string(),
        ))
    }
}

/// Unversioned layout: durations in seconds, one flat entry per step
#[derive(Debug, Deserialize)]
struct LegacyMetrics {
    #[serde(default, alias = "project_name")]
    repo_name: Option<String>,
    #[serde(default)]
    total_duration: f64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    total_cost: f64,
    #[serde(default)]
    workflows: BTreeMap<String, LegacyStep>,
}

#[derive(Debug, Deserialize)]
struct LegacyStep {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    tokens: Option<u64>,
    #[serde(default)]
    cost: Option<f64>,
    /// `None` when the key is absent, `Some(None)` for an explicit `null`
    #[serde(default, deserialize_with = "present")]
    success: Option<Option<bool>>,
    #[serde(default)]
    end_time: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl LegacyStep {
    /// An explicit flag wins. A `null` flag marks a step that never ended;
    /// without any flag, a recorded duration or end time means it ended.
    fn succeeded(&self) -> bool {
        match self.success {
            Some(flag) => flag.unwrap_or(false),
            None => self.duration.is_some() || self.end_time.is_some(),
        }
    }
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<bool>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Some)
}

fn seconds_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Legacy files only carry a total, so it is booked as output tokens
fn legacy_tokens(total: u64) -> TokenUsage {
    TokenUsage::new(0, u32::try_from(total).unwrap_or(u32::MAX))
}

impl LegacyMetrics {
    fn upgrade(self) -> MetricsArtifact {
        let any_failed = self.workflows.values().any(|s| !s.succeeded());
        let any_succeeded = self.workflows.values().any(LegacyStep::succeeded);
        let status = match (any_succeeded, any_failed) {
            (_, false) => OutcomeStatus::Completed,
            (true, true) => OutcomeStatus::Partial,
            (false, true) => OutcomeStatus::Failed,
        };

        let stages = self
            .workflows
            .into_iter()
            .map(|(name, step)| {
                let success = step.succeeded();
                let unfinished = matches!(step.success, Some(None))
                    || (step.success.is_none() && !success);
                let error = match step.error {
                    Some(error) => Some(error),
                    None if unfinished => Some("step did not finish".to_string()),
                    None => None,
                };
                let tokens = step.tokens.unwrap_or(0);
                let entry = StageEntry {
                    duration_ms: seconds_to_ms(step.duration.unwrap_or(0.0)),
                    success,
                    status: if success {
                        StageStatus::Succeeded
                    } else {
                        StageStatus::Failed
                    },
                    error,
                    token_usage: (tokens > 0).then(|| legacy_tokens(tokens)),
                    cost_usd: step.cost.unwrap_or(0.0),
                };
                (name, entry)
            })
            .collect();

        MetricsArtifact {
            schema_version: METRICS_SCHEMA_VERSION,
            run_id: None,
            project_name: self.repo_name.unwrap_or_else(|| "unknown".to_string()),
            repo_root: None,
            started_at: None,
            finished_at: None,
            status,
            total_duration_ms: seconds_to_ms(self.total_duration),
            total_tokens: legacy_tokens(self.total_tokens),
            total_cost_usd: self.total_cost,
            stages,
            documents: Vec::new(),
            service: None,
            legacy: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{StageMetrics, StageName, StageRecord};
    use tempfile::TempDir;

    fn finished_state() -> WorkflowState {
        let mut state = WorkflowState::default();
        state.finish(
            StageName::Scan,
            StageRecord {
                status: StageStatus::Succeeded,
                metrics: StageMetrics {
                    duration_ms: 12,
                    ..StageMetrics::default()
                },
                ..StageRecord::default()
            },
        );
        state.finish(
            StageName::Api,
            StageRecord {
                status: StageStatus::Failed,
                error: Some("quota exhausted".into()),
                metrics: StageMetrics {
                    token_usage: Some(TokenUsage::new(40, 2)),
                    cost_usd: 0.01,
                    ..StageMetrics::default()
                },
                ..StageRecord::default()
            },
        );
        state
    }

    #[test]
    fn test_artifact_from_run_skips_pending_stages() {
        let artifact =
            MetricsArtifact::from_run(&finished_state(), "demo", OutcomeStatus::Partial, &[], None);
        assert_eq!(artifact.schema_version, 1);
        assert_eq!(artifact.stages.len(), 2);
        assert!(artifact.stages["scan"].success);
        assert_eq!(artifact.stages["api"].error.as_deref(), Some("quota exhausted"));
        assert_eq!(artifact.total_tokens, TokenUsage::new(40, 2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/docpilot-metrics.json");
        let artifact =
            MetricsArtifact::from_run(&finished_state(), "demo", OutcomeStatus::Partial, &[], None);
        artifact.save(&path).unwrap();
        assert_eq!(MetricsArtifact::load(&path).unwrap(), artifact);
    }

    #[test]
    fn test_legacy_layout_is_upgraded() {
        let legacy = r#"{
            "repo_name": "old-repo",
            "total_duration": 12.5,
            "total_tokens": 1500,
            "total_cost": 0.0042,
            "workflows": {
                "analyze_repository": {"duration": 2.25, "tokens": 0, "cost": 0.0},
                "generate_readme": {"duration": 10.0, "tokens": 1500, "cost": 0.0042}
            }
        }"#;
        let artifact = MetricsArtifact::parse(legacy).unwrap();
        assert!(artifact.legacy);
        assert_eq!(artifact.project_name, "old-repo");
        assert_eq!(artifact.total_duration_ms, 12_500);
        assert_eq!(artifact.total_tokens.total(), 1500);
        assert_eq!(artifact.status, OutcomeStatus::Completed);
        assert_eq!(artifact.stages["analyze_repository"].duration_ms, 2250);
        assert!(artifact.stages["analyze_repository"].token_usage.is_none());
        assert_eq!(artifact.stages["generate_readme"].status, StageStatus::Succeeded);
    }

    #[test]
    fn test_legacy_step_with_null_success_is_unfinished() {
        let legacy = r#"{
            "project_name": "half-done",
            "total_duration": 4.0,
            "total_tokens": 800,
            "total_cost": 0.002,
            "workflows": {
                "scan_repository": {"duration": 1.0, "cost": 0.0, "tokens": 0, "success": true},
                "generate_readme": {"duration": 0, "cost": 0.002, "tokens": 800, "success": null},
                "generate_api": {"duration": 3.0, "cost": 0.0, "tokens": 0, "success": false}
            }
        }"#;
        let artifact = MetricsArtifact::parse(legacy).unwrap();
        assert_eq!(artifact.project_name, "half-done");
        assert_eq!(artifact.status, OutcomeStatus::Partial);

        let readme = &artifact.stages["generate_readme"];
        assert!(!readme.success);
        assert_eq!(readme.status, StageStatus::Failed);
        assert_eq!(readme.error.as_deref(), Some("step did not finish"));
        assert_eq!(readme.cost_usd, 0.002);

        let api = &artifact.stages["generate_api"];
        assert_eq!(api.status, StageStatus::Failed);
        assert!(api.error.is_none());
        assert_eq!(artifact.stages["scan_repository"].status, StageStatus::Succeeded);
    }

    #[test]
    fn test_legacy_step_without_end_is_unfinished() {
        let legacy = r#"{
            "workflows": {
                "scan": {"start_time": 1700000000.0, "end_time": 1700000001.5, "duration": 1.5, "cost": 0.0, "tokens": 0},
                "readme": {"start_time": 1700000002.0, "cost": 0.0, "tokens": 0}
            }
        }"#;
        let artifact = MetricsArtifact::parse(legacy).unwrap();
        assert_eq!(artifact.project_name, "unknown");
        assert_eq!(artifact.stages["scan"].status, StageStatus::Succeeded);
        assert_eq!(artifact.stages["readme"].status, StageStatus::Failed);
        assert_eq!(artifact.status, OutcomeStatus::Partial);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let err = MetricsArtifact::parse(r#"{"schema_version": 9}"#).unwrap_err();
        assert!(matches!(err, DocpilotError::Validation(_)));
    }

    #[test]
    fn test_unrelated_json_is_rejected() {
        assert!(matches!(
            MetricsArtifact::parse(r#"{"hello": "world"}"#),
            Err(DocpilotError::Validation(_))
        ));
        assert!(matches!(MetricsArtifact::parse("not json"), Err(DocpilotError::Json(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            MetricsArtifact::load(&dir.path().join("nope.json")),
            Err(DocpilotError::NotFound { .. })
        ));
    }
}
