//! Metrics Command
//!
//! Reads the metrics artifact of the last run, current or legacy layout.

use std::path::PathBuf;

use super::{OutputFormat, RepoOptions};
use crate::cli::ui::{Output, format_duration_ms};
use crate::config::Config;
use crate::constants::pipeline::METRICS_FILE;
use crate::pipeline::MetricsArtifact;
use crate::types::Result;

/// Where the artifact for `options` lives
pub fn artifact_path(options: &RepoOptions, config: &Config) -> PathBuf {
    options.output_dir(config).join(METRICS_FILE)
}

pub fn run(options: &RepoOptions, format: OutputFormat, config: &Config) -> Result<u8> {
    let artifact = MetricsArtifact::load(&artifact_path(options, config))?;

    if format.print_structured(&artifact)? {
        return Ok(0);
    }

    let out = Output::new();
    out.header(&format!("Metrics: {}", artifact.project_name));
    if artifact.legacy {
        out.info("Legacy metrics file (upgraded on read)");
    }
    if let Some(run_id) = artifact.run_id {
        out.field("Run", run_id);
    }
    if let Some(finished) = artifact.finished_at {
        out.field("Finished", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    out.field("Duration", format_duration_ms(artifact.total_duration_ms));
    out.field("Tokens", artifact.total_tokens.total());
    out.field("Cost", format!("${:.4}", artifact.total_cost_usd));

    out.section("Stages");
    for (name, stage) in &artifact.stages {
        let mut detail = format_duration_ms(stage.duration_ms);
        if let Some(usage) = stage.token_usage {
            detail.push_str(&format!(", {} tokens", usage.total()));
        }
        if stage.cost_usd > 0.0 {
            detail.push_str(&format!(", ${:.4}", stage.cost_usd));
        }
        if let Some(error) = &stage.error {
            detail.push_str(&format!(", {error}"));
        }
        out.stage(name, stage.status, &detail);
    }

    if !artifact.documents.is_empty() {
        out.section("Documents");
        for doc in &artifact.documents {
            let mark = if doc.passed { "passed" } else { "below threshold" };
            out.item(&format!(
                "{}: revision {}, score {:.2} ({mark})",
                doc.path, doc.revision, doc.score
            ));
        }
    }

    if let Some(service) = &artifact.service {
        out.section("Generation service");
        out.field("Calls", service.api_calls);
        out.field("Failed calls", service.failed_calls);
        out.field("Retries", service.retries);
        out.field("Avg latency", format!("{:.0}ms", service.avg_latency_ms));
    }

    let summary = format!("{} stages recorded", artifact.stages.len());
    out.outcome(artifact.status, &summary);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OutcomeStatus, WorkflowState};
    use tempfile::TempDir;

    #[test]
    fn test_reads_artifact_from_output_dir() {
        let out = TempDir::new().unwrap();
        let options = RepoOptions {
            repo: PathBuf::from("."),
            output_dir: Some(out.path().to_path_buf()),
            exclude: Vec::new(),
        };
        let config = Config::default();
        MetricsArtifact::from_run(&WorkflowState::default(), "demo", OutcomeStatus::Completed, &[], None)
            .save(&artifact_path(&options, &config))
            .unwrap();

        assert_eq!(run(&options, OutputFormat::Json, &config).unwrap(), 0);
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let out = TempDir::new().unwrap();
        let options = RepoOptions {
            repo: PathBuf::from("."),
            output_dir: Some(out.path().to_path_buf()),
            exclude: Vec::new(),
        };
        let err = run(&options, OutputFormat::Text, &Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
