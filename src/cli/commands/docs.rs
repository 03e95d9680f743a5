//! Docs Command
//!
//! Runs the whole workflow and prints the overall status, a per-stage
//! breakdown and one line per document. Partial results exit 0.

use tokio_util::sync::CancellationToken;

use super::{OutputFormat, RepoOptions};
use crate::cli::ui::{Output, format_duration_ms};
use crate::config::Config;
use crate::pipeline::{Orchestrator, StageName, StageStatus, WorkflowOutcome};
use crate::types::{DocKind, Result};

#[derive(Debug, Clone, Default)]
pub struct DocsOptions {
    pub repo: RepoOptions,
    pub readme: bool,
    pub api: bool,
    pub components: bool,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub resume: bool,
}

impl DocsOptions {
    /// Selected kinds; none selected means all of them
    pub fn kinds(&self) -> Vec<DocKind> {
        let selected: Vec<DocKind> = [
            (self.readme, DocKind::Readme),
            (self.api, DocKind::Api),
            (self.components, DocKind::Component),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect();
        if selected.is_empty() {
            DocKind::ALL.to_vec()
        } else {
            selected
        }
    }

    /// Apply `--model` and `--temperature` on top of the loaded config
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run(options: &DocsOptions, format: OutputFormat, config: Config, cancel: CancellationToken) -> Result<u8> {
    options.repo.ensure_repo()?;
    let config = options.apply(config)?;
    let output_dir = options.repo.output_dir(&config);
    let excluded = options.repo.excluded_dirs(&config);
    let scanner = options.repo.scanner(&config);
    let kinds = options.kinds();

    let orchestrator = Orchestrator::from_config(config)?
        .with_scanner(scanner)
        .with_cancellation(cancel)
        .with_resume(options.resume);

    let out = Output::quiet(format != OutputFormat::Text);
    out.header(&format!("Generating documentation for {}", options.repo.repo.display()));
    out.field("Output", output_dir.display());
    out.field(
        "Documents",
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", "),
    );

    let outcome = orchestrator
        .run_workflow(&options.repo.repo, &output_dir, &excluded, &kinds)
        .await;

    if let Some(metrics) = &outcome.metrics
        && format.print_structured(metrics)?
    {
        return Ok(outcome.exit_code());
    }

    print_outcome(&out, &outcome);
    Ok(outcome.exit_code())
}

fn print_outcome(out: &Output, outcome: &WorkflowOutcome) {
    out.section("Stages");
    for stage in StageName::ALL {
        let record = outcome.state.stage(stage);
        let mut detail = match (&record.error, &record.result_ref, &record.note) {
            (Some(error), _, _) => error.clone(),
            (None, Some(result), _) => result.clone(),
            (None, None, Some(note)) => note.clone(),
            _ => String::new(),
        };
        if record.status.is_finished() && record.metrics.duration_ms > 0 {
            detail = format!("[{}] {detail}", format_duration_ms(record.metrics.duration_ms));
        }
        out.stage(stage.as_str(), record.status, &detail);
    }

    if !outcome.documents.is_empty() {
        out.section("Documents");
        for doc in &outcome.documents {
            let mut line = format!(
                "{}: revision {}, score {:.2}, {} tokens",
                doc.output_path().display(),
                doc.revision,
                doc.verdict.score,
                doc.usage.total()
            );
            if doc.stalled {
                line.push_str(", stalled");
            }
            if doc.accepted_without_pass {
                out.warning(&format!("{line} (accepted below quality threshold)"));
            } else {
                out.item(&line);
            }
        }
    }

    for (kind, result) in &outcome.per_kind {
        if result.status == StageStatus::Failed {
            out.warning(&format!(
                "{kind}: {}",
                result.error.as_deref().unwrap_or("failed")
            ));
        }
        if let Some(note) = &result.note
            && result.status == StageStatus::Succeeded
        {
            out.warning(&format!("{kind}: some documents failed ({note})"));
        }
    }

    let summary = match &outcome.error {
        Some(err) => err.to_string(),
        None => {
            let tokens = outcome.state.total_usage().total();
            let cost = outcome.state.total_cost();
            format!(
                "{} documents, {tokens} tokens, ${cost:.4} (run {})",
                outcome.documents.len(),
                outcome.run_id
            )
        }
    };
    out.outcome(outcome.status, &summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocpilotError;

    #[test]
    fn test_no_selector_means_all_kinds() {
        assert_eq!(DocsOptions::default().kinds(), DocKind::ALL.to_vec());
        let options = DocsOptions {
            api: true,
            components: true,
            ..DocsOptions::default()
        };
        assert_eq!(options.kinds(), vec![DocKind::Api, DocKind::Component]);
    }

    #[test]
    fn test_overrides_are_validated() {
        let options = DocsOptions {
            model: Some("gpt-4o".into()),
            temperature: Some(0.9),
            ..DocsOptions::default()
        };
        let config = options.apply(Config::default()).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.temperature, 0.9);

        let bad = DocsOptions {
            temperature: Some(5.0),
            ..DocsOptions::default()
        };
        assert!(matches!(bad.apply(Config::default()), Err(DocpilotError::Config(_))));
    }
}
