//! Analyze Command
//!
//! Scan plus analysis. Enrichment is used when `pipeline.enrich` is on and
//! a provider can be built; otherwise the report is structural only.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{OutputFormat, RepoOptions};
use crate::cli::ui::{Output, format_bytes};
use crate::config::Config;
use crate::pipeline::{CheckpointStore, Orchestrator};
use crate::types::Result;

pub async fn run(options: &RepoOptions, format: OutputFormat, config: Config, cancel: CancellationToken) -> Result<u8> {
    options.ensure_repo()?;
    let output_dir = options.output_dir(&config);
    let excluded = options.excluded_dirs(&config);
    let scanner = options.scanner(&config);

    let orchestrator = if config.pipeline.enrich {
        match Orchestrator::from_config(config.clone()) {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                warn!(error = %err, "Generation service unavailable, analysis will be structural only");
                Orchestrator::structural(config)
            }
        }
    } else {
        Orchestrator::structural(config)
    }
    .with_scanner(scanner)
    .with_cancellation(cancel);

    let snapshot = orchestrator.scan_repository(&options.repo, &excluded).await?;
    let report = orchestrator.analyze_repository().await?;

    let store = CheckpointStore::new(&output_dir);
    let saved = store
        .save_snapshot(&options.repo, &snapshot)
        .and_then(|()| store.save_analysis(&options.repo, &report));
    if let Err(err) = saved {
        warn!(error = %err, "Failed to checkpoint analysis");
    }

    if format.print_structured(report.as_ref())? {
        return Ok(0);
    }

    let out = Output::new();
    out.header(&format!("Analysis: {}", report.project_name));
    out.field("Files", format!("{} ({})", report.file_count, format_bytes(report.total_bytes)));
    out.field(
        "Languages",
        report
            .languages
            .iter()
            .map(|l| l.tag())
            .collect::<Vec<_>>()
            .join(", "),
    );
    if let Some(primary) = report.primary_language {
        out.field("Primary", primary.tag());
    }
    out.field("Enriched", report.enriched);
    if let Some(summary) = &report.summary {
        out.field("Summary", summary);
    }

    if report.has_frameworks() {
        out.section("Frameworks");
        for (category, names) in &report.framework_categories {
            out.field(
                category.as_str(),
                names.iter().cloned().collect::<Vec<_>>().join(", "),
            );
        }
    }

    out.section("Entry points");
    if report.entry_points.is_empty() {
        out.warning("No entry point detected");
    }
    for entry in &report.entry_points {
        out.item(&format!("{} ({})", entry.path, entry.reason));
    }

    if !report.components.is_empty() {
        out.section("Components");
        for (name, info) in &report.components {
            out.item(&format!("{name}: {} ({} files)", info.purpose, info.file_refs.len()));
        }
    }

    if !report.api_files.is_empty() {
        out.section("API surface");
        for path in &report.api_files {
            out.item(path);
        }
    }

    out.section("Dependencies");
    out.field("Runtime", report.dependencies.iter().filter(|d| !d.dev).count());
    out.field("Development", report.dependencies.iter().filter(|d| d.dev).count());
    out.field("Manifests", report.manifests.join(", "));

    out.success(&format!("Analyzed {}", report.project_name));
    Ok(0)
}
