//! Scan Command
//!
//! Walks the repository and prints the file inventory. The snapshot is
//! checkpointed so `docs --resume` can start from it.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{OutputFormat, RepoOptions, language_breakdown};
use crate::cli::ui::{Output, format_bytes};
use crate::config::Config;
use crate::constants::scan::{TREE_DEPTH, TREE_ENTRIES_PER_DIR};
use crate::pipeline::{CheckpointStore, Orchestrator};
use crate::types::Result;

pub async fn run(options: &RepoOptions, format: OutputFormat, config: Config, cancel: CancellationToken) -> Result<u8> {
    options.ensure_repo()?;
    let output_dir = options.output_dir(&config);
    let excluded = options.excluded_dirs(&config);

    let scanner = options.scanner(&config);
    let orchestrator = Orchestrator::structural(config)
        .with_scanner(scanner)
        .with_cancellation(cancel);
    let snapshot = orchestrator.scan_repository(&options.repo, &excluded).await?;

    let store = CheckpointStore::new(&output_dir);
    if let Err(err) = store
        .invalidate_analysis()
        .and_then(|()| store.save_snapshot(&options.repo, &snapshot))
    {
        warn!(error = %err, "Failed to checkpoint snapshot");
    }

    if format.print_structured(snapshot.as_ref())? {
        return Ok(0);
    }

    let out = Output::new();
    out.header(&format!("Scan: {}", options.repo.display()));
    out.field("Files", snapshot.total_files);
    out.field("Size", format_bytes(snapshot.total_bytes));
    out.field("Excluded", excluded.join(", "));

    out.section("Languages");
    for (language, count) in language_breakdown(&snapshot) {
        out.field(&language, count);
    }

    out.section("Extensions");
    for (ext, stats) in snapshot.by_extension.iter().take(15) {
        out.field(ext, format!("{} files, {}", stats.files, format_bytes(stats.bytes)));
    }

    if !snapshot.skipped.is_empty() {
        out.section("Skipped");
        for entry in &snapshot.skipped {
            out.warning(&format!("{}: {}", entry.path, entry.reason));
        }
    }

    out.section("Layout");
    println!("{}", snapshot.directory_tree(TREE_DEPTH, TREE_ENTRIES_PER_DIR));

    out.success(&format!("Scanned {} files", snapshot.total_files));
    Ok(0)
}
