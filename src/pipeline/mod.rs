//! Documentation Pipeline
//!
//! ```text
//! scan → analyze → generate(readme | api | component, concurrently) → check
//! ```
//!
//! The [`Orchestrator`] is the only holder of cross-stage state. Each stage
//! method checks its prerequisite, runs, records timing and token metrics,
//! and replaces its stage record in one write. Scan and analyze failures end
//! the run; a failed document kind is recorded and its siblings carry on.
//!
//! Cancellation is cooperative: checked at every stage boundary, and a
//! generation stage in flight drops its pending service calls and is marked
//! `cancelled`.

pub mod checkpoint;
pub mod metrics;
pub mod outcome;
pub mod output;
pub mod state;

pub use checkpoint::{CHECKPOINT_VERSION, CheckpointStore, Restored};
pub use metrics::{DocumentEntry, METRICS_SCHEMA_VERSION, MetricsArtifact, StageEntry};
pub use outcome::{KindOutcome, OutcomeStatus, WorkflowOutcome};
pub use state::{Phase, StageError, StageMetrics, StageName, StageRecord, StageStatus, WorkflowState};

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::ai::{MetricsCollector, RetryPolicy, TokenUsage, create_service, estimate_cost};
use crate::analyzer::{AnalysisReport, Analyzer, CodeAnalyzer, RepositoryScanner, RepositorySnapshot, Scanner};
use crate::config::Config;
use crate::constants::pipeline::METRICS_FILE;
use crate::docs::{DocumentGenerator, GeneratedDocument, GenerationTask, Generator};
use crate::types::{DocKind, DocpilotError, ErrorCategory, Result};

/// Stage outputs held between calls
#[derive(Default)]
struct Artifacts {
    snapshot: Option<Arc<RepositorySnapshot>>,
    report: Option<Arc<AnalysisReport>>,
    documents: BTreeMap<DocKind, Vec<GeneratedDocument>>,
}

pub struct Orchestrator {
    config: Config,
    scanner: Arc<dyn Scanner>,
    analyzer: Arc<dyn Analyzer>,
    generator: Option<Arc<dyn Generator>>,
    state: Arc<RwLock<WorkflowState>>,
    artifacts: RwLock<Artifacts>,
    cancel: CancellationToken,
    service_metrics: Option<Arc<MetricsCollector>>,
    resume: bool,
}

impl Orchestrator {
    pub fn new(config: Config, scanner: Arc<dyn Scanner>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            config,
            scanner,
            analyzer,
            generator: None,
            state: Arc::new(RwLock::new(WorkflowState::default())),
            artifacts: RwLock::new(Artifacts::default()),
            cancel: CancellationToken::new(),
            service_metrics: None,
            resume: false,
        }
    }

    /// Orchestrator without a generation service: scan and analyze only
    pub fn structural(config: Config) -> Self {
        let scanner = Arc::new(RepositoryScanner::from_config(&config.scan));
        let analyzer = Arc::new(CodeAnalyzer::from_config(&config).with_enrichment(false));
        Self::new(config, scanner, analyzer)
    }

    /// Full pipeline backed by the provider named in `config.llm`
    pub fn from_config(config: Config) -> Result<Self> {
        let collector = Arc::new(MetricsCollector::new());
        let service = create_service(&config.llm, RetryPolicy::from_config(&config), Arc::clone(&collector))?;

        let scanner = Arc::new(RepositoryScanner::from_config(&config.scan));
        let analyzer = Arc::new(CodeAnalyzer::from_config(&config).with_service(Arc::clone(&service)));
        let generator = Arc::new(DocumentGenerator::from_config(service, &config));

        Ok(Self::new(config, scanner, analyzer)
            .with_generator(generator)
            .with_service_metrics(collector))
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_service_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.service_metrics = Some(metrics);
        self
    }

    /// Reuse a persisted scan and analysis of the same tree in `run_workflow`
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consistent copy of the current state
    pub fn state(&self) -> WorkflowState {
        self.read_state(|s| s.clone())
    }

    pub fn snapshot(&self) -> Option<Arc<RepositorySnapshot>> {
        self.read_artifacts(|a| a.snapshot.clone())
    }

    pub fn report(&self) -> Option<Arc<AnalysisReport>> {
        self.read_artifacts(|a| a.report.clone())
    }

    /// Accepted documents so far, in kind then target order
    pub fn documents(&self) -> Vec<GeneratedDocument> {
        self.read_artifacts(|a| a.documents.values().flatten().cloned().collect())
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Walk `root`; resets every later stage
    #[instrument(skip(self, excluded_dirs), fields(root = %root.display()))]
    pub async fn scan_repository(&self, root: &Path, excluded_dirs: &[String]) -> Result<Arc<RepositorySnapshot>> {
        self.write_state(|s| {
            s.reset_from(StageName::Scan);
            s.repo_root = Some(root.to_path_buf());
        });
        self.ensure_active(StageName::Scan)?;
        self.write_state(|s| s.begin(StageName::Scan, Phase::Scanning));
        info!("Stage scan: walking repository");
        let started = Instant::now();

        let scanner = Arc::clone(&self.scanner);
        let root_buf = root.to_path_buf();
        let excluded = excluded_dirs.to_vec();
        let cancel = self.cancel.clone();
        let result = tokio::task::spawn_blocking(move || scanner.scan_cancellable(&root_buf, &excluded, &cancel))
            .await
            .map_err(|e| DocpilotError::Io(std::io::Error::other(e)))
            .and_then(|r| r);

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.install_snapshot(Arc::clone(&snapshot));
                self.succeed(
                    StageName::Scan,
                    started,
                    format!("{} files, {} bytes", snapshot.total_files, snapshot.total_bytes),
                    None,
                    None,
                );
                info!(files = snapshot.total_files, skipped = snapshot.skipped.len(), "Stage scan: done");
                Ok(snapshot)
            }
            Err(err) => Err(self.fail(StageName::Scan, started, err)),
        }
    }

    /// Structural analysis, enriched when a service is configured
    #[instrument(skip(self))]
    pub async fn analyze_repository(&self) -> Result<Arc<AnalysisReport>> {
        self.read_state(|s| s.require(StageName::Analyze, StageName::Scan))?;
        let snapshot = self
            .snapshot()
            .ok_or_else(|| DocpilotError::sequence(StageName::Analyze.as_str(), StageName::Scan.as_str()))?;
        self.write_state(|s| s.reset_from(StageName::Analyze));
        self.ensure_active(StageName::Analyze)?;
        self.write_state(|s| s.begin(StageName::Analyze, Phase::Analyzing));
        info!("Stage analyze: inferring structure");
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DocpilotError::cancelled(StageName::Analyze.as_str())),
            report = self.analyzer.analyze(&snapshot) => report,
        };

        match result {
            Ok(report) => {
                let report = Arc::new(report);
                let usage = report.enrichment_usage;
                let cost = usage.map(|u| estimate_cost(&self.config.llm.provider, &self.config.llm.model, u));
                self.install_report(Arc::clone(&report));
                self.succeed(
                    StageName::Analyze,
                    started,
                    format!(
                        "{} languages, {} components, enriched: {}",
                        report.languages.len(),
                        report.components.len(),
                        report.enriched
                    ),
                    usage,
                    cost,
                );
                Ok(report)
            }
            Err(err) => Err(self.fail(StageName::Analyze, started, err)),
        }
    }

    pub async fn generate_readme(&self) -> Result<GeneratedDocument> {
        self.generate_single(DocKind::Readme).await
    }

    pub async fn generate_api(&self) -> Result<GeneratedDocument> {
        self.generate_single(DocKind::Api).await
    }

    /// One document per detected component, up to `pipeline.max_components`
    pub async fn generate_components(&self) -> Result<Vec<GeneratedDocument>> {
        self.generate(DocKind::Component).await
    }

    async fn generate_single(&self, kind: DocKind) -> Result<GeneratedDocument> {
        self.generate(kind).await?.into_iter().next().ok_or_else(|| {
            DocpilotError::generation(ErrorCategory::Unknown, format!("no {kind} document produced"))
        })
    }

    /// Run the generation stage for `kind`
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn generate(&self, kind: DocKind) -> Result<Vec<GeneratedDocument>> {
        let stage = StageName::for_kind(kind);
        self.read_state(|s| s.require(stage, StageName::Analyze))?;
        let report = self
            .report()
            .ok_or_else(|| DocpilotError::sequence(stage.as_str(), StageName::Analyze.as_str()))?;
        self.ensure_active(stage)?;

        let started = Instant::now();
        self.write_state(|s| s.begin(stage, Phase::Generating));
        let Some(generator) = self.generator.clone() else {
            let err = DocpilotError::Config("no generation service configured".to_string());
            return Err(self.fail(stage, started, err));
        };

        let tasks = self.tasks_for(kind, &report);
        if tasks.is_empty() {
            info!("Stage {stage}: no components detected, skipping");
            self.write_state(|s| s.finish(stage, StageRecord::skipped("no components detected")));
            return Ok(Vec::new());
        }
        info!(tasks = tasks.len(), "Stage {stage}: generating");

        let limit = self.config.pipeline.max_concurrency.max(1);
        let run = stream::iter(tasks)
            .map(|task| {
                let generator = Arc::clone(&generator);
                let report = Arc::clone(&report);
                async move {
                    let label = task.label();
                    (label, generator.generate(task, &report).await)
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        // dropping `run` aborts every in-flight service call
        let results = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            results = run => Some(results),
        };
        let Some(results) = results else {
            warn!("Stage {stage}: cancelled mid-generation");
            return Err(self.fail(stage, started, DocpilotError::cancelled(stage.as_str())));
        };

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for (label, result) in results {
            match result {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    warn!(task = %label, error = %err, "Document generation failed");
                    failures.push((label, err));
                }
            }
        }
        documents.sort_by(|a, b| a.target.cmp(&b.target));

        if documents.is_empty() {
            let err = failures.into_iter().next().map_or_else(
                || DocpilotError::generation(ErrorCategory::Unknown, format!("no {kind} document produced")),
                |(_, err)| err,
            );
            return Err(self.fail(stage, started, err));
        }

        let usage = documents
            .iter()
            .fold(TokenUsage::default(), |acc, d| acc + d.usage);
        let cost: f64 = documents.iter().map(|d| d.cost_usd).sum();
        let summary = documents
            .iter()
            .map(|d| format!("{} (revision {}, score {:.2})", d.output_path().display(), d.revision, d.verdict.score))
            .collect::<Vec<_>>()
            .join(", ");
        let note = (!failures.is_empty()).then(|| {
            failures
                .iter()
                .map(|(label, err)| format!("{label}: {err}"))
                .collect::<Vec<_>>()
                .join("; ")
        });

        self.write_artifacts(|a| {
            a.documents.insert(kind, documents.clone());
        });
        self.succeed_with_note(stage, started, summary, Some(usage), Some(cost), note);
        Ok(documents)
    }

    fn tasks_for(&self, kind: DocKind, report: &AnalysisReport) -> Vec<GenerationTask> {
        let max_revisions = self.config.pipeline.max_revisions;
        match kind {
            DocKind::Readme => vec![GenerationTask::readme(report, max_revisions)],
            DocKind::Api => vec![GenerationTask::api(report, max_revisions)],
            DocKind::Component => {
                if report.components.len() > self.config.pipeline.max_components {
                    warn!(
                        detected = report.components.len(),
                        limit = self.config.pipeline.max_components,
                        "Too many components, documenting the first ones only"
                    );
                }
                report
                    .components
                    .keys()
                    .take(self.config.pipeline.max_components)
                    .filter_map(|name| GenerationTask::component(report, name, max_revisions))
                    .collect()
            }
        }
    }

    /// Aggregation stage: write documents, index and metrics; settle the run
    #[instrument(skip(self, requested), fields(output = %output_dir.display()))]
    pub fn check(&self, output_dir: &Path, requested: &[DocKind]) -> Result<(OutcomeStatus, MetricsArtifact)> {
        self.read_state(|s| s.require(StageName::Check, StageName::Analyze))?;
        self.ensure_active(StageName::Check)?;
        self.write_state(|s| s.begin(StageName::Check, Phase::Checking));
        let started = Instant::now();

        let documents = self.documents();
        match output::write_documents(output_dir, &documents) {
            Ok(written) => {
                let summary = format!("{} files written", written.len());
                self.succeed(StageName::Check, started, summary, None, None);
            }
            Err(err) => return Err(self.fail(StageName::Check, started, err)),
        }

        let status = self.read_state(|s| OutcomeStatus::from_state(s, requested));
        let artifact = self.settle(output_dir, status);
        Ok((status, artifact))
    }

    // -------------------------------------------------------------------------
    // Workflow
    // -------------------------------------------------------------------------

    /// Scan, analyze, generate every requested kind, then check.
    ///
    /// Never returns an error: failures are reported through the outcome's
    /// status, per-kind records and `error`.
    #[instrument(skip(self, excluded_dirs, kinds), fields(repo = %repo.display()))]
    pub async fn run_workflow(
        &self,
        repo: &Path,
        output_dir: &Path,
        excluded_dirs: &[String],
        kinds: &[DocKind],
    ) -> WorkflowOutcome {
        let mut requested = kinds.to_vec();
        requested.sort();
        requested.dedup();

        let store = CheckpointStore::new(output_dir);
        if let Err(err) = self.prepare(repo, excluded_dirs, &store).await {
            warn!(error = %err, "Workflow stopped before generation");
            let status = if err.is_cancelled() {
                OutcomeStatus::Cancelled
            } else {
                OutcomeStatus::Failed
            };
            let metrics = self.settle(output_dir, status);
            return self.outcome(status, &requested, Some(metrics), Some(err));
        }

        // kinds run side by side; the service gate bounds calls in flight
        let results = futures::future::join_all(
            requested
                .iter()
                .map(|kind| async move { (*kind, self.generate(*kind).await) }),
        )
        .await;
        for (kind, result) in results {
            if let Err(err) = result {
                info!(kind = %kind, error = %err, "Document kind failed");
            }
        }
        self.save_state_checkpoint(repo, &store);

        if self.cancel.is_cancelled() {
            self.write_state(|s| s.finish(StageName::Check, StageRecord::skipped("cancelled")));
            let metrics = self.settle(output_dir, OutcomeStatus::Cancelled);
            return self.outcome(
                OutcomeStatus::Cancelled,
                &requested,
                Some(metrics),
                Some(DocpilotError::cancelled("generate")),
            );
        }

        match self.check(output_dir, &requested) {
            Ok((status, metrics)) => {
                self.save_state_checkpoint(repo, &store);
                self.outcome(status, &requested, Some(metrics), None)
            }
            Err(err) => {
                let metrics = self.settle(output_dir, OutcomeStatus::Failed);
                self.outcome(OutcomeStatus::Failed, &requested, Some(metrics), Some(err))
            }
        }
    }

    /// Mandatory stages, restored from a checkpoint when resuming
    async fn prepare(&self, repo: &Path, excluded_dirs: &[String], store: &CheckpointStore) -> Result<()> {
        let restored = if self.resume {
            store.restore(repo).unwrap_or_else(|err| {
                warn!(error = %err, "Checkpoint unusable, starting fresh");
                None
            })
        } else {
            None
        };

        let cached_report = match restored {
            Some(restored) => {
                self.adopt_snapshot(repo, Arc::new(restored.snapshot));
                restored.report
            }
            None => {
                let snapshot = self.scan_repository(repo, excluded_dirs).await?;
                self.checkpoint(|| {
                    store.invalidate_analysis()?;
                    store.save_snapshot(repo, &snapshot)
                });
                None
            }
        };

        match cached_report {
            Some(report) => self.adopt_report(Arc::new(report)),
            None => {
                let report = self.analyze_repository().await?;
                self.checkpoint(|| store.save_analysis(repo, &report));
            }
        }
        self.save_state_checkpoint(repo, store);
        Ok(())
    }

    fn adopt_snapshot(&self, repo: &Path, snapshot: Arc<RepositorySnapshot>) {
        info!(files = snapshot.total_files, "Stage scan: skipped (resuming from checkpoint)");
        let record = StageRecord {
            result_ref: Some(format!("{} files, {} bytes", snapshot.total_files, snapshot.total_bytes)),
            ..StageRecord::skipped("resumed")
        };
        self.install_snapshot(snapshot);
        self.write_state(|s| {
            s.reset_from(StageName::Scan);
            s.repo_root = Some(repo.to_path_buf());
            s.finish(StageName::Scan, record);
        });
    }

    fn adopt_report(&self, report: Arc<AnalysisReport>) {
        info!(components = report.components.len(), "Stage analyze: skipped (resuming from checkpoint)");
        self.install_report(report);
        self.write_state(|s| {
            s.reset_from(StageName::Analyze);
            s.finish(StageName::Analyze, StageRecord::skipped("resumed"));
        });
    }

    /// Terminate the state machine and persist the metrics artifact
    fn settle(&self, output_dir: &Path, status: OutcomeStatus) -> MetricsArtifact {
        let phase = match status {
            OutcomeStatus::Completed | OutcomeStatus::Partial => Phase::Completed,
            OutcomeStatus::Failed => Phase::Failed,
            OutcomeStatus::Cancelled => Phase::Cancelled,
        };
        self.write_state(|s| s.terminate(phase));

        let project_name = self
            .report()
            .map(|r| r.project_name.clone())
            .or_else(|| {
                self.read_state(|s| s.repo_root.clone())
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            })
            .unwrap_or_else(|| "unknown".to_string());
        let documents = self.documents();
        let service = self.service_metrics.as_ref().map(|m| m.snapshot());
        let artifact =
            self.read_state(|s| MetricsArtifact::from_run(s, &project_name, status, &documents, service));

        let path = output_dir.join(METRICS_FILE);
        match artifact.save(&path) {
            Ok(()) => info!(path = %path.display(), status = %status, "Metrics written"),
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to write metrics"),
        }
        artifact
    }

    fn outcome(
        &self,
        status: OutcomeStatus,
        requested: &[DocKind],
        metrics: Option<MetricsArtifact>,
        error: Option<DocpilotError>,
    ) -> WorkflowOutcome {
        let state = self.state();
        let documents = self.documents();
        let per_kind = requested
            .iter()
            .map(|kind| {
                let record = state.stage(StageName::for_kind(*kind));
                let outcome = KindOutcome {
                    status: record.status,
                    documents: documents.iter().filter(|d| d.kind == *kind).count(),
                    error: record.error.clone(),
                    note: record.note.clone(),
                };
                (*kind, outcome)
            })
            .collect();

        info!(run_id = %state.run_id, status = %status, documents = documents.len(), "Workflow finished");
        WorkflowOutcome {
            run_id: state.run_id,
            status,
            documents,
            per_kind,
            state,
            metrics,
            error,
        }
    }

    // -------------------------------------------------------------------------
    // State helpers
    // -------------------------------------------------------------------------

    fn read_state<R>(&self, f: impl FnOnce(&WorkflowState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write_state<R>(&self, f: impl FnOnce(&mut WorkflowState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn read_artifacts<R>(&self, f: impl FnOnce(&Artifacts) -> R) -> R {
        let guard = self.artifacts.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write_artifacts<R>(&self, f: impl FnOnce(&mut Artifacts) -> R) -> R {
        let mut guard = self.artifacts.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn install_snapshot(&self, snapshot: Arc<RepositorySnapshot>) {
        self.write_artifacts(|a| {
            *a = Artifacts {
                snapshot: Some(snapshot),
                ..Artifacts::default()
            };
        });
    }

    fn install_report(&self, report: Arc<AnalysisReport>) {
        self.write_artifacts(|a| {
            a.report = Some(report);
            a.documents.clear();
        });
    }

    /// `Cancelled` (and the stage marked so) once the token has fired
    fn ensure_active(&self, stage: StageName) -> Result<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        let err = DocpilotError::cancelled(stage.as_str());
        self.write_state(|s| {
            s.finish(
                stage,
                StageRecord {
                    status: StageStatus::Cancelled,
                    error: Some(err.to_string()),
                    ..StageRecord::default()
                },
            )
        });
        Err(err)
    }

    fn succeed(
        &self,
        stage: StageName,
        started: Instant,
        result_ref: String,
        usage: Option<TokenUsage>,
        cost: Option<f64>,
    ) {
        self.succeed_with_note(stage, started, result_ref, usage, cost, None);
    }

    fn succeed_with_note(
        &self,
        stage: StageName,
        started: Instant,
        result_ref: String,
        usage: Option<TokenUsage>,
        cost: Option<f64>,
        note: Option<String>,
    ) {
        self.write_state(|s| {
            let metrics = StageMetrics {
                started_at: s.stage(stage).metrics.started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                token_usage: usage,
                cost_usd: cost.unwrap_or(0.0),
            };
            s.finish(
                stage,
                StageRecord {
                    status: StageStatus::Succeeded,
                    result_ref: Some(result_ref),
                    error: None,
                    note,
                    metrics,
                },
            );
        });
    }

    /// Record `err` against `stage` and hand it back
    fn fail(&self, stage: StageName, started: Instant, err: DocpilotError) -> DocpilotError {
        let status = if err.is_cancelled() {
            StageStatus::Cancelled
        } else {
            StageStatus::Failed
        };
        warn!(stage = %stage, status = %status, error = %err, "Stage did not succeed");
        self.write_state(|s| {
            let metrics = StageMetrics {
                started_at: s.stage(stage).metrics.started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                ..StageMetrics::default()
            };
            s.finish(
                stage,
                StageRecord {
                    status,
                    error: Some(err.to_string()),
                    metrics,
                    ..StageRecord::default()
                },
            );
        });
        err
    }

    fn checkpoint(&self, save: impl FnOnce() -> Result<()>) {
        if let Err(err) = save() {
            warn!(error = %err, "Failed to write checkpoint");
        }
    }

    fn save_state_checkpoint(&self, repo: &Path, store: &CheckpointStore) {
        let state = self.state();
        self.checkpoint(|| store.save_state(repo, &state));
    }
}
