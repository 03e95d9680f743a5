//! Bounded Revise Loop
//!
//! Draft, check, revise. At most `max_revisions + 1` calls reach the
//! generation service per task, whatever the checker decides:
//!
//! 1. A passing draft is accepted.
//! 2. A draft byte-identical to the previous `stall_window - 1` drafts is
//!    accepted as `stalled`.
//! 3. The draft at `max_revisions` is accepted with `accepted_without_pass`.
//! 4. Anything else is rejected; its issues feed the next revision prompt.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::document::{GeneratedDocument, Rejection};
use super::prompts;
use super::quality::{Checker, QualityChecker, QualityVerdict};
use super::task::GenerationTask;
use crate::ai::{CompletionRequest, SharedService, TokenUsage, estimate_cost};
use crate::analyzer::AnalysisReport;
use crate::config::{Config, LlmConfig};
use crate::constants::quality::DEFAULT_STALL_WINDOW;
use crate::types::{DocpilotError, ErrorCategory, Result, ServiceError};

/// Turns a task and the analysis facts into one accepted document
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, task: GenerationTask, report: &AnalysisReport) -> Result<GeneratedDocument>;
}

pub struct DocumentGenerator {
    service: SharedService,
    checker: Arc<dyn Checker>,
    llm: LlmConfig,
    stall_window: usize,
}

impl DocumentGenerator {
    pub fn new(service: SharedService, checker: Arc<dyn Checker>, llm: LlmConfig) -> Self {
        Self {
            service,
            checker,
            llm,
            stall_window: DEFAULT_STALL_WINDOW,
        }
    }

    pub fn from_config(service: SharedService, config: &Config) -> Self {
        Self::new(
            service,
            Arc::new(QualityChecker::from_config(&config.quality)),
            config.llm.clone(),
        )
        .with_stall_window(config.quality.stall_window)
    }

    /// Identical consecutive drafts needed to stop early (at least 2)
    pub fn with_stall_window(mut self, window: usize) -> Self {
        self.stall_window = window.max(2);
        self
    }

    fn evaluate(&self, text: &str, task: &GenerationTask, report: &AnalysisReport) -> Result<QualityVerdict> {
        match self.checker.check(text, task.kind, report) {
            Ok(verdict) => Ok(verdict),
            // a draft the checker cannot read is a failed draft, not a failed task
            Err(DocpilotError::Validation(reason)) => Ok(QualityVerdict::unusable(reason)),
            Err(err) => Err(err),
        }
    }
}

/// Digests of the most recent drafts
struct StallDetector {
    window: usize,
    recent: VecDeque<[u8; 32]>,
}

impl StallDetector {
    fn new(window: usize) -> Self {
        Self {
            window,
            recent: VecDeque::with_capacity(window),
        }
    }

    /// Record `text`; true once the last `window` drafts are identical
    fn observe(&mut self, text: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(digest);
        self.recent.len() == self.window && self.recent.iter().all(|d| *d == digest)
    }
}

#[async_trait]
impl Generator for DocumentGenerator {
    #[instrument(skip(self, task, report), fields(task = %task.label(), max_revisions = task.max_revisions))]
    async fn generate(&self, task: GenerationTask, report: &AnalysisReport) -> Result<GeneratedDocument> {
        let started = Instant::now();
        let context = prompts::context(&task);
        let mut task = task;
        let mut usage = TokenUsage::default();
        let mut trail = Vec::new();
        let mut stalls = StallDetector::new(self.stall_window);
        let mut previous: Option<(String, QualityVerdict)> = None;

        loop {
            let prompt = match &previous {
                None => prompts::initial(&task),
                Some((text, verdict)) => prompts::revision(&task, text, verdict),
            };
            let request = CompletionRequest::new(prompt, context.as_str(), &self.llm);
            debug!(revision = task.revision, bytes = request.size(), "Requesting draft");

            let completion = self.service.complete(&request).await?;
            usage.add(completion.usage);

            let text = completion.text.trim().to_string();
            if text.is_empty() {
                return Err(ServiceError::with_provider(
                    ErrorCategory::ParseError,
                    format!("empty draft for {}", task.label()),
                    self.service.name(),
                )
                .into());
            }

            let verdict = self.evaluate(&text, &task, report)?;
            let stalled = !verdict.passed && stalls.observe(&text);

            if verdict.passed || stalled || task.is_last_revision() {
                let accepted_without_pass = !verdict.passed;
                info!(
                    revision = task.revision,
                    score = verdict.score,
                    passed = verdict.passed,
                    stalled,
                    "Document accepted"
                );
                return Ok(GeneratedDocument {
                    kind: task.kind,
                    target: task.scope,
                    text,
                    cost_usd: estimate_cost(self.service.name(), &completion.model, usage),
                    model: completion.model,
                    usage,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    revision: task.revision,
                    accepted_without_pass,
                    stalled,
                    verdict,
                    rejection_trail: trail,
                    created_at: Utc::now(),
                });
            }

            info!(
                revision = task.revision,
                score = verdict.score,
                issues = verdict.issues.len(),
                "Draft rejected, revising"
            );
            trail.push(Rejection {
                revision: task.revision,
                score: verdict.score,
                reasons: verdict.actionable().map(ToString::to_string).collect(),
            });
            previous = Some((text, verdict));
            task = task.next_revision();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Completion, GenerationService, ResponseTiming};
    use crate::docs::quality::Issue;
    use crate::types::DocKind;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `drafts[n]` on the n-th call (repeating the last one)
    struct DraftService {
        drafts: Vec<String>,
        prompts: Mutex<Vec<String>>,
        fail: Option<ErrorCategory>,
    }

    impl DraftService {
        fn new(drafts: &[&str]) -> Self {
            Self {
                drafts: drafts.iter().map(|d| d.to_string()).collect(),
                prompts: Mutex::new(Vec::new()),
                fail: None,
            }
        }

        /// A distinct draft for every call
        fn changing() -> Self {
            Self::new(&[])
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationService for DraftService {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            let n = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(request.prompt.clone());
                prompts.len() - 1
            };
            if let Some(category) = self.fail {
                return Err(ServiceError::with_provider(category, "scripted failure", "fake").into());
            }
            let text = if self.drafts.is_empty() {
                format!("# Draft {n}\n")
            } else {
                self.drafts[n.min(self.drafts.len() - 1)].clone()
            };
            Ok(Completion {
                text,
                usage: TokenUsage::new(100, 50),
                timing: ResponseTiming::default(),
                model: request.model.clone(),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    /// Passes according to `script[n]` on the n-th check (repeating the last entry)
    struct ScriptedChecker {
        script: Vec<bool>,
        calls: AtomicUsize,
    }

    impl ScriptedChecker {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Checker for ScriptedChecker {
        fn check(&self, text: &str, _kind: DocKind, _report: &AnalysisReport) -> Result<QualityVerdict> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("unreadable") {
                return Err(DocpilotError::Validation("unreadable".into()));
            }
            let passed = self.script.get(n).or(self.script.last()).copied().unwrap_or(false);
            Ok(QualityVerdict {
                passed,
                score: if passed { 0.9 } else { 0.3 },
                issues: if passed {
                    vec![]
                } else {
                    vec![Issue::error("missing required section 'Usage'").at("section:Usage")]
                },
            })
        }
    }

    fn generator(service: Arc<DraftService>, checker: ScriptedChecker) -> DocumentGenerator {
        DocumentGenerator::new(service, Arc::new(checker), LlmConfig::default())
    }

    fn readme_task(max_revisions: u32) -> GenerationTask {
        GenerationTask::readme(&AnalysisReport::default(), max_revisions)
    }

    #[tokio::test]
    async fn test_passing_first_draft() {
        let service = Arc::new(DraftService::changing());
        let doc = generator(service.clone(), ScriptedChecker::new(vec![true]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 1);
        assert_eq!(doc.revision, 0);
        assert!(!doc.accepted_without_pass);
        assert!(!doc.stalled);
        assert!(doc.rejection_trail.is_empty());
        assert_eq!(doc.usage, TokenUsage::new(100, 50));
        assert_eq!(doc.model, LlmConfig::default().model);
    }

    #[tokio::test]
    async fn test_revises_until_pass() {
        let service = Arc::new(DraftService::changing());
        let doc = generator(service.clone(), ScriptedChecker::new(vec![false, false, true]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 3);
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.text, "# Draft 2");
        assert_eq!(doc.rejection_trail.len(), 2);
        assert_eq!(doc.usage, TokenUsage::new(300, 150));

        let prompts = service.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Previous draft"));
        assert!(prompts[1].contains("missing required section 'Usage'"));
        assert!(prompts[1].contains("# Draft 0"));
    }

    #[tokio::test]
    async fn test_always_failing_checker_is_bounded() {
        let service = Arc::new(DraftService::changing());
        let doc = generator(service.clone(), ScriptedChecker::new(vec![false]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 4);
        assert_eq!(doc.revision, 3);
        assert!(doc.accepted_without_pass);
        assert!(!doc.stalled);
        assert_eq!(doc.rejection_trail.len(), 3);
        assert_eq!(doc.rejection_trail[0].reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_identical_drafts_stall() {
        let service = Arc::new(DraftService::new(&["# Same\n"]));
        let doc = generator(service.clone(), ScriptedChecker::new(vec![false]))
            .generate(readme_task(5), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 2);
        assert!(doc.stalled);
        assert!(doc.accepted_without_pass);
        assert_eq!(doc.revision, 1);
    }

    #[tokio::test]
    async fn test_stall_window_is_configurable() {
        let service = Arc::new(DraftService::new(&["# Same\n"]));
        let doc = generator(service.clone(), ScriptedChecker::new(vec![false]))
            .with_stall_window(3)
            .generate(readme_task(5), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 3);
        assert!(doc.stalled);
    }

    #[tokio::test]
    async fn test_service_failure_is_generation_error() {
        let service = Arc::new(DraftService {
            fail: Some(ErrorCategory::Auth),
            ..DraftService::changing()
        });
        let err = generator(service.clone(), ScriptedChecker::new(vec![true]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DocpilotError::Generation(ref e) if e.category == ErrorCategory::Auth));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_draft_is_parse_error() {
        let service = Arc::new(DraftService::new(&["  \n"]));
        let err = generator(service, ScriptedChecker::new(vec![true]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DocpilotError::Generation(ref e) if e.category == ErrorCategory::ParseError));
    }

    #[tokio::test]
    async fn test_unreadable_draft_is_revised() {
        let service = Arc::new(DraftService::new(&["# unreadable\n", "# Fixed\n"]));
        let doc = generator(service.clone(), ScriptedChecker::new(vec![true]))
            .generate(readme_task(3), &AnalysisReport::default())
            .await
            .unwrap();

        assert_eq!(service.calls(), 2);
        assert_eq!(doc.text, "# Fixed");
        assert_eq!(doc.rejection_trail[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_real_checker_end_to_end() {
        let service = Arc::new(DraftService::new(&["no headings at all"]));
        let generator = DocumentGenerator::from_config(service.clone(), &Config::default());
        let doc = generator
            .generate(readme_task(1), &AnalysisReport::default())
            .await
            .unwrap();

        assert!(doc.accepted_without_pass);
        assert!(!doc.verdict.passed);
        assert!(service.calls() <= 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_revise_loop_terminates(
            max_revisions in 0u32..6,
            script in proptest::collection::vec(any::<bool>(), 1..8),
            repeat in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let service = Arc::new(if repeat {
                DraftService::new(&["# Same\n"])
            } else {
                DraftService::changing()
            });
            let doc = runtime
                .block_on(
                    generator(service.clone(), ScriptedChecker::new(script))
                        .generate(readme_task(max_revisions), &AnalysisReport::default()),
                )
                .unwrap();

            prop_assert!(service.calls() <= max_revisions as usize + 1);
            prop_assert_eq!(doc.revision as usize + 1, service.calls());
            prop_assert_eq!(doc.rejection_trail.len(), doc.revision as usize);
            prop_assert!(doc.verdict.passed || doc.accepted_without_pass);
        }
    }
}
