//! Code Analyzer Module
//!
//! Turns a [`RepositorySnapshot`] into an [`AnalysisReport`]:
//! - Manifest parsing (dependencies, declared entry points)
//! - Import and naming-convention inference
//! - Framework detection
//! - Optional enrichment through the generation service
//!
//! The structural pass is deterministic. Enrichment is best-effort: when it
//! fails the report is returned as-is with `enriched: false`.

pub mod enrichment;
pub mod frameworks;
pub mod manifest;
pub mod report;
pub mod scanner;
pub mod structure;

pub use report::{
    AnalysisReport, ComponentInfo, Dependency, Ecosystem, EntryPoint, EntryPointReason,
    FrameworkCategory,
};
pub use scanner::{FileRecord, Language, RepositoryScanner, RepositorySnapshot, RoleTag, Scanner};

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::ai::SharedService;
use crate::config::{Config, LlmConfig};
use crate::constants::scan::{MAX_CONTENT_BYTES, TREE_DEPTH, TREE_ENTRIES_PER_DIR};
use crate::types::Result;
use enrichment::{Enricher, needs_enrichment};

/// Derives an [`AnalysisReport`] from a snapshot
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, snapshot: &RepositorySnapshot) -> Result<AnalysisReport>;
}

pub struct CodeAnalyzer {
    service: Option<SharedService>,
    llm: LlmConfig,
    enrich: bool,
    max_content_bytes: u64,
}

impl Default for CodeAnalyzer {
    fn default() -> Self {
        Self {
            service: None,
            llm: LlmConfig::default(),
            enrich: false,
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

impl CodeAnalyzer {
    /// Structural-only analyzer; never calls out
    pub fn structural() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            service: None,
            llm: config.llm.clone(),
            enrich: config.pipeline.enrich,
            max_content_bytes: config.scan.max_content_bytes,
        }
    }

    /// Enable enrichment through `service` (still subject to `pipeline.enrich`)
    pub fn with_service(mut self, service: SharedService) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_enrichment(mut self, enrich: bool) -> Self {
        self.enrich = enrich;
        self
    }

    /// Deterministic pass over paths, manifests and source text
    pub fn analyze_structure(&self, snapshot: &RepositorySnapshot) -> AnalysisReport {
        let manifests = sort_by_depth(
            snapshot
                .with_role(RoleTag::Manifest)
                .map(|f| f.path.clone())
                .collect(),
        );

        let mut dependencies = Vec::new();
        let mut declared_entries = Vec::new();
        let mut project_name = None;
        for path in &manifests {
            let limit = self.max_content_bytes as usize;
            let content = match snapshot.read_text(path, self.max_content_bytes, limit) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path, error = %err, "Manifest unreadable");
                    continue;
                }
            };
            let facts = manifest::parse_manifest(path, &content);
            dependencies.extend(facts.dependencies);
            declared_entries.extend(facts.declared_entries);
            // the shallowest manifest names the project
            if project_name.is_none() {
                project_name = facts.project_name;
            }
        }
        dependencies.sort();
        dependencies.dedup();

        let index = structure::index_sources(snapshot, self.max_content_bytes);
        let imports = structure::imported_modules(&index);

        let framework_categories = frameworks::detect(snapshot, &dependencies, &imports);
        let frameworks = framework_categories
            .values()
            .flat_map(|names| names.iter().cloned())
            .collect();

        let mut language_counts: BTreeMap<Language, usize> = BTreeMap::new();
        for file in snapshot.files.iter().filter(|f| f.language_guess.is_programming()) {
            *language_counts.entry(file.language_guess).or_default() += 1;
        }
        let primary_language = language_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(lang, _)| *lang);

        let project_name = project_name.unwrap_or_else(|| {
            snapshot
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        });

        AnalysisReport {
            project_name,
            languages: language_counts.keys().copied().collect(),
            primary_language,
            frameworks,
            framework_categories,
            dependencies,
            entry_points: structure::find_entry_points(snapshot, &declared_entries, &index),
            components: structure::build_components(snapshot, &index),
            api_files: structure::find_api_files(snapshot),
            manifests,
            directory_tree: snapshot.directory_tree(TREE_DEPTH, TREE_ENTRIES_PER_DIR),
            file_count: snapshot.total_files,
            total_bytes: snapshot.total_bytes,
            enriched: false,
            summary: None,
            enrichment_usage: None,
        }
    }
}

fn sort_by_depth(mut paths: Vec<String>) -> Vec<String> {
    paths.sort_by(|a, b| {
        a.matches('/')
            .count()
            .cmp(&b.matches('/').count())
            .then_with(|| a.cmp(b))
    });
    paths
}

#[async_trait]
impl Analyzer for CodeAnalyzer {
    #[instrument(skip(self, snapshot), fields(files = snapshot.total_files))]
    async fn analyze(&self, snapshot: &RepositorySnapshot) -> Result<AnalysisReport> {
        let mut report = self.analyze_structure(snapshot);

        if let Some(service) = &self.service
            && self.enrich
            && needs_enrichment(&report)
        {
            let enricher = Enricher::new(service, &self.llm, self.max_content_bytes);
            // the report is only touched once a usable answer has been parsed
            if let Err(err) = enricher.enrich(snapshot, &mut report).await {
                warn!(error = %err, "Enrichment failed, keeping structural analysis");
            }
        }

        info!(
            languages = report.languages.len(),
            frameworks = report.frameworks.len(),
            entry_points = report.entry_points.len(),
            components = report.components.len(),
            enriched = report.enriched,
            "Analysis complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Completion, CompletionRequest, GenerationService, ResponseTiming, TokenUsage};
    use crate::types::{ErrorCategory, ServiceError};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn three_file_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "# Demo\n");
        write(dir.path(), "src/main.py", "from util import greet\n\ngreet()\n");
        write(dir.path(), "src/util.py", "def greet():\n    print('hi')\n");
        dir
    }

    struct FixedService {
        reply: std::result::Result<String, ErrorCategory>,
    }

    #[async_trait]
    impl GenerationService for FixedService {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            match &self.reply {
                Ok(text) => Ok(Completion {
                    text: text.clone(),
                    usage: TokenUsage::new(100, 20),
                    timing: ResponseTiming::default(),
                    model: request.model.clone(),
                }),
                Err(category) => Err(ServiceError::new(*category, "down").into()),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }
    }

    #[tokio::test]
    async fn test_three_file_analysis() {
        let dir = three_file_repo();
        let snapshot = RepositoryScanner::new().scan(dir.path(), &[]).unwrap();
        let report = CodeAnalyzer::structural().analyze(&snapshot).await.unwrap();

        assert_eq!(report.languages.iter().map(|l| l.tag()).collect::<Vec<_>>(), vec!["python"]);
        assert_eq!(report.primary_language, Some(Language::Python));
        assert_eq!(report.entry_paths().collect::<Vec<_>>(), vec!["src/main.py"]);
        assert_eq!(report.components.len(), 1);
        assert_eq!(report.components["src"].public_surface, vec!["greet"]);
        assert!(!report.enriched);
    }

    #[tokio::test]
    async fn test_structural_analysis_is_deterministic() {
        let dir = three_file_repo();
        write(dir.path(), "package.json", r#"{"name": "demo", "dependencies": {"express": "4", "react": "18"}}"#);
        write(dir.path(), "web/routes/users.js", "const express = require('express');\nexport function list() {}\n");

        let analyzer = CodeAnalyzer::structural();
        let first = analyzer
            .analyze(&RepositoryScanner::new().scan(dir.path(), &[]).unwrap())
            .await
            .unwrap();
        let second = analyzer
            .analyze(&RepositoryScanner::new().scan(dir.path(), &[]).unwrap())
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(first.project_name, "demo");
        assert!(first.frameworks.contains("express"));
        assert_eq!(first.api_files, vec!["web/routes/users.js"]);
    }

    #[tokio::test]
    async fn test_report_refs_resolve_in_snapshot() {
        let dir = three_file_repo();
        write(dir.path(), "package.json", r#"{"main": "lib/missing.js", "bin": "cli.js"}"#);
        write(dir.path(), "cli.js", "#!/usr/bin/env node\n");
        write(dir.path(), "app/services/billing/charge.py", "def charge(): pass\n");

        let snapshot = RepositoryScanner::new().scan(dir.path(), &[]).unwrap();
        let report = CodeAnalyzer::structural().analyze(&snapshot).await.unwrap();

        assert!(report.dangling_refs(&snapshot).is_empty());
        assert!(report.entry_paths().any(|p| p == "cli.js"));
        assert!(!report.entry_paths().any(|p| p == "lib/missing.js"));
    }

    #[tokio::test]
    async fn test_enrichment_merges_and_marks_report() {
        let dir = three_file_repo();
        let snapshot = RepositoryScanner::new().scan(dir.path(), &[]).unwrap();
        let service: SharedService = Arc::new(FixedService {
            reply: Ok(r#"{"summary": "Greets people.", "frameworks": ["click"], "entry_points": ["src/util.py", "nope.py"]}"#.into()),
        });

        let report = CodeAnalyzer::structural()
            .with_service(service)
            .with_enrichment(true)
            .analyze(&snapshot)
            .await
            .unwrap();

        assert!(report.enriched);
        assert_eq!(report.summary.as_deref(), Some("Greets people."));
        assert!(report.frameworks.contains("click"));
        assert_eq!(report.entry_paths().collect::<Vec<_>>(), vec!["src/main.py", "src/util.py"]);
        assert_eq!(report.enrichment_usage, Some(TokenUsage::new(100, 20)));
        assert!(report.dangling_refs(&snapshot).is_empty());
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades() {
        let dir = three_file_repo();
        let snapshot = RepositoryScanner::new().scan(dir.path(), &[]).unwrap();

        for reply in [Err(ErrorCategory::Unavailable), Ok("not json at all".to_string())] {
            let service: SharedService = Arc::new(FixedService { reply });
            let report = CodeAnalyzer::structural()
                .with_service(service)
                .with_enrichment(true)
                .analyze(&snapshot)
                .await
                .unwrap();

            assert!(!report.enriched);
            assert_eq!(report, CodeAnalyzer::structural().analyze_structure(&snapshot));
        }
    }
}
