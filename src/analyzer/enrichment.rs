//! Optional generation-service enrichment of a structural report.
//!
//! Sends a size-capped excerpt of the repository and merges back only
//! facts that are consistent with the snapshot.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::frameworks::category_of;
use super::report::{AnalysisReport, EntryPoint, EntryPointReason};
use super::scanner::{RepositorySnapshot, RoleTag};
use super::structure::{default_purpose, sort_entry_points};
use crate::ai::{CompletionRequest, SharedService, parse_json};
use crate::config::LlmConfig;
use crate::constants::analysis::{ENRICHMENT_EXCERPT_BYTES, EXCERPT_BYTES_PER_FILE};
use crate::types::Result;

const INSTRUCTIONS: &str = "You are reviewing a software repository. Using only the facts and file \
excerpts provided, answer with a single JSON object and nothing else:
{
  \"summary\": \"one paragraph describing what the project does\",
  \"frameworks\": [\"lowercase framework or library names actually used\"],
  \"entry_points\": [\"repository-relative paths of files that start the program\"],
  \"component_purposes\": {\"<component name>\": \"one sentence purpose\"}
}
Only list paths that appear in the excerpts or the file tree. Leave a field empty when unsure.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnrichmentResponse {
    summary: Option<String>,
    frameworks: Vec<String>,
    entry_points: Vec<String>,
    component_purposes: BTreeMap<String, String>,
}

/// Whether structural inference left gaps worth asking about
pub fn needs_enrichment(report: &AnalysisReport) -> bool {
    if report.components.is_empty() && report.entry_points.is_empty() && report.languages.is_empty()
    {
        return false;
    }
    report.entry_points.is_empty()
        || report.frameworks.is_empty()
        || report
            .components
            .keys()
            .any(|name| default_purpose(name).is_none())
}

/// Manifests first, then entry points, then remaining source files, each
/// truncated, until the total budget is spent
pub fn build_excerpt(snapshot: &RepositorySnapshot, report: &AnalysisReport, max_content_bytes: u64) -> String {
    let mut ordered: Vec<&str> = report.manifests.iter().map(String::as_str).collect();
    ordered.extend(report.entry_paths());
    ordered.extend(snapshot.with_role(RoleTag::Source).map(|f| f.path.as_str()));

    let mut out = String::new();
    let mut seen = std::collections::BTreeSet::new();
    for path in ordered {
        if !seen.insert(path) {
            continue;
        }
        let remaining = ENRICHMENT_EXCERPT_BYTES.saturating_sub(out.len());
        if remaining < 256 {
            break;
        }
        let limit = EXCERPT_BYTES_PER_FILE.min(remaining);
        match snapshot.read_text(path, max_content_bytes, limit) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                out.push_str(&format!("--- {path} ---\n{}\n", text.trim_end()));
            }
            Ok(_) => {}
            Err(err) => debug!(path, error = %err, "Skipping excerpt"),
        }
    }
    out
}

pub struct Enricher<'a> {
    service: &'a SharedService,
    llm: &'a LlmConfig,
    max_content_bytes: u64,
}

impl<'a> Enricher<'a> {
    pub fn new(service: &'a SharedService, llm: &'a LlmConfig, max_content_bytes: u64) -> Self {
        Self {
            service,
            llm,
            max_content_bytes,
        }
    }

    /// Ask the service to fill gaps and merge the answer into `report`
    pub async fn enrich(&self, snapshot: &RepositorySnapshot, report: &mut AnalysisReport) -> Result<()> {
        let context = format!(
            "{}\nComponents: {}\n\nFile tree:\n{}\nExcerpts:\n{}",
            report.facts_text(),
            report.components.keys().cloned().collect::<Vec<_>>().join(", "),
            report.directory_tree,
            build_excerpt(snapshot, report, self.max_content_bytes),
        );
        let request = CompletionRequest::new(INSTRUCTIONS, context, self.llm);
        debug!(bytes = request.size(), "Enrichment request");

        let completion = self.service.complete(&request).await?;
        let response: EnrichmentResponse = parse_json(&completion.text, self.service.name())?;

        merge(report, snapshot, response);
        report.enriched = true;
        report.enrichment_usage = Some(completion.usage);
        info!(
            frameworks = report.frameworks.len(),
            entry_points = report.entry_points.len(),
            "Analysis enriched"
        );
        Ok(())
    }
}

fn merge(report: &mut AnalysisReport, snapshot: &RepositorySnapshot, response: EnrichmentResponse) {
    if let Some(summary) = response.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        report.summary = Some(summary);
    }

    for framework in response.frameworks {
        let name = framework.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        if let Some(category) = category_of(&name) {
            report
                .framework_categories
                .entry(category)
                .or_default()
                .insert(name.clone());
        }
        report.frameworks.insert(name);
    }

    let mut added = false;
    for path in response.entry_points {
        let path = path.trim().trim_start_matches("./");
        let known = report.entry_points.iter().any(|e| e.path == path);
        if !known && snapshot.contains(path) {
            report.entry_points.push(EntryPoint {
                path: path.to_string(),
                reason: EntryPointReason::Inferred,
            });
            added = true;
        } else if !known {
            debug!(path, "Dropping inferred entry point absent from snapshot");
        }
    }
    if added {
        sort_entry_points(&mut report.entry_points);
    }

    for (name, purpose) in response.component_purposes {
        let purpose = purpose.trim();
        if let Some(info) = report.components.get_mut(&name)
            && !purpose.is_empty()
        {
            info.purpose = purpose.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::{ComponentInfo, FrameworkCategory};
    use crate::analyzer::scanner::{FileRecord, Language};
    use std::path::{Path, PathBuf};

    fn snapshot(paths: &[&str]) -> RepositorySnapshot {
        let files = paths
            .iter()
            .map(|p| {
                let language_guess = Language::from_path(p);
                FileRecord {
                    path: p.to_string(),
                    size: 1,
                    language_guess,
                    role_tag: RoleTag::classify(Path::new(p), language_guess),
                }
            })
            .collect();
        RepositorySnapshot::new(PathBuf::from("/r"), files, vec![])
    }

    #[test]
    fn test_merge_keeps_refs_inside_snapshot() {
        let snap = snapshot(&["src/app.py", "src/worker.py"]);
        let mut report = AnalysisReport::default();
        report.components.insert("src".into(), ComponentInfo::default());

        merge(
            &mut report,
            &snap,
            EnrichmentResponse {
                summary: Some("  A queue worker.  ".into()),
                frameworks: vec!["Celery".into(), " ".into()],
                entry_points: vec!["./src/worker.py".into(), "src/ghost.py".into()],
                component_purposes: [
                    ("src".to_string(), "Workers".to_string()),
                    ("ghost".to_string(), "Nope".to_string()),
                ]
                .into_iter()
                .collect(),
            },
        );

        assert_eq!(report.summary.as_deref(), Some("A queue worker."));
        assert!(report.frameworks.contains("celery"));
        assert_eq!(report.frameworks.len(), 1);
        assert_eq!(report.entry_points.len(), 1);
        assert_eq!(report.entry_points[0].path, "src/worker.py");
        assert_eq!(report.entry_points[0].reason, EntryPointReason::Inferred);
        assert_eq!(report.components["src"].purpose, "Workers");
        assert!(!report.components.contains_key("ghost"));
        assert!(report.dangling_refs(&snap).is_empty());
    }

    #[test]
    fn test_enriched_frameworks_reach_facts_text() {
        let snap = snapshot(&["app.py"]);
        let mut report = AnalysisReport::default();

        merge(
            &mut report,
            &snap,
            EnrichmentResponse {
                frameworks: vec!["Flask".into(), "click".into()],
                ..Default::default()
            },
        );

        assert!(report.framework_categories[&FrameworkCategory::Backend].contains("flask"));
        let facts = report.facts_text();
        assert!(facts.contains("Frameworks (backend): flask"), "{facts}");
        assert!(facts.contains("Frameworks (other): click"), "{facts}");
    }

    #[test]
    fn test_needs_enrichment() {
        let mut report = AnalysisReport::default();
        assert!(!needs_enrichment(&report));

        report.languages.insert(Language::Python);
        assert!(needs_enrichment(&report));

        report.entry_points.push(EntryPoint {
            path: "main.py".into(),
            reason: EntryPointReason::NamingConvention,
        });
        report.frameworks.insert("flask".into());
        report.components.insert("src".into(), ComponentInfo::default());
        assert!(!needs_enrichment(&report));

        report.components.insert("billing".into(), ComponentInfo::default());
        assert!(needs_enrichment(&report));
    }

    #[test]
    fn test_excerpt_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..20 {
            let rel = format!("src/m{i:02}.py");
            std::fs::create_dir_all(dir.path().join("src")).unwrap();
            std::fs::write(dir.path().join(&rel), "x = 1\n".repeat(1000)).unwrap();
            paths.push(rel);
        }
        let files = paths
            .iter()
            .map(|p| FileRecord {
                path: p.clone(),
                size: 6000,
                language_guess: Language::Python,
                role_tag: RoleTag::Source,
            })
            .collect();
        let snap = RepositorySnapshot::new(dir.path().to_path_buf(), files, vec![]);

        let excerpt = build_excerpt(&snap, &AnalysisReport::default(), 1 << 20);
        assert!(excerpt.len() <= ENRICHMENT_EXCERPT_BYTES + 64 * 20);
        assert!(excerpt.starts_with("--- src/m00.py ---"));
    }
}
