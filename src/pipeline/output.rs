//! Writes accepted documents and the documentation index.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::docs::GeneratedDocument;
use crate::types::{DocKind, Result};

pub const INDEX_FILE: &str = "index.md";

/// Write every document under `output_dir`, returning the written paths
pub fn write_documents(output_dir: &Path, documents: &[GeneratedDocument]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(documents.len() + 1);
    for doc in documents {
        let path = output_dir.join(doc.output_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = doc.text.clone();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        fs::write(&path, text)?;
        info!(path = %path.display(), revision = doc.revision, "Document written");
        written.push(path);
    }

    if !documents.is_empty() {
        let index = output_dir.join(INDEX_FILE);
        fs::write(&index, render_index(project_title(documents), documents))?;
        written.push(index);
    }
    Ok(written)
}

fn project_title(documents: &[GeneratedDocument]) -> &str {
    documents
        .iter()
        .find(|d| d.kind == DocKind::Readme)
        .and_then(|d| d.text.lines().next())
        .and_then(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Documentation")
}

/// Table of contents linking each document with its score
pub fn render_index(title: &str, documents: &[GeneratedDocument]) -> String {
    let mut out = format!("# {title}\n\n");
    for kind in DocKind::ALL {
        let docs: Vec<_> = documents.iter().filter(|d| d.kind == kind).collect();
        if docs.is_empty() {
            continue;
        }
        let heading = match kind {
            DocKind::Readme => "Overview",
            DocKind::Api => "API",
            DocKind::Component => "Components",
        };
        out.push_str(&format!("## {heading}\n\n"));
        for doc in docs {
            let link = doc.output_path().to_string_lossy().replace('\\', "/");
            let name = match kind {
                DocKind::Component => doc.target.label().to_string(),
                _ => link.clone(),
            };
            out.push_str(&format!("- [{name}]({link}) (score {:.2}", doc.verdict.score));
            if doc.accepted_without_pass {
                out.push_str(", below quality threshold");
            }
            out.push_str(")\n");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::TokenUsage;
    use crate::docs::{DocScope, QualityVerdict};
    use chrono::Utc;
    use tempfile::TempDir;

    fn doc(kind: DocKind, target: DocScope, text: &str, passed: bool) -> GeneratedDocument {
        GeneratedDocument {
            kind,
            target,
            text: text.to_string(),
            model: "m".into(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            elapsed_ms: 0,
            revision: 0,
            accepted_without_pass: !passed,
            stalled: false,
            verdict: QualityVerdict {
                passed,
                score: if passed { 0.9 } else { 0.4 },
                issues: Vec::new(),
            },
            rejection_trail: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_documents_and_index() {
        let out = TempDir::new().unwrap();
        let docs = vec![
            doc(DocKind::Readme, DocScope::Repository, "# Demo\n\nHello", true),
            doc(DocKind::Component, DocScope::Component("src/core".into()), "# Core", false),
        ];

        let written = write_documents(out.path(), &docs).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(
            fs::read_to_string(out.path().join("README.md")).unwrap(),
            "# Demo\n\nHello\n"
        );

        let index = fs::read_to_string(out.path().join(INDEX_FILE)).unwrap();
        assert!(index.starts_with("# Demo\n"));
        assert!(index.contains("- [README.md](README.md) (score 0.90)"));
        assert!(index.contains("(score 0.40, below quality threshold)"));
    }

    #[test]
    fn test_nothing_written_without_documents() {
        let out = TempDir::new().unwrap();
        assert!(write_documents(out.path(), &[]).unwrap().is_empty());
        assert!(!out.path().join(INDEX_FILE).exists());
    }
}
