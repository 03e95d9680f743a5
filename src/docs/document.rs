use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::quality::QualityVerdict;
use super::task::DocScope;
use crate::ai::TokenUsage;
use crate::types::DocKind;

/// A rejected draft, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub revision: u32,
    pub score: f32,
    pub reasons: Vec<String>,
}

/// Final text of one document plus how it was produced.
///
/// Built once per task from the accepted draft; earlier drafts survive only
/// as entries of `rejection_trail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub kind: DocKind,
    pub target: DocScope,
    pub text: String,
    pub model: String,
    /// Tokens across every draft of this document
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub elapsed_ms: u64,
    /// Revision of the accepted draft (0 is the first draft)
    pub revision: u32,
    /// Revision budget ran out before any draft passed
    pub accepted_without_pass: bool,
    /// Consecutive drafts were byte-identical
    pub stalled: bool,
    pub verdict: QualityVerdict,
    pub rejection_trail: Vec<Rejection>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedDocument {
    /// Path relative to the output directory
    pub fn output_path(&self) -> PathBuf {
        match (&self.kind, &self.target) {
            (DocKind::Readme, _) => PathBuf::from("README.md"),
            (DocKind::Api, _) => PathBuf::from("API.md"),
            (DocKind::Component, DocScope::Component(name)) => {
                PathBuf::from("components").join(format!("{}.md", file_stem(name)))
            }
            (DocKind::Component, DocScope::Repository) => PathBuf::from("components/index.md"),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

/// Component names such as `src/api` or `Billing Service` as a safe file stem
pub fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "component".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(kind: DocKind, target: DocScope) -> GeneratedDocument {
        GeneratedDocument {
            kind,
            target,
            text: "# x".into(),
            model: "m".into(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            elapsed_ms: 0,
            revision: 0,
            accepted_without_pass: false,
            stalled: false,
            verdict: QualityVerdict {
                passed: true,
                score: 1.0,
                issues: vec![],
            },
            rejection_trail: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_output_paths() {
        assert_eq!(
            document(DocKind::Readme, DocScope::Repository).output_path(),
            PathBuf::from("README.md")
        );
        assert_eq!(
            document(DocKind::Api, DocScope::Repository).output_path(),
            PathBuf::from("API.md")
        );
        assert_eq!(
            document(DocKind::Component, DocScope::Component("app/services".into())).output_path(),
            PathBuf::from("components/app-services.md")
        );
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Billing Service"), "billing-service");
        assert_eq!(file_stem("../../etc"), "etc");
        assert_eq!(file_stem("///"), "component");
        assert_eq!(file_stem("user_auth"), "user_auth");
    }
}
