//! Document Quality Checking
//!
//! Deterministic, local scoring of a generated document against the
//! analysis report:
//! - Required and recommended sections per document kind
//! - Cross-references to files and components the report knows about
//! - Length against a per-kind minimum
//! - Basic Markdown hygiene (title, balanced fences, placeholders)
//!
//! Identical inputs always produce an identical verdict.

pub mod references;
pub mod sections;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::analyzer::AnalysisReport;
use crate::config::{MinWords, QualityConfig};
use crate::constants::quality::{DEFAULT_PASS_THRESHOLD, weights};
use crate::types::{DocKind, DocpilotError, Result};

/// Scores a document of `kind` against `report`
pub trait Checker: Send + Sync {
    fn check(&self, text: &str, kind: DocKind, report: &AnalysisReport) -> Result<QualityVerdict>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks acceptance regardless of score
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    /// Where the issue is, e.g. `line:12` or `section:Usage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            locator: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            locator: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            locator: None,
        }
    }

    pub fn at(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Some(locator) => write!(f, "[{}] {} ({})", self.severity, self.message, locator),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passed: bool,
    /// 0.0 to 1.0
    pub score: f32,
    pub issues: Vec<Issue>,
}

impl QualityVerdict {
    /// Verdict for a draft the checker could not evaluate
    pub fn unusable(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            issues: vec![Issue::error(reason)],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Issues worth acting on in a revision (errors and warnings)
    pub fn actionable(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity != Severity::Info)
    }
}

/// Section, reference, length and formatting checks with a weighted score
#[derive(Debug, Clone)]
pub struct QualityChecker {
    pass_threshold: f32,
    min_words: MinWords,
}

impl Default for QualityChecker {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            min_words: MinWords::default(),
        }
    }
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)lorem ipsum|\[insert|\btodo:|\btbd\b|<your-|\bxxx\b").expect("valid regex literal")
});

impl QualityChecker {
    pub fn new(pass_threshold: f32, min_words: MinWords) -> Self {
        Self {
            pass_threshold,
            min_words,
        }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(config.pass_threshold, config.min_words.clone())
    }

    fn min_words_for(&self, kind: DocKind) -> usize {
        match kind {
            DocKind::Readme => self.min_words.readme,
            DocKind::Api => self.min_words.api,
            DocKind::Component => self.min_words.component,
        }
    }

    fn check_sections(&self, text: &str, kind: DocKind, issues: &mut Vec<Issue>) -> f32 {
        let headings = sections::headings(text);
        let rules = sections::rules_for(kind);

        let mut earned = 0.0;
        let mut possible = 0.0;
        for rule in rules {
            let weight = if rule.required { 1.0 } else { 0.5 };
            possible += weight;
            if rule.satisfied_by(&headings) {
                earned += weight;
            } else if rule.required {
                issues.push(
                    Issue::error(format!("missing required section '{}'", rule.name))
                        .at(format!("section:{}", rule.name)),
                );
            } else {
                issues.push(
                    Issue::warning(format!("consider adding a '{}' section", rule.name))
                        .at(format!("section:{}", rule.name)),
                );
            }
        }
        if possible > 0.0 { earned / possible } else { 1.0 }
    }

    fn check_references(&self, text: &str, report: &AnalysisReport, issues: &mut Vec<Issue>) -> f32 {
        let refs = references::extract(text);
        if refs.is_empty() {
            if !report.referenced_paths().is_empty() {
                issues.push(Issue::info("document does not mention any repository file"));
            }
            return 1.0;
        }
        let mut known = 0usize;
        for reference in &refs {
            if report.knows_path(&reference.path) {
                known += 1;
            } else {
                issues.push(
                    Issue::warning(format!(
                        "references '{}' which is not part of the analyzed repository",
                        reference.path
                    ))
                    .at(format!("line:{}", reference.line)),
                );
            }
        }
        known as f32 / refs.len() as f32
    }

    fn check_length(&self, text: &str, kind: DocKind, issues: &mut Vec<Issue>) -> f32 {
        let words = text.split_whitespace().count();
        let minimum = self.min_words_for(kind);
        if minimum == 0 || words >= minimum {
            return 1.0;
        }
        let message = format!("document has {words} words, expected at least {minimum}");
        if words * 4 < minimum {
            issues.push(Issue::error(message));
        } else {
            issues.push(Issue::warning(message));
        }
        words as f32 / minimum as f32
    }

    fn check_formatting(&self, text: &str, issues: &mut Vec<Issue>) -> f32 {
        let mut passed = 0u8;

        match text.lines().find(|l| !l.trim().is_empty()) {
            Some(first) if first.trim_start().starts_with("# ") => passed += 1,
            _ => issues.push(Issue::warning("document should open with a '# ' title").at("line:1")),
        }

        let fences = text
            .lines()
            .filter(|l| l.trim_start().starts_with("```"))
            .count();
        if fences % 2 == 0 {
            passed += 1;
        } else {
            issues.push(Issue::warning("unbalanced code fence"));
        }

        match text.lines().position(|l| PLACEHOLDER.is_match(l)) {
            None => passed += 1,
            Some(idx) => issues.push(
                Issue::warning("placeholder text left in document").at(format!("line:{}", idx + 1)),
            ),
        }

        passed as f32 / 3.0
    }
}

impl Checker for QualityChecker {
    fn check(&self, text: &str, kind: DocKind, report: &AnalysisReport) -> Result<QualityVerdict> {
        if text.trim().is_empty() {
            return Err(DocpilotError::Validation("document text is empty".to_string()));
        }
        if text.contains('\0') {
            return Err(DocpilotError::Validation(
                "document text contains NUL bytes".to_string(),
            ));
        }

        let mut issues = Vec::new();
        let sections = self.check_sections(text, kind, &mut issues);
        let references = self.check_references(text, report, &mut issues);
        let length = self.check_length(text, kind, &mut issues);
        let formatting = self.check_formatting(text, &mut issues);

        let raw = sections * weights::SECTIONS
            + references * weights::REFERENCES
            + length * weights::LENGTH
            + formatting * weights::FORMATTING;
        let score = ((raw * 1000.0).round() / 1000.0).clamp(0.0, 1.0);

        let blocked = issues.iter().any(|i| i.severity == Severity::Error);
        Ok(QualityVerdict {
            passed: !blocked && score >= self.pass_threshold,
            score,
            issues,
        })
    }
}
