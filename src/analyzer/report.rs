//! Analysis report types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::scanner::{Language, RepositorySnapshot};
use crate::ai::TokenUsage;

/// Structured facts about a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub project_name: String,
    /// Programming languages present (data and markup formats excluded)
    pub languages: BTreeSet<Language>,
    pub primary_language: Option<Language>,
    pub frameworks: BTreeSet<String>,
    pub framework_categories: BTreeMap<FrameworkCategory, BTreeSet<String>>,
    pub dependencies: Vec<Dependency>,
    pub entry_points: Vec<EntryPoint>,
    pub components: BTreeMap<String, ComponentInfo>,
    /// Files that look like HTTP routes, controllers or handlers
    pub api_files: Vec<String>,
    pub manifests: Vec<String>,
    pub directory_tree: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub enriched: bool,
    /// One-paragraph description, only set by enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub path: String,
    pub reason: EntryPointReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointReason {
    /// Named `main.py`, `index.js`, `main.rs` and similar
    NamingConvention,
    /// Declared by a manifest (`main`, `bin`, `[[bin]]`)
    Manifest,
    /// `if __name__ == "__main__"`, `func main()` in `package main`
    MainGuard,
    /// Proposed by enrichment and present in the snapshot
    Inferred,
}

impl fmt::Display for EntryPointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NamingConvention => "naming convention",
            Self::Manifest => "manifest",
            Self::MainGuard => "main guard",
            Self::Inferred => "inferred",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub purpose: String,
    /// Public names (functions, classes, exports), capped
    pub public_surface: Vec<String>,
    pub file_refs: Vec<String>,
    /// Other components this one imports
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub dev: bool,
    /// Manifest the dependency was read from
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Cargo,
    Go,
    Maven,
    Composer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkCategory {
    Frontend,
    Backend,
    Database,
    Testing,
    Tooling,
}

impl FrameworkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Database => "database",
            Self::Testing => "testing",
            Self::Tooling => "tooling",
        }
    }
}

impl AnalysisReport {
    pub fn entry_paths(&self) -> impl Iterator<Item = &str> {
        self.entry_points.iter().map(|e| e.path.as_str())
    }

    /// Every path the report refers to, deduplicated and sorted
    pub fn referenced_paths(&self) -> BTreeSet<&str> {
        self.entry_paths()
            .chain(self.components.values().flat_map(|c| c.file_refs.iter().map(String::as_str)))
            .chain(self.api_files.iter().map(String::as_str))
            .chain(self.manifests.iter().map(String::as_str))
            .collect()
    }

    /// References that are not files of `snapshot`
    pub fn dangling_refs<'a>(&'a self, snapshot: &RepositorySnapshot) -> Vec<&'a str> {
        self.referenced_paths()
            .into_iter()
            .filter(|p| !snapshot.contains(p))
            .collect()
    }

    pub fn has_frameworks(&self) -> bool {
        !self.frameworks.is_empty()
    }

    /// Whether `name` is a known component, file, or directory prefix of one
    pub fn knows_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./").trim_end_matches('/');
        if path.is_empty() {
            return false;
        }
        let dir_prefix = format!("{path}/");
        self.referenced_paths()
            .into_iter()
            .any(|p| p == path || p.starts_with(&dir_prefix) || p.ends_with(&format!("/{path}")))
            || self.components.contains_key(path)
    }

    /// Compact plain-text rendering used as generation context
    pub fn facts_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Project: {}\n", self.project_name));
        if let Some(summary) = &self.summary {
            out.push_str(&format!("Summary: {summary}\n"));
        }
        out.push_str(&format!(
            "Languages: {}\n",
            join_or_none(self.languages.iter().map(|l| l.display_name()))
        ));
        for (category, names) in &self.framework_categories {
            out.push_str(&format!(
                "Frameworks ({}): {}\n",
                category.as_str(),
                join_or_none(names.iter().map(String::as_str))
            ));
        }
        let mut other = self
            .frameworks
            .iter()
            .filter(|name| !self.framework_categories.values().any(|set| set.contains(*name)))
            .peekable();
        if other.peek().is_some() {
            out.push_str(&format!(
                "Frameworks (other): {}\n",
                join_or_none(other.map(String::as_str))
            ));
        }
        out.push_str(&format!(
            "Entry points: {}\n",
            join_or_none(self.entry_paths())
        ));
        if !self.dependencies.is_empty() {
            let runtime = self
                .dependencies
                .iter()
                .filter(|d| !d.dev)
                .map(|d| d.name.as_str());
            out.push_str(&format!("Dependencies: {}\n", join_or_none(runtime)));
        }
        out.push_str(&format!("Files: {} ({} bytes)\n", self.file_count, self.total_bytes));
        out
    }
}

fn join_or_none<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none detected".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AnalysisReport {
        let mut components = BTreeMap::new();
        components.insert(
            "src".to_string(),
            ComponentInfo {
                purpose: "Application source".into(),
                public_surface: vec!["main".into()],
                file_refs: vec!["src/main.py".into(), "src/util.py".into()],
                depends_on: BTreeSet::new(),
            },
        );
        AnalysisReport {
            project_name: "demo".into(),
            languages: [Language::Python].into_iter().collect(),
            entry_points: vec![EntryPoint {
                path: "src/main.py".into(),
                reason: EntryPointReason::NamingConvention,
            }],
            components,
            ..AnalysisReport::default()
        }
    }

    #[test]
    fn test_referenced_paths_dedup() {
        let report = report();
        let refs: Vec<_> = report.referenced_paths().into_iter().collect();
        assert_eq!(refs, vec!["src/main.py", "src/util.py"]);
    }

    #[test]
    fn test_knows_path() {
        let report = report();
        assert!(report.knows_path("src/main.py"));
        assert!(report.knows_path("./src/util.py"));
        assert!(report.knows_path("src/"));
        assert!(report.knows_path("util.py"));
        assert!(!report.knows_path("lib/missing.py"));
        assert!(!report.knows_path(""));
    }

    #[test]
    fn test_facts_text() {
        let text = report().facts_text();
        assert!(text.contains("Project: demo"));
        assert!(text.contains("Languages: Python"));
        assert!(text.contains("Entry points: src/main.py"));
    }

    #[test]
    fn test_category_map_serializes() {
        let mut report = report();
        report
            .framework_categories
            .entry(FrameworkCategory::Backend)
            .or_default()
            .insert("flask".into());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""backend":["flask"]"#));
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
