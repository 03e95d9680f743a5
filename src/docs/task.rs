//! Generation tasks: one document kind, one target, the facts it needs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyzer::{AnalysisReport, ComponentInfo};
use crate::types::DocKind;

/// What a document describes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "lowercase")]
pub enum DocScope {
    Repository,
    Component(String),
}

impl DocScope {
    pub fn label(&self) -> &str {
        match self {
            DocScope::Repository => "repository",
            DocScope::Component(name) => name,
        }
    }
}

impl fmt::Display for DocScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocScope::Repository => f.write_str("repository"),
            DocScope::Component(name) => write!(f, "component '{name}'"),
        }
    }
}

/// Request to produce one document
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub kind: DocKind,
    pub scope: DocScope,
    /// Subset of the analysis report rendered for the prompt
    pub facts: String,
    pub revision: u32,
    pub max_revisions: u32,
}

impl GenerationTask {
    pub fn readme(report: &AnalysisReport, max_revisions: u32) -> Self {
        Self::new(DocKind::Readme, DocScope::Repository, readme_facts(report), max_revisions)
    }

    pub fn api(report: &AnalysisReport, max_revisions: u32) -> Self {
        Self::new(DocKind::Api, DocScope::Repository, api_facts(report), max_revisions)
    }

    /// `None` when the report has no component called `name`
    pub fn component(report: &AnalysisReport, name: &str, max_revisions: u32) -> Option<Self> {
        let info = report.components.get(name)?;
        Some(Self::new(
            DocKind::Component,
            DocScope::Component(name.to_string()),
            component_facts(report, name, info),
            max_revisions,
        ))
    }

    fn new(kind: DocKind, scope: DocScope, facts: String, max_revisions: u32) -> Self {
        Self {
            kind,
            scope,
            facts,
            revision: 0,
            max_revisions,
        }
    }

    /// Same task, one revision further
    pub fn next_revision(&self) -> Self {
        Self {
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    pub fn is_last_revision(&self) -> bool {
        self.revision >= self.max_revisions
    }

    /// Stable label, e.g. `readme` or `component:auth`
    pub fn label(&self) -> String {
        match &self.scope {
            DocScope::Repository => self.kind.to_string(),
            DocScope::Component(name) => format!("{}:{}", self.kind, name),
        }
    }
}

fn readme_facts(report: &AnalysisReport) -> String {
    let mut out = report.facts_text();
    if !report.components.is_empty() {
        out.push_str("\nComponents:\n");
        for (name, info) in &report.components {
            out.push_str(&format!("- {name}: {}\n", purpose_or_unknown(info)));
        }
    }
    out.push_str(&format!("\nDirectory tree:\n{}", report.directory_tree));
    out
}

fn api_facts(report: &AnalysisReport) -> String {
    let mut out = report.facts_text();
    if report.api_files.is_empty() {
        out.push_str("\nNo route or controller files were detected; document the public interface of the components instead.\n");
    } else {
        out.push_str("\nAPI files:\n");
        for path in &report.api_files {
            out.push_str(&format!("- {path}\n"));
        }
    }

    let touches_api = |info: &ComponentInfo| {
        report.api_files.is_empty() || info.file_refs.iter().any(|f| report.api_files.contains(f))
    };
    for (name, info) in report.components.iter().filter(|(_, info)| touches_api(info)) {
        if info.public_surface.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "\nPublic names in {name}: {}\n",
            info.public_surface.join(", ")
        ));
    }
    out
}

fn component_facts(report: &AnalysisReport, name: &str, info: &ComponentInfo) -> String {
    let mut out = format!("Project: {}\n", report.project_name);
    if let Some(summary) = &report.summary {
        out.push_str(&format!("Project summary: {summary}\n"));
    }
    out.push_str(&format!("Component: {name}\n"));
    out.push_str(&format!("Purpose: {}\n", purpose_or_unknown(info)));
    out.push_str("Files:\n");
    for path in &info.file_refs {
        out.push_str(&format!("- {path}\n"));
    }
    if !info.public_surface.is_empty() {
        out.push_str(&format!("Public names: {}\n", info.public_surface.join(", ")));
    }
    if !info.depends_on.is_empty() {
        let deps: Vec<&str> = info.depends_on.iter().map(String::as_str).collect();
        out.push_str(&format!("Depends on components: {}\n", deps.join(", ")));
    }
    let used_by: Vec<&str> = report
        .components
        .iter()
        .filter(|(other, c)| other.as_str() != name && c.depends_on.contains(name))
        .map(|(other, _)| other.as_str())
        .collect();
    if !used_by.is_empty() {
        out.push_str(&format!("Used by components: {}\n", used_by.join(", ")));
    }
    out
}

fn purpose_or_unknown(info: &ComponentInfo) -> &str {
    if info.purpose.is_empty() {
        "purpose not determined"
    } else {
        &info.purpose
    }
}
