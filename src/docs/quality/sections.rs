use regex::Regex;
use std::sync::LazyLock;

use crate::types::DocKind;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex literal")
});

/// A section a document of some kind should have
#[derive(Debug, Clone, Copy)]
pub struct SectionRule {
    pub name: &'static str,
    /// Lowercase heading fragments that satisfy the rule
    pub aliases: &'static [&'static str],
    /// Missing required sections are errors, missing optional ones warnings
    pub required: bool,
}

const README_SECTIONS: &[SectionRule] = &[
    SectionRule {
        name: "Overview",
        aliases: &["overview", "about", "introduction", "features", "description"],
        required: false,
    },
    SectionRule {
        name: "Installation",
        aliases: &["install", "getting started", "setup", "quick start", "quickstart", "requirements"],
        required: true,
    },
    SectionRule {
        name: "Usage",
        aliases: &["usage", "example", "how to use", "running", "run"],
        required: true,
    },
    SectionRule {
        name: "Project Structure",
        aliases: &["structure", "layout", "architecture", "components"],
        required: false,
    },
    SectionRule {
        name: "License",
        aliases: &["license", "contributing"],
        required: false,
    },
];

const API_SECTIONS: &[SectionRule] = &[
    SectionRule {
        name: "Overview",
        aliases: &["overview", "introduction", "about"],
        required: true,
    },
    SectionRule {
        name: "Endpoints",
        aliases: &["endpoint", "reference", "routes", "functions", "methods", "operations", "interface"],
        required: true,
    },
    SectionRule {
        name: "Authentication",
        aliases: &["auth"],
        required: false,
    },
    SectionRule {
        name: "Examples",
        aliases: &["example", "usage"],
        required: false,
    },
    SectionRule {
        name: "Errors",
        aliases: &["error", "status codes"],
        required: false,
    },
];

const COMPONENT_SECTIONS: &[SectionRule] = &[
    SectionRule {
        name: "Purpose",
        aliases: &["purpose", "overview", "responsibilit", "about"],
        required: true,
    },
    SectionRule {
        name: "Public Interface",
        aliases: &["interface", "api", "public", "exports", "usage"],
        required: true,
    },
    SectionRule {
        name: "Dependencies",
        aliases: &["dependenc", "depends", "collaborat", "relationships"],
        required: false,
    },
];

pub fn rules_for(kind: DocKind) -> &'static [SectionRule] {
    match kind {
        DocKind::Readme => README_SECTIONS,
        DocKind::Api => API_SECTIONS,
        DocKind::Component => COMPONENT_SECTIONS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub title: String,
    /// 1-based
    pub line: usize,
}

/// Markdown ATX headings outside fenced code blocks
pub fn headings(text: &str) -> Vec<Heading> {
    let mut in_fence = false;
    let mut found = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            found.push(Heading {
                level: caps[1].len(),
                title: caps[2].to_string(),
                line: idx + 1,
            });
        }
    }
    found
}

impl SectionRule {
    pub fn satisfied_by(&self, headings: &[Heading]) -> bool {
        headings.iter().any(|h| {
            let title = h.title.to_lowercase();
            self.aliases.iter().any(|alias| title.contains(alias))
        })
    }
}
