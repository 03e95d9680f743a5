//! Document Prompts
//!
//! Instructions per document kind. The section list comes from the same
//! checklist the quality checker applies, so a draft that follows the
//! instructions can pass.

use super::quality::{QualityVerdict, sections};
use super::task::{DocScope, GenerationTask};
use crate::types::DocKind;

/// Previous draft text included in a revision request is capped
const MAX_PREVIOUS_DRAFT_CHARS: usize = 24_000;

fn role(kind: DocKind) -> &'static str {
    match kind {
        DocKind::Readme => {
            "You are a technical writer producing the README.md for a software repository."
        }
        DocKind::Api => {
            "You are a technical writer producing API reference documentation (API.md) for a software repository."
        }
        DocKind::Component => {
            "You are a technical writer documenting one component of a software repository for its maintainers."
        }
    }
}

fn section_list(kind: DocKind) -> String {
    let mut out = String::new();
    for rule in sections::rules_for(kind) {
        let marker = if rule.required { "required" } else { "recommended" };
        out.push_str(&format!("- ## {} ({marker})\n", rule.name));
    }
    out
}

fn rules(task: &GenerationTask) -> String {
    let subject = match &task.scope {
        DocScope::Repository => "the project".to_string(),
        DocScope::Component(name) => format!("the `{name}` component"),
    };
    format!(
        "Write Markdown describing {subject}. Start with a single `# ` title, then use these sections:\n{}\n\
         Rules:\n\
         - Use only the facts below; do not invent files, commands or dependencies.\n\
         - Write repository paths in backticks exactly as listed (for example `src/main.py`).\n\
         - Close every code fence.\n\
         - Output the document only, without commentary before or after it.\n",
        section_list(task.kind)
    )
}

/// Prompt for the first draft
pub fn initial(task: &GenerationTask) -> String {
    format!("{}\n\n{}", role(task.kind), rules(task))
}

/// Prompt asking for a revised draft that addresses `verdict`
pub fn revision(task: &GenerationTask, previous: &str, verdict: &QualityVerdict) -> String {
    let mut prompt = initial(task);

    prompt.push_str(&format!(
        "\n# Review of the previous draft (revision {}, score {:.2})\n\n",
        task.revision.saturating_sub(1),
        verdict.score
    ));
    for issue in verdict.actionable() {
        prompt.push_str(&format!("- {issue}\n"));
    }

    prompt.push_str("\nRewrite the document so every issue above is resolved. Keep what was correct.\n\n");
    prompt.push_str("# Previous draft\n\n");
    if previous.len() > MAX_PREVIOUS_DRAFT_CHARS {
        let mut end = MAX_PREVIOUS_DRAFT_CHARS;
        while !previous.is_char_boundary(end) {
            end -= 1;
        }
        prompt.push_str(&previous[..end]);
        prompt.push_str("\n... [truncated]\n");
    } else {
        prompt.push_str(previous);
    }
    prompt
}

/// Context sent with every draft of `task`
pub fn context(task: &GenerationTask) -> String {
    format!("# Repository facts\n\n{}", task.facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalysisReport;
    use crate::docs::quality::Issue;

    #[test]
    fn test_initial_prompt_lists_sections() {
        let task = GenerationTask::readme(&AnalysisReport::default(), 3);
        let prompt = initial(&task);
        assert!(prompt.contains("README.md"));
        assert!(prompt.contains("- ## Installation (required)"));
        assert!(prompt.contains("- ## License (recommended)"));
    }

    #[test]
    fn test_revision_prompt_folds_issues() {
        let task = GenerationTask::api(&AnalysisReport::default(), 3).next_revision();
        let verdict = QualityVerdict {
            passed: false,
            score: 0.4,
            issues: vec![
                Issue::error("missing required section 'Endpoints'").at("section:Endpoints"),
                Issue::info("document does not mention any repository file"),
            ],
        };
        let prompt = revision(&task, "# Draft\n", &verdict);
        assert!(prompt.contains("revision 0, score 0.40"));
        assert!(prompt.contains("missing required section 'Endpoints'"));
        assert!(!prompt.contains("does not mention"));
        assert!(prompt.ends_with("# Draft\n"));
    }

    #[test]
    fn test_revision_prompt_truncates_long_drafts() {
        let task = GenerationTask::readme(&AnalysisReport::default(), 3).next_revision();
        let verdict = QualityVerdict::unusable("bad");
        let previous = "é".repeat(MAX_PREVIOUS_DRAFT_CHARS);
        let prompt = revision(&task, &previous, &verdict);
        assert!(prompt.ends_with("[truncated]\n"));
    }
}
