//! File references mentioned in a document.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::analyzer::Language;

static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex literal"));

static LINK_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\(([^)\s]+)\)").expect("valid regex literal"));

/// Extensions worth checking that are not source languages
const PLAIN_EXTENSIONS: &[&str] = &["txt", "lock", "cfg", "env", "csv", "rst", "example"];

/// A path-like token and the line it appears on (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub path: String,
    pub line: usize,
}

/// Path-like inline code spans and relative link targets, outside fenced
/// blocks, deduplicated in order of first appearance
pub fn extract(text: &str) -> Vec<Reference> {
    let mut seen = BTreeSet::new();
    let mut found = Vec::new();
    let mut in_fence = false;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let spans = INLINE_CODE.captures_iter(line).map(|c| c[1].to_string());
        let links = LINK_TARGET.captures_iter(line).map(|c| c[1].to_string());
        for candidate in spans.chain(links) {
            if let Some(path) = normalize(&candidate)
                && seen.insert(path.clone())
            {
                found.push(Reference {
                    path,
                    line: idx + 1,
                });
            }
        }
    }
    found
}

fn normalize(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty()
        || token.contains(char::is_whitespace)
        || token.contains("://")
        || token.starts_with(['/', '#', '-', '~', '$', '@'])
        || token.contains(['(', ')', '=', '{', '}', '<', '>', '*', '"', '\'', ','])
        || token.starts_with("mailto:")
    {
        return None;
    }

    let token = token.split('#').next().unwrap_or(token);
    let token = token.trim_start_matches("./");
    // `src/app.py:42` points at a line
    let token = match token.rsplit_once(':') {
        Some((path, line)) if line.chars().all(|c| c.is_ascii_digit()) => path,
        _ => token,
    };
    if token.is_empty() || token.contains(':') || token.starts_with("..") {
        return None;
    }

    if token.contains('/') || has_file_extension(token) {
        Some(token.to_string())
    } else {
        None
    }
}

fn has_file_extension(token: &str) -> bool {
    let Some((stem, ext)) = token.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    Language::from_extension(ext).is_known() || PLAIN_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(text: &str) -> Vec<String> {
        extract(text).into_iter().map(|r| r.path).collect()
    }

    #[test]
    fn test_extracts_inline_paths_and_links() {
        let text = "Run `src/main.py` or see [util](./src/util.py).\nConfig lives in `settings.toml`.\n";
        assert_eq!(paths(text), vec!["src/main.py", "src/util.py", "settings.toml"]);
        assert_eq!(extract(text)[2].line, 2);
    }

    #[test]
    fn test_ignores_non_paths() {
        let text = "Use `pip install demo`, call `greet()`, set `DEBUG=1`, visit [site](https://x.io), \
                    hit `/users/{id}`, read `os.path`, pass `--verbose`.";
        assert!(paths(text).is_empty());
    }

    #[test]
    fn test_ignores_fenced_blocks_and_dedups() {
        let text = "`app/models.py`\n```\n`hidden/file.py`\n```\nAgain `app/models.py:12`\n";
        assert_eq!(paths(text), vec!["app/models.py"]);
    }

    #[test]
    fn test_directory_references() {
        assert_eq!(paths("The `src/` directory."), vec!["src/"]);
    }
}
