//! JSON extraction from free-form model output.
//!
//! Models wrap JSON in code fences, leave trailing commas, or surround it
//! with prose. [`parse_json`] undoes those in order and deserializes into
//! the caller's type.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{ErrorCategory, Result, ServiceError};

/// Parse `raw` into `T`, repairing common formatting problems
pub fn parse_json<T: DeserializeOwned>(raw: &str, provider: &str) -> Result<T> {
    let cleaned = strip_code_fences(raw.trim().trim_start_matches('\u{feff}'));

    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Ok(value);
    }
    debug!("Direct JSON parse failed, attempting repair");

    let candidates = [
        Some(fix_trailing_commas(&cleaned)),
        extract_embedded(&cleaned),
        extract_embedded(&cleaned).map(|s| fix_trailing_commas(&s)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<T>(&candidate) {
            return Ok(value);
        }
    }

    let preview: String = cleaned.chars().take(120).collect();
    Err(ServiceError::with_provider(
        ErrorCategory::ParseError,
        format!("response is not the expected JSON: {preview}"),
        provider,
    )
    .into())
}

fn strip_code_fences(s: &str) -> String {
    let mut result = s;
    if result.starts_with("```")
        && let Some(first_newline) = result.find('\n')
    {
        result = &result[first_newline + 1..];
    }
    if let Some(stripped) = result.trim_end().strip_suffix("```") {
        result = stripped;
    }
    result.trim().to_string()
}

/// Drop commas directly before `]` or `}` outside strings
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if escape {
            escape = false;
            result.push(ch);
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    continue;
                }
            }
            _ => {}
        }
        result.push(ch);
    }
    result
}

/// First balanced `{...}` or `[...]` in mixed text
fn extract_embedded(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
