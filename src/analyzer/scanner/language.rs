//! Language Detection
//!
//! Single table mapping languages to tags, extensions and interpreters.
//! Detection is best-effort: extension first, well-known file names second,
//! shebang line last.
//!
//! ```rust,ignore
//! use docpilot::analyzer::scanner::Language;
//!
//! assert_eq!(Language::from_path("src/main.py"), Language::Python);
//! assert_eq!(Language::from_shebang("#!/usr/bin/env node"), Language::JavaScript);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Language Metadata Table
// =============================================================================

struct LanguageMeta {
    /// Human-readable name
    display_name: &'static str,
    /// File extensions (lowercase, no dot)
    extensions: &'static [&'static str],
    /// Interpreter names recognised on a `#!` line
    interpreters: &'static [&'static str],
    /// Counts toward the report's language set
    programming: bool,
}

macro_rules! lang_meta {
    ($display:literal, [$($ext:literal),*], [$($interp:literal),*], $prog:literal) => {
        LanguageMeta {
            display_name: $display,
            extensions: &[$($ext),*],
            interpreters: &[$($interp),*],
            programming: $prog,
        }
    };
}

impl Language {
    fn meta(&self) -> LanguageMeta {
        match self {
            Language::Rust => lang_meta!("Rust", ["rs"], [], true),
            Language::Go => lang_meta!("Go", ["go"], [], true),
            Language::C => lang_meta!("C", ["c", "h"], [], true),
            Language::Cpp => lang_meta!("C++", ["cpp", "cc", "cxx", "hpp", "hh", "hxx"], [], true),
            Language::Java => lang_meta!("Java", ["java"], [], true),
            Language::Kotlin => lang_meta!("Kotlin", ["kt", "kts"], [], true),
            Language::Scala => lang_meta!("Scala", ["scala", "sc"], [], true),
            Language::CSharp => lang_meta!("C#", ["cs"], [], true),
            Language::Swift => lang_meta!("Swift", ["swift"], [], true),
            Language::Dart => lang_meta!("Dart", ["dart"], [], true),

            Language::TypeScript => lang_meta!("TypeScript", ["ts", "mts", "cts", "tsx"], ["ts-node", "deno"], true),
            Language::JavaScript => lang_meta!("JavaScript", ["js", "mjs", "cjs", "jsx"], ["node", "nodejs"], true),
            Language::Vue => lang_meta!("Vue", ["vue"], [], true),
            Language::Svelte => lang_meta!("Svelte", ["svelte"], [], true),
            Language::Html => lang_meta!("HTML", ["html", "htm"], [], false),
            Language::Css => lang_meta!("CSS", ["css", "scss", "sass", "less"], [], false),

            Language::Python => lang_meta!("Python", ["py", "pyi", "pyw"], ["python", "python3", "python2", "pypy"], true),
            Language::Ruby => lang_meta!("Ruby", ["rb", "rake", "gemspec"], ["ruby"], true),
            Language::Php => lang_meta!("PHP", ["php"], ["php"], true),
            Language::Perl => lang_meta!("Perl", ["pl", "pm"], ["perl"], true),
            Language::Lua => lang_meta!("Lua", ["lua"], ["lua"], true),
            Language::R => lang_meta!("R", ["r"], ["rscript"], true),
            Language::Elixir => lang_meta!("Elixir", ["ex", "exs"], ["elixir"], true),
            Language::Haskell => lang_meta!("Haskell", ["hs"], ["runghc", "runhaskell"], true),
            Language::Shell => lang_meta!("Shell", ["sh", "bash", "zsh", "fish"], ["sh", "bash", "zsh", "dash", "fish"], true),
            Language::PowerShell => lang_meta!("PowerShell", ["ps1", "psm1"], ["pwsh"], true),
            Language::Sql => lang_meta!("SQL", ["sql"], [], true),

            Language::Yaml => lang_meta!("YAML", ["yaml", "yml"], [], false),
            Language::Json => lang_meta!("JSON", ["json", "jsonc"], [], false),
            Language::Toml => lang_meta!("TOML", ["toml"], [], false),
            Language::Xml => lang_meta!("XML", ["xml", "xsd"], [], false),
            Language::Ini => lang_meta!("INI", ["ini", "cfg", "conf"], [], false),
            Language::Markdown => lang_meta!("Markdown", ["md", "markdown", "rst", "adoc"], [], false),
            Language::Proto => lang_meta!("Protocol Buffers", ["proto"], [], false),
            Language::GraphQL => lang_meta!("GraphQL", ["graphql", "gql"], [], false),
            Language::Makefile => lang_meta!("Makefile", ["mk"], ["make"], false),
            Language::Dockerfile => lang_meta!("Dockerfile", [], [], false),

            Language::Unknown => lang_meta!("Unknown", [], [], false),
        }
    }
}

// =============================================================================
// Language Enum
// =============================================================================

/// Best-effort language guess for one file.
///
/// Serialized as a lowercase tag (`python`, `typescript`, `cpp`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Go,
    C,
    Cpp,
    Java,
    Kotlin,
    Scala,
    CSharp,
    Swift,
    Dart,

    TypeScript,
    JavaScript,
    Vue,
    Svelte,
    Html,
    Css,

    Python,
    Ruby,
    Php,
    Perl,
    Lua,
    R,
    Elixir,
    Haskell,
    Shell,
    PowerShell,
    Sql,

    Yaml,
    Json,
    Toml,
    Xml,
    Ini,
    Markdown,
    Proto,
    GraphQL,
    Makefile,
    Dockerfile,

    #[default]
    Unknown,
}

const ALL: &[Language] = &[
    Language::Rust, Language::Go, Language::C, Language::Cpp, Language::Java,
    Language::Kotlin, Language::Scala, Language::CSharp, Language::Swift, Language::Dart,
    Language::TypeScript, Language::JavaScript, Language::Vue, Language::Svelte,
    Language::Html, Language::Css, Language::Python, Language::Ruby, Language::Php,
    Language::Perl, Language::Lua, Language::R, Language::Elixir, Language::Haskell,
    Language::Shell, Language::PowerShell, Language::Sql, Language::Yaml, Language::Json,
    Language::Toml, Language::Xml, Language::Ini, Language::Markdown, Language::Proto,
    Language::GraphQL, Language::Makefile, Language::Dockerfile,
];

impl Language {
    pub fn display_name(&self) -> &'static str {
        self.meta().display_name
    }

    /// Lowercase tag, identical to the serialized form
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::Dart => "dart",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Html => "html",
            Language::Css => "css",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Perl => "perl",
            Language::Lua => "lua",
            Language::R => "r",
            Language::Elixir => "elixir",
            Language::Haskell => "haskell",
            Language::Shell => "shell",
            Language::PowerShell => "powershell",
            Language::Sql => "sql",
            Language::Yaml => "yaml",
            Language::Json => "json",
            Language::Toml => "toml",
            Language::Xml => "xml",
            Language::Ini => "ini",
            Language::Markdown => "markdown",
            Language::Proto => "proto",
            Language::GraphQL => "graphql",
            Language::Makefile => "makefile",
            Language::Dockerfile => "dockerfile",
            Language::Unknown => "unknown",
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext_lower = ext.to_lowercase();
        ALL.iter()
            .copied()
            .find(|lang| lang.meta().extensions.contains(&ext_lower.as_str()))
            .unwrap_or(Language::Unknown)
    }

    /// Detect from file name and extension (no file access)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
            let lower = filename.to_lowercase();
            if lower == "makefile" || lower == "gnumakefile" {
                return Language::Makefile;
            }
            if lower == "dockerfile" || lower.starts_with("dockerfile.") {
                return Language::Dockerfile;
            }
            if matches!(lower.as_str(), "rakefile" | "gemfile") {
                return Language::Ruby;
            }
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Detect from a `#!` line such as `#!/usr/bin/env python3`
    pub fn from_shebang(first_line: &str) -> Self {
        let Some(rest) = first_line.strip_prefix("#!") else {
            return Language::Unknown;
        };

        let mut parts = rest.split_whitespace();
        let Some(program) = parts.next() else {
            return Language::Unknown;
        };
        let mut name = program.rsplit('/').next().unwrap_or(program);
        if name == "env" {
            // skip env flags such as `-S`
            name = parts.find(|p| !p.starts_with('-')).unwrap_or("");
        }
        // python3.11 -> python3
        let name = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        let name = if name.is_empty() { "" } else { name };

        ALL.iter()
            .copied()
            .find(|lang| {
                lang.meta()
                    .interpreters
                    .iter()
                    .any(|i| i.trim_end_matches(|c: char| c.is_ascii_digit()) == name)
            })
            .unwrap_or(Language::Unknown)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Language::Unknown)
    }

    /// Programming languages, as opposed to data, markup and build files
    pub fn is_programming(&self) -> bool {
        self.meta().programming
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.is_empty() || lower == "unknown" {
            return Ok(Language::Unknown);
        }
        ALL.iter()
            .copied()
            .find(|lang| lang.tag() == lower || lang.display_name().to_lowercase() == lower)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("src/main.py"), Language::Python);
        assert_eq!(Language::from_path("Makefile"), Language::Makefile);
        assert_eq!(Language::from_path("Dockerfile.prod"), Language::Dockerfile);
        assert_eq!(Language::from_path("bin/tool"), Language::Unknown);
    }

    #[test]
    fn test_from_shebang() {
        assert_eq!(Language::from_shebang("#!/usr/bin/env python3"), Language::Python);
        assert_eq!(Language::from_shebang("#!/usr/bin/python3.11"), Language::Python);
        assert_eq!(Language::from_shebang("#!/bin/bash -e"), Language::Shell);
        assert_eq!(Language::from_shebang("#!/usr/bin/env -S node --harmony"), Language::JavaScript);
        assert_eq!(Language::from_shebang("#!/usr/bin/env ruby"), Language::Ruby);
        assert_eq!(Language::from_shebang("import os"), Language::Unknown);
        assert_eq!(Language::from_shebang("#!"), Language::Unknown);
    }

    #[test]
    fn test_tag_matches_serde() {
        for lang in ALL {
            let json = serde_json::to_string(lang).unwrap();
            assert_eq!(json, format!("\"{}\"", lang.tag()));
        }
    }

    #[test]
    fn test_programming_split() {
        assert!(Language::Python.is_programming());
        assert!(!Language::Markdown.is_programming());
        assert!(!Language::Json.is_programming());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("c#".parse::<Language>(), Ok(Language::CSharp));
        assert!("klingon".parse::<Language>().is_err());
    }
}
