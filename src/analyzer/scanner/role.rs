use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::Language;

/// What a file is for, as far as its path tells
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTag {
    Source,
    Test,
    Docs,
    Config,
    Manifest,
    Build,
    Asset,
    Other,
}

/// Package manifests recognised by exact file name
pub const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "Pipfile",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "composer.json",
    "Gemfile",
];

const BUILD_FILES: &[&str] = &[
    "Makefile",
    "GNUmakefile",
    "CMakeLists.txt",
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    "Jenkinsfile",
    "justfile",
    "build.rs",
    "webpack.config.js",
    "vite.config.ts",
    "vite.config.js",
    "rollup.config.js",
];

const DOC_STEMS: &[&str] = &["readme", "changelog", "license", "contributing", "authors", "notice"];

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "testing"];

const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "woff", "woff2", "ttf", "otf",
    "eot", "pdf", "zip", "gz", "tar", "mp3", "mp4", "wav", "webm", "bin", "wasm",
];

impl RoleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Config => "config",
            Self::Manifest => "manifest",
            Self::Build => "build",
            Self::Asset => "asset",
            Self::Other => "other",
        }
    }

    /// Classify a root-relative path. First matching rule wins:
    /// manifest, build, test source, source, docs, config, asset.
    pub fn classify(relative: &Path, language: Language) -> Self {
        let file_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let lower_name = file_name.to_lowercase();
        let extension = relative
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if MANIFEST_FILES.contains(&file_name)
            || lower_name.ends_with(".gemspec")
            || lower_name.ends_with(".csproj")
        {
            return Self::Manifest;
        }

        if BUILD_FILES.contains(&file_name)
            || language == Language::Makefile
            || language == Language::Dockerfile
            || is_ci_workflow(relative)
        {
            return Self::Build;
        }

        if language.is_programming() {
            return if is_test_path(relative, &lower_name) {
                Self::Test
            } else {
                Self::Source
            };
        }

        let stem = lower_name.split('.').next().unwrap_or_default();
        if language == Language::Markdown || DOC_STEMS.contains(&stem)
            || (in_dir(relative, "docs") && extension == "txt")
        {
            return Self::Docs;
        }

        if matches!(
            language,
            Language::Yaml | Language::Json | Language::Toml | Language::Ini | Language::Xml
        ) || file_name.starts_with('.')
        {
            return Self::Config;
        }

        if ASSET_EXTENSIONS.contains(&extension.as_str()) {
            return Self::Asset;
        }

        Self::Other
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn in_dir(relative: &Path, dir: &str) -> bool {
    relative
        .parent()
        .is_some_and(|p| p.components().any(|c| c.as_os_str() == dir))
}

fn is_ci_workflow(relative: &Path) -> bool {
    relative.starts_with(".github/workflows") || relative.starts_with(".gitlab-ci.yml")
}

fn is_test_path(relative: &Path, lower_name: &str) -> bool {
    TEST_DIRS.iter().any(|dir| in_dir(relative, dir))
        || lower_name.starts_with("test_")
        || lower_name.contains("_test.")
        || lower_name.contains(".test.")
        || lower_name.contains(".spec.")
        || lower_name == "conftest.py"
}
