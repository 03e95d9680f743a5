//! CLI Commands
//!
//! `scan`, `analyze`, `docs`, `metrics` and `config`. Each returns the
//! process exit code; errors of the taxonomy map to codes in `main`.

pub mod analyze;
pub mod config;
pub mod docs;
pub mod metrics;
pub mod scan;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analyzer::{RepositoryScanner, RepositorySnapshot, Scanner};
use crate::config::Config;
use crate::types::{DocpilotError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print `value` in a structured format; false for `Text`
    pub fn print_structured<T: Serialize>(&self, value: &T) -> Result<bool> {
        match self {
            Self::Text => Ok(false),
            Self::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
                Ok(true)
            }
            Self::Yaml => {
                print!("{}", serde_yaml::to_string(value)?);
                Ok(true)
            }
        }
    }
}

/// Arguments shared by every repository command
#[derive(Debug, Clone, Default)]
pub struct RepoOptions {
    pub repo: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Extra excluded directory names (from `--exclude a,b`)
    pub exclude: Vec<String>,
}

impl RepoOptions {
    pub fn output_dir(&self, config: &Config) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| config.output.output_dir.clone())
    }

    /// Configured exclusions plus `--exclude`
    pub fn excluded_dirs(&self, config: &Config) -> Vec<String> {
        let mut excluded = config.scan.excluded_dirs.clone();
        excluded.extend(
            self.exclude
                .iter()
                .map(|s| s.trim().trim_matches('/').to_string())
                .filter(|s| !s.is_empty()),
        );
        excluded.sort();
        excluded.dedup();
        excluded
    }

    /// Fail early with `NotFound` instead of deep inside the scan
    pub fn ensure_repo(&self) -> Result<()> {
        if self.repo.is_dir() {
            Ok(())
        } else {
            Err(DocpilotError::NotFound {
                path: self.repo.clone(),
            })
        }
    }

    /// Scanner that never reads back what this tool wrote: the output
    /// directory is skipped when it lies inside the repository
    pub fn scanner(&self, config: &Config) -> Arc<dyn Scanner> {
        Arc::new(RepositoryScanner::from_config(&config.scan).skip_path(self.output_dir(config)))
    }
}

/// Language counts, largest first
pub(crate) fn language_breakdown(snapshot: &RepositorySnapshot) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = snapshot
        .by_language
        .iter()
        .map(|(lang, count)| (lang.clone(), *count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_excluded_dirs_merge() {
        let repo = TempDir::new().unwrap();
        let options = RepoOptions {
            repo: repo.path().to_path_buf(),
            output_dir: Some(repo.path().join("site/docs")),
            exclude: vec![" vendor ".into(), "fixtures/".into(), "".into()],
        };
        let excluded = options.excluded_dirs(&Config::default());
        assert!(excluded.contains(&"vendor".to_string()));
        assert!(excluded.contains(&"fixtures".to_string()));
        assert!(excluded.contains(&".git".to_string()));
        assert!(!excluded.contains(&String::new()));
        // the output directory is skipped by location, never by name
        assert!(!excluded.contains(&"site".to_string()));
        assert!(!excluded.contains(&"docs".to_string()));
    }

    #[test]
    fn test_scanner_skips_only_the_output_directory() {
        let repo = TempDir::new().unwrap();
        for rel in ["src/main.rs", "src/docs/generator.rs", "docs/README.md"] {
            let path = repo.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "x").unwrap();
        }
        let options = RepoOptions {
            repo: repo.path().to_path_buf(),
            output_dir: Some(repo.path().join("docs")),
            exclude: Vec::new(),
        };
        let config = Config::default();

        let snapshot = options
            .scanner(&config)
            .scan(&options.repo, &options.excluded_dirs(&config))
            .unwrap();
        let paths: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/docs/generator.rs", "src/main.rs"]);
    }

    #[test]
    fn test_ensure_repo() {
        let options = RepoOptions {
            repo: PathBuf::from("/no/such/repo"),
            ..RepoOptions::default()
        };
        assert!(matches!(options.ensure_repo(), Err(DocpilotError::NotFound { .. })));
    }
}
