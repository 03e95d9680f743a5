//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (<config dir>/docpilot/config.toml)
//! 3. Project config (.docpilot/config.toml)
//! 4. Environment variables (DOCPILOT_* prefix, `__` separates sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::types::{DocpilotError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_with(Self::global_config_path(), &Self::project_config_path())
    }

    /// Load configuration, with an explicit file taking the place of the project config
    pub fn load_with_file(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_with(Self::global_config_path(), path),
            None => Self::load(),
        }
    }

    fn load_with(global_path: Option<PathBuf>, project_path: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global_path
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(project_path));
        }

        // DOCPILOT_PIPELINE__MAX_REVISIONS -> pipeline.max_revisions
        figment = figment.merge(Env::prefixed("DOCPILOT_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| DocpilotError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| DocpilotError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Global config directory (platform config dir + `docpilot`)
    pub fn global_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "docpilot").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".docpilot/config.toml")
    }

    /// Render the effective configuration as TOML (api key omitted)
    pub fn render(config: &Config) -> Result<String> {
        toml::to_string_pretty(config).map_err(|e| DocpilotError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            ConfigLoader::load_with(None, &temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
model = "llama3:latest"

[pipeline]
max_revisions = 5

[scan]
strict = true
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.pipeline.max_revisions, 5);
        assert!(config.scan.strict);
        // untouched sections keep defaults
        assert_eq!(config.quality.stall_window, 2);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[quality]\npass_threshold = 1.5\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(DocpilotError::Config(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: This test is the only one touching this variable
        unsafe {
            std::env::set_var("DOCPILOT_PIPELINE__MAX_COMPONENTS", "4");
        }
        let config =
            ConfigLoader::load_with(None, &temp_dir.path().join("missing.toml")).unwrap();
        unsafe {
            std::env::remove_var("DOCPILOT_PIPELINE__MAX_COMPONENTS");
        }
        assert_eq!(config.pipeline.max_components, 4);
    }

    #[test]
    fn test_render_omits_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-hidden".to_string());
        let rendered = ConfigLoader::render(&config).unwrap();
        assert!(rendered.contains("[llm]"));
        assert!(!rendered.contains("sk-hidden"));
    }
}
