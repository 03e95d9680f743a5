//! Config Command
//!
//! Usage:
//!   docpilot config show [--format toml|json|yaml]
//!   docpilot config path

use crate::config::{Config, ConfigLoader};
use crate::cli::ui::Output;
use crate::types::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Json,
    Yaml,
}

/// Print the effective configuration (api key never shown)
pub fn show(config: &Config, format: ConfigFormat) -> Result<u8> {
    let rendered = match format {
        ConfigFormat::Toml => ConfigLoader::render(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{}", rendered.trim_end());
    Ok(0)
}

/// Print where configuration is read from
pub fn path() -> Result<u8> {
    let out = Output::new();
    out.header("Configuration sources (lowest to highest priority)");
    match ConfigLoader::global_config_path() {
        Some(path) => out.field("Global", describe(&path)),
        None => out.field("Global", "(no config directory on this platform)"),
    }
    out.field("Project", describe(&ConfigLoader::project_config_path()));
    out.field("Environment", "DOCPILOT_<SECTION>__<KEY>");
    Ok(0)
}

fn describe(path: &std::path::Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_formats_hide_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".into());
        let json = serde_json::to_string_pretty(&config).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let toml = ConfigLoader::render(&config).unwrap();
        for rendered in [json, yaml, toml] {
            assert!(!rendered.contains("sk-secret"));
        }
    }
}
