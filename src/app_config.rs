//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blogcrawl_core::CrawlSettings;
use serde::Deserialize;

/// Name of the database file created under the download root.
const DATABASE_FILE_NAME: &str = "blogcrawl.db";

/// TOML-backed file configuration.
///
/// ```toml
/// database = "/data/blogcrawl.db"
///
/// [crawl]
/// parallel_blogs = 4
/// image_size = 500
///
/// [crawl.toggles]
/// texts = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Database path; defaults to `blogcrawl.db` inside the download root.
    pub database: Option<PathBuf>,
    /// Engine settings; missing keys keep their defaults.
    pub crawl: CrawlSettings,
}

impl FileConfig {
    /// Database path for the given settings.
    #[must_use]
    pub fn database_path(&self, settings: &CrawlSettings) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| settings.download_root.join(DATABASE_FILE_NAME))
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/blogcrawl/config.toml`
/// 2. `$HOME/.config/blogcrawl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("blogcrawl")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("blogcrawl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (it must exist), otherwise the default path if
/// present, otherwise built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.crawl.validate()?;
    Ok(config)
}
