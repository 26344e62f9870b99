// chainlab/src/config.rs
//!
//! Runtime configuration
//!
//! Lookup order for the config file:
//! 1. an explicit path (the CLI's `--config`),
//! 2. `CHAINLAB_CONFIG`,
//! 3. `<config dir>/chainlab/config.toml`.
//!
//! A missing file means defaults. `CHAINLAB_BASE_URL` overrides whatever the
//! file says about the backend.

use crate::component::ComponentKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "CHAINLAB_CONFIG";
pub const BASE_URL_ENV: &str = "CHAINLAB_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_DATABASE_FILE: &str = "chainlab.sqlite3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin; `/v1/...` paths are appended to it.
    pub base_url: String,
    pub data_dir: Option<PathBuf>,
    pub database_file: String,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: None,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Per-call HTTP timeouts in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub openai_secs: u64,
    pub anthropic_secs: u64,
    pub google_search_secs: u64,
    pub youtube_transcript_secs: u64,
    pub doc_search_secs: u64,
    pub default_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            openai_secs: 120,
            anthropic_secs: 180,
            google_search_secs: 30,
            youtube_transcript_secs: 30,
            doc_search_secs: 60,
            default_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn for_kind(&self, kind: ComponentKind) -> Duration {
        let secs = match kind {
            ComponentKind::OpenAi => self.openai_secs,
            ComponentKind::Anthropic => self.anthropic_secs,
            ComponentKind::GoogleSearch => self.google_search_secs,
            ComponentKind::YoutubeTranscript => self.youtube_transcript_secs,
            ComponentKind::DocSearch => self.doc_search_secs,
            _ => self.default_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config TOML")
    }

    /// Resolves and reads the config file, then applies environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            Some(path) if explicit.is_some() => {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            _ => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.base_url = url;
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("chainlab")))
            .unwrap_or_else(|| PathBuf::from(".chainlab"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database_file)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chainlab").join("config.toml"))
}
