use portalfill_core::Timings;
use portalfill_core::options::{DEFAULT_EPISODE_LIMIT, DEFAULT_TEXT_CAP};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub episodes: EpisodesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DefaultConfig {
    pub profile: Option<String>,
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    /// Browser profile directory; portal logins persist here.
    pub user_data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EpisodesConfig {
    #[serde(default = "default_text_cap")]
    pub text_cap: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for EpisodesConfig {
    fn default() -> Self {
        Self {
            text_cap: default_text_cap(),
            default_limit: default_limit(),
        }
    }
}

impl CliConfig {
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("Warning: Failed to parse config: {err}");
                    Self::default()
                }
            },
            Err(err) => {
                eprintln!("Warning: Failed to read config: {err}");
                Self::default()
            }
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portalfill")
            .join("config.toml")
    }
}

fn default_text_cap() -> usize {
    DEFAULT_TEXT_CAP
}

fn default_limit() -> usize {
    DEFAULT_EPISODE_LIMIT
}
