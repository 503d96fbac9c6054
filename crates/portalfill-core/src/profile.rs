//! Profile name to mapping config resolution.

use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

use crate::config::MappingConfig;
use crate::error::{AutomationError, Result};

pub const DEFAULT_PROFILE: &str = "vinavi";
pub const TEST_PROFILE: &str = "test";

const LOCAL_PREFIX: &str = "local:";

/// A mapping config bound to a session, with its portal URL made navigable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundProfile {
    pub mapping_path: PathBuf,
    pub config: MappingConfig,
    pub portal_url: String,
}

#[derive(Debug, Clone)]
pub struct ProfileResolver {
    project_root: PathBuf,
    config_dir: PathBuf,
}

impl ProfileResolver {
    /// Mapping files live in `<project_root>/config`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let config_dir = project_root.join("config");
        Self {
            project_root,
            config_dir,
        }
    }

    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// `None`/`vinavi` and unknown names map to the default file, `test` to the
    /// test file, and an existing absolute path to itself.
    pub fn mapping_path(&self, profile: Option<&str>) -> PathBuf {
        let default_path = self.config_dir.join(format!("{DEFAULT_PROFILE}.mapping.json"));
        let Some(profile) = profile.map(str::trim).filter(|p| !p.is_empty()) else {
            return default_path;
        };

        match profile {
            DEFAULT_PROFILE => default_path,
            TEST_PROFILE => self.config_dir.join(format!("{TEST_PROFILE}.mapping.json")),
            other => {
                let candidate = Path::new(other);
                if candidate.is_absolute() && candidate.exists() {
                    candidate.to_path_buf()
                } else {
                    warn!(
                        "Unknown profile {:?}; using {}",
                        other,
                        default_path.display()
                    );
                    default_path
                }
            }
        }
    }

    /// Turn `local:<relative path>` into a `file://` URL under the project root.
    pub fn resolve_portal_url(&self, portal_url: &str) -> Result<String> {
        let Some(relative) = portal_url.strip_prefix(LOCAL_PREFIX) else {
            return Ok(portal_url.to_string());
        };

        let mut path = self.project_root.join(relative.trim_start_matches(['/', '\\']));
        if path.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| {
                AutomationError::Config(format!("cannot resolve {portal_url}: {e}"))
            })?;
            path = cwd.join(path);
        }

        Url::from_file_path(&path)
            .map(String::from)
            .map_err(|_| {
                AutomationError::Config(format!(
                    "cannot turn {} into a file URL",
                    path.display()
                ))
            })
    }

    pub fn bind(&self, profile: Option<&str>) -> Result<BoundProfile> {
        let mapping_path = self.mapping_path(profile);
        let config = MappingConfig::load(&mapping_path)?;
        let portal_url = self.resolve_portal_url(&config.portal_url)?;
        Ok(BoundProfile {
            mapping_path,
            config,
            portal_url,
        })
    }
}
