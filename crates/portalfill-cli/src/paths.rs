use anyhow::Result;
use std::path::PathBuf;

const PORTALFILL_DIR: &str = "portalfill";
const LOGS_DIR: &str = "logs";
const BROWSER_PROFILE_DIR: &str = "browser-profile";

/// Environment variable to override the PortalFill data directory.
const PORTALFILL_DIR_ENV: &str = "PORTALFILL_DIR";

/// Priority: PORTALFILL_DIR env var > platform data dir > ~/.portalfill
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(PORTALFILL_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    if let Some(data) = dirs::data_dir() {
        return Ok(data.join(PORTALFILL_DIR));
    }
    dirs::home_dir()
        .map(|h| h.join(format!(".{PORTALFILL_DIR}")))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = resolve_data_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(ensure_data_dir()?.join(LOGS_DIR))
}

/// Persistent Chromium profile so portal logins survive between runs.
pub fn browser_profile_dir() -> Result<PathBuf> {
    Ok(ensure_data_dir()?.join(BROWSER_PROFILE_DIR))
}
