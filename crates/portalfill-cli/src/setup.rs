//! CLI setup module
//!
//! Builds the automation session from flags, config file and environment.

use anyhow::{Context, Result};
use portalfill_browser::{CHROMIUM_ENV, ChromiumLauncher, LaunchOptions};
use portalfill_core::{AutomationOptions, AutomationSession, ProfileResolver};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::Cli;
use crate::config::CliConfig;
use crate::paths;

pub fn project_root(cli: &Cli, config: &CliConfig) -> Result<PathBuf> {
    match cli
        .project_root
        .clone()
        .or_else(|| config.default.project_root.clone())
    {
        Some(root) => Ok(root),
        None => std::env::current_dir().context("Failed to read the current directory"),
    }
}

/// Profile from `--profile`, then the config file.
pub fn profile(cli: &Cli, config: &CliConfig) -> Option<String> {
    cli.profile.clone().or_else(|| config.default.profile.clone())
}

pub fn launcher(config: &CliConfig) -> ChromiumLauncher {
    // The environment variable beats the config file; the probe reads it itself.
    let env_set = std::env::var_os(CHROMIUM_ENV).is_some_and(|v| !v.is_empty());
    match (&config.default.chromium_path, env_set) {
        (Some(path), false) => ChromiumLauncher::with_executable(path.clone()),
        _ => ChromiumLauncher::new(),
    }
}

pub fn build_session(cli: &Cli, config: &CliConfig) -> Result<AutomationSession> {
    let user_data_dir = match &config.default.user_data_dir {
        Some(dir) => dir.clone(),
        None => paths::browser_profile_dir()?,
    };

    let options = AutomationOptions {
        timings: config.timings.clone(),
        text_cap: config.episodes.text_cap,
        default_limit: config.episodes.default_limit,
        launch: LaunchOptions {
            headless: cli.headless || config.default.headless,
            user_data_dir: Some(user_data_dir),
            ..LaunchOptions::default()
        },
    };

    Ok(AutomationSession::new(
        Arc::new(launcher(config)),
        ProfileResolver::new(project_root(cli, config)?),
        options,
    ))
}
