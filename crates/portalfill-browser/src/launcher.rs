use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

use crate::cdp::CdpConnection;
use crate::cdp_page::{BrowserProcess, CdpPage};
use crate::page::{BrowserLauncher, Page};
use crate::probe::{RuntimeProbe, probe_chromium};

const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 20;
const TARGET_POLL_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOptions {
    #[serde(default)]
    pub headless: bool,
    /// Persistent profile directory so portal logins survive restarts.
    /// A throwaway directory is used when unset.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_viewport")]
    pub viewport: (u32, u32),
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            user_data_dir: None,
            executable: None,
            viewport: default_viewport(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }
}

/// Launches a local Chromium and drives its first tab over DevTools.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn probe_runtime(&self) -> Result<RuntimeProbe> {
        Ok(probe_chromium(self.executable.as_deref()).await)
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Page>> {
        let explicit = options.executable.as_deref().or(self.executable.as_deref());
        let probe = probe_chromium(explicit).await;
        if let Some(message) = probe.failure_message() {
            bail!(message);
        }
        let Some(executable) = probe.chromium_path.as_deref().map(PathBuf::from) else {
            bail!("Chromium executable path missing from probe");
        };

        let (profile_dir, temp_profile) = match &options.user_data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("portalfill-profile-")
                    .tempdir()?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        let port = reserve_port()?;
        let args = chromium_args(options, &profile_dir, port);
        info!(
            "Launching {} (port {}, profile {})",
            executable.display(),
            port,
            profile_dir.display()
        );

        let child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", executable.display()))?;

        let process = BrowserProcess::new(child, temp_profile);
        let startup_timeout = Duration::from_secs(options.startup_timeout_secs.max(1));
        let ws_url = wait_for_page_target(port, startup_timeout).await?;
        let connection = CdpConnection::connect(&ws_url).await?;

        Ok(Arc::new(CdpPage::new(connection, process)))
    }
}

#[derive(Debug, serde::Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    websocket_url: Option<String>,
}

fn chromium_args(options: &LaunchOptions, profile_dir: &Path, port: u16) -> Vec<String> {
    let (width, height) = options.viewport;
    let mut args = vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", profile_dir.display()),
        "--remote-allow-origins=*".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        format!("--window-size={width},{height}"),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

fn reserve_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to reserve a local port")?;
    Ok(listener.local_addr()?.port())
}

async fn wait_for_page_target(port: u16, startup_timeout: Duration) -> Result<String> {
    let client = reqwest::Client::new();
    let endpoint = format!("http://127.0.0.1:{port}/json/list");
    let deadline = Instant::now() + startup_timeout;

    loop {
        if let Ok(response) = client.get(&endpoint).send().await
            && let Ok(targets) = response.json::<Vec<TargetInfo>>().await
            && let Some(ws_url) = select_page_target(targets)
        {
            return Ok(ws_url);
        }

        if Instant::now() >= deadline {
            bail!(
                "Chromium did not expose a page target within {} seconds",
                startup_timeout.as_secs()
            );
        }
        tokio::time::sleep(TARGET_POLL_INTERVAL).await;
    }
}

fn select_page_target(targets: Vec<TargetInfo>) -> Option<String> {
    targets
        .into_iter()
        .filter(|target| target.kind == "page")
        .find_map(|target| {
            debug!("Using page target {}", target.url);
            target.websocket_url
        })
}

fn default_viewport() -> (u32, u32) {
    (1280, 800)
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flag_only_when_requested() {
        let mut options = LaunchOptions::default();
        let args = chromium_args(&options, Path::new("/tmp/profile"), 9333);
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--headless")));
        assert_eq!(args.last().unwrap(), "about:blank");

        options.headless = true;
        let args = chromium_args(&options, Path::new("/tmp/profile"), 9333);
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn page_target_skips_workers_and_extensions() {
        let targets: Vec<TargetInfo> = serde_json::from_str(
            r#"[
                {"type":"service_worker","url":"chrome-extension://x","webSocketDebuggerUrl":"ws://sw"},
                {"type":"page","url":"about:blank","webSocketDebuggerUrl":"ws://127.0.0.1:9333/devtools/page/A"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            select_page_target(targets).as_deref(),
            Some("ws://127.0.0.1:9333/devtools/page/A")
        );
    }

    #[test]
    fn no_page_target_yields_none() {
        let targets: Vec<TargetInfo> =
            serde_json::from_str(r#"[{"type":"browser","url":""}]"#).unwrap();
        assert!(select_page_target(targets).is_none());
    }

    #[test]
    fn launch_options_fill_defaults_from_json() {
        let options: LaunchOptions = serde_json::from_str(r#"{"headless":true}"#).unwrap();
        assert!(options.headless);
        assert_eq!(options.viewport, (1280, 800));
        assert_eq!(options.startup_timeout_secs, DEFAULT_STARTUP_TIMEOUT_SECS);
    }
}
