use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Environment variable pointing at a Chromium-compatible executable.
pub const CHROMIUM_ENV: &str = "PORTALFILL_CHROMIUM";

const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeProbe {
    pub chromium_available: bool,
    pub chromium_path: Option<String>,
    pub chromium_version: Option<String>,
    pub ready: bool,
    pub notes: Vec<String>,
}

impl RuntimeProbe {
    fn empty() -> Self {
        Self {
            chromium_available: false,
            chromium_path: None,
            chromium_version: None,
            ready: false,
            notes: Vec::new(),
        }
    }

    /// Human-readable reason the runtime is unusable, if it is.
    pub fn failure_message(&self) -> Option<String> {
        if self.ready {
            return None;
        }
        if self.notes.is_empty() {
            return Some("Chromium browser runtime is not ready".to_string());
        }
        Some(self.notes.join(" "))
    }
}

/// Locate a Chromium executable and read its version.
///
/// `explicit` wins over [`CHROMIUM_ENV`], which wins over well-known install
/// locations and `PATH`.
pub async fn probe_chromium(explicit: Option<&Path>) -> RuntimeProbe {
    let mut probe = RuntimeProbe::empty();

    let executable = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os(CHROMIUM_ENV)
            .map(PathBuf::from)
            .or_else(detect_chromium_executable),
    };

    let Some(executable) = executable else {
        probe.notes.push(format!(
            "Chromium not found. Install Google Chrome or Chromium, or set {CHROMIUM_ENV} to its executable."
        ));
        return probe;
    };

    if !executable.is_file() {
        probe.notes.push(format!(
            "Configured Chromium executable does not exist: {}",
            executable.display()
        ));
        return probe;
    }

    probe.chromium_available = true;
    probe.chromium_path = Some(executable.display().to_string());

    match run_command_capture(&executable, &["--version".to_string()], 10).await {
        Ok(output) if output.exit_code == 0 && !output.stdout.trim().is_empty() => {
            probe.chromium_version = Some(output.stdout.trim().to_string());
        }
        Ok(_) | Err(_) => {
            probe
                .notes
                .push("Could not read the Chromium version; launching anyway.".to_string());
        }
    }

    probe.ready = true;
    probe
}

fn detect_chromium_executable() -> Option<PathBuf> {
    well_known_locations()
        .into_iter()
        .find(|path| path.is_file())
        .or_else(|| EXECUTABLE_NAMES.iter().find_map(|name| find_on_path(name)))
}

fn well_known_locations() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ));
        candidates.push(PathBuf::from(
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ));
    }

    if cfg!(target_os = "windows") {
        for var in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(base) = std::env::var(var) {
                candidates.push(PathBuf::from(&base).join("Google/Chrome/Application/chrome.exe"));
                candidates.push(PathBuf::from(&base).join("Microsoft/Edge/Application/msedge.exe"));
            }
        }
    }

    candidates
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let file_name = if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    };

    std::env::split_paths(&path_var)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

pub(crate) struct CommandCapture {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub(crate) async fn run_command_capture(
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<CommandCapture> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(Duration::from_secs(timeout_secs), command.output()).await {
        Ok(result) => result?,
        Err(_) => bail!("Command timed out after {} seconds", timeout_secs),
    };

    Ok(CommandCapture {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
