pub mod collect;
pub mod diagnose;
pub mod fill;
pub mod open;
pub mod probe;
pub mod stdio;

use anyhow::{Result, bail};
use colored::Colorize;
use portalfill_core::{StatusReporter, StatusUpdate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::output::OutputFormat;

/// Print status updates to stderr while an operation runs. JSON output keeps
/// stderr quiet so stdout stays machine-readable.
pub(crate) fn status_printer(format: OutputFormat) -> (StatusReporter, Option<JoinHandle<()>>) {
    if format.is_json() {
        return (StatusReporter::silent(), None);
    }
    let (reporter, rx) = StatusReporter::channel();
    (reporter, Some(tokio::spawn(print_status(rx))))
}

async fn print_status(mut rx: UnboundedReceiver<StatusUpdate>) {
    while let Some(update) = rx.recv().await {
        let time = chrono::DateTime::from_timestamp_millis(update.timestamp)
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        eprintln!("{} {}", time.dimmed(), update.message);
    }
}

/// Drop the reporter and let the printer drain.
pub(crate) async fn finish_status(reporter: StatusReporter, printer: Option<JoinHandle<()>>) {
    drop(reporter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
}

pub(crate) async fn wait_for_enter(prompt: &str) -> Result<()> {
    eprintln!("{} {}", "→".cyan().bold(), prompt);
    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    if read == 0 {
        bail!("stdin closed before Enter was pressed");
    }
    Ok(())
}

pub(crate) async fn wait_for_ctrl_c(prompt: &str) -> Result<()> {
    eprintln!("{} {}", "→".cyan().bold(), prompt);
    tokio::signal::ctrl_c().await?;
    Ok(())
}
