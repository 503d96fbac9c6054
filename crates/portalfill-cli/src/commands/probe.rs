use anyhow::Result;
use colored::Colorize;
use portalfill_core::AutomationSession;

use crate::output::{OutputFormat, json::print_json};

pub async fn run(session: &AutomationSession, format: OutputFormat) -> Result<()> {
    let probe = session.probe_runtime().await?;

    if format.is_json() {
        print_json(&probe)?;
    } else {
        let state = if probe.ready {
            "ready".green().bold()
        } else {
            "not ready".red().bold()
        };
        println!("Chromium: {state}");
        println!(
            "Executable: {}",
            probe.chromium_path.as_deref().unwrap_or("-")
        );
        println!(
            "Version: {}",
            probe.chromium_version.as_deref().unwrap_or("-")
        );
        for note in &probe.notes {
            println!("Note: {note}");
        }
        if let Some(message) = probe.failure_message() {
            eprintln!("{} {message}", "Warning:".yellow().bold());
        }
    }

    Ok(())
}
