use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Table};
use portalfill_core::{AutomationSession, CollectRequest, Episode};

use crate::cli::CollectArgs;
use crate::commands::{finish_status, status_printer, wait_for_enter};
use crate::output::table::{clip, print_table};
use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    session: &AutomationSession,
    profile: Option<&str>,
    args: CollectArgs,
    format: OutputFormat,
) -> Result<()> {
    if !args.now {
        session.open(profile).await?;
        wait_for_enter("Open the patient's consultations list, then press Enter.").await?;
    }

    let request = CollectRequest {
        profile: profile.map(str::to_string),
        limit: args.limit,
    };
    let (reporter, printer) = status_printer(format);
    let report = session.collect_episodes(request, &reporter).await;
    finish_status(reporter, printer).await;
    session.close().await;

    if !report.ok {
        if format.is_json() {
            print_json(&report)?;
        }
        bail!(report.error.unwrap_or_else(|| "Episode collection failed".to_string()));
    }

    let episodes = report.episodes.clone().unwrap_or_default();
    if let Some(path) = &args.output {
        let content = serde_json::to_string_pretty(&episodes)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if format.is_json() {
        return print_json(&report);
    }

    if episodes.is_empty() {
        println!("No episodes collected.");
        return Ok(());
    }
    print_table(episodes_table(&episodes))?;
    if let Some(path) = &args.output {
        println!("Wrote {} episode(s) to {}", episodes.len(), path.display());
    }
    Ok(())
}

fn episodes_table(episodes: &[Episode]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "URL", "Row", "Chars"]);
    for episode in episodes {
        table.add_row(vec![
            Cell::new(episode.index),
            Cell::new(clip(&episode.url, 50)),
            Cell::new(clip(&episode.row_text, 60)),
            Cell::new(episode.text.chars().count()),
        ]);
    }
    table
}
