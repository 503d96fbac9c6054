use anyhow::{Context, Result, bail};
use colored::Colorize;
use comfy_table::{Cell, Table};
use portalfill_core::{AutomationSession, Draft, FieldResult, FillOutcome, FillRequest};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::cli::FillArgs;
use crate::commands::{finish_status, status_printer, wait_for_ctrl_c};
use crate::output::table::{clip, print_table};
use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    session: &AutomationSession,
    profile: Option<&str>,
    args: FillArgs,
    format: OutputFormat,
) -> Result<()> {
    let draft = build_draft(args.draft.as_deref(), &args.fields).await?;
    let request = FillRequest {
        id_card: args.id_card,
        draft,
        profile: profile.map(str::to_string),
    };

    let (reporter, printer) = status_printer(format);
    let report = session.fill(request, &reporter).await;
    finish_status(reporter, printer).await;

    if format.is_json() {
        print_json(&report)?;
    } else if let Some(results) = &report.results {
        print_table(results_table(results))?;
    }

    if !report.ok {
        session.close().await;
        bail!(report.error.unwrap_or_else(|| "Fill failed".to_string()));
    }

    if !args.close {
        wait_for_ctrl_c("Review the form in the portal and save it there. Press Ctrl+C to close the browser.").await?;
    }
    session.close().await;
    Ok(())
}

/// Draft file first, then `--field` pairs on top.
async fn build_draft(path: Option<&Path>, fields: &[String]) -> Result<Draft> {
    let mut draft = match path {
        Some(path) => {
            let content = read_draft_source(path).await?;
            serde_json::from_str::<Draft>(&content)
                .with_context(|| format!("Invalid draft JSON in {}", path.display()))?
        }
        None => Draft::new(),
    };
    for field in fields {
        let (key, value) = parse_field(field)?;
        draft = draft.with(key, value);
    }
    Ok(draft)
}

async fn read_draft_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read draft from stdin")?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read draft {}", path.display()))
}

fn parse_field(raw: &str) -> Result<(&str, &str)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --field '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --field '{raw}': key is empty");
    }
    Ok((key, value))
}

fn results_table(results: &[FieldResult]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Outcome", "Technique", "Detail"]);
    for result in results {
        let outcome = wire_name(&result.outcome);
        let outcome = match result.outcome {
            FillOutcome::Filled => outcome.as_str().green(),
            FillOutcome::Skipped => outcome.as_str().dimmed(),
            FillOutcome::NotFound | FillOutcome::NotFilled => outcome.as_str().yellow(),
        };
        table.add_row(vec![
            Cell::new(&result.key),
            Cell::new(outcome),
            Cell::new(result.technique.as_ref().map(wire_name).unwrap_or_default()),
            Cell::new(clip(result.detail.as_deref().unwrap_or(""), 60)),
        ]);
    }
    table
}

fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_field_splits_on_first_equals() {
        assert_eq!(parse_field("complaint=fever").unwrap(), ("complaint", "fever"));
        assert_eq!(parse_field(" advice =a=b").unwrap(), ("advice", "a=b"));
        assert_eq!(parse_field("history=").unwrap(), ("history", ""));
    }

    #[test]
    fn parse_field_rejects_missing_key() {
        assert!(parse_field("complaint").is_err());
        assert!(parse_field(" =fever").is_err());
    }

    #[test]
    fn wire_name_uses_serde_names() {
        assert_eq!(wire_name(&FillOutcome::NotFound), "not-found");
    }

    #[tokio::test]
    async fn fields_override_draft_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("draft.json");
        std::fs::write(
            &path,
            r#"{"complaint": "cough", "history": null, "advice": "rest"}"#,
        )
        .unwrap();

        let draft = build_draft(Some(&path), &["complaint=fever".to_string()])
            .await
            .unwrap();
        assert_eq!(draft.value("complaint"), "fever");
        assert_eq!(draft.value("history"), "");
        assert_eq!(draft.value("advice"), "rest");
    }

    #[tokio::test]
    async fn invalid_draft_file_names_the_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("draft.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let err = build_draft(Some(&path), &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("draft.json"));
    }
}
