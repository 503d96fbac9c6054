use anyhow::Result;
use portalfill_core::AutomationSession;
use serde_json::json;

use crate::commands::wait_for_ctrl_c;
use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    session: &AutomationSession,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let bound = session.open(profile).await?;

    if format.is_json() {
        print_json(&json!({
            "ok": true,
            "portalUrl": bound.portal_url,
            "mapping": bound.mapping_path,
        }))?;
    } else {
        println!("Opened {}", bound.portal_url);
        println!("Mapping: {}", bound.mapping_path.display());
    }

    let waited = wait_for_ctrl_c("Log in or look around, then press Ctrl+C to close the browser.").await;
    session.close().await;
    waited
}
