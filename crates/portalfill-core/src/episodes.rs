//! Episode collection: open each "view" trigger on a list page, capture the
//! detail text, then put the list back the way it was.

use portalfill_browser::{Key, Page};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EpisodeSettings;
use crate::error::{AutomationError, Result};
use crate::locator::{Located, compile_label_pattern};
use crate::options::Timings;
use crate::status::{BestEffort, StatusReporter};

const LINK_SELECTOR: &str = r#"a, [role="link"]"#;
const BUTTON_SELECTOR: &str =
    r#"button, [role="button"], input[type="button"], input[type="submit"]"#;
const CLOSE_CONTROL_PATTERN: &str = r"(?i)\b(close|back|cancel|done)\b|^\s*[x×✕]\s*$";
const URL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// 1-based position of the trigger on the list page.
    pub index: usize,
    pub url: String,
    pub row_text: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes: Option<Vec<Episode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectReport {
    pub fn completed(episodes: Vec<Episode>) -> Self {
        Self {
            ok: true,
            episodes: Some(episodes),
            error: None,
        }
    }

    pub fn failed(error: &AutomationError) -> Self {
        Self {
            ok: false,
            episodes: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Clamped to at least 1.
    pub limit: usize,
    pub text_cap: usize,
}

pub async fn collect_episodes(
    page: &dyn Page,
    settings: &EpisodeSettings,
    options: &CollectOptions,
    timings: &Timings,
    status: &StatusReporter,
) -> CollectReport {
    match run_collect(page, settings, options, timings, status).await {
        Ok(episodes) => CollectReport::completed(episodes),
        Err(e) => {
            warn!("Episode collection aborted: {}", e);
            CollectReport::failed(&e)
        }
    }
}

async fn run_collect(
    page: &dyn Page,
    settings: &EpisodeSettings,
    options: &CollectOptions,
    timings: &Timings,
    status: &StatusReporter,
) -> Result<Vec<Episode>> {
    let view_pattern = view_label_pattern(&settings.view_label)?;

    status.report("Looking for episode view links...");
    page.wait_until_ready(timings.ready_timeout()).await?;

    let count = discover_triggers(page, &view_pattern).await.len();
    if count == 0 {
        return Err(AutomationError::precondition(format!(
            "No \"{}\" links or buttons found on this page. Navigate to the patient's consultations list first, then try again.",
            settings.view_label
        )));
    }

    let to_fetch = count.min(options.limit.max(1));
    info!("Found {} trigger(s); collecting {}", count, to_fetch);

    let mut episodes = Vec::with_capacity(to_fetch);
    for index in 1..=to_fetch {
        status.report(format!("Opening episode {index} of {to_fetch}..."));

        let triggers = discover_triggers(page, &view_pattern).await;
        let Some(trigger) = triggers.into_iter().nth(index - 1) else {
            warn!(
                "Trigger {} disappeared after re-discovery; stopping with {} episode(s)",
                index,
                episodes.len()
            );
            break;
        };

        let before = match page.url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "Could not read the list URL before episode {}: {}; stopping with {} episode(s)",
                    index,
                    e,
                    episodes.len()
                );
                break;
            }
        };
        let row_text = page
            .enclosing_row_text(&trigger.handle)
            .await
            .ok()
            .flatten()
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        let list_controls = close_control_keys(page).await;

        if let Err(e) = page.click(&trigger.handle).await {
            warn!(
                "Could not open episode {}: {}; stopping with {} episode(s)",
                index,
                e,
                episodes.len()
            );
            break;
        }
        await_open(page, &before, timings).await;

        status.report(format!("Extracting episode {index} text..."));
        let text = match page.visible_text(&settings.text_selector).await {
            Ok(text) => truncate_chars(&text, options.text_cap),
            Err(e) => {
                debug!("Could not read episode {} text: {}", index, e);
                String::new()
            }
        };
        let url = page.url().await.unwrap_or_else(|_| before.clone());

        episodes.push(Episode {
            index,
            url: url.clone(),
            row_text,
            text,
        });

        let restored = restore_list(page, &before, &url, &list_controls, status).await;
        if let BestEffort::Ignored(reason) = restored {
            debug!("List restore after episode {} incomplete: {}", index, reason);
        }
        tokio::time::sleep(timings.between_episodes()).await;
    }

    status.report(format!("Fetched {} episode(s)", episodes.len()));
    Ok(episodes)
}

/// Visible links whose label matches, falling back to buttons when no link does.
pub async fn discover_triggers(page: &dyn Page, pattern: &Regex) -> Vec<Located> {
    let links = matching_controls(page, LINK_SELECTOR, pattern).await;
    if !links.is_empty() {
        return links;
    }
    matching_controls(page, BUTTON_SELECTOR, pattern).await
}

async fn matching_controls(page: &dyn Page, selector: &str, pattern: &Regex) -> Vec<Located> {
    let Ok(handles) = page.query_all(selector).await else {
        return Vec::new();
    };
    let mut matched = Vec::new();
    for handle in handles {
        let Ok(info) = page.describe(&handle).await else {
            continue;
        };
        let matches = control_label(&info.text, info.aria_label.as_deref())
            .is_some_and(|label| pattern.is_match(label));
        if info.visible && matches {
            matched.push(Located { handle, info });
        }
    }
    matched
}

fn control_label<'a>(text: &'a str, aria_label: Option<&'a str>) -> Option<&'a str> {
    Some(text.trim())
        .filter(|t| !t.is_empty())
        .or_else(|| aria_label.map(str::trim).filter(|a| !a.is_empty()))
}

/// A label that is not a valid pattern is matched literally.
fn view_label_pattern(label: &str) -> Result<Regex> {
    if let Some(regex) = compile_label_pattern(label) {
        return Ok(regex);
    }
    RegexBuilder::new(&regex::escape(label))
        .case_insensitive(true)
        .build()
        .map_err(|e| AutomationError::Config(format!("invalid viewLabel {label:?}: {e}")))
}

/// Race a URL change (bounded) against a fixed settle delay.
async fn await_open(page: &dyn Page, before: &str, timings: &Timings) {
    tokio::select! {
        changed = wait_for_url_change(page, before, timings.navigation_timeout()) => {
            debug!("Trigger click {} the URL", if changed { "changed" } else { "did not change" });
        }
        _ = tokio::time::sleep(timings.open_settle()) => {}
    }
}

async fn wait_for_url_change(page: &dyn Page, before: &str, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if page.url().await.is_ok_and(|url| url != before) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(URL_POLL_INTERVAL).await;
    }
}

/// Navigation-style details go back. Modal-style details get Escape, then a
/// click on a close control only if one appeared after the trigger click.
/// `list_controls` are the close-control keys present on the list beforehand.
async fn restore_list(
    page: &dyn Page,
    before: &str,
    current: &str,
    list_controls: &[String],
    status: &StatusReporter,
) -> BestEffort {
    if current != before {
        status.report("Returning to episode list...");
        return BestEffort::from_result("go back", page.go_back().await);
    }

    let escape = BestEffort::from_result("press Escape", page.press_key(None, Key::Escape).await);

    let close = match detail_close_control(page, list_controls).await {
        Some(control) => {
            debug!("Closing episode detail via {}", control.info.selector_hint);
            BestEffort::from_result("click close control", page.click(&control.handle).await)
        }
        None => BestEffort::Done,
    };

    match (escape, close) {
        (BestEffort::Done, BestEffort::Done) => BestEffort::Done,
        (BestEffort::Ignored(a), BestEffort::Ignored(b)) => BestEffort::Ignored(format!("{a}; {b}")),
        (BestEffort::Ignored(reason), _) | (_, BestEffort::Ignored(reason)) => {
            BestEffort::Ignored(reason)
        }
    }
}

async fn close_controls(page: &dyn Page) -> Vec<Located> {
    let Ok(pattern) = Regex::new(CLOSE_CONTROL_PATTERN) else {
        return Vec::new();
    };
    matching_controls(page, BUTTON_SELECTOR, &pattern).await
}

/// Element handles are not stable across queries, so controls are keyed by
/// structural selector plus label.
fn control_key(control: &Located) -> String {
    format!(
        "{}|{}",
        control.info.selector_hint,
        control_label(&control.info.text, control.info.aria_label.as_deref()).unwrap_or("")
    )
}

async fn close_control_keys(page: &dyn Page) -> Vec<String> {
    close_controls(page).await.iter().map(control_key).collect()
}

async fn detail_close_control(page: &dyn Page, list_controls: &[String]) -> Option<Located> {
    close_controls(page)
        .await
        .into_iter()
        .find(|control| !list_controls.contains(&control_key(control)))
}

/// Keep at most `cap` characters.
pub fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("ab", 4), "ab");
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn close_pattern_avoids_partial_words() {
        let pattern = Regex::new(CLOSE_CONTROL_PATTERN).unwrap();
        for label in ["Close", "Back to list", "CANCEL", "Done", "×", " x "] {
            assert!(pattern.is_match(label), "{label} should match");
        }
        for label in ["Next", "Export", "Feedback", "Closed cases"] {
            assert!(!pattern.is_match(label), "{label} should not match");
        }
    }

    #[test]
    fn control_label_falls_back_to_aria_label() {
        assert_eq!(control_label("  View ", Some("Open")), Some("View"));
        assert_eq!(control_label("", Some("View episode")), Some("View episode"));
        assert_eq!(control_label(" ", None), None);
    }

    #[test]
    fn invalid_view_label_matches_literally() {
        let pattern = view_label_pattern("view (").unwrap();
        assert!(pattern.is_match("VIEW ("));
        assert!(!pattern.is_match("view"));
    }
}
