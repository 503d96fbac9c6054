//! Field discovery: selector first, then label pattern.

use portalfill_browser::{ElementHandle, ElementInfo, Page};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::FieldDescriptor;

/// Everything that can take typed text, before type filtering.
pub const TEXT_ENTRY_SELECTOR: &str = r#"input, textarea, [contenteditable], [role="textbox"]"#;

const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "hidden", "submit", "button", "checkbox", "radio", "file", "image", "reset",
];

/// A resolved element plus the description used to pick an injection technique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub handle: ElementHandle,
    pub info: ElementInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateStrategy {
    Selector,
    LabelPattern,
}

impl LocateStrategy {
    pub const CHAIN: [LocateStrategy; 2] = [LocateStrategy::Selector, LocateStrategy::LabelPattern];

    async fn attempt(self, page: &dyn Page, descriptor: &FieldDescriptor) -> Option<Located> {
        match self {
            Self::Selector => {
                let selector = descriptor.selector()?;
                let matches = describe_all(page, selector).await;
                if matches.is_empty() {
                    debug!("Selector {:?} matched nothing", selector);
                }
                pick_preferred(matches)
            }
            Self::LabelPattern => {
                let pattern = compile_label_pattern(descriptor.label_pattern()?)?;
                let matches = text_entry_candidates(page)
                    .await
                    .into_iter()
                    .filter(|candidate| {
                        composite_label(&candidate.info)
                            .is_some_and(|label| pattern.is_match(&label))
                    })
                    .collect();
                pick_preferred(matches)
            }
        }
    }
}

/// Resolve a descriptor to at most one element. Never fails: anything the
/// page rejects counts as no match.
pub async fn locate(page: &dyn Page, descriptor: &FieldDescriptor) -> Option<Located> {
    for strategy in LocateStrategy::CHAIN {
        if let Some(found) = strategy.attempt(page, descriptor).await {
            debug!(
                "Located {} via {:?}",
                found.info.selector_hint, strategy
            );
            return Some(found);
        }
    }
    None
}

/// Compile a label pattern case-insensitively; an invalid pattern is logged
/// and treated as absent.
pub fn compile_label_pattern(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Ignoring invalid label pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// First non-empty of aria-label, placeholder, name, `label[for]` text and
/// enclosing label text.
pub fn composite_label(info: &ElementInfo) -> Option<String> {
    [
        info.aria_label.as_deref(),
        info.placeholder.as_deref(),
        info.name.as_deref(),
        info.for_label_text.as_deref(),
        info.enclosing_label_text.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|label| !label.is_empty())
    .map(str::to_string)
}

pub fn is_text_candidate(info: &ElementInfo) -> bool {
    match info.tag.as_str() {
        "input" => {
            let input_type = info.input_type.as_deref().unwrap_or("text");
            !NON_TEXT_INPUT_TYPES
                .iter()
                .any(|excluded| input_type.eq_ignore_ascii_case(excluded))
        }
        "textarea" => true,
        _ => info.content_editable || info.role.as_deref() == Some("textbox"),
    }
}

/// Text-entry elements on the page in document order, visible or not.
pub async fn text_entry_candidates(page: &dyn Page) -> Vec<Located> {
    describe_all(page, TEXT_ENTRY_SELECTOR)
        .await
        .into_iter()
        .filter(|candidate| is_text_candidate(&candidate.info))
        .collect()
}

/// First visible element, else the first of any visibility.
pub fn pick_preferred(candidates: Vec<Located>) -> Option<Located> {
    let visible = candidates.iter().position(|c| c.info.visible).unwrap_or(0);
    candidates.into_iter().nth(visible)
}

async fn describe_all(page: &dyn Page, selector: &str) -> Vec<Located> {
    let handles = match page.query_all(selector).await {
        Ok(handles) => handles,
        Err(e) => {
            debug!("Query {:?} failed, treating as no match: {}", selector, e);
            return Vec::new();
        }
    };

    let mut described = Vec::with_capacity(handles.len());
    for handle in handles {
        match page.describe(&handle).await {
            Ok(info) => described.push(Located { handle, info }),
            Err(e) => debug!("Skipping element {}: {}", handle, e),
        }
    }
    described
}
