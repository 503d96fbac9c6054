//! Value injection across heterogeneous widgets.

use portalfill_browser::{ElementInfo, Key, Page};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::locator::Located;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetKind {
    PlainInput,
    TextArea,
    ContentEditable,
    Other,
}

impl WidgetKind {
    pub fn of(info: &ElementInfo) -> Self {
        match info.tag.as_str() {
            "input" => Self::PlainInput,
            "textarea" => Self::TextArea,
            _ if info.content_editable => Self::ContentEditable,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technique {
    /// Native value setter plus `input`/`change` events.
    SmartFill,
    /// Select-all, then per-character key input.
    Typed,
    /// Replace `textContent` and dispatch `input`.
    ContentEditable,
}

impl Technique {
    pub const CHAIN: [Technique; 3] = [
        Technique::SmartFill,
        Technique::Typed,
        Technique::ContentEditable,
    ];

    pub fn applies_to(self, kind: WidgetKind) -> bool {
        match self {
            Self::SmartFill => matches!(kind, WidgetKind::PlainInput | WidgetKind::TextArea),
            Self::Typed => true,
            Self::ContentEditable => kind == WidgetKind::ContentEditable,
        }
    }

    async fn apply(
        self,
        page: &dyn Page,
        target: &Located,
        value: &str,
        options: &InjectOptions,
    ) -> anyhow::Result<()> {
        let handle = &target.handle;
        match self {
            Self::SmartFill => {
                page.focus(handle).await?;
                page.fill_value(handle, value).await
            }
            Self::Typed => {
                page.focus(handle).await?;
                page.press_key(Some(handle), Key::SelectAll).await?;
                page.type_text(handle, value, options.keystroke_delay).await
            }
            Self::ContentEditable => page.set_text_content(handle, value).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOutcome {
    Filled(Technique),
    Blank,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct InjectOptions {
    pub keystroke_delay: Duration,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            keystroke_delay: Duration::from_millis(1),
        }
    }
}

/// Commit `value` with the first technique that succeeds for the widget.
/// A blank value touches nothing.
pub async fn inject(
    page: &dyn Page,
    target: &Located,
    value: &str,
    options: &InjectOptions,
) -> InjectOutcome {
    if value.trim().is_empty() {
        return InjectOutcome::Blank;
    }

    let kind = WidgetKind::of(&target.info);
    let mut failures = Vec::new();
    for technique in Technique::CHAIN {
        if !technique.applies_to(kind) {
            continue;
        }
        match technique.apply(page, target, value, options).await {
            Ok(()) => return InjectOutcome::Filled(technique),
            Err(e) => {
                debug!(
                    "{:?} failed on {}: {}",
                    technique, target.info.selector_hint, e
                );
                failures.push(format!("{technique:?}: {e}"));
            }
        }
    }
    InjectOutcome::Failed(failures.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::locate;
    use crate::config::FieldDescriptor;
    use portalfill_browser::testkit::{FakeDocument, FakeElement, FakePage};

    async fn target(page: &FakePage, id: &str) -> Located {
        locate(page, &FieldDescriptor::with_selector(&format!("#{id}")))
            .await
            .unwrap()
    }

    fn fast() -> InjectOptions {
        InjectOptions {
            keystroke_delay: Duration::ZERO,
        }
    }

    #[test]
    fn widget_kinds() {
        let mut info = ElementInfo {
            tag: "div".into(),
            ..ElementInfo::default()
        };
        assert_eq!(WidgetKind::of(&info), WidgetKind::Other);
        info.content_editable = true;
        assert_eq!(WidgetKind::of(&info), WidgetKind::ContentEditable);
        info.tag = "textarea".into();
        assert_eq!(WidgetKind::of(&info), WidgetKind::TextArea);
    }

    #[tokio::test]
    async fn blank_value_is_a_no_op() {
        let page = FakePage::new(
            "https://portal.test/",
            FakeDocument::new("").with(FakeElement::new("input").id("f").value("keep")),
        );
        let located = target(&page, "f").await;
        assert_eq!(inject(&page, &located, "  \n", &fast()).await, InjectOutcome::Blank);
        assert_eq!(page.value_of("f").as_deref(), Some("keep"));
        assert!(page.events_of("f").is_empty());
    }

    #[tokio::test]
    async fn smart_fill_dispatches_input_and_change() {
        let page = FakePage::new(
            "https://portal.test/",
            FakeDocument::new("").with(FakeElement::new("textarea").id("f").value("old")),
        );
        let located = target(&page, "f").await;
        assert_eq!(
            inject(&page, &located, "Fever for 3 days", &fast()).await,
            InjectOutcome::Filled(Technique::SmartFill)
        );
        assert_eq!(page.value_of("f").as_deref(), Some("Fever for 3 days"));
        let events = page.events_of("f");
        assert!(events.contains(&"input".to_string()));
        assert!(events.contains(&"change".to_string()));
    }

    #[tokio::test]
    async fn typing_replaces_value_when_setter_is_rejected() {
        let page = FakePage::new(
            "https://portal.test/",
            FakeDocument::new("").with(
                FakeElement::new("input")
                    .id("f")
                    .value("old")
                    .rejects_value_assignment(),
            ),
        );
        let located = target(&page, "f").await;
        assert_eq!(
            inject(&page, &located, "new", &fast()).await,
            InjectOutcome::Filled(Technique::Typed)
        );
        assert_eq!(page.value_of("f").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn content_editable_is_last_resort() {
        let page = FakePage::new(
            "https://portal.test/",
            FakeDocument::new("").with(
                FakeElement::new("div")
                    .id("f")
                    .content_editable()
                    .rejects_typing(),
            ),
        );
        let located = target(&page, "f").await;
        assert_eq!(
            inject(&page, &located, "Rest and fluids", &fast()).await,
            InjectOutcome::Filled(Technique::ContentEditable)
        );
        assert_eq!(page.value_of("f").as_deref(), Some("Rest and fluids"));
    }

    #[tokio::test]
    async fn all_techniques_failing_is_reported() {
        let page = FakePage::new(
            "https://portal.test/",
            FakeDocument::new("").with(
                FakeElement::new("input")
                    .id("f")
                    .rejects_value_assignment()
                    .rejects_typing(),
            ),
        );
        let located = target(&page, "f").await;
        match inject(&page, &located, "x", &fast()).await {
            InjectOutcome::Failed(reason) => {
                assert!(reason.contains("SmartFill"));
                assert!(reason.contains("Typed"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
