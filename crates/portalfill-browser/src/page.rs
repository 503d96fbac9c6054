use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::launcher::LaunchOptions;
use crate::probe::RuntimeProbe;

/// Opaque reference to a live element on the current page.
///
/// Handles go stale when the page navigates; every [`Page`] method taking a
/// handle reports a stale one as an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the attributes the engine needs to rank and fill an element.
///
/// Attribute fields are `None` when the attribute is missing or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    pub tag: String,
    /// Lowercased `type` attribute for `<input>` elements (`"text"` when absent).
    pub input_type: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub role: Option<String>,
    /// Text of a `<label for="...">` pointing at this element.
    pub for_label_text: Option<String>,
    /// Text of the closest enclosing `<label>`.
    pub enclosing_label_text: Option<String>,
    /// Trimmed rendered text of the element itself.
    pub text: String,
    pub content_editable: bool,
    /// Non-zero box and not hidden via `visibility` or `display`.
    pub visible: bool,
    /// `#id` or a short `tag:nth-of-type(n)` chain.
    pub selector_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    SelectAll,
}

/// Page-level primitives. Implementations must bound every wait they perform.
#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> Result<String>;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn go_back(&self) -> Result<()>;

    /// Wait until the document is past the `loading` state.
    async fn wait_until_ready(&self, timeout: Duration) -> Result<()>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo>;

    async fn focus(&self, element: &ElementHandle) -> Result<()>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Replace the value of an `<input>`/`<textarea>` through its native
    /// setter and dispatch bubbling `input` and `change` events. Fails when
    /// the widget refuses programmatic assignment.
    async fn fill_value(&self, element: &ElementHandle, value: &str) -> Result<()>;

    /// Insert `text` one character at a time into the focused element.
    async fn type_text(&self, element: &ElementHandle, text: &str, delay: Duration) -> Result<()>;

    /// Press a key, on `target` when given, otherwise on whatever has focus.
    async fn press_key(&self, target: Option<&ElementHandle>, key: Key) -> Result<()>;

    /// Set `textContent` of a content-editable element and dispatch `input`.
    async fn set_text_content(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Rendered text of the first element matching `selector`, or of the body.
    async fn visible_text(&self, selector: &str) -> Result<String>;

    /// Rendered text of the table row containing `element`, if any.
    async fn enclosing_row_text(&self, element: &ElementHandle) -> Result<Option<String>>;

    /// Free the remote objects behind every handle returned so far. Those
    /// handles are stale afterwards.
    async fn release_handles(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn probe_runtime(&self) -> Result<RuntimeProbe>;

    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Page>>;
}
