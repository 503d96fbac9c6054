//! [`Page`] implementation backed by a DevTools connection.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cdp::CdpConnection;
use crate::page::{ElementHandle, ElementInfo, Key, Page};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const HISTORY_READY_TIMEOUT: Duration = Duration::from_secs(10);
const NAVIGATION_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Remote objects behind element handles live in this group until released.
const OBJECT_GROUP: &str = "portalfill-handles";

const DESCRIBE_ELEMENT: &str = r#"function () {
  const el = this;
  const attr = (name) => {
    const value = el.getAttribute(name);
    return value && value.trim() ? value.trim() : null;
  };
  const text = (node) => (node && node.textContent && node.textContent.trim() ? node.textContent.trim() : null);
  const cssPath = (node) => {
    if (node.id) return `#${CSS.escape(node.id)}`;
    const parts = [];
    let cur = node;
    for (let depth = 0; cur && cur.nodeType === 1 && depth < 5; depth++) {
      const tag = cur.tagName.toLowerCase();
      if (cur.id) {
        parts.unshift(`#${CSS.escape(cur.id)}`);
        break;
      }
      let idx = 1;
      let sib = cur;
      while ((sib = sib.previousElementSibling)) {
        if (sib.tagName.toLowerCase() === tag) idx++;
      }
      parts.unshift(`${tag}:nth-of-type(${idx})`);
      cur = cur.parentElement;
    }
    return parts.join(' > ');
  };
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const tag = el.tagName.toLowerCase();
  const forLabel = el.id ? document.querySelector(`label[for="${CSS.escape(el.id)}"]`) : null;
  return {
    tag,
    inputType: tag === 'input' ? (el.getAttribute('type') || 'text').toLowerCase() : null,
    id: el.id || null,
    name: attr('name'),
    ariaLabel: attr('aria-label'),
    placeholder: attr('placeholder'),
    role: attr('role'),
    forLabelText: text(forLabel),
    enclosingLabelText: text(el.closest('label')),
    text: (el.innerText || el.textContent || '').trim().slice(0, 500),
    contentEditable: el.isContentEditable || el.getAttribute('contenteditable') === 'true',
    visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
    selectorHint: cssPath(el),
  };
}"#;

const FOCUS_ELEMENT: &str = r#"function () {
  this.scrollIntoView({ block: 'center', inline: 'nearest' });
  this.focus();
  return true;
}"#;

const CLICK_ELEMENT: &str = r#"function () {
  this.scrollIntoView({ block: 'center', inline: 'nearest' });
  this.click();
  return true;
}"#;

const FILL_VALUE: &str = r#"function (value) {
  const el = this;
  const tag = el.tagName.toLowerCase();
  if (tag !== 'input' && tag !== 'textarea') throw new Error(`cannot assign a value to <${tag}>`);
  if (el.disabled || el.readOnly) throw new Error('element does not accept programmatic input');
  el.focus();
  if (typeof el.select === 'function') el.select();
  const proto = tag === 'input' ? HTMLInputElement.prototype : HTMLTextAreaElement.prototype;
  Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
  if (el.value !== value) throw new Error('element rejected value assignment');
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}"#;

const SET_TEXT_CONTENT: &str = r#"function (value) {
  const el = this;
  if (!(el.isContentEditable || el.getAttribute('contenteditable') === 'true')) {
    throw new Error('element is not content-editable');
  }
  el.focus();
  el.textContent = value;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
}"#;

const TYPING_STATE: &str = r#"function () {
  const el = this;
  const tag = el.tagName.toLowerCase();
  const field = tag === 'input' || tag === 'textarea';
  const active = document.activeElement;
  return {
    accepts: (field && !el.disabled && !el.readOnly) || el.isContentEditable,
    focused: active === el || (el.isContentEditable && el.contains(active)),
    current: field ? el.value : (el.textContent || ''),
  };
}"#;

const ROW_TEXT: &str = r#"function () {
  const row = this.closest('tr');
  return row ? row.innerText : null;
}"#;

#[derive(Debug, Clone, Deserialize)]
struct TypingState {
    accepts: bool,
    focused: bool,
    current: String,
}

impl TypingState {
    fn ensure_typable(&self) -> Result<()> {
        if !self.accepts {
            bail!("element does not accept typed input");
        }
        if !self.focused {
            bail!("element did not take focus");
        }
        Ok(())
    }

    /// Whitespace is ignored; widgets normalize line breaks differently.
    fn ensure_typed(&self, text: &str) -> Result<()> {
        let compact = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        if !compact(&self.current).ends_with(&compact(text)) {
            bail!("typed text did not land in the element");
        }
        Ok(())
    }
}

/// Chromium child process plus the throwaway profile it may be using.
pub(crate) struct BrowserProcess {
    child: Child,
    _temp_profile: Option<TempDir>,
}

impl BrowserProcess {
    pub(crate) fn new(child: Child, temp_profile: Option<TempDir>) -> Self {
        Self {
            child,
            _temp_profile: temp_profile,
        }
    }
}

pub struct CdpPage {
    connection: CdpConnection,
    process: Mutex<Option<BrowserProcess>>,
}

impl CdpPage {
    pub(crate) fn new(connection: CdpConnection, process: BrowserProcess) -> Self {
        Self {
            connection,
            process: Mutex::new(Some(process)),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let response = self
            .connection
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        remote_value(response)
    }

    async fn call_on(&self, element: &ElementHandle, function: &str, args: &[Value]) -> Result<Value> {
        let arguments: Vec<Value> = args.iter().map(|value| json!({ "value": value })).collect();
        let response = self
            .connection
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": element.id(),
                    "functionDeclaration": function,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        remote_value(response)
    }

    async fn dispatch_key(&self, key: Key) -> Result<()> {
        for event in key_events(key) {
            self.connection.call("Input.dispatchKeyEvent", event).await?;
        }
        Ok(())
    }

    async fn typing_state(&self, element: &ElementHandle) -> Result<TypingState> {
        let value = self.call_on(element, TYPING_STATE, &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn ready_state(&self) -> Option<String> {
        // The execution context is torn down mid-navigation; treat that as "not yet".
        let state = self.evaluate("document.readyState").await.ok()?;
        state.as_str().map(str::to_string)
    }

    /// Wait for the history navigation to commit to `url` and load.
    async fn wait_for_history_entry(&self, url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.url().await.is_ok_and(|current| current == url)
                && self.ready_state().await.is_some_and(|s| s != "loading")
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("Did not return to {url} within {} ms", timeout.as_millis());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn navigation_history(&self) -> Result<(usize, Vec<Value>)> {
        let history = self
            .connection
            .call("Page.getNavigationHistory", json!({}))
            .await?;
        let current = history["currentIndex"].as_u64().unwrap_or(0) as usize;
        let entries = history["entries"].as_array().cloned().unwrap_or_default();
        Ok((current, entries))
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn url(&self) -> Result<String> {
        let (current, entries) = self.navigation_history().await?;
        match entries.get(current).and_then(|entry| entry["url"].as_str()) {
            Some(url) => Ok(url.to_string()),
            None => bail!("Navigation history has no current entry"),
        }
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let response = self
            .connection
            .call("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = response["errorText"].as_str().filter(|e| !e.is_empty()) {
            bail!("Navigation to {url} failed: {error}");
        }
        self.wait_until_ready(NAVIGATION_READY_TIMEOUT).await
    }

    async fn go_back(&self) -> Result<()> {
        let (current, entries) = self.navigation_history().await?;
        let (entry_id, target_url) = previous_entry(current, &entries)?;
        debug!("Going back to {}", target_url);
        self.connection
            .call(
                "Page.navigateToHistoryEntry",
                json!({ "entryId": entry_id }),
            )
            .await?;
        self.wait_for_history_entry(&target_url, HISTORY_READY_TIMEOUT)
            .await
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ready_state().await.is_some_and(|s| s != "loading") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("Page did not finish loading within {} ms", timeout.as_millis());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let expression = format!(
            "Array.from(document.querySelectorAll({}))",
            serde_json::to_string(selector)?
        );
        let response = self
            .connection
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": false,
                    "objectGroup": OBJECT_GROUP,
                }),
            )
            .await?;
        if let Some(message) = exception_message(&response) {
            bail!("Selector {selector:?} rejected: {message}");
        }
        let Some(array_id) = response["result"]["objectId"].as_str() else {
            return Ok(Vec::new());
        };

        let properties = self
            .connection
            .call(
                "Runtime.getProperties",
                json!({ "objectId": array_id, "ownProperties": true }),
            )
            .await?;
        let handles = array_element_handles(&properties);

        if let Err(e) = self
            .connection
            .call("Runtime.releaseObject", json!({ "objectId": array_id }))
            .await
        {
            debug!("Failed to release query result: {}", e);
        }
        Ok(handles)
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        let value = self.call_on(element, DESCRIBE_ELEMENT, &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        self.call_on(element, FOCUS_ELEMENT, &[]).await.map(|_| ())
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.call_on(element, CLICK_ELEMENT, &[]).await.map(|_| ())
    }

    async fn fill_value(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.call_on(element, FILL_VALUE, &[json!(value)])
            .await
            .map(|_| ())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str, delay: Duration) -> Result<()> {
        self.focus(element).await?;
        self.typing_state(element).await?.ensure_typable()?;
        for ch in text.chars() {
            self.connection
                .call("Input.insertText", json!({ "text": ch.to_string() }))
                .await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.typing_state(element).await?.ensure_typed(text)
    }

    async fn press_key(&self, target: Option<&ElementHandle>, key: Key) -> Result<()> {
        if let Some(element) = target {
            self.focus(element).await?;
        }
        self.dispatch_key(key).await
    }

    async fn set_text_content(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.call_on(element, SET_TEXT_CONTENT, &[json!(text)])
            .await
            .map(|_| ())
    }

    async fn visible_text(&self, selector: &str) -> Result<String> {
        let expression = format!(
            "(() => {{ let el = null; try {{ el = document.querySelector({}); }} catch (_) {{}} el = el || document.body; return el ? (el.innerText || '') : ''; }})()",
            serde_json::to_string(selector)?
        );
        let value = self.evaluate(&expression).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn enclosing_row_text(&self, element: &ElementHandle) -> Result<Option<String>> {
        let value = self.call_on(element, ROW_TEXT, &[]).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn release_handles(&self) -> Result<()> {
        self.connection
            .call(
                "Runtime.releaseObjectGroup",
                json!({ "objectGroup": OBJECT_GROUP }),
            )
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.connection.call("Browser.close", json!({})).await {
            debug!("Browser.close failed: {}", e);
        }
        let mut process = self.process.lock().await;
        if let Some(mut browser) = process.take()
            && let Err(e) = browser.child.kill().await
        {
            warn!("Failed to stop Chromium: {}", e);
        }
        Ok(())
    }
}

/// Unwrap a `Runtime.evaluate`/`callFunctionOn` response into its value,
/// turning a thrown exception into an error.
fn remote_value(response: Value) -> Result<Value> {
    if let Some(message) = exception_message(&response) {
        bail!(message);
    }
    Ok(response["result"]["value"].clone())
}

fn exception_message(response: &Value) -> Option<String> {
    let details = response.get("exceptionDetails")?;
    let message = details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("script threw an exception");
    Some(message.lines().next().unwrap_or(message).to_string())
}

fn previous_entry(current: usize, entries: &[Value]) -> Result<(i64, String)> {
    if current == 0 {
        bail!("No previous history entry");
    }
    let Some(entry) = entries.get(current - 1) else {
        bail!("Navigation history has no entry before {current}");
    };
    let (Some(id), Some(url)) = (entry["id"].as_i64(), entry["url"].as_str()) else {
        bail!("Previous history entry is missing its id or url");
    };
    Ok((id, url.to_string()))
}

fn array_element_handles(properties: &Value) -> Vec<ElementHandle> {
    let mut indexed: Vec<(usize, ElementHandle)> = properties["result"]
        .as_array()
        .map(|props| {
            props
                .iter()
                .filter_map(|prop| {
                    let index = prop["name"].as_str()?.parse::<usize>().ok()?;
                    let object_id = prop["value"]["objectId"].as_str()?;
                    Some((index, ElementHandle::new(object_id)))
                })
                .collect()
        })
        .unwrap_or_default();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, handle)| handle).collect()
}

fn key_events(key: Key) -> Vec<Value> {
    let (key_name, code, key_code, text, modifiers, commands) = match key {
        Key::Enter => ("Enter", "Enter", 13, Some("\r"), 0, None),
        Key::Escape => ("Escape", "Escape", 27, None, 0, None),
        Key::SelectAll => {
            let modifier = if cfg!(target_os = "macos") { 4 } else { 2 };
            ("a", "KeyA", 65, None, modifier, Some(vec!["selectAll"]))
        }
    };

    let mut down = json!({
        "type": "keyDown",
        "key": key_name,
        "code": code,
        "windowsVirtualKeyCode": key_code,
        "nativeVirtualKeyCode": key_code,
        "modifiers": modifiers,
    });
    if let Some(text) = text {
        down["text"] = json!(text);
    }
    if let Some(commands) = commands {
        down["commands"] = json!(commands);
    }

    let up = json!({
        "type": "keyUp",
        "key": key_name,
        "code": code,
        "windowsVirtualKeyCode": key_code,
        "nativeVirtualKeyCode": key_code,
        "modifiers": modifiers,
    });

    vec![down, up]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thrown_exception_becomes_error() {
        let response = json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "Error: element rejected value assignment\n    at <anonymous>:5:3" }
            }
        });
        let error = remote_value(response).unwrap_err();
        assert_eq!(error.to_string(), "Error: element rejected value assignment");
    }

    #[test]
    fn plain_result_returns_value() {
        let response = json!({ "result": { "type": "string", "value": "complete" } });
        assert_eq!(remote_value(response).unwrap(), json!("complete"));
    }

    #[test]
    fn array_properties_keep_document_order() {
        let properties = json!({
            "result": [
                { "name": "1", "value": { "objectId": "obj-b" } },
                { "name": "length", "value": { "type": "number", "value": 2 } },
                { "name": "0", "value": { "objectId": "obj-a" } },
                { "name": "__proto__", "value": { "objectId": "proto" } }
            ]
        });
        let handles = array_element_handles(&properties);
        let ids: Vec<&str> = handles.iter().map(ElementHandle::id).collect();
        assert_eq!(ids, vec!["obj-a", "obj-b"]);
    }

    fn typing_state(accepts: bool, focused: bool, current: &str) -> TypingState {
        TypingState {
            accepts,
            focused,
            current: current.to_string(),
        }
    }

    #[test]
    fn typing_requires_a_focused_text_target() {
        assert!(typing_state(true, true, "").ensure_typable().is_ok());
        let err = typing_state(false, true, "").ensure_typable().unwrap_err();
        assert!(err.to_string().contains("does not accept"));
        let err = typing_state(true, false, "").ensure_typable().unwrap_err();
        assert!(err.to_string().contains("focus"));
    }

    #[test]
    fn typed_text_must_be_read_back() {
        assert!(typing_state(true, true, "Fever 3 days").ensure_typed("Fever 3 days").is_ok());
        assert!(typing_state(true, true, "Line one\nLine two").ensure_typed("Line one\r\nLine two").is_ok());
        assert!(typing_state(true, true, "").ensure_typed("Fever").is_err());
        assert!(typing_state(true, true, "Fev").ensure_typed("Fever").is_err());
    }

    #[test]
    fn typing_state_parses_from_script_output() {
        let state: TypingState = serde_json::from_value(json!({
            "accepts": false,
            "focused": false,
            "current": "",
        }))
        .unwrap();
        assert!(state.ensure_typable().is_err());
    }

    #[test]
    fn previous_entry_targets_the_list_url() {
        let entries = vec![
            json!({ "id": 3, "url": "https://portal.test/list" }),
            json!({ "id": 4, "url": "https://portal.test/list/1" }),
        ];
        let (id, url) = previous_entry(1, &entries).unwrap();
        assert_eq!(id, 3);
        assert_eq!(url, "https://portal.test/list");
        assert!(previous_entry(0, &entries).is_err());
        assert!(previous_entry(1, &[json!({}), json!({})]).is_err());
    }

    #[test]
    fn enter_sends_carriage_return_on_key_down_only() {
        let events = key_events(Key::Enter);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], json!("keyDown"));
        assert_eq!(events[0]["text"], json!("\r"));
        assert_eq!(events[1]["type"], json!("keyUp"));
        assert!(events[1].get("text").is_none());
    }

    #[test]
    fn select_all_uses_editing_command() {
        let events = key_events(Key::SelectAll);
        assert_eq!(events[0]["commands"], json!(["selectAll"]));
        assert_ne!(events[0]["modifiers"], json!(0));
    }

    #[test]
    fn element_description_parses_from_script_output() {
        let info: ElementInfo = serde_json::from_value(json!({
            "tag": "textarea",
            "inputType": null,
            "id": "fieldHistory",
            "name": null,
            "ariaLabel": null,
            "placeholder": "History of present illness",
            "role": null,
            "forLabelText": "History",
            "enclosingLabelText": null,
            "text": "",
            "contentEditable": false,
            "visible": true,
            "selectorHint": "#fieldHistory"
        }))
        .unwrap();
        assert_eq!(info.tag, "textarea");
        assert_eq!(info.for_label_text.as_deref(), Some("History"));
        assert!(info.visible);
    }
}
