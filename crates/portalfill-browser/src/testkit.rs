//! In-memory page and launcher for exercising automation logic without a
//! browser.
//!
//! [`FakePage`] models just enough of a portal: documents keyed by URL, a
//! navigation history, a stack of open modals, and elements that react to
//! clicks and Enter. Selectors support tag, `#id`, `.class`, `[attr]` and
//! `[attr="value"]` compounds joined by commas; combinators are rejected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::launcher::LaunchOptions;
use crate::page::{BrowserLauncher, ElementHandle, ElementInfo, Key, Page};
use crate::probe::RuntimeProbe;

/// What happens when an element is clicked or receives Enter.
#[derive(Debug, Clone, Default)]
pub enum FakeAction {
    #[default]
    None,
    Navigate(String),
    OpenModal(FakeModal),
    CloseModal,
    /// Re-render the current URL with new content, as a client-side app would.
    Replace(FakeDocument),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    info: ElementInfo,
    classes: Vec<String>,
    value: String,
    row_text: Option<String>,
    on_click: FakeAction,
    on_enter: FakeAction,
    rejects_value_assignment: bool,
    rejects_typing: bool,
    rejects_click: bool,
    selected_all: bool,
    events: Vec<String>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        let input_type = (tag == "input").then(|| "text".to_string());
        Self {
            info: ElementInfo {
                tag,
                input_type,
                visible: true,
                ..ElementInfo::default()
            },
            classes: Vec::new(),
            value: String::new(),
            row_text: None,
            on_click: FakeAction::None,
            on_enter: FakeAction::None,
            rejects_value_assignment: false,
            rejects_typing: false,
            rejects_click: false,
            selected_all: false,
            events: Vec::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.info.id = Some(id.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.info.name = Some(name.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn aria_label(mut self, label: &str) -> Self {
        self.info.aria_label = Some(label.to_string());
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.info.placeholder = Some(placeholder.to_string());
        self
    }

    /// Text of a `<label for=...>` pointing at this element.
    pub fn label(mut self, text: &str) -> Self {
        self.info.for_label_text = Some(text.to_string());
        self
    }

    pub fn enclosing_label(mut self, text: &str) -> Self {
        self.info.enclosing_label_text = Some(text.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.info.text = text.to_string();
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.info.role = Some(role.to_string());
        self
    }

    pub fn input_type(mut self, input_type: &str) -> Self {
        self.info.input_type = Some(input_type.to_ascii_lowercase());
        self
    }

    pub fn content_editable(mut self) -> Self {
        self.info.content_editable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.info.visible = false;
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn row_text(mut self, text: &str) -> Self {
        self.row_text = Some(text.to_string());
        self
    }

    pub fn on_click(mut self, action: FakeAction) -> Self {
        self.on_click = action;
        self
    }

    pub fn on_enter(mut self, action: FakeAction) -> Self {
        self.on_enter = action;
        self
    }

    /// Make the native value setter path fail, like a framework-controlled widget.
    pub fn rejects_value_assignment(mut self) -> Self {
        self.rejects_value_assignment = true;
        self
    }

    pub fn rejects_typing(mut self) -> Self {
        self.rejects_typing = true;
        self
    }

    /// Clicks fail, as when the element is detached mid-click.
    pub fn rejects_click(mut self) -> Self {
        self.rejects_click = true;
        self
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.info.id.clone(),
            "name" => self.info.name.clone(),
            "aria-label" => self.info.aria_label.clone(),
            "placeholder" => self.info.placeholder.clone(),
            "role" => self.info.role.clone(),
            "type" => self.info.input_type.clone(),
            "class" => (!self.classes.is_empty()).then(|| self.classes.join(" ")),
            "contenteditable" => self.info.content_editable.then(|| "true".to_string()),
            _ => None,
        }
    }

    fn accepts_text(&self) -> bool {
        matches!(self.info.tag.as_str(), "input" | "textarea") || self.info.content_editable
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeModal {
    elements: Vec<FakeElement>,
    text: String,
    closes_on_escape: bool,
}

impl FakeModal {
    pub fn new(text: &str) -> Self {
        Self {
            elements: Vec::new(),
            text: text.to_string(),
            closes_on_escape: false,
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn closes_on_escape(mut self) -> Self {
        self.closes_on_escape = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    body: String,
    elements: Vec<FakeElement>,
}

impl FakeDocument {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// One recorded click, with the page state at the moment it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeClick {
    pub text: String,
    pub url: String,
    pub open_modals: usize,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Document(usize),
    Modal(usize, usize),
}

#[derive(Debug)]
struct FakeState {
    url: String,
    history: Vec<String>,
    documents: HashMap<String, FakeDocument>,
    modals: Vec<FakeModal>,
    generation: u64,
    clicks: Vec<FakeClick>,
    releases: usize,
    closed: bool,
}

impl FakeState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("Target page has been closed");
        }
        Ok(())
    }

    fn slots(&self) -> Vec<(Slot, &FakeElement)> {
        let mut slots: Vec<(Slot, &FakeElement)> = self
            .documents
            .get(&self.url)
            .map(|doc| {
                doc.elements
                    .iter()
                    .enumerate()
                    .map(|(idx, el)| (Slot::Document(idx), el))
                    .collect()
            })
            .unwrap_or_default();
        for (depth, modal) in self.modals.iter().enumerate() {
            slots.extend(
                modal
                    .elements
                    .iter()
                    .enumerate()
                    .map(|(idx, el)| (Slot::Modal(depth, idx), el)),
            );
        }
        slots
    }

    fn handle_for(&self, slot: Slot) -> ElementHandle {
        match slot {
            Slot::Document(idx) => ElementHandle::new(format!("g{}:d:{idx}", self.generation)),
            Slot::Modal(depth, idx) => {
                ElementHandle::new(format!("g{}:m{depth}:{idx}", self.generation))
            }
        }
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<Slot> {
        let stale = || anyhow!("Element handle {handle} is stale");
        let mut parts = handle.id().split(':');
        let generation = parts
            .next()
            .and_then(|g| g.strip_prefix('g'))
            .and_then(|g| g.parse::<u64>().ok())
            .ok_or_else(stale)?;
        if generation != self.generation {
            return Err(stale());
        }
        let scope = parts.next().ok_or_else(stale)?;
        let idx = parts
            .next()
            .and_then(|i| i.parse::<usize>().ok())
            .ok_or_else(stale)?;
        let slot = if scope == "d" {
            Slot::Document(idx)
        } else {
            let depth = scope
                .strip_prefix('m')
                .and_then(|d| d.parse::<usize>().ok())
                .ok_or_else(stale)?;
            Slot::Modal(depth, idx)
        };
        self.element(slot).map(|_| slot).ok_or_else(stale)
    }

    fn element(&self, slot: Slot) -> Option<&FakeElement> {
        match slot {
            Slot::Document(idx) => self.documents.get(&self.url)?.elements.get(idx),
            Slot::Modal(depth, idx) => self.modals.get(depth)?.elements.get(idx),
        }
    }

    fn element_mut(&mut self, handle: &ElementHandle) -> Result<&mut FakeElement> {
        let slot = self.resolve(handle)?;
        let element = match slot {
            Slot::Document(idx) => self
                .documents
                .get_mut(&self.url)
                .and_then(|doc| doc.elements.get_mut(idx)),
            Slot::Modal(depth, idx) => self
                .modals
                .get_mut(depth)
                .and_then(|modal| modal.elements.get_mut(idx)),
        };
        element.ok_or_else(|| anyhow!("Element handle {handle} is stale"))
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        if !self.documents.contains_key(url) {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        }
        self.history.push(url.to_string());
        self.url = url.to_string();
        self.modals.clear();
        self.generation += 1;
        Ok(())
    }

    fn perform(&mut self, action: FakeAction) -> Result<()> {
        match action {
            FakeAction::None => Ok(()),
            FakeAction::Navigate(url) => self.navigate(&url),
            FakeAction::OpenModal(modal) => {
                self.modals.push(modal);
                Ok(())
            }
            FakeAction::CloseModal => {
                self.modals.pop();
                Ok(())
            }
            FakeAction::Replace(document) => {
                self.documents.insert(self.url.clone(), document);
                self.generation += 1;
                Ok(())
            }
        }
    }

    fn body_text(&self) -> String {
        let mut text = self
            .documents
            .get(&self.url)
            .map(|doc| doc.body.clone())
            .unwrap_or_default();
        for modal in &self.modals {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&modal.text);
        }
        text
    }
}

/// Scriptable stand-in for a browser tab.
#[derive(Debug)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new(url: &str, document: FakeDocument) -> Self {
        let mut documents = HashMap::new();
        documents.insert(url.to_string(), document);
        Self {
            state: Mutex::new(FakeState {
                url: url.to_string(),
                history: vec![url.to_string()],
                documents,
                modals: Vec::new(),
                generation: 0,
                clicks: Vec::new(),
                releases: 0,
                closed: false,
            }),
        }
    }

    /// Register another document reachable by navigation.
    pub fn with_document(self, url: &str, document: FakeDocument) -> Self {
        self.lock().documents.insert(url.to_string(), document);
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current value of the element with the given `id` attribute, searching
    /// every registered document and the open modals.
    pub fn value_of(&self, element_id: &str) -> Option<String> {
        self.find_by_id(element_id, |el| el.value.clone())
    }

    pub fn events_of(&self, element_id: &str) -> Vec<String> {
        self.find_by_id(element_id, |el| el.events.clone())
            .unwrap_or_default()
    }

    fn find_by_id<T>(&self, element_id: &str, read: impl Fn(&FakeElement) -> T) -> Option<T> {
        let state = self.lock();
        state
            .documents
            .values()
            .flat_map(|doc| doc.elements.iter())
            .chain(state.modals.iter().flat_map(|m| m.elements.iter()))
            .find(|el| el.info.id.as_deref() == Some(element_id))
            .map(read)
    }

    pub fn current_url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn open_modal_count(&self) -> usize {
        self.lock().modals.len()
    }

    pub fn clicks(&self) -> Vec<FakeClick> {
        self.lock().clicks.clone()
    }

    /// Number of times the handles were released.
    pub fn release_count(&self) -> usize {
        self.lock().releases
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }
}

#[async_trait]
impl Page for FakePage {
    async fn url(&self) -> Result<String> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.url.clone())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.navigate(url)
    }

    async fn go_back(&self) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        if state.history.len() < 2 {
            bail!("No previous history entry");
        }
        state.history.pop();
        state.url = state.history.last().cloned().unwrap_or_default();
        state.modals.clear();
        state.generation += 1;
        Ok(())
    }

    async fn wait_until_ready(&self, _timeout: Duration) -> Result<()> {
        self.lock().ensure_open()
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let state = self.lock();
        state.ensure_open()?;
        let compounds = parse_selector_list(selector)?;
        Ok(state
            .slots()
            .into_iter()
            .filter(|(_, el)| compounds.iter().any(|c| c.matches(el)))
            .map(|(slot, _)| state.handle_for(slot))
            .collect())
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        let state = self.lock();
        state.ensure_open()?;
        let slot = state.resolve(element)?;
        let Some(el) = state.element(slot) else {
            bail!("Element handle {element} is stale");
        };
        let mut info = el.info.clone();
        info.selector_hint = match &info.id {
            Some(id) => format!("#{id}"),
            None => {
                let position = state
                    .slots()
                    .iter()
                    .take_while(|(s, _)| !same_slot(*s, slot))
                    .filter(|(_, other)| other.info.tag == info.tag)
                    .count();
                format!("{}:nth-of-type({})", info.tag, position + 1)
            }
        };
        Ok(info)
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.element_mut(element)?.events.push("focus".to_string());
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let open_modals = state.modals.len();
        let url = state.url.clone();
        let el = state.element_mut(element)?;
        if el.rejects_click {
            bail!("Node is detached from document");
        }
        el.events.push("click".to_string());
        let text = el.info.text.clone();
        let action = el.on_click.clone();
        state.clicks.push(FakeClick {
            text,
            url,
            open_modals,
        });
        state.perform(action)
    }

    async fn fill_value(&self, element: &ElementHandle, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if !matches!(el.info.tag.as_str(), "input" | "textarea") {
            bail!("cannot assign a value to <{}>", el.info.tag);
        }
        if el.rejects_value_assignment {
            bail!("element rejected value assignment");
        }
        el.value = value.to_string();
        el.events
            .extend(["focus", "input", "change"].map(str::to_string));
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str, _delay: Duration) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if el.rejects_typing || !el.accepts_text() {
            bail!("element does not accept keyboard input");
        }
        el.events.push("focus".to_string());
        if el.selected_all {
            el.value.clear();
            el.selected_all = false;
        }
        for ch in text.chars() {
            el.value.push(ch);
            el.events.push("input".to_string());
        }
        Ok(())
    }

    async fn press_key(&self, target: Option<&ElementHandle>, key: Key) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        match (target, key) {
            (Some(handle), Key::SelectAll) => {
                let el = state.element_mut(handle)?;
                el.selected_all = true;
                el.events.push("keydown:SelectAll".to_string());
                Ok(())
            }
            (Some(handle), Key::Enter) => {
                let el = state.element_mut(handle)?;
                el.events.push("keydown:Enter".to_string());
                let action = el.on_enter.clone();
                state.perform(action)
            }
            (Some(handle), Key::Escape) => {
                state
                    .element_mut(handle)?
                    .events
                    .push("keydown:Escape".to_string());
                close_modal_on_escape(&mut state);
                Ok(())
            }
            (None, Key::Escape) => {
                close_modal_on_escape(&mut state);
                Ok(())
            }
            (None, _) => Ok(()),
        }
    }

    async fn set_text_content(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if !el.info.content_editable {
            bail!("element is not content-editable");
        }
        el.value = text.to_string();
        el.events.extend(["focus", "input"].map(str::to_string));
        Ok(())
    }

    async fn visible_text(&self, selector: &str) -> Result<String> {
        let state = self.lock();
        state.ensure_open()?;
        if selector.trim().eq_ignore_ascii_case("body") {
            return Ok(state.body_text());
        }
        let matched = parse_selector_list(selector).ok().and_then(|compounds| {
            state
                .slots()
                .into_iter()
                .find(|(_, el)| compounds.iter().any(|c| c.matches(el)))
                .map(|(_, el)| el.info.text.clone())
        });
        Ok(matched.unwrap_or_else(|| state.body_text()))
    }

    async fn enclosing_row_text(&self, element: &ElementHandle) -> Result<Option<String>> {
        let state = self.lock();
        state.ensure_open()?;
        let slot = state.resolve(element)?;
        Ok(state.element(slot).and_then(|el| el.row_text.clone()))
    }

    async fn release_handles(&self) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.releases += 1;
        state.generation += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

fn close_modal_on_escape(state: &mut FakeState) {
    if state.modals.last().is_some_and(|m| m.closes_on_escape) {
        state.modals.pop();
    }
}

fn same_slot(a: Slot, b: Slot) -> bool {
    match (a, b) {
        (Slot::Document(x), Slot::Document(y)) => x == y,
        (Slot::Modal(d1, x), Slot::Modal(d2, y)) => d1 == d2 && x == y,
        _ => false,
    }
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, element: &FakeElement) -> bool {
        if self.tag.as_ref().is_some_and(|tag| *tag != element.info.tag) {
            return false;
        }
        if self
            .id
            .as_ref()
            .is_some_and(|id| element.info.id.as_ref() != Some(id))
        {
            return false;
        }
        if !self.classes.iter().all(|c| element.classes.contains(c)) {
            return false;
        }
        self.attributes
            .iter()
            .all(|(name, expected)| match (element.attribute(name), expected) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            })
    }
}

fn parse_selector_list(selector: &str) -> Result<Vec<Compound>> {
    selector
        .split(',')
        .map(|part| parse_compound(part.trim()))
        .collect()
}

fn parse_compound(input: &str) -> Result<Compound> {
    if input.is_empty() {
        bail!("'{input}' is not a valid selector");
    }
    let mut compound = Compound::default();
    let mut chars = input.chars().peekable();

    let tag = take_ident(&mut chars);
    if !tag.is_empty() {
        compound.tag = Some(tag.to_ascii_lowercase());
    } else if chars.peek() == Some(&'*') {
        chars.next();
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let id = take_ident(&mut chars);
                if id.is_empty() {
                    bail!("'{input}' is not a valid selector");
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = take_ident(&mut chars);
                if class.is_empty() {
                    bail!("'{input}' is not a valid selector");
                }
                compound.classes.push(class);
            }
            '[' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => body.push(ch),
                        None => bail!("'{input}' is not a valid selector"),
                    }
                }
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (
                        name.trim(),
                        Some(value.trim().trim_matches(['"', '\'']).to_string()),
                    ),
                    None => (body.trim(), None),
                };
                if name.is_empty() {
                    bail!("'{input}' is not a valid selector");
                }
                compound
                    .attributes
                    .push((name.to_ascii_lowercase(), value));
            }
            _ => bail!("'{input}' is not a valid selector"),
        }
    }
    Ok(compound)
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

/// Launcher handing out a shared [`FakePage`].
pub struct FakeLauncher {
    page: Arc<FakePage>,
    available: bool,
    launches: AtomicU32,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            available: true,
            launches: AtomicU32::new(0),
        }
    }

    /// A launcher whose probe reports no Chromium executable.
    pub fn unavailable(page: Arc<FakePage>) -> Self {
        Self {
            available: false,
            ..Self::new(page)
        }
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn probe_runtime(&self) -> Result<RuntimeProbe> {
        Ok(if self.available {
            RuntimeProbe {
                chromium_available: true,
                chromium_path: Some("/usr/bin/fake-chromium".to_string()),
                chromium_version: Some("FakeChromium 1.0".to_string()),
                ready: true,
                notes: Vec::new(),
            }
        } else {
            RuntimeProbe {
                chromium_available: false,
                chromium_path: None,
                chromium_version: None,
                ready: false,
                notes: vec!["Chromium not found.".to_string()],
            }
        })
    }

    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn Page>> {
        if !self.available {
            bail!("Chromium not found.");
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.page.reopen();
        Ok(self.page.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> FakePage {
        FakePage::new(
            "https://portal.test/list",
            FakeDocument::new("Consultations")
                .with(FakeElement::new("input").id("search").name("q"))
                .with(FakeElement::new("textarea").name("history").hidden())
                .with(
                    FakeElement::new("a")
                        .text("View")
                        .on_click(FakeAction::Navigate("https://portal.test/ep/1".into())),
                ),
        )
        .with_document("https://portal.test/ep/1", FakeDocument::new("Episode one"))
    }

    #[tokio::test]
    async fn selector_lists_match_in_document_order() {
        let page = page();
        let handles = page.query_all("a, input[name=\"q\"]").await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(page.describe(&handles[0]).await.unwrap().tag, "input");
        assert!(page.query_all("input[name=").await.is_err());
        assert!(page.query_all("div input").await.is_err());
    }

    #[tokio::test]
    async fn navigation_invalidates_handles_and_back_restores_url() {
        let page = page();
        let link = page.query_all("a").await.unwrap().remove(0);
        page.click(&link).await.unwrap();
        assert_eq!(page.current_url(), "https://portal.test/ep/1");
        assert_eq!(page.visible_text("body").await.unwrap(), "Episode one");
        assert!(page.describe(&link).await.is_err());

        page.go_back().await.unwrap();
        assert_eq!(page.current_url(), "https://portal.test/list");
        assert!(page.describe(&link).await.is_err());
    }

    #[tokio::test]
    async fn select_all_then_typing_replaces_value() {
        let page = page();
        let input = page.query_all("#search").await.unwrap().remove(0);
        page.type_text(&input, "old", Duration::ZERO).await.unwrap();
        page.press_key(Some(&input), Key::SelectAll).await.unwrap();
        page.type_text(&input, "new", Duration::ZERO).await.unwrap();
        assert_eq!(page.value_of("search").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn escape_closes_only_dismissible_modals() {
        let page = FakePage::new(
            "https://portal.test/list",
            FakeDocument::new("List").with(FakeElement::new("button").text("View").on_click(
                FakeAction::OpenModal(FakeModal::new("Details").closes_on_escape()),
            )),
        );
        let button = page.query_all("button").await.unwrap().remove(0);
        page.click(&button).await.unwrap();
        assert_eq!(page.open_modal_count(), 1);
        assert_eq!(page.visible_text("body").await.unwrap(), "List\nDetails");
        page.press_key(None, Key::Escape).await.unwrap();
        assert_eq!(page.open_modal_count(), 0);
    }

    #[tokio::test]
    async fn released_handles_go_stale() {
        let page = page();
        let input = page.query_all("#search").await.unwrap().remove(0);
        page.release_handles().await.unwrap();
        assert_eq!(page.release_count(), 1);
        assert!(page.describe(&input).await.is_err());
        let fresh = page.query_all("#search").await.unwrap().remove(0);
        assert!(page.describe(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn closed_page_rejects_operations() {
        let page = page();
        page.close().await.unwrap();
        assert!(page.url().await.is_err());
        page.reopen();
        assert!(page.url().await.is_ok());
    }
}
