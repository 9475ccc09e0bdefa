//! Browser automation boundary.
//!
//! Everything above this module talks to a [`Driver`]: element queries,
//! synthetic pointer and keyboard input, network subscription and storage
//! state. [`MockDriver`] is a scripted in-memory application used by unit and
//! workflow tests; the chromiumoxide implementation lives in `cdp` behind the
//! `browser` feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::locator::{BoundingBox, Point, Selector};
use crate::network::HttpMethod;
use crate::result::{E2eError, E2eResult};

/// Capacity of the network event channel
pub const NETWORK_CHANNEL_CAPACITY: usize = 512;

// =============================================================================
// SNAPSHOTS AND EVENTS
// =============================================================================

/// Point-in-time snapshot of one element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementState {
    /// Rendered and not hidden by CSS
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
    /// Checkbox/radio state, `None` for non-checkable elements
    pub checked: Option<bool>,
    /// Whitespace-normalized text content
    pub text: String,
    /// Form control value
    pub value: Option<String>,
    /// Layout box, `None` when not rendered
    pub bounding_box: Option<BoundingBox>,
    /// Hit-test at the center lands on this element
    pub receives_events: bool,
    /// Attribute map
    pub attributes: HashMap<String, String>,
}

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    /// Primary
    Left,
    /// Secondary (context menu, map rotate)
    Right,
    /// Wheel button
    Middle,
}

impl MouseButton {
    /// CDP button name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

/// Synthetic pointer input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    /// Move the pointer
    Move {
        /// Target position
        point: Point,
    },
    /// Press a button
    Down {
        /// Position
        point: Point,
        /// Button
        button: MouseButton,
        /// Click count (2 for the second press of a double click)
        click_count: u32,
    },
    /// Release a button
    Up {
        /// Position
        point: Point,
        /// Button
        button: MouseButton,
        /// Click count
        click_count: u32,
    },
    /// Scroll wheel
    Wheel {
        /// Position
        point: Point,
        /// Horizontal delta
        delta_x: f64,
        /// Vertical delta (negative scrolls up, zooming a map in)
        delta_y: f64,
    },
}

impl PointerEvent {
    /// Position of the event
    #[must_use]
    pub const fn point(&self) -> Point {
        match self {
            Self::Move { point }
            | Self::Down { point, .. }
            | Self::Up { point, .. }
            | Self::Wheel { point, .. } => *point,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Down { .. } => "down",
            Self::Up { .. } => "up",
            Self::Wheel { .. } => "wheel",
        }
    }
}

/// Synthetic keyboard input, keys named as in `KeyboardEvent.key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    /// Key down
    Down(String),
    /// Key up
    Up(String),
    /// Down then up
    Press(String),
}

/// A completed network response observed by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// Browser request identifier, used to fetch the body
    pub request_id: String,
    /// Full request URL
    pub url: String,
    /// Request method
    pub method: HttpMethod,
    /// Response status
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
}

// =============================================================================
// STORAGE STATE
// =============================================================================

/// A stored cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain
    pub domain: String,
    /// Path
    pub path: String,
    /// Expiry as unix seconds, -1 for session cookies
    pub expires: f64,
    /// HttpOnly flag
    pub http_only: bool,
    /// Secure flag
    pub secure: bool,
    /// SameSite policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// One localStorage entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Key
    pub name: String,
    /// Value
    pub value: String,
}

/// localStorage contents for one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    /// Origin, e.g. `https://app.example.test`
    pub origin: String,
    /// Entries
    pub local_storage: Vec<StorageEntry>,
}

/// Serialized authenticated session, reused across test files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Cookies
    pub cookies: Vec<StoredCookie>,
    /// Per-origin local storage
    pub origins: Vec<OriginStorage>,
}

impl StorageState {
    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a previously saved session
    pub fn load(path: &Path) -> E2eResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| E2eError::Decode {
            context: path.display().to_string(),
            message: e.to_string(),
            body: text,
        })
    }
}

// =============================================================================
// DRIVER TRAIT
// =============================================================================

/// Browser driver abstraction
///
/// Methods take `&self`: a session hands the same driver to every page object
/// and locator, so implementations use interior mutability.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Navigate to a URL
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Current page URL
    async fn current_url(&self) -> E2eResult<String>;

    /// Reload the page
    async fn reload(&self) -> E2eResult<()>;

    /// Snapshot every element matching the selector, in document order
    async fn query(&self, selector: &Selector) -> E2eResult<Vec<ElementState>>;

    /// Replace the value of the `index`-th match
    async fn fill(&self, selector: &Selector, index: usize, value: &str) -> E2eResult<()>;

    /// Focus the `index`-th match
    async fn focus(&self, selector: &Selector, index: usize) -> E2eResult<()>;

    /// Scroll the `index`-th match into view
    async fn scroll_into_view(&self, selector: &Selector, index: usize) -> E2eResult<()>;

    /// Dispatch a pointer event
    async fn pointer(&self, event: PointerEvent) -> E2eResult<()>;

    /// Dispatch a key event to the focused element
    async fn key(&self, event: KeyEvent) -> E2eResult<()>;

    /// Evaluate a JavaScript expression
    async fn evaluate(&self, script: &str) -> E2eResult<serde_json::Value>;

    /// Subscribe to completed responses from now on
    fn subscribe_network(&self) -> broadcast::Receiver<NetworkEvent>;

    /// Body text of a completed response
    async fn response_body(&self, request_id: &str) -> E2eResult<String>;

    /// Capture cookies and local storage
    async fn storage_state(&self) -> E2eResult<StorageState>;

    /// Restore cookies and local storage
    async fn restore_storage_state(&self, state: &StorageState) -> E2eResult<()>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> E2eResult<Vec<u8>>;

    /// Close the page and browser
    async fn close(&self) -> E2eResult<()>;
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

const MOCK_COLUMN_X: f64 = 1400.0;
const MOCK_ROW_HEIGHT: f64 = 30.0;
const MOCK_ROW_GAP: f64 = 10.0;
const MOCK_WIDTH: f64 = 200.0;

/// An element in the scripted DOM
#[derive(Debug, Clone)]
pub struct MockElement {
    state: ElementState,
    explicit_box: bool,
    scope: Option<String>,
}

impl Default for MockElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MockElement {
    /// A visible, enabled element with an automatic layout box
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ElementState {
                visible: true,
                enabled: true,
                ..ElementState::default()
            },
            explicit_box: false,
            scope: None,
        }
    }

    /// Set text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.state.text = text.into();
        self
    }

    /// Set input value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.state.value = Some(value.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.attributes.insert(name.into(), value.into());
        self
    }

    /// Start hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.state.visible = false;
        self
    }

    /// Start disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.state.enabled = false;
        self
    }

    /// Make checkable with an initial state
    #[must_use]
    pub fn checked(mut self, checked: bool) -> Self {
        self.state.checked = Some(checked);
        self
    }

    /// Place at an explicit box instead of the automatic column
    #[must_use]
    pub fn bbox(mut self, bbox: BoundingBox) -> Self {
        self.state.bounding_box = Some(bbox);
        self.explicit_box = true;
        self
    }

    /// Only resolvable through `scope.within(..)`
    #[must_use]
    pub fn within(mut self, scope: &Selector) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct Stored {
    key: String,
    element: MockElement,
}

type Reaction = Arc<dyn Fn(&mut MockDom<'_>) + Send + Sync>;
type FillReaction = Arc<dyn Fn(&mut MockDom<'_>, &str) + Send + Sync>;
type PointerHandler = Arc<dyn Fn(&mut MockDom<'_>, &PointerEvent) + Send + Sync>;

#[derive(Default)]
struct MockState {
    url: String,
    elements: Vec<Stored>,
    layout_cursor: f64,
    click_reactions: Vec<(String, Reaction)>,
    fill_reactions: Vec<(String, FillReaction)>,
    key_reactions: Vec<(String, Reaction)>,
    navigate_reactions: Vec<Reaction>,
    pointer_handlers: Vec<(String, PointerHandler)>,
    pressed: Option<(usize, MouseButton)>,
    drag_origin: Option<String>,
    focused: Option<usize>,
    bodies: HashMap<String, String>,
    next_request: u64,
    eval_results: VecDeque<serde_json::Value>,
    storage: StorageState,
    screenshot: Vec<u8>,
    history: Vec<String>,
    closed: bool,
}

impl MockState {
    fn insert(&mut self, key: String, mut element: MockElement) {
        if !element.explicit_box {
            element.state.bounding_box = Some(BoundingBox::new(
                MOCK_COLUMN_X,
                self.layout_cursor,
                MOCK_WIDTH,
                MOCK_ROW_HEIGHT,
            ));
            self.layout_cursor += MOCK_ROW_HEIGHT + MOCK_ROW_GAP;
        }
        self.elements.push(Stored { key, element });
    }

    fn matching(&self, selector: &Selector) -> Vec<usize> {
        let key = selector.to_string();
        let direct: Vec<usize> = self.indices(|s| s.key == key && s.element.scope.is_none());
        if !direct.is_empty() {
            return direct;
        }
        match selector {
            Selector::HasText { base, text } => self
                .matching(base)
                .into_iter()
                .filter(|&i| self.elements[i].element.state.text.contains(text.as_str()))
                .collect(),
            Selector::Within { scope, inner } => {
                if self.matching(scope).is_empty() {
                    return Vec::new();
                }
                let scope_key = scope.to_string();
                let inner_key = inner.to_string();
                self.indices(|s| {
                    s.key == inner_key && s.element.scope.as_deref() == Some(scope_key.as_str())
                })
            }
            Selector::Text { text, exact } => self.indices(|s| {
                let own = s.element.state.text.as_str();
                if *exact {
                    own == text
                } else {
                    !own.is_empty() && own.contains(text.as_str())
                }
            }),
            _ => Vec::new(),
        }
    }

    fn indices(&self, keep: impl Fn(&Stored) -> bool) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, s)| keep(s))
            .map(|(i, _)| i)
            .collect()
    }

    fn topmost_at(&self, point: Point) -> Option<usize> {
        self.elements
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| {
                s.element.state.visible
                    && s.element
                        .state
                        .bounding_box
                        .is_some_and(|b| b.contains(point))
            })
            .map(|(i, _)| i)
    }

    fn snapshot(&self, index: usize) -> ElementState {
        let element = &self.elements[index].element;
        let mut state = element.state.clone();
        if state.visible {
            state.receives_events = state
                .bounding_box
                .is_some_and(|b| self.topmost_at(b.center()) == Some(index));
        } else {
            state.bounding_box = None;
            state.receives_events = false;
        }
        state
    }

    fn target(&self, selector: &Selector, index: usize) -> E2eResult<usize> {
        self.matching(selector)
            .get(index)
            .copied()
            .ok_or_else(|| E2eError::driver(format!("no element matches {selector} at index {index}")))
    }
}

/// Mutable view of the scripted DOM handed to reactions
pub struct MockDom<'a> {
    state: &'a mut MockState,
    network: &'a broadcast::Sender<NetworkEvent>,
    clicked: Option<ElementState>,
}

impl fmt::Debug for MockDom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDom")
            .field("url", &self.state.url)
            .field("elements", &self.state.elements.len())
            .finish_non_exhaustive()
    }
}

impl MockDom<'_> {
    fn each(&mut self, selector: &Selector, mut apply: impl FnMut(&mut ElementState)) {
        for i in self.state.matching(selector) {
            apply(&mut self.state.elements[i].element.state);
        }
    }

    /// The element whose click triggered this reaction
    #[must_use]
    pub const fn clicked(&self) -> Option<&ElementState> {
        self.clicked.as_ref()
    }

    /// Current URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.state.url
    }

    /// Change the URL without a navigation reaction
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.state.url = url.into();
    }

    /// Add an element
    pub fn insert(&mut self, selector: &Selector, element: MockElement) {
        self.state.insert(selector.to_string(), element);
    }

    /// Remove every match, returning how many were removed
    pub fn remove(&mut self, selector: &Selector) -> usize {
        let doomed = self.state.matching(selector);
        let before = self.state.elements.len();
        let mut index = 0;
        self.state.elements.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
        before - self.state.elements.len()
    }

    /// Number of matches
    #[must_use]
    pub fn count(&self, selector: &Selector) -> usize {
        self.state.matching(selector).len()
    }

    /// Snapshot of the first match
    #[must_use]
    pub fn element(&self, selector: &Selector) -> Option<ElementState> {
        self.state
            .matching(selector)
            .first()
            .map(|&i| self.state.snapshot(i))
    }

    /// Value of the first match
    #[must_use]
    pub fn value_of(&self, selector: &Selector) -> Option<String> {
        self.element(selector).and_then(|s| s.value)
    }

    /// Show or hide every match
    pub fn set_visible(&mut self, selector: &Selector, visible: bool) {
        self.each(selector, |s| s.visible = visible);
    }

    /// Enable or disable every match
    pub fn set_enabled(&mut self, selector: &Selector, enabled: bool) {
        self.each(selector, |s| s.enabled = enabled);
    }

    /// Set checked state of every match
    pub fn set_checked(&mut self, selector: &Selector, checked: bool) {
        self.each(selector, |s| s.checked = Some(checked));
    }

    /// Set text of every match
    pub fn set_text(&mut self, selector: &Selector, text: &str) {
        self.each(selector, |s| s.text = text.to_string());
    }

    /// Set value of every match
    pub fn set_value(&mut self, selector: &Selector, value: &str) {
        self.each(selector, |s| s.value = Some(value.to_string()));
    }

    /// Set an attribute on every match
    pub fn set_attribute(&mut self, selector: &Selector, name: &str, value: &str) {
        self.each(selector, |s| {
            s.attributes.insert(name.to_string(), value.to_string());
        });
    }

    /// Emit a completed response with a body
    pub fn respond(
        &mut self,
        method: HttpMethod,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> String {
        self.state.next_request += 1;
        let request_id = format!("mock-{}", self.state.next_request);
        self.state.bodies.insert(request_id.clone(), body.into());
        let event = NetworkEvent {
            request_id: request_id.clone(),
            url: url.into(),
            method,
            status,
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        };
        // No subscribers is not an error: nothing was armed for this call
        let _ = self.network.send(event);
        request_id
    }
}

/// Scripted in-memory application for tests
pub struct MockDriver {
    state: Mutex<MockState>,
    network: broadcast::Sender<NetworkEvent>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MockDriver")
            .field("url", &state.url)
            .field("elements", &state.elements.len())
            .field("history", &state.history.len())
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create an empty mock at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        let (network, _) = broadcast::channel(NETWORK_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MockState {
                url: "about:blank".to_string(),
                ..MockState::default()
            }),
            network,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn with_dom<R>(&self, clicked: Option<ElementState>, f: impl FnOnce(&mut MockDom<'_>) -> R) -> R {
        let mut state = self.lock();
        let mut dom = MockDom {
            state: &mut *state,
            network: &self.network,
            clicked,
        };
        f(&mut dom)
    }

    /// Apply a scripted change outside of any reaction
    pub fn script<R>(&self, f: impl FnOnce(&mut MockDom<'_>) -> R) -> R {
        self.with_dom(None, f)
    }

    /// Add an element
    pub fn insert(&self, selector: &Selector, element: MockElement) {
        self.lock().insert(selector.to_string(), element);
    }

    /// Set the current URL
    pub fn set_url(&self, url: impl Into<String>) {
        self.lock().url = url.into();
    }

    /// Run `reaction` after a left click on an element registered under `selector`
    pub fn on_click(
        &self,
        selector: &Selector,
        reaction: impl Fn(&mut MockDom<'_>) + Send + Sync + 'static,
    ) {
        self.lock()
            .click_reactions
            .push((selector.to_string(), Arc::new(reaction)));
    }

    /// Run `reaction` after a fill on an element registered under `selector`
    pub fn on_fill(
        &self,
        selector: &Selector,
        reaction: impl Fn(&mut MockDom<'_>, &str) + Send + Sync + 'static,
    ) {
        self.lock()
            .fill_reactions
            .push((selector.to_string(), Arc::new(reaction)));
    }

    /// Run `reaction` when `key` is pressed
    pub fn on_key(&self, key: &str, reaction: impl Fn(&mut MockDom<'_>) + Send + Sync + 'static) {
        self.lock()
            .key_reactions
            .push((key.to_string(), Arc::new(reaction)));
    }

    /// Run `reaction` after every navigation
    pub fn on_navigate(&self, reaction: impl Fn(&mut MockDom<'_>) + Send + Sync + 'static) {
        self.lock().navigate_reactions.push(Arc::new(reaction));
    }

    /// Receive pointer events landing on (or dragged from) an element
    pub fn on_pointer(
        &self,
        selector: &Selector,
        handler: impl Fn(&mut MockDom<'_>, &PointerEvent) + Send + Sync + 'static,
    ) {
        self.lock()
            .pointer_handlers
            .push((selector.to_string(), Arc::new(handler)));
    }

    /// Queue a result for the next `evaluate`
    pub fn push_eval_result(&self, value: serde_json::Value) {
        self.lock().eval_results.push_back(value);
    }

    /// Bytes returned by `screenshot`
    pub fn set_screenshot(&self, png: Vec<u8>) {
        self.lock().screenshot = png;
    }

    /// Emit a response as if the application had made a request
    pub fn emit(&self, method: HttpMethod, url: &str, status: u16, body: &str) -> String {
        self.script(|dom| dom.respond(method, url, status, body))
    }

    /// Snapshot of the first element matching `selector`
    #[must_use]
    pub fn element(&self, selector: &Selector) -> Option<ElementState> {
        self.script(|dom| dom.element(selector))
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Check if a call with this prefix was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.lock().history.iter().any(|c| c.starts_with(prefix))
    }

    /// Number of calls with this prefix
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn record(&self, call: String) {
        self.lock().history.push(call);
    }

    fn dispatch_pointer(&self, event: PointerEvent) {
        let point = event.point();
        let (handlers, click) = {
            let mut state = self.lock();
            state.history.push(format!(
                "pointer:{}:{:.0},{:.0}",
                event.label(),
                point.x,
                point.y
            ));
            let hit = state.topmost_at(point);
            let mut click = None;
            match event {
                PointerEvent::Down { button, .. } => {
                    if let Some(i) = hit {
                        state.pressed = Some((i, button));
                        state.drag_origin = Some(state.elements[i].key.clone());
                    }
                }
                PointerEvent::Up { button, .. } => {
                    if let (Some(i), Some((pressed, pressed_button))) = (hit, state.pressed.take()) {
                        let target = &mut state.elements[i].element.state;
                        if i == pressed
                            && button == pressed_button
                            && button == MouseButton::Left
                            && target.enabled
                        {
                            if let Some(checked) = target.checked {
                                target.checked = Some(!checked);
                            }
                            state.focused = Some(i);
                            click = Some((state.elements[i].key.clone(), state.snapshot(i)));
                        }
                    }
                }
                PointerEvent::Move { .. } | PointerEvent::Wheel { .. } => {}
            }
            let handlers: Vec<PointerHandler> = state
                .pointer_handlers
                .iter()
                .filter(|(key, _)| {
                    state.drag_origin.as_deref() == Some(key.as_str())
                        || state.elements.iter().any(|s| {
                            &s.key == key
                                && s.element.state.visible
                                && s.element
                                    .state
                                    .bounding_box
                                    .is_some_and(|b| b.contains(point))
                        })
                })
                .map(|(_, h)| Arc::clone(h))
                .collect();
            if matches!(event, PointerEvent::Up { .. }) {
                state.drag_origin = None;
            }
            (handlers, click)
        };

        for handler in handlers {
            self.with_dom(None, |dom| handler(dom, &event));
        }
        if let Some((key, snapshot)) = click {
            let reactions: Vec<Reaction> = self
                .lock()
                .click_reactions
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, r)| Arc::clone(r))
                .collect();
            for reaction in reactions {
                self.with_dom(Some(snapshot.clone()), |dom| reaction(dom));
            }
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let reactions = {
            let mut state = self.lock();
            state.history.push(format!("goto:{url}"));
            state.url = url.to_string();
            state.navigate_reactions.clone()
        };
        for reaction in reactions {
            self.with_dom(None, |dom| reaction(dom));
        }
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn reload(&self) -> E2eResult<()> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn query(&self, selector: &Selector) -> E2eResult<Vec<ElementState>> {
        let state = self.lock();
        Ok(state
            .matching(selector)
            .into_iter()
            .map(|i| state.snapshot(i))
            .collect())
    }

    async fn fill(&self, selector: &Selector, index: usize, value: &str) -> E2eResult<()> {
        let key = {
            let mut state = self.lock();
            state.history.push(format!("fill:{selector}:{value}"));
            let i = state.target(selector, index)?;
            state.elements[i].element.state.value = Some(value.to_string());
            state.focused = Some(i);
            state.elements[i].key.clone()
        };
        let reactions: Vec<FillReaction> = self
            .lock()
            .fill_reactions
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, r)| Arc::clone(r))
            .collect();
        for reaction in reactions {
            self.with_dom(None, |dom| reaction(dom, value));
        }
        Ok(())
    }

    async fn focus(&self, selector: &Selector, index: usize) -> E2eResult<()> {
        let mut state = self.lock();
        state.history.push(format!("focus:{selector}"));
        let i = state.target(selector, index)?;
        state.focused = Some(i);
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &Selector, index: usize) -> E2eResult<()> {
        let mut state = self.lock();
        state.history.push(format!("scroll:{selector}"));
        state.target(selector, index).map(|_| ())
    }

    async fn pointer(&self, event: PointerEvent) -> E2eResult<()> {
        self.dispatch_pointer(event);
        Ok(())
    }

    async fn key(&self, event: KeyEvent) -> E2eResult<()> {
        let (label, key) = match &event {
            KeyEvent::Down(k) => ("down", k.clone()),
            KeyEvent::Up(k) => ("up", k.clone()),
            KeyEvent::Press(k) => ("press", k.clone()),
        };
        let reactions: Vec<Reaction> = {
            let mut state = self.lock();
            state.history.push(format!("key:{label}:{key}"));
            if label == "up" {
                Vec::new()
            } else {
                state
                    .key_reactions
                    .iter()
                    .filter(|(k, _)| *k == key)
                    .map(|(_, r)| Arc::clone(r))
                    .collect()
            }
        };
        for reaction in reactions {
            self.with_dom(None, |dom| reaction(dom));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> E2eResult<serde_json::Value> {
        let mut state = self.lock();
        state.history.push(format!("evaluate:{script}"));
        Ok(state
            .eval_results
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    fn subscribe_network(&self) -> broadcast::Receiver<NetworkEvent> {
        self.network.subscribe()
    }

    async fn response_body(&self, request_id: &str) -> E2eResult<String> {
        self.lock()
            .bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| E2eError::driver(format!("no body recorded for request {request_id}")))
    }

    async fn storage_state(&self) -> E2eResult<StorageState> {
        let mut state = self.lock();
        state.history.push("storage_state".to_string());
        Ok(state.storage.clone())
    }

    async fn restore_storage_state(&self, storage: &StorageState) -> E2eResult<()> {
        let mut state = self.lock();
        state.history.push("restore_storage_state".to_string());
        state.storage = storage.clone();
        Ok(())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        let mut state = self.lock();
        state.history.push("screenshot".to_string());
        Ok(state.screenshot.clone())
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.lock();
        state.history.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod storage_tests {
        use super::*;

        fn sample() -> StorageState {
            StorageState {
                cookies: vec![StoredCookie {
                    name: "session".into(),
                    value: "abc".into(),
                    domain: "app.example.test".into(),
                    path: "/".into(),
                    expires: -1.0,
                    http_only: true,
                    secure: true,
                    same_site: Some("Lax".into()),
                }],
                origins: vec![OriginStorage {
                    origin: "https://app.example.test".into(),
                    local_storage: vec![StorageEntry {
                        name: "token".into(),
                        value: "jwt".into(),
                    }],
                }],
            }
        }

        #[test]
        fn test_save_and_load_creates_parent_dir() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(".auth").join("session.json");
            sample().save(&path).unwrap();
            assert_eq!(StorageState::load(&path).unwrap(), sample());
        }

        #[test]
        fn test_json_uses_camel_case_keys() {
            let json = serde_json::to_string(&sample()).unwrap();
            assert!(json.contains("\"httpOnly\":true"));
            assert!(json.contains("\"localStorage\""));
        }

        #[test]
        fn test_load_malformed_is_decode_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("session.json");
            std::fs::write(&path, "{not json").unwrap();
            let err = StorageState::load(&path).unwrap_err();
            assert!(matches!(err, E2eError::Decode { .. }));
        }

        #[test]
        fn test_is_empty() {
            assert!(StorageState::default().is_empty());
            assert!(!sample().is_empty());
        }
    }

    mod mock_driver_tests {
        use super::*;

        #[tokio::test]
        async fn test_goto_records_history_and_url() {
            let driver = MockDriver::new();
            driver.goto("https://app.example.test/projects").await.unwrap();
            assert_eq!(
                driver.current_url().await.unwrap(),
                "https://app.example.test/projects"
            );
            assert!(driver.was_called("goto:"));
        }

        #[tokio::test]
        async fn test_auto_layout_does_not_overlap() {
            let driver = MockDriver::new();
            driver.insert(&Selector::test_id("a"), MockElement::new());
            driver.insert(&Selector::test_id("b"), MockElement::new());
            let a = driver.element(&Selector::test_id("a")).unwrap();
            let b = driver.element(&Selector::test_id("b")).unwrap();
            assert!(a.receives_events);
            assert!(b.receives_events);
            assert!(a.bounding_box.unwrap().y < b.bounding_box.unwrap().y);
        }

        #[tokio::test]
        async fn test_hidden_element_has_no_box() {
            let driver = MockDriver::new();
            driver.insert(&Selector::test_id("a"), MockElement::new().hidden());
            let a = driver.element(&Selector::test_id("a")).unwrap();
            assert!(a.bounding_box.is_none());
            assert!(!a.receives_events);
        }

        #[tokio::test]
        async fn test_has_text_filters_structurally() {
            let driver = MockDriver::new();
            let rows = Selector::test_id("floor-row");
            driver.insert(&rows, MockElement::new().text("Level 1"));
            driver.insert(&rows, MockElement::new().text("Level 2"));
            let hits = driver.query(&rows.clone().has_text("Level 2")).await.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].text, "Level 2");
        }

        #[tokio::test]
        async fn test_within_requires_scope() {
            let driver = MockDriver::new();
            let modal = Selector::test_id("modal");
            let save = Selector::role("button", "Save");
            driver.insert(&save, MockElement::new().within(&modal));
            assert!(driver.query(&modal.clone().within(save.clone())).await.unwrap().is_empty());
            driver.insert(&modal, MockElement::new());
            assert_eq!(driver.query(&modal.within(save.clone())).await.unwrap().len(), 1);
            assert!(driver.query(&save).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_text_selector_matches_element_text() {
            let driver = MockDriver::new();
            driver.insert(&Selector::test_id("opt"), MockElement::new().text("Average"));
            let hits = driver.query(&Selector::exact_text("Average")).await.unwrap();
            assert_eq!(hits.len(), 1);
        }

        #[tokio::test]
        async fn test_click_emits_network_event() {
            let driver = MockDriver::new();
            let save = Selector::test_id("save");
            driver.insert(&save, MockElement::new());
            driver.on_click(&save, |dom| {
                dom.respond(HttpMethod::Post, "https://api.example.test/v2/floors", 201, "{}");
            });
            let mut rx = driver.subscribe_network();
            let center = driver.element(&save).unwrap().bounding_box.unwrap().center();
            for event in [
                PointerEvent::Down {
                    point: center,
                    button: MouseButton::Left,
                    click_count: 1,
                },
                PointerEvent::Up {
                    point: center,
                    button: MouseButton::Left,
                    click_count: 1,
                },
            ] {
                driver.pointer(event).await.unwrap();
            }
            let event = rx.recv().await.unwrap();
            assert_eq!(event.status, 201);
            assert_eq!(driver.response_body(&event.request_id).await.unwrap(), "{}");
        }

        #[tokio::test]
        async fn test_right_click_does_not_fire_click_reaction() {
            let driver = MockDriver::new();
            let save = Selector::test_id("save");
            driver.insert(&save, MockElement::new());
            driver.on_click(&save, |dom| dom.set_url("clicked"));
            let center = driver.element(&save).unwrap().bounding_box.unwrap().center();
            driver
                .pointer(PointerEvent::Down {
                    point: center,
                    button: MouseButton::Right,
                    click_count: 1,
                })
                .await
                .unwrap();
            driver
                .pointer(PointerEvent::Up {
                    point: center,
                    button: MouseButton::Right,
                    click_count: 1,
                })
                .await
                .unwrap();
            assert_eq!(driver.current_url().await.unwrap(), "about:blank");
        }

        #[tokio::test]
        async fn test_eval_queue_and_close() {
            let driver = MockDriver::new();
            driver.push_eval_result(serde_json::json!(42));
            assert_eq!(driver.evaluate("1").await.unwrap(), 42);
            assert_eq!(driver.evaluate("1").await.unwrap(), serde_json::Value::Null);
            driver.close().await.unwrap();
            assert!(driver.is_closed());
        }
    }
}
