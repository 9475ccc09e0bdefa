//! Locator abstraction for element selection and interaction.
//!
//! A [`Selector`] is a description, never a handle: every call on a
//! [`Locator`] asks the driver to resolve it again, because the application
//! re-renders asynchronously. Actions auto-wait until the target is
//! actionable (attached, visible, enabled, stable, receiving events).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::driver::{Driver, ElementState, KeyEvent, MouseButton, PointerEvent};
use crate::gesture::DragPath;
use crate::result::{E2eError, E2eResult};
use crate::wait::{poll_until, WaitOptions};

/// Default timeout for auto-waiting (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default polling interval for auto-waiting (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// GEOMETRY
// =============================================================================

/// A point in page pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by an offset
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Element bounding box in page pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the box
    #[must_use]
    pub fn center(&self) -> Point {
        self.offset_point(2.0)
    }

    /// `(x + width / divisor, y + height / divisor)`
    ///
    /// Map gestures start from this point; a divisor of 2 is the center,
    /// 4 is the upper-left quadrant's center.
    #[must_use]
    pub fn offset_point(&self, divisor: f64) -> Point {
        let divisor = if divisor.abs() < f64::EPSILON {
            1.0
        } else {
            divisor
        };
        Point::new(self.x + self.width / divisor, self.y + self.height / divisor)
    }

    /// Whether a point falls inside the box (edges inclusive)
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Whether the box has a drawable area
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

// =============================================================================
// SELECTORS
// =============================================================================

/// Semantic description of one or more elements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector
    Css(String),
    /// `data-testid` attribute
    TestId(String),
    /// Visible text; `exact` compares the whole normalized text
    Text {
        /// Text to match
        text: String,
        /// Whole-text match instead of substring
        exact: bool,
    },
    /// Accessible role with an optional accessible name
    Role {
        /// ARIA role
        role: String,
        /// Accessible name
        name: Option<String>,
    },
    /// Arbitrary attribute equality
    Attribute {
        /// Attribute name
        name: String,
        /// Attribute value
        value: String,
    },
    /// Narrow another selector to elements containing text
    HasText {
        /// Selector being filtered
        base: Box<Selector>,
        /// Text the element must contain
        text: String,
    },
    /// `inner` resolved inside each match of `scope`
    Within {
        /// Outer selector
        scope: Box<Selector>,
        /// Inner selector
        inner: Box<Selector>,
    },
    /// Siblings of `anchor` matching a CSS selector
    SiblingOf {
        /// Anchor element
        anchor: Box<Selector>,
        /// CSS the sibling must match
        css: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Substring text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: false,
        }
    }

    /// Whole-text selector
    #[must_use]
    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            exact: true,
        }
    }

    /// Role selector with accessible name
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

    /// Role selector without a name filter
    #[must_use]
    pub fn any_role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    /// Attribute equality selector
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Keep only matches containing `text`
    #[must_use]
    pub fn has_text(self, text: impl Into<String>) -> Self {
        Self::HasText {
            base: Box::new(self),
            text: text.into(),
        }
    }

    /// Resolve `inner` inside this selector's matches
    #[must_use]
    pub fn within(self, inner: Selector) -> Self {
        Self::Within {
            scope: Box::new(self),
            inner: Box::new(inner),
        }
    }

    /// Siblings of this selector's matches that match `css`
    #[must_use]
    pub fn sibling(self, css: impl Into<String>) -> Self {
        Self::SiblingOf {
            anchor: Box::new(self),
            css: css.into(),
        }
    }

    /// Compile to a JavaScript function `(root) => Element[]`
    #[must_use]
    pub fn to_js(&self) -> String {
        match self {
            Self::Css(css) => format!(
                "(root) => Array.from(root.querySelectorAll({}))",
                js_string(css)
            ),
            Self::TestId(id) => Self::css(format!("[data-testid={}]", js_string(id))).to_js(),
            Self::Attribute { name, value } => {
                Self::css(format!("[{name}={}]", js_string(value))).to_js()
            }
            Self::Text { text, exact } => format!(
                "(root) => {{ const want = {want}; const norm = (s) => (s || '').replace(/\\s+/g, ' ').trim(); \
                 const hit = (el) => {cmp}; \
                 return Array.from(root.querySelectorAll('*')).filter((el) => hit(el) && !Array.from(el.children).some(hit)); }}",
                want = js_string(text),
                cmp = if *exact {
                    "norm(el.textContent) === want"
                } else {
                    "norm(el.textContent).includes(want)"
                },
            ),
            Self::Role { role, name } => format!(
                "(root) => {{ const implicit = {implicit}; const role = {role}; const name = {name}; \
                 const norm = (s) => (s || '').replace(/\\s+/g, ' ').trim(); \
                 const nameOf = (el) => norm(el.getAttribute('aria-label') || (el.labels && el.labels[0] && el.labels[0].textContent) || el.getAttribute('title') || el.getAttribute('alt') || el.textContent); \
                 const css = '[role=\"' + role + '\"]' + (implicit[role] ? ',' + implicit[role] : ''); \
                 return Array.from(root.querySelectorAll(css)).filter((el) => name === null || nameOf(el) === name); }}",
                implicit = IMPLICIT_ROLES_JS,
                role = js_string(role),
                name = name.as_deref().map_or_else(|| "null".to_string(), js_string),
            ),
            Self::HasText { base, text } => format!(
                "(root) => ({base})(root).filter((el) => (el.textContent || '').replace(/\\s+/g, ' ').includes({text}))",
                base = base.to_js(),
                text = js_string(text),
            ),
            Self::Within { scope, inner } => format!(
                "(root) => Array.from(new Set(({scope})(root).flatMap((r) => ({inner})(r))))",
                scope = scope.to_js(),
                inner = inner.to_js(),
            ),
            Self::SiblingOf { anchor, css } => format!(
                "(root) => Array.from(new Set(({anchor})(root).flatMap((a) => a.parentElement \
                 ? Array.from(a.parentElement.children).filter((c) => c !== a && c.matches({css})) : [])))",
                anchor = anchor.to_js(),
                css = js_string(css),
            ),
        }
    }
}

const IMPLICIT_ROLES_JS: &str = "{ button: 'button,input[type=button],input[type=submit]', \
     link: 'a[href]', checkbox: 'input[type=checkbox]', radio: 'input[type=radio]', \
     textbox: 'input:not([type]),input[type=text],input[type=email],input[type=password],input[type=number],textarea', \
     heading: 'h1,h2,h3,h4,h5,h6', dialog: 'dialog', combobox: 'select', option: 'option', \
     listitem: 'li', img: 'img', switch: '' }";

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{css}"),
            Self::TestId(id) => write!(f, "[data-testid=\"{id}\"]"),
            Self::Text { text, exact: true } => write!(f, "text=\"{text}\""),
            Self::Text { text, exact: false } => write!(f, "text={text}"),
            Self::Role { role, name: Some(name) } => write!(f, "role={role}[name=\"{name}\"]"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Attribute { name, value } => write!(f, "[{name}=\"{value}\"]"),
            Self::HasText { base, text } => write!(f, "{base}:has-text(\"{text}\")"),
            Self::Within { scope, inner } => write!(f, "{scope} >> {inner}"),
            Self::SiblingOf { anchor, css } => write!(f, "{anchor} ~ {css}"),
        }
    }
}

// =============================================================================
// LOCATOR
// =============================================================================

/// Locator options for customizing behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Timeout for auto-waiting
    pub timeout: Duration,
    /// Polling interval for auto-waiting
    pub poll_interval: Duration,
    /// Pick the n-th match instead of requiring a single match
    pub index: Option<usize>,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            index: None,
        }
    }
}

/// Result of probing for optional UI
#[derive(Debug)]
pub enum Probe {
    /// Element became visible within the budget
    Present,
    /// Budget elapsed without the element becoming visible
    AbsentWithinBudget,
    /// The probe itself failed
    Error(E2eError),
}

impl Probe {
    /// Whether the element was seen
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Whether absence was confirmed
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::AbsentWithinBudget)
    }
}

#[derive(Debug, Clone, Copy)]
struct Actionability {
    enabled: bool,
    stable: bool,
    receives_events: bool,
}

impl Actionability {
    const CLICK: Self = Self {
        enabled: true,
        stable: true,
        receives_events: true,
    };
    const HOVER: Self = Self {
        enabled: false,
        stable: true,
        receives_events: true,
    };
    const EDIT: Self = Self {
        enabled: true,
        stable: false,
        receives_events: false,
    };

    fn unmet(self, state: &ElementState, previous: Option<&ElementState>) -> Option<String> {
        if !state.visible {
            return Some("element is not visible".into());
        }
        let Some(bbox) = state.bounding_box.filter(BoundingBox::has_area) else {
            return Some("element has no bounding box".into());
        };
        if self.enabled && !state.enabled {
            return Some("element is disabled".into());
        }
        if self.stable && previous.and_then(|p| p.bounding_box) != Some(bbox) {
            return Some("element is not stable".into());
        }
        if self.receives_events && !state.receives_events {
            return Some("element does not receive pointer events".into());
        }
        None
    }
}

/// A live, re-resolving handle on a [`Selector`]
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn Driver>,
    selector: Selector,
    options: LocatorOptions,
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("selector", &self.selector.to_string())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.options.index {
            Some(i) => write!(f, "{} >> nth={i}", self.selector),
            None => write!(f, "{}", self.selector),
        }
    }
}

impl Locator {
    /// Create a locator over a driver
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, selector: Selector, options: LocatorOptions) -> Self {
        Self {
            driver,
            selector,
            options,
        }
    }

    /// The selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// The driver this locator resolves against
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Human-readable description for errors and logs
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Pick the n-th match
    #[must_use]
    pub fn nth(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.options.index = Some(index);
        next
    }

    /// Pick the first match
    #[must_use]
    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// Set a custom timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.options.timeout = timeout;
        next
    }

    /// Narrow to matches containing text
    #[must_use]
    pub fn has_text(&self, text: impl Into<String>) -> Self {
        Self::new(
            Arc::clone(&self.driver),
            self.selector.clone().has_text(text),
            LocatorOptions {
                index: None,
                ..self.options.clone()
            },
        )
    }

    /// Resolve `inner` inside this locator's matches
    #[must_use]
    pub fn locator(&self, inner: Selector) -> Self {
        Self::new(
            Arc::clone(&self.driver),
            self.selector.clone().within(inner),
            LocatorOptions {
                index: None,
                ..self.options.clone()
            },
        )
    }

    fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(self.options.timeout)
            .with_poll_interval(self.options.poll_interval)
    }

    fn target_index(&self) -> usize {
        self.options.index.unwrap_or(0)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// All current matches
    pub async fn resolve_all(&self) -> E2eResult<Vec<ElementState>> {
        self.driver.query(&self.selector).await
    }

    /// The targeted element right now, if attached
    pub async fn resolve(&self) -> E2eResult<Option<ElementState>> {
        let mut matches = self.resolve_all().await?;
        match self.options.index {
            Some(i) if i < matches.len() => Ok(Some(matches.swap_remove(i))),
            Some(_) => Ok(None),
            None if matches.len() > 1 => Err(E2eError::StrictModeViolation {
                description: self.description(),
                count: matches.len(),
            }),
            None => Ok(matches.pop()),
        }
    }

    /// Wait for the element to be attached and return its state
    pub async fn state(&self) -> E2eResult<ElementState> {
        let description = format!("{} to be attached", self.description());
        poll_until(&description, &self.wait_options(), move || self.resolve()).await
    }

    async fn wait_actionable(&self, checks: Actionability) -> E2eResult<ElementState> {
        let start = Instant::now();
        let mut previous: Option<ElementState> = None;
        loop {
            let reason = match self.resolve().await? {
                None => "element is not attached".to_string(),
                Some(state) => match checks.unmet(&state, previous.as_ref()) {
                    None => return Ok(state),
                    Some(reason) => {
                        previous = Some(state);
                        reason
                    }
                },
            };
            if start.elapsed() >= self.options.timeout {
                return Err(E2eError::ActionabilityTimeout {
                    description: self.description(),
                    waited_ms: self.options.timeout.as_millis() as u64,
                    reason,
                });
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn actionable_center(&self, checks: Actionability) -> E2eResult<crate::locator::Point> {
        let state = self.wait_actionable(checks).await?;
        state
            .bounding_box
            .map(|b| b.center())
            .ok_or_else(|| E2eError::driver(format!("{} lost its bounding box", self)))
    }

    // =========================================================================
    // Actions
    // =========================================================================

    async fn press_at(&self, button: MouseButton, click_count: u32) -> E2eResult<()> {
        let point = self.actionable_center(Actionability::CLICK).await?;
        tracing::debug!(target = %self, ?button, click_count, "click");
        self.driver.pointer(PointerEvent::Move { point }).await?;
        for count in 1..=click_count {
            self.driver
                .pointer(PointerEvent::Down {
                    point,
                    button,
                    click_count: count,
                })
                .await?;
            self.driver
                .pointer(PointerEvent::Up {
                    point,
                    button,
                    click_count: count,
                })
                .await?;
        }
        Ok(())
    }

    /// Click the element
    pub async fn click(&self) -> E2eResult<()> {
        self.press_at(MouseButton::Left, 1).await
    }

    /// Double-click the element
    pub async fn dblclick(&self) -> E2eResult<()> {
        self.press_at(MouseButton::Left, 2).await
    }

    /// Right-click the element
    pub async fn right_click(&self) -> E2eResult<()> {
        self.press_at(MouseButton::Right, 1).await
    }

    /// Move the pointer over the element
    pub async fn hover(&self) -> E2eResult<()> {
        let point = self.actionable_center(Actionability::HOVER).await?;
        tracing::debug!(target = %self, "hover");
        self.driver.pointer(PointerEvent::Move { point }).await
    }

    /// Replace the element's value
    pub async fn fill(&self, value: &str) -> E2eResult<()> {
        self.wait_actionable(Actionability::EDIT).await?;
        tracing::debug!(target = %self, len = value.len(), "fill");
        self.driver
            .fill(&self.selector, self.target_index(), value)
            .await
    }

    /// Clear the element's value
    pub async fn clear(&self) -> E2eResult<()> {
        self.fill("").await
    }

    /// Focus the element and press a key
    pub async fn press(&self, key: &str) -> E2eResult<()> {
        self.wait_actionable(Actionability::EDIT).await?;
        self.driver.focus(&self.selector, self.target_index()).await?;
        self.driver.key(KeyEvent::Press(key.to_string())).await
    }

    /// Scroll the element into the viewport
    pub async fn scroll_into_view(&self) -> E2eResult<()> {
        self.state().await?;
        self.driver
            .scroll_into_view(&self.selector, self.target_index())
            .await
    }

    async fn set_checked(&self, checked: bool) -> E2eResult<()> {
        let state = self.wait_actionable(Actionability::CLICK).await?;
        if state.checked == Some(checked) {
            return Ok(());
        }
        self.click().await?;
        let description = format!("{} to become checked={checked}", self.description());
        poll_until(&description, &self.wait_options(), move || async move {
            Ok(self
                .resolve()
                .await?
                .filter(|s| s.checked == Some(checked))
                .map(|_| ()))
        })
        .await
        .map_err(|_| E2eError::assertion(description.clone(), checked, !checked))
    }

    /// Ensure a checkbox or radio is checked
    pub async fn check(&self) -> E2eResult<()> {
        self.set_checked(true).await
    }

    /// Ensure a checkbox is unchecked
    pub async fn uncheck(&self) -> E2eResult<()> {
        self.set_checked(false).await
    }

    /// Drag this element onto another in `steps` intermediate moves
    pub async fn drag_to(&self, target: &Self, steps: u32) -> E2eResult<()> {
        let from = self.actionable_center(Actionability::HOVER).await?;
        let to = target.actionable_center(Actionability::HOVER).await?;
        tracing::debug!(source = %self, target = %target, steps, "drag");
        self.driver.pointer(PointerEvent::Move { point: from }).await?;
        self.driver
            .pointer(PointerEvent::Down {
                point: from,
                button: MouseButton::Left,
                click_count: 1,
            })
            .await?;
        for point in DragPath::new(from, to, steps).points() {
            self.driver.pointer(PointerEvent::Move { point }).await?;
        }
        self.driver
            .pointer(PointerEvent::Up {
                point: to,
                button: MouseButton::Left,
                click_count: 1,
            })
            .await
    }

    // =========================================================================
    // State queries
    // =========================================================================

    /// Number of current matches (no waiting)
    pub async fn count(&self) -> E2eResult<usize> {
        Ok(self.resolve_all().await?.len())
    }

    /// Normalized text of the element
    pub async fn text(&self) -> E2eResult<String> {
        Ok(self.state().await?.text)
    }

    /// Normalized text of every match
    pub async fn texts(&self) -> E2eResult<Vec<String>> {
        Ok(self
            .resolve_all()
            .await?
            .into_iter()
            .map(|s| s.text)
            .collect())
    }

    /// Current input value
    pub async fn input_value(&self) -> E2eResult<String> {
        Ok(self.state().await?.value.unwrap_or_default())
    }

    /// An attribute value
    pub async fn attribute(&self, name: &str) -> E2eResult<Option<String>> {
        Ok(self.state().await?.attributes.get(name).cloned())
    }

    /// Whether the element is attached and visible right now
    pub async fn is_visible(&self) -> E2eResult<bool> {
        Ok(self.resolve().await?.is_some_and(|s| s.visible))
    }

    /// Whether the element is enabled
    pub async fn is_enabled(&self) -> E2eResult<bool> {
        Ok(self.state().await?.enabled)
    }

    /// Whether the element is checked
    pub async fn is_checked(&self) -> E2eResult<bool> {
        Ok(self.state().await?.checked.unwrap_or(false))
    }

    /// The element's bounding box; waits for visibility
    pub async fn bounding_box(&self) -> E2eResult<BoundingBox> {
        self.wait_for_visible().await?;
        self.state()
            .await?
            .bounding_box
            .ok_or_else(|| E2eError::driver(format!("{self} has no bounding box")))
    }

    // =========================================================================
    // Waits
    // =========================================================================

    /// Wait until the element is visible
    pub async fn wait_for_visible(&self) -> E2eResult<()> {
        let description = format!("{} to be visible", self.description());
        poll_until(&description, &self.wait_options(), move || async move {
            Ok(self.is_visible().await?.then_some(()))
        })
        .await
    }

    /// Wait until the element is detached or hidden
    pub async fn wait_for_hidden(&self) -> E2eResult<()> {
        let description = format!("{} to be hidden", self.description());
        poll_until(&description, &self.wait_options(), move || async move {
            Ok((!self.is_visible().await?).then_some(()))
        })
        .await
    }

    /// Wait until exactly `expected` elements match
    pub async fn wait_for_count(&self, expected: usize) -> E2eResult<()> {
        let description = format!("{} to match {expected} elements", self.description());
        poll_until(&description, &self.wait_options(), move || async move {
            Ok((self.count().await? == expected).then_some(()))
        })
        .await
    }

    /// Check for optional UI within a short budget
    pub async fn probe(&self, budget: Duration) -> Probe {
        let short = self.with_timeout(budget);
        match short.wait_for_visible().await {
            Ok(()) => Probe::Present,
            Err(E2eError::Timeout { .. }) => Probe::AbsentWithinBudget,
            Err(err) => Probe::Error(err),
        }
    }
}
