//! Polling waits and web-first assertions.
//!
//! Every check here re-evaluates against the live application until it
//! passes or the budget runs out. Nothing is sampled once.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::driver::{Driver, ElementState};
use crate::locator::Locator;
use crate::result::{E2eError, E2eResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for assertions (15 seconds)
pub const DEFAULT_ASSERTION_TIMEOUT_MS: u64 = 15_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Overall budget
    pub timeout: Duration,
    /// Delay between evaluations
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_ASSERTION_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Re-run `check` until it yields `Some` or the budget is spent
///
/// Errors from `check` abort the wait immediately.
pub async fn poll_until<T, F, Fut>(
    description: &str,
    options: &WaitOptions,
    mut check: F,
) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if start.elapsed() >= options.timeout {
            return Err(E2eError::Timeout {
                description: description.to_string(),
                ms: options.timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

// =============================================================================
// LOCATOR EXPECTATIONS
// =============================================================================

/// Start an assertion on a locator
#[must_use]
pub fn expect(locator: &Locator) -> LocatorExpect {
    LocatorExpect {
        locator: locator.clone(),
        options: WaitOptions::default(),
        negate: false,
    }
}

/// Retrying assertions over a [`Locator`]
#[derive(Debug, Clone)]
pub struct LocatorExpect {
    locator: Locator,
    options: WaitOptions,
    negate: bool,
}

impl LocatorExpect {
    /// Invert the next assertion
    #[must_use]
    pub const fn not(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Override the budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Override the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.options.poll_interval = poll_interval;
        self
    }

    async fn settle<F, Fut>(&self, what: &str, expected: impl Display, mut observe: F) -> E2eResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = E2eResult<(bool, String)>>,
    {
        let start = Instant::now();
        let actual = loop {
            let (matched, seen) = observe().await?;
            if matched != self.negate {
                return Ok(());
            }
            if start.elapsed() >= self.options.timeout {
                break seen;
            }
            tokio::time::sleep(self.options.poll_interval).await;
        };
        let prefix = if self.negate { "not " } else { "" };
        Err(E2eError::assertion(
            format!("{} {what}", self.locator.description()),
            format!("{prefix}{expected}"),
            actual,
        ))
    }

    async fn observe_state<P>(&self, what: &str, expected: &str, predicate: P) -> E2eResult<()>
    where
        P: Fn(Option<&ElementState>) -> (bool, String),
    {
        let locator = &self.locator;
        let predicate = &predicate;
        self.settle(what, expected, move || async move {
            let state = locator.resolve().await?;
            Ok(predicate(state.as_ref()))
        })
        .await
    }

    /// Element is attached and visible
    pub async fn to_be_visible(&self) -> E2eResult<()> {
        self.observe_state("visibility", "visible", |s| match s {
            Some(s) if s.visible => (true, "visible".into()),
            Some(_) => (false, "hidden".into()),
            None => (false, "detached".into()),
        })
        .await
    }

    /// Element is detached or hidden
    pub async fn to_be_hidden(&self) -> E2eResult<()> {
        self.observe_state("visibility", "hidden", |s| match s {
            Some(s) if s.visible => (false, "visible".into()),
            Some(_) => (true, "hidden".into()),
            None => (true, "detached".into()),
        })
        .await
    }

    /// Element is enabled
    pub async fn to_be_enabled(&self) -> E2eResult<()> {
        self.observe_state("enabled state", "enabled", |s| match s {
            Some(s) if s.enabled => (true, "enabled".into()),
            Some(_) => (false, "disabled".into()),
            None => (false, "detached".into()),
        })
        .await
    }

    /// Element is disabled
    pub async fn to_be_disabled(&self) -> E2eResult<()> {
        self.observe_state("enabled state", "disabled", |s| match s {
            Some(s) if !s.enabled => (true, "disabled".into()),
            Some(_) => (false, "enabled".into()),
            None => (false, "detached".into()),
        })
        .await
    }

    /// Checkbox or radio is checked
    pub async fn to_be_checked(&self) -> E2eResult<()> {
        self.observe_state("checked state", "checked", |s| {
            let checked = s.and_then(|s| s.checked).unwrap_or(false);
            (checked, if checked { "checked" } else { "unchecked" }.into())
        })
        .await
    }

    /// Checkbox or radio is unchecked
    pub async fn to_be_unchecked(&self) -> E2eResult<()> {
        self.observe_state("checked state", "unchecked", |s| {
            let checked = s.and_then(|s| s.checked).unwrap_or(false);
            (!checked, if checked { "checked" } else { "unchecked" }.into())
        })
        .await
    }

    /// Whole normalized text equals `text`
    pub async fn to_have_text(&self, text: &str) -> E2eResult<()> {
        self.observe_state("text", &format!("{text:?}"), |s| {
            let seen = s.map(|s| s.text.clone()).unwrap_or_default();
            (seen == text, format!("{seen:?}"))
        })
        .await
    }

    /// Text contains `text`
    pub async fn to_contain_text(&self, text: &str) -> E2eResult<()> {
        self.observe_state("text", &format!("text containing {text:?}"), |s| {
            let seen = s.map(|s| s.text.clone()).unwrap_or_default();
            (seen.contains(text), format!("{seen:?}"))
        })
        .await
    }

    /// Attribute equals `value`
    pub async fn to_have_attribute(&self, name: &str, value: &str) -> E2eResult<()> {
        self.observe_state(&format!("attribute {name}"), value, |s| {
            match s.and_then(|s| s.attributes.get(name)) {
                Some(seen) => (seen == value, seen.clone()),
                None => (false, "<absent>".into()),
            }
        })
        .await
    }

    /// Input value equals `value`
    pub async fn to_have_value(&self, value: &str) -> E2eResult<()> {
        self.observe_state("value", &format!("{value:?}"), |s| {
            let seen = s.and_then(|s| s.value.clone()).unwrap_or_default();
            (seen == value, format!("{seen:?}"))
        })
        .await
    }

    /// Exactly `expected` elements match
    pub async fn to_have_count(&self, expected: usize) -> E2eResult<()> {
        let locator = &self.locator;
        self.settle("count", expected, move || async move {
            let count = locator.count().await?;
            Ok((count == expected, count.to_string()))
        })
        .await
    }
}

// =============================================================================
// URL EXPECTATIONS
// =============================================================================

/// Start an assertion on the page URL
#[must_use]
pub fn expect_url(driver: &Arc<dyn Driver>) -> UrlExpect {
    UrlExpect {
        driver: Arc::clone(driver),
        options: WaitOptions::default(),
    }
}

/// Retrying assertions over the current URL
#[derive(Debug, Clone)]
pub struct UrlExpect {
    driver: Arc<dyn Driver>,
    options: WaitOptions,
}

impl UrlExpect {
    /// Override the budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    async fn settle(&self, expected: String, matches: impl Fn(&str) -> bool) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            let url = self.driver.current_url().await?;
            if matches(&url) {
                return Ok(());
            }
            if start.elapsed() >= self.options.timeout {
                return Err(E2eError::assertion("page url", expected, url));
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// URL contains `fragment`
    pub async fn to_contain(&self, fragment: &str) -> E2eResult<()> {
        self.settle(format!("url containing {fragment:?}"), |url| url.contains(fragment))
            .await
    }

    /// URL equals `expected`
    pub async fn to_equal(&self, expected: &str) -> E2eResult<()> {
        self.settle(expected.to_string(), |url| url == expected).await
    }
}
