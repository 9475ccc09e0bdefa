//! Response correlation.
//!
//! UI actions that write to the backend complete asynchronously. Instead of
//! sleeping, a test arms a [`ResponsePredicate`] *before* the triggering
//! action and then awaits the first matching response:
//!
//! ```ignore
//! let created = session
//!     .correlator()
//!     .arm(ResponsePredicate::new(HttpMethod::Post, "/issues").with_status(StatusRange::Success))
//!     .fire(|| issues.submit())
//!     .await?;
//! let issue: IssueEnvelope = created.json()?;
//! ```
//!
//! Arming subscribes to the driver's network stream, so a response that
//! arrives while the action is still running is buffered, never missed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::driver::{Driver, NetworkEvent};
use crate::result::{E2eError, E2eResult};

/// Default budget for a correlated response (15 seconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 15_000;

/// HTTP method for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method
    Any,
}

impl HttpMethod {
    /// Parse from string; unknown methods become `Any`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Any,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check if this method matches another
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        *self == Self::Any || *other == Self::Any || *self == *other
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL pattern for matching responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "**/v2/projects/*/floors")
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Check if a URL matches this pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(pattern) => url == pattern,
            Self::Prefix(pattern) => url.starts_with(pattern.as_str()),
            Self::Contains(pattern) => url.contains(pattern.as_str()),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            Self::Glob(pattern) => glob_matches(pattern, url),
            Self::Any => true,
        }
    }

    /// The textual fragment, for diagnostics
    #[must_use]
    pub fn fragment(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Prefix(p) | Self::Contains(p) | Self::Regex(p) | Self::Glob(p) => p,
            Self::Any => "*",
        }
    }
}

/// `*` (and `**`) match any run of characters, `/` included; the whole URL
/// must match
fn glob_matches(pattern: &str, url: &str) -> bool {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    regex::Regex::new(&format!("^{body}$"))
        .map(|re| re.is_match(url))
        .unwrap_or(false)
}

/// Acceptable response statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusRange {
    /// Any status
    #[default]
    Any,
    /// 200-299
    Success,
    /// One exact code
    Exact(u16),
    /// Inclusive range
    Between(u16, u16),
}

impl StatusRange {
    /// Whether `status` is in range
    #[must_use]
    pub const fn contains(&self, status: u16) -> bool {
        match *self {
            Self::Any => true,
            Self::Success => status >= 200 && status < 300,
            Self::Exact(code) => status == code,
            Self::Between(lo, hi) => status >= lo && status <= hi,
        }
    }
}

/// URL + method + status predicate over completed responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePredicate {
    /// URL pattern
    pub url: UrlPattern,
    /// Method
    pub method: HttpMethod,
    /// Status range
    pub status: StatusRange,
}

impl ResponsePredicate {
    /// Match `method` requests whose URL contains `fragment`, any status
    #[must_use]
    pub fn new(method: HttpMethod, fragment: impl Into<String>) -> Self {
        Self {
            url: UrlPattern::Contains(fragment.into()),
            method,
            status: StatusRange::Any,
        }
    }

    /// Use a custom URL pattern
    #[must_use]
    pub fn with_url(mut self, url: UrlPattern) -> Self {
        self.url = url;
        self
    }

    /// Restrict the status
    #[must_use]
    pub const fn with_status(mut self, status: StatusRange) -> Self {
        self.status = status;
        self
    }

    /// Whether the event satisfies all three parts
    #[must_use]
    pub fn matches(&self, event: &NetworkEvent) -> bool {
        self.method.matches(&event.method)
            && self.url.matches(&event.url)
            && self.status.contains(event.status)
    }
}

impl fmt::Display for ResponsePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url.fragment())?;
        match self.status {
            StatusRange::Any => Ok(()),
            StatusRange::Success => write!(f, " [2xx]"),
            StatusRange::Exact(code) => write!(f, " [{code}]"),
            StatusRange::Between(lo, hi) => write!(f, " [{lo}-{hi}]"),
        }
    }
}

/// A matched response with its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedResponse {
    /// The network event
    pub event: NetworkEvent,
    /// Body text
    pub body: String,
}

impl CorrelatedResponse {
    /// Status code
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.event.status
    }

    /// Request URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.event.url
    }

    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        StatusRange::Success.contains(self.event.status)
    }

    /// Decode the body, failing on non-2xx or malformed JSON
    pub fn json<T: DeserializeOwned>(&self) -> E2eResult<T> {
        if !self.is_success() {
            return Err(E2eError::HttpStatus {
                status: self.status(),
                url: self.event.url.clone(),
                body: self.body.clone(),
            });
        }
        serde_json::from_str(&self.body).map_err(|e| E2eError::Decode {
            context: format!("{} {}", self.event.method, self.event.url),
            message: e.to_string(),
            body: self.body.clone(),
        })
    }

    /// Require an exact status code
    pub fn expect_status(&self, expected: u16) -> E2eResult<&Self> {
        if self.status() == expected {
            Ok(self)
        } else {
            Err(E2eError::HttpStatus {
                status: self.status(),
                url: self.event.url.clone(),
                body: self.body.clone(),
            })
        }
    }
}

/// Factory for armed waits over one driver
#[derive(Clone)]
pub struct ResponseCorrelator {
    driver: Arc<dyn Driver>,
    timeout: Duration,
}

impl fmt::Debug for ResponseCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCorrelator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ResponseCorrelator {
    /// Create a correlator with the default budget
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
        }
    }

    /// Set the default budget for armed waits
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Subscribe now; nothing that happens after this call can be missed
    #[must_use]
    pub fn arm(&self, predicate: ResponsePredicate) -> ArmedResponse {
        tracing::debug!(%predicate, "armed response wait");
        ArmedResponse {
            driver: Arc::clone(&self.driver),
            receiver: self.driver.subscribe_network(),
            predicate,
            timeout: self.timeout,
        }
    }
}

/// A subscribed, not yet resolved response wait
pub struct ArmedResponse {
    driver: Arc<dyn Driver>,
    receiver: broadcast::Receiver<NetworkEvent>,
    predicate: ResponsePredicate,
    timeout: Duration,
}

impl fmt::Debug for ArmedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmedResponse")
            .field("predicate", &self.predicate.to_string())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ArmedResponse {
    /// Override the budget for this wait
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The predicate being waited on
    #[must_use]
    pub const fn predicate(&self) -> &ResponsePredicate {
        &self.predicate
    }

    /// Run the triggering action and the wait together
    pub async fn fire<F, Fut>(self, action: F) -> E2eResult<CorrelatedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let ((), response) = tokio::try_join!(action(), self.wait())?;
        Ok(response)
    }

    /// Await the first matching response
    pub async fn wait(mut self) -> E2eResult<CorrelatedResponse> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_) => {
                    tracing::warn!(predicate = %self.predicate, "no matching response");
                    return Err(E2eError::ResponseTimeout {
                        method: self.predicate.method.to_string(),
                        url_fragment: self.predicate.url.fragment().to_string(),
                        waited_ms: self.timeout.as_millis() as u64,
                    });
                }
                Ok(Ok(event)) if self.predicate.matches(&event) => {
                    tracing::debug!(url = %event.url, status = event.status, "correlated response");
                    let body = self.driver.response_body(&event.request_id).await?;
                    return Ok(CorrelatedResponse { event, body });
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, predicate = %self.predicate, "network stream lagged");
                }
                Ok(Err(RecvError::Closed)) => {
                    return Err(E2eError::driver("network event stream closed"));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use serde::Deserialize;
    use std::collections::HashMap;

    fn event(method: HttpMethod, url: &str, status: u16) -> NetworkEvent {
        NetworkEvent {
            request_id: "r1".into(),
            url: url.into(),
            method,
            status,
            headers: HashMap::new(),
        }
    }

    mod predicate_tests {
        use super::*;

        #[test]
        fn test_all_three_parts_must_match() {
            let predicate = ResponsePredicate::new(HttpMethod::Post, "/issues")
                .with_status(StatusRange::Success);
            assert!(predicate.matches(&event(
                HttpMethod::Post,
                "https://api.example.test/v2/projects/7/issues",
                201
            )));
            assert!(!predicate.matches(&event(HttpMethod::Get, "https://x/issues", 200)));
            assert!(!predicate.matches(&event(HttpMethod::Post, "https://x/floors", 201)));
            assert!(!predicate.matches(&event(HttpMethod::Post, "https://x/issues", 422)));
        }

        #[test]
        fn test_status_ranges() {
            assert!(StatusRange::Any.contains(500));
            assert!(StatusRange::Success.contains(204));
            assert!(!StatusRange::Success.contains(301));
            assert!(StatusRange::Exact(204).contains(204));
            assert!(StatusRange::Between(400, 499).contains(404));
            assert!(!StatusRange::Between(400, 499).contains(500));
        }

        #[test]
        fn test_display_names_method_fragment_and_status() {
            let predicate = ResponsePredicate::new(HttpMethod::Delete, "/floors/")
                .with_status(StatusRange::Exact(204));
            assert_eq!(predicate.to_string(), "DELETE /floors/ [204]");
        }

        #[test]
        fn test_glob_and_regex_patterns() {
            assert!(UrlPattern::Glob("*/v2/projects/*/floors".into())
                .matches("https://api.example.test/v2/projects/12/floors"));
            assert!(!UrlPattern::Glob("https://a/*".into()).matches("https://b/x"));
            assert!(UrlPattern::Regex(r"/measurement-groups/\d+$".into())
                .matches("https://x/v2/projects/1/measurement-groups/55"));
            assert!(!UrlPattern::Regex("(".into()).matches("anything"));
        }

        #[test]
        fn test_glob_backtracks_past_earlier_literal() {
            let url = "https://api.example.test/v2/projects/1/floors/9/floors";
            assert!(UrlPattern::Glob("*/floors".into()).matches(url));
            assert!(UrlPattern::Glob("**/projects/*/floors".into()).matches(url));
            assert!(!UrlPattern::Glob("*/floors".into()).matches("https://x/floors/9"));
        }

        #[test]
        fn test_glob_treats_regex_characters_literally() {
            let glob = UrlPattern::Glob("*/assets?project_id=*".into());
            assert!(glob.matches("https://x/external/v1/assets?project_id=p1"));
            assert!(!glob.matches("https://x/external/v1/assetsXproject_id=p1"));
            assert!(UrlPattern::Glob("*".into()).matches(""));
        }

        #[test]
        fn test_method_parse_round_trip_and_any() {
            assert_eq!(HttpMethod::parse("delete"), HttpMethod::Delete);
            assert_eq!(HttpMethod::parse("BREW"), HttpMethod::Any);
            assert!(HttpMethod::Any.matches(&HttpMethod::Patch));
        }
    }

    mod correlated_tests {
        use super::*;

        #[derive(Debug, Deserialize)]
        struct Created {
            id: u64,
        }

        fn response(status: u16, body: &str) -> CorrelatedResponse {
            CorrelatedResponse {
                event: event(HttpMethod::Post, "https://x/v2/issues", status),
                body: body.into(),
            }
        }

        #[test]
        fn test_json_decodes_success() {
            let created: Created = response(201, r#"{"id":9}"#).json().unwrap();
            assert_eq!(created.id, 9);
        }

        #[test]
        fn test_json_fails_fast_on_error_status() {
            let err = response(500, "boom").json::<Created>().unwrap_err();
            match err {
                E2eError::HttpStatus { status, body, .. } => {
                    assert_eq!(status, 500);
                    assert_eq!(body, "boom");
                }
                other => panic!("unexpected: {other}"),
            }
        }

        #[test]
        fn test_json_malformed_keeps_raw_text() {
            let err = response(200, "<html>").json::<Created>().unwrap_err();
            match err {
                E2eError::Decode { body, .. } => assert_eq!(body, "<html>"),
                other => panic!("unexpected: {other}"),
            }
        }

        #[test]
        fn test_expect_status() {
            assert!(response(204, "").expect_status(204).is_ok());
            assert!(response(200, "").expect_status(204).is_err());
        }
    }

    mod correlator_tests {
        use super::*;

        fn correlator(driver: &Arc<MockDriver>) -> ResponseCorrelator {
            ResponseCorrelator::new(driver.clone()).with_timeout(Duration::from_millis(200))
        }

        #[tokio::test]
        async fn test_response_during_action_is_not_missed() {
            let driver = Arc::new(MockDriver::new());
            let armed = correlator(&driver).arm(ResponsePredicate::new(HttpMethod::Post, "/issues"));
            let emitter = driver.clone();
            let response = armed
                .fire(|| async move {
                    emitter.emit(HttpMethod::Get, "https://x/v2/issues", 200, "[]");
                    emitter.emit(HttpMethod::Post, "https://x/v2/issues", 201, r#"{"id":1}"#);
                    Ok(())
                })
                .await
                .unwrap();
            assert_eq!(response.status(), 201);
            assert_eq!(response.body, r#"{"id":1}"#);
        }

        #[tokio::test]
        async fn test_response_before_arm_is_ignored() {
            let driver = Arc::new(MockDriver::new());
            driver.emit(HttpMethod::Post, "https://x/v2/issues", 201, "{}");
            let err = correlator(&driver)
                .arm(ResponsePredicate::new(HttpMethod::Post, "/issues"))
                .wait()
                .await
                .unwrap_err();
            match err {
                E2eError::ResponseTimeout {
                    method,
                    url_fragment,
                    ..
                } => {
                    assert_eq!(method, "POST");
                    assert_eq!(url_fragment, "/issues");
                }
                other => panic!("unexpected: {other}"),
            }
        }

        #[tokio::test]
        async fn test_action_failure_wins() {
            let driver = Arc::new(MockDriver::new());
            let err = correlator(&driver)
                .arm(ResponsePredicate::new(HttpMethod::Post, "/issues"))
                .fire(|| async { Err(E2eError::driver("click failed")) })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("click failed"));
        }
    }
}
