//! Direct HTTP helpers for the backend and the volume calculation service.
//!
//! Each helper issues one request and hands back the raw
//! [`reqwest::Response`] so the caller can assert on status and headers.
//! [`decode_json`] is the shared fail-fast decoder: non-2xx becomes
//! [`E2eError::HttpStatus`], a body outside the schema becomes
//! [`E2eError::Decode`], both carrying the raw text.

pub mod assets;
pub mod auth;
pub mod backend;
pub mod vcm;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::result::{E2eError, E2eResult};

/// Header carrying the external API key
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request authentication
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `X-API-KEY: <key>`
    ApiKey(String),
    /// No credentials
    #[default]
    None,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(********)"),
            Self::ApiKey(_) => f.write_str("ApiKey(********)"),
            Self::None => f.write_str("None"),
        }
    }
}

impl Auth {
    fn headers(&self) -> E2eResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let invalid = |_| E2eError::config("credential contains characters not allowed in a header");
        match self {
            Self::Bearer(token) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(invalid)?,
                );
            }
            Self::ApiKey(key) => {
                headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).map_err(invalid)?);
            }
            Self::None => {}
        }
        Ok(headers)
    }
}

/// Base URL + auth over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    auth: Auth,
}

impl ApiClient {
    /// Create a client without credentials
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .user_agent(concat!("aerial-e2e/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a client over an existing `reqwest::Client`
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            auth: Auth::None,
        }
    }

    /// Same connection pool, different credentials
    #[must_use]
    pub fn with_auth(&self, auth: Auth) -> Self {
        Self {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            auth,
        }
    }

    /// Returns the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current credentials
    pub const fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Absolute URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Authenticated request builder
    pub fn request(&self, method: Method, path: &str) -> E2eResult<RequestBuilder> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "request");
        Ok(self.client.request(method, url).headers(self.auth.headers()?))
    }

    /// GET
    pub async fn get(&self, path: &str) -> E2eResult<Response> {
        Ok(self.request(Method::GET, path)?.send().await?)
    }

    /// GET with query parameters
    pub async fn get_query<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> E2eResult<Response> {
        Ok(self.request(Method::GET, path)?.query(query).send().await?)
    }

    /// POST a JSON body
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> E2eResult<Response> {
        Ok(self.request(Method::POST, path)?.json(body).send().await?)
    }

    /// PATCH a JSON body
    pub async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> E2eResult<Response> {
        Ok(self.request(Method::PATCH, path)?.json(body).send().await?)
    }

    /// DELETE
    pub async fn delete(&self, path: &str) -> E2eResult<Response> {
        Ok(self.request(Method::DELETE, path)?.send().await?)
    }
}

/// Decode a successful JSON response, failing fast otherwise
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> E2eResult<T> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(E2eError::HttpStatus {
            status: status.as_u16(),
            url,
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| E2eError::Decode {
        context: url,
        message: e.to_string(),
        body,
    })
}

/// Require an exact status, returning the response for further checks
pub async fn expect_status(response: Response, expected: StatusCode) -> E2eResult<Response> {
    if response.status() == expected {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(E2eError::HttpStatus { status, url, body })
}
