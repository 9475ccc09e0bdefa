//! Authentication endpoints.

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{decode_json, expect_status, ApiClient};
use crate::config::Credentials;
use crate::result::{E2eError, E2eResult};

/// Token endpoint
pub const LOGIN_PATH: &str = "/v2/auth/token";

/// Password reset request endpoint
pub const PASSWORD_RESET_PATH: &str = "/v2/auth/password/reset";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// `{ data: { attributes: { token, email } } }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    /// Resource
    pub data: LoginData,
}

/// Login resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginData {
    /// Resource type
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Attributes
    pub attributes: LoginAttributes,
}

/// Token and the email it was issued for
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginAttributes {
    /// Bearer token
    pub token: String,
    /// Account email
    pub email: String,
}

impl LoginResponse {
    /// Token was issued for `email` and is non-empty
    pub fn validate(&self, email: &str) -> E2eResult<()> {
        let attrs = &self.data.attributes;
        if attrs.email != email {
            return Err(E2eError::assertion("login response email", email, &attrs.email));
        }
        if attrs.token.trim().is_empty() {
            return Err(E2eError::assertion("login response token", "non-empty token", "\"\""));
        }
        Ok(())
    }

    /// The token
    #[must_use]
    pub fn token(&self) -> &str {
        &self.data.attributes.token
    }
}

/// POST the credentials to the token endpoint
pub async fn login(client: &ApiClient, credentials: &Credentials) -> E2eResult<Response> {
    tracing::info!(email = %credentials.email, "login");
    client
        .post_json(
            LOGIN_PATH,
            &LoginRequest {
                email: &credentials.email,
                password: &credentials.password,
            },
        )
        .await
}

/// Log in and return a validated token
pub async fn token(client: &ApiClient, credentials: &Credentials) -> E2eResult<String> {
    let response = expect_status(login(client, credentials).await?, StatusCode::CREATED).await?;
    let body: LoginResponse = decode_json(response).await?;
    body.validate(&credentials.email)?;
    Ok(body.data.attributes.token)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResetRequest<'a> {
    email: &'a str,
    redirect_url: &'a str,
}

/// Ask for a reset link to be mailed
pub async fn request_password_reset(
    client: &ApiClient,
    email: &str,
    redirect_url: &str,
) -> E2eResult<Response> {
    client
        .post_json(
            PASSWORD_RESET_PATH,
            &PasswordResetRequest {
                email,
                redirect_url,
            },
        )
        .await
}
