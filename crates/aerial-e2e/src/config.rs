//! Environment configuration for live runs.
//!
//! Every variable the suite understands is read once into [`Env`]. A `.env`
//! file in the working directory is loaded first when present, so local runs
//! and CI share the same variable names.

use crate::result::{E2eError, E2eResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the serialized authenticated session
pub const DEFAULT_SESSION_FILE: &str = ".auth/session.json";

/// Which login a test runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// The default account (`EMAIL` / `PASSWORD`)
    #[default]
    Default,
    /// The business-plan account (`V2B_EMAIL` / `V2B_PASSWORD`)
    V2b,
}

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timeout budgets shared by every wait in the suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Polling assertions
    pub assertion: Duration,
    /// Actionability waits before a gesture
    pub action: Duration,
    /// Heavy map/tiles render waits
    pub map_render: Duration,
    /// Short probe for optional UI (onboarding popups)
    pub probe: Duration,
    /// Upper bound for a whole test
    pub test: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            assertion: Duration::from_secs(15),
            action: Duration::from_secs(5),
            map_render: Duration::from_secs(30),
            probe: Duration::from_secs(2),
            test: Duration::from_secs(600),
        }
    }
}

impl Timeouts {
    /// Scale every budget down, for scripted drivers in tests
    #[must_use]
    pub fn scaled(self, divisor: u32) -> Self {
        let divisor = divisor.max(1);
        Self {
            assertion: self.assertion / divisor,
            action: self.action / divisor,
            map_render: self.map_render / divisor,
            probe: self.probe / divisor,
            test: self.test / divisor,
        }
    }
}

/// Browser configuration for the CDP driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl DriverConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Resolved environment
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

/// Variables the suite recognizes
pub const RECOGNIZED_VARS: &[&str] = &[
    "BASE_URL",
    "ADMIN_URL",
    "API_URL",
    "BACKEND_URL",
    "API_KEY",
    "API_KEY_EXPIRED",
    "EMAIL",
    "PASSWORD",
    "V2B_EMAIL",
    "V2B_PASSWORD",
    "PROJECT_ID",
    "RESET_PASSWORD_URL",
    "RESET_PASSWORD_EMAIL",
    "VCM_ELEVATION",
    "VCM_ELEVATION_HTTPS",
    "EMAIL_DOMAIN",
    "MAX_PIXEL_DIFFERENCE",
];

const SECRET_VARS: &[&str] = &["API_KEY", "API_KEY_EXPIRED", "PASSWORD", "V2B_PASSWORD"];

impl Env {
    /// Read the process environment, loading `.env` first if present
    #[must_use]
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let vars = RECOGNIZED_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| ((*name).to_string(), v))
            })
            .collect();
        Self { vars }
    }

    /// Build from an explicit map
    #[must_use]
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up an optional variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Look up a required variable
    pub fn require(&self, name: &str) -> E2eResult<&str> {
        self.get(name)
            .ok_or_else(|| E2eError::config(format!("{name} is not set")))
    }

    /// Web app origin, without trailing slash
    pub fn base_url(&self) -> E2eResult<String> {
        self.require("BASE_URL").map(trim_url)
    }

    /// Admin console origin
    pub fn admin_url(&self) -> E2eResult<String> {
        self.require("ADMIN_URL").map(trim_url)
    }

    /// Public API origin (login, external assets)
    pub fn api_url(&self) -> E2eResult<String> {
        self.require("API_URL").map(trim_url)
    }

    /// Backend origin used for `/v2` calls; falls back to `API_URL`
    pub fn backend_url(&self) -> E2eResult<String> {
        self.get("BACKEND_URL")
            .map(trim_url)
            .map_or_else(|| self.api_url(), Ok)
    }

    /// Volume calculation service origin, preferring the HTTPS endpoint
    pub fn vcm_url(&self) -> E2eResult<String> {
        self.get("VCM_ELEVATION_HTTPS")
            .or_else(|| self.get("VCM_ELEVATION"))
            .map(trim_url)
            .ok_or_else(|| E2eError::config("VCM_ELEVATION_HTTPS or VCM_ELEVATION is not set"))
    }

    /// Valid external API key
    pub fn api_key(&self) -> E2eResult<&str> {
        self.require("API_KEY")
    }

    /// Expired external API key
    pub fn expired_api_key(&self) -> E2eResult<&str> {
        self.require("API_KEY_EXPIRED")
    }

    /// Project every live test runs against
    pub fn project_id(&self) -> E2eResult<&str> {
        self.require("PROJECT_ID")
    }

    /// Credentials for a role
    pub fn credentials(&self, role: Role) -> E2eResult<Credentials> {
        let (email, password) = match role {
            Role::Default => ("EMAIL", "PASSWORD"),
            Role::V2b => ("V2B_EMAIL", "V2B_PASSWORD"),
        };
        Ok(Credentials {
            email: self.require(email)?.to_string(),
            password: self.require(password)?.to_string(),
        })
    }

    /// Domain used for generated invitee emails
    #[must_use]
    pub fn email_domain(&self) -> &str {
        self.get("EMAIL_DOMAIN").unwrap_or("example.test")
    }

    /// Pixel budget for screenshot comparisons
    pub fn max_pixel_difference(&self) -> E2eResult<u64> {
        self.get("MAX_PIXEL_DIFFERENCE").map_or(Ok(0), |raw| {
            raw.trim().parse().map_err(|_| {
                E2eError::config(format!("MAX_PIXEL_DIFFERENCE must be an integer, got '{raw}'"))
            })
        })
    }

    /// Reset-password page and the mailbox that receives the link
    pub fn reset_password(&self) -> E2eResult<(String, String)> {
        Ok((
            trim_url(self.require("RESET_PASSWORD_URL")?),
            self.require("RESET_PASSWORD_EMAIL")?.to_string(),
        ))
    }

    /// Where the stored session lives
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        PathBuf::from(DEFAULT_SESSION_FILE)
    }

    /// Check the variables live browser tests need
    pub fn require_live(&self) -> E2eResult<()> {
        let missing: Vec<&str> = ["BASE_URL", "API_URL", "EMAIL", "PASSWORD", "PROJECT_ID"]
            .into_iter()
            .filter(|name| self.get(name).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(E2eError::config(format!(
                "live run needs {}",
                missing.join(", ")
            )))
        }
    }

    /// Resolved variables with secrets masked, sorted by name
    #[must_use]
    pub fn redacted(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .vars
            .iter()
            .map(|(k, v)| {
                let shown = if SECRET_VARS.contains(&k.as_str()) {
                    "********".to_string()
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect();
        out.sort();
        out
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::from_map([
            ("BASE_URL", "https://app.example.test/"),
            ("API_URL", "https://api.example.test"),
            ("EMAIL", "qa@example.test"),
            ("PASSWORD", "hunter2"),
            ("PROJECT_ID", "4821"),
            ("VCM_ELEVATION", "http://vcm.internal:8080"),
            ("VCM_ELEVATION_HTTPS", "https://vcm.example.test/"),
            ("MAX_PIXEL_DIFFERENCE", "250"),
        ])
    }

    #[test]
    fn test_urls_are_trimmed() {
        let env = env();
        assert_eq!(env.base_url().unwrap(), "https://app.example.test");
        assert_eq!(env.vcm_url().unwrap(), "https://vcm.example.test");
    }

    #[test]
    fn test_backend_falls_back_to_api() {
        assert_eq!(env().backend_url().unwrap(), "https://api.example.test");
    }

    #[test]
    fn test_missing_required_names_the_variable() {
        let err = env().admin_url().unwrap_err();
        assert!(err.to_string().contains("ADMIN_URL"));
    }

    #[test]
    fn test_credentials_per_role() {
        let env = env();
        let creds = env.credentials(Role::Default).unwrap();
        assert_eq!(creds.email, "qa@example.test");
        assert!(env.credentials(Role::V2b).is_err());
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_max_pixel_difference() {
        assert_eq!(env().max_pixel_difference().unwrap(), 250);
        assert_eq!(Env::default().max_pixel_difference().unwrap(), 0);
        let bad = Env::from_map([("MAX_PIXEL_DIFFERENCE", "lots")]);
        assert!(bad.max_pixel_difference().is_err());
    }

    #[test]
    fn test_require_live_lists_missing() {
        assert!(env().require_live().is_ok());
        let err = Env::from_map([("BASE_URL", "x")]).require_live().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("API_URL"));
        assert!(msg.contains("PROJECT_ID"));
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let shown = env().redacted();
        let password = shown.iter().find(|(k, _)| k == "PASSWORD").unwrap();
        assert_eq!(password.1, "********");
        assert!(shown.iter().any(|(k, v)| k == "EMAIL" && v == "qa@example.test"));
    }

    #[test]
    fn test_timeouts_scaled() {
        let t = Timeouts::default().scaled(100);
        assert_eq!(t.assertion, Duration::from_millis(150));
        assert_eq!(t.probe, Duration::from_millis(20));
    }

    #[test]
    fn test_email_domain_default() {
        assert_eq!(Env::default().email_domain(), "example.test");
    }
}
