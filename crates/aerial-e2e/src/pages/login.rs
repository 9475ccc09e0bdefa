//! Login form, onboarding popup and logout.

use crate::config::Credentials;
use crate::locator::{Locator, Probe, Selector};
use crate::network::{CorrelatedResponse, HttpMethod, ResponsePredicate};
use crate::pages::PageObject;
use crate::result::E2eResult;
use crate::service::auth::{LoginResponse, LOGIN_PATH};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct LoginPage {
    session: Session,
}

impl PageObject for LoginPage {
    const NAME: &'static str = "login";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        Ok("/login".to_string())
    }
}

impl LoginPage {
    /// Email field
    pub fn email_input(&self) -> Locator {
        self.session.locator(Selector::test_id("login-email"))
    }

    /// Password field
    pub fn password_input(&self) -> Locator {
        self.session.locator(Selector::test_id("login-password"))
    }

    /// Login button
    pub fn submit_button(&self) -> Locator {
        self.session.locator(Selector::test_id("login-submit"))
    }

    /// Inline credential error
    pub fn error_message(&self) -> Locator {
        self.session.locator(Selector::test_id("login-error"))
    }

    /// First-login onboarding dialog
    pub fn onboarding_popup(&self) -> Locator {
        self.session.locator(Selector::test_id("onboarding-popup"))
    }

    /// Signed-in user menu
    pub fn user_menu(&self) -> Locator {
        self.session.locator(Selector::test_id("user-menu"))
    }

    /// Fill the form and submit, returning the token response
    ///
    /// The response is returned whatever its status so callers can assert
    /// on rejected logins too.
    pub async fn submit(&self, credentials: &Credentials) -> E2eResult<CorrelatedResponse> {
        self.email_input().fill(&credentials.email).await?;
        self.password_input().fill(&credentials.password).await?;
        let submit = self.submit_button();
        self.session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, LOGIN_PATH))
            .fire(|| submit.click())
            .await
    }

    /// Log in through the UI and land past the onboarding popup
    pub async fn login(&self, credentials: &Credentials) -> E2eResult<LoginResponse> {
        self.open().await?;
        let response = self.submit(credentials).await?;
        let body: LoginResponse = response.json()?;
        body.validate(&credentials.email)?;
        self.session.expect(&self.user_menu()).to_be_visible().await?;
        self.dismiss_onboarding().await?;
        tracing::info!(email = %credentials.email, "logged in");
        Ok(body)
    }

    /// Check for the onboarding popup within the probe budget
    pub async fn probe_onboarding(&self) -> Probe {
        self.onboarding_popup().probe(self.session.timeouts().probe).await
    }

    /// Close the onboarding popup if it appeared; true if it was closed
    pub async fn dismiss_onboarding(&self) -> E2eResult<bool> {
        match self.probe_onboarding().await {
            Probe::Present => {
                self.session
                    .locator(Selector::test_id("onboarding-close"))
                    .click()
                    .await?;
                self.session.expect(&self.onboarding_popup()).to_be_hidden().await?;
                Ok(true)
            }
            Probe::AbsentWithinBudget => {
                tracing::debug!("no onboarding popup");
                Ok(false)
            }
            Probe::Error(err) => Err(err),
        }
    }

    /// Text of the form error
    pub async fn error_text(&self) -> E2eResult<String> {
        self.session.expect(&self.error_message()).to_be_visible().await?;
        self.error_message().text().await
    }

    /// Whether the signed-in user menu is showing
    pub async fn is_logged_in(&self) -> E2eResult<bool> {
        self.user_menu().is_visible().await
    }

    /// Sign out and wait for the login route
    pub async fn logout(&self) -> E2eResult<()> {
        self.user_menu().click().await?;
        self.session.locator(Selector::test_id("logout")).click().await?;
        self.session.expect_url().to_contain("/login").await
    }
}
