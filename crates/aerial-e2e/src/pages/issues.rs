//! Issues: creation, sidebar cards, map markers, pinning and deletion.

use chrono::{DateTime, Utc};

use crate::locator::{Locator, Selector};
use crate::network::{HttpMethod, ResponsePredicate, StatusRange};
use crate::pages::{project_path, PageObject};
use crate::result::{E2eError, E2eResult};
use crate::service::backend::{Document, Issue};
use crate::session::Session;

/// What the sidebar shows for one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCard {
    pub title: String,
    pub status: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
}

#[derive(Debug, Clone)]
pub struct IssuesPage {
    session: Session,
}

impl PageObject for IssuesPage {
    const NAME: &'static str = "issues";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        project_path(&self.session, "/map?panel=issues")
    }
}

impl IssuesPage {
    /// Every issue card in the sidebar
    pub fn cards(&self) -> Locator {
        self.session.locator(Selector::test_id("issue-card"))
    }

    /// Issue card containing `title`
    pub fn card(&self, title: &str) -> Locator {
        self.cards().has_text(title)
    }

    /// Map marker for an issue id
    pub fn marker(&self, issue_id: &str) -> Locator {
        self.session.locator(Selector::css(format!(
            "[data-testid=\"issue-marker\"][data-issue-id=\"{issue_id}\"]"
        )))
    }

    /// Create an issue and return the creation response
    pub async fn create_issue(&self, title: &str, description: &str) -> E2eResult<Issue> {
        tracing::info!(title, "create issue");
        self.session.locator(Selector::test_id("issue-add")).click().await?;
        self.session
            .locator(Selector::test_id("issue-title-input"))
            .fill(title)
            .await?;
        self.session
            .locator(Selector::test_id("issue-description-input"))
            .fill(description)
            .await?;
        let save = self.session.locator(Selector::test_id("issue-save"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/issues").with_status(StatusRange::Any))
            .fire(|| save.click())
            .await?;
        let issue = response.json::<Document<Issue>>()?.data;
        self.session
            .expect(&self.card(title).first())
            .to_be_visible()
            .await?;
        Ok(issue)
    }

    /// Read a sidebar card
    pub async fn read_card(&self, title: &str) -> E2eResult<IssueCard> {
        let card = self.card(title).first();
        let state = card.state().await?;
        let field = |id: &'static str| card.locator(Selector::test_id(id)).first();
        let created_raw = state.attributes.get("data-created-at").cloned().unwrap_or_default();
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map_err(|e| E2eError::Decode {
                context: format!("issue card {title} created-at"),
                message: e.to_string(),
                body: created_raw.clone(),
            })?
            .with_timezone(&Utc);
        Ok(IssueCard {
            title: field("issue-card-title").text().await?,
            status: field("issue-card-status").text().await?,
            creator: field("issue-card-creator").text().await?,
            created_at,
            pinned: state.attributes.get("data-pinned").map(String::as_str) == Some("true"),
        })
    }

    /// Marker tooltip title for an issue
    pub async fn marker_title(&self, issue_id: &str) -> E2eResult<String> {
        let marker = self.marker(issue_id);
        marker.hover().await?;
        let tooltip = self.session.locator(Selector::test_id("issue-tooltip"));
        self.session.expect(&tooltip).to_be_visible().await?;
        tooltip.text().await
    }

    /// Toggle the pin on a card; returns the pinned flag from the response
    pub async fn toggle_pin(&self, title: &str) -> E2eResult<bool> {
        let pin = self
            .card(title)
            .locator(Selector::test_id("issue-pin"))
            .first();
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Patch, "/issues/").with_status(StatusRange::Any))
            .fire(|| pin.click())
            .await?;
        Ok(response.json::<Document<Issue>>()?.data.attributes.pinned)
    }

    /// Delete an issue; requires `204` and the card gone
    pub async fn delete_issue(&self, title: &str) -> E2eResult<()> {
        tracing::info!(title, "delete issue");
        let card = self.card(title);
        card.locator(Selector::test_id("issue-more")).first().click().await?;
        self.session.locator(Selector::test_id("issue-delete")).click().await?;
        let confirm = self.session.locator(Selector::test_id("confirm-delete"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Delete, "/issues/").with_status(StatusRange::Any))
            .fire(|| confirm.click())
            .await?;
        response.expect_status(204)?;
        self.session.expect(&card).to_have_count(0).await
    }
}
