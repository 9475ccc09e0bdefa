//! Video links attached to a project.

use serde::{Deserialize, Serialize};

use crate::locator::{Locator, Selector};
use crate::network::{HttpMethod, ResponsePredicate, StatusRange};
use crate::pages::{project_path, PageObject};
use crate::result::E2eResult;
use crate::service::backend::{Document, Resource};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLinkAttributes {
    pub name: String,
    pub url: String,
}

pub type VideoLink = Resource<VideoLinkAttributes>;

#[derive(Debug, Clone)]
pub struct VideoLinkPage {
    session: Session,
}

impl PageObject for VideoLinkPage {
    const NAME: &'static str = "video-link";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        project_path(&self.session, "/videos")
    }
}

impl VideoLinkPage {
    /// Every video link row
    pub fn rows(&self) -> Locator {
        self.session.locator(Selector::test_id("video-link-row"))
    }

    /// Video link row containing `name`
    pub fn row(&self, name: &str) -> Locator {
        self.rows().has_text(name)
    }

    /// Link form submit
    pub fn save_button(&self) -> Locator {
        self.session.locator(Selector::test_id("video-link-save"))
    }

    async fn fill_form(&self, name: &str, url: &str) -> E2eResult<()> {
        self.session.locator(Selector::test_id("video-link-add")).click().await?;
        self.session
            .locator(Selector::test_id("video-link-name-input"))
            .fill(name)
            .await?;
        self.session
            .locator(Selector::test_id("video-link-url-input"))
            .fill(url)
            .await
    }

    /// Whether the form accepts `url`; the modal is left open
    pub async fn accepts_url(&self, name: &str, url: &str) -> E2eResult<bool> {
        self.fill_form(name, url).await?;
        self.save_button().is_enabled().await
    }

    /// Add a link and return it as created
    pub async fn add(&self, name: &str, url: &str) -> E2eResult<VideoLink> {
        tracing::info!(name, "add video link");
        self.fill_form(name, url).await?;
        let save = self.save_button();
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/video-links").with_status(StatusRange::Any))
            .fire(|| save.click())
            .await?;
        let link = response.json::<Document<VideoLink>>()?.data;
        self.session.expect(&self.row(name).first()).to_be_visible().await?;
        Ok(link)
    }

    /// Delete a link; requires `204` and the row gone
    pub async fn delete(&self, name: &str) -> E2eResult<()> {
        tracing::info!(name, "delete video link");
        let row = self.row(name);
        row.locator(Selector::test_id("video-link-delete")).first().click().await?;
        let confirm = self.session.locator(Selector::test_id("confirm-delete"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Delete, "/video-links/").with_status(StatusRange::Any))
            .fire(|| confirm.click())
            .await?;
        response.expect_status(204)?;
        self.session.expect(&row).to_have_count(0).await
    }
}
