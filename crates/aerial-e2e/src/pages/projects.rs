//! Project list and map-ready wait.

use crate::locator::{Locator, Selector};
use crate::pages::{project_path, PageObject};
use crate::result::E2eResult;
use crate::session::Session;

/// Attribute the map container sets once tiles and models have rendered
pub const MAP_READY_ATTR: &str = "data-ready";

#[derive(Debug, Clone)]
pub struct ProjectsPage {
    session: Session,
}

impl PageObject for ProjectsPage {
    const NAME: &'static str = "projects";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        Ok("/projects".to_string())
    }
}

impl ProjectsPage {
    /// Project search box
    pub fn search_input(&self) -> Locator {
        self.session.locator(Selector::test_id("project-search"))
    }

    /// Every project card
    pub fn cards(&self) -> Locator {
        self.session.locator(Selector::test_id("project-card"))
    }

    /// Project card containing `name`
    pub fn card(&self, name: &str) -> Locator {
        self.cards().has_text(name)
    }

    /// Names of the visible project cards
    pub async fn project_names(&self) -> E2eResult<Vec<String>> {
        self.cards().texts().await
    }

    /// Filter the list and wait for the project to show
    pub async fn search(&self, name: &str) -> E2eResult<()> {
        self.search_input().fill(name).await?;
        self.session.expect(&self.card(name).first()).to_be_visible().await
    }

    /// Open a project from the list
    pub async fn open_project(&self, name: &str) -> E2eResult<()> {
        tracing::info!(project = name, "open project");
        self.card(name).first().click().await?;
        self.session.expect_url().to_contain("/projects/").await?;
        self.wait_for_map_ready().await
    }

    /// Open `PROJECT_ID` directly
    pub async fn open_configured_project(&self) -> E2eResult<()> {
        self.session.goto_path(&project_path(&self.session, "/map")?).await?;
        self.wait_for_map_ready().await
    }

    /// Wait for the map container to report it rendered, with the map budget
    pub async fn wait_for_map_ready(&self) -> E2eResult<()> {
        let budget = self.session.timeouts().map_render;
        let map = self
            .session
            .locator_with_timeout(Selector::test_id("map-canvas"), budget);
        self.session
            .expect(&map)
            .with_timeout(budget)
            .to_have_attribute(MAP_READY_ATTR, "true")
            .await
    }
}
