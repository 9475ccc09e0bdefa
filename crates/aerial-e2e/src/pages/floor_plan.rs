//! Indoor floor plans: create, select, list and delete floors.

use crate::locator::{Locator, Selector};
use crate::network::{HttpMethod, ResponsePredicate, StatusRange};
use crate::pages::components::{Dropdown, Toast};
use crate::pages::{project_path, PageObject};
use crate::result::{E2eError, E2eResult};
use crate::service::backend::{Document, Floor};
use crate::session::Session;

/// Header of the create-floor modal
pub const CREATE_FLOOR_TITLE: &str = "Add Floor";

/// Toast after a successful save
pub const FLOOR_SAVED: &str = "Floor created";

/// Toast after a delete
pub const FLOOR_DELETED: &str = "Floor deleted";

/// Input for the create-floor workflow
#[derive(Debug, Clone, PartialEq)]
pub struct FloorDraft {
    pub name: String,
    /// Label of the plan image to use
    pub plan: String,
    /// Metres
    pub altitude: f64,
}

#[derive(Debug, Clone)]
pub struct FloorPlanPage {
    session: Session,
}

impl PageObject for FloorPlanPage {
    const NAME: &'static str = "floor-plan";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        project_path(&self.session, "/indoor")
    }
}

impl FloorPlanPage {
    /// Opens the new-floor modal
    pub fn add_button(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-add"))
    }

    /// Create/edit floor modal
    pub fn modal(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-modal"))
    }

    /// Heading of the modal, create or edit
    pub fn modal_title(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-modal-title"))
    }

    /// Floor name field
    pub fn name_input(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-name-input"))
    }

    /// Altitude field, metres
    pub fn altitude_input(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-altitude-input"))
    }

    /// Floor plan image picker
    pub fn plan_select(&self) -> Dropdown {
        Dropdown::new(self.session.clone(), Selector::test_id("floor-plan-select"))
    }

    /// Modal submit
    pub fn save_button(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-save"))
    }

    /// Every floor in the list
    pub fn floor_items(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-item"))
    }

    /// Floor list entry containing `name`
    pub fn floor_item(&self, name: &str) -> Locator {
        self.floor_items().has_text(name)
    }

    /// Shown when the project has no floors
    pub fn empty_state(&self) -> Locator {
        self.session.locator(Selector::test_id("floor-empty"))
    }

    /// Open the modal, fill it in, save, and wait for the success toast
    ///
    /// Save must stay disabled until a name and a plan are chosen.
    pub async fn create_floor(&self, draft: &FloorDraft) -> E2eResult<Floor> {
        tracing::info!(floor = %draft.name, "create floor");
        self.add_button().click().await?;
        self.session.expect(&self.modal()).to_be_visible().await?;
        self.session
            .expect(&self.modal_title())
            .to_have_text(CREATE_FLOOR_TITLE)
            .await?;
        self.session.expect(&self.save_button()).to_be_disabled().await?;

        self.name_input().fill(&draft.name).await?;
        self.plan_select().select(&draft.plan).await?;
        self.session.expect(&self.save_button()).to_be_enabled().await?;
        self.altitude_input().fill(&draft.altitude.to_string()).await?;

        let save = self.save_button();
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/floors").with_status(StatusRange::Any))
            .fire(|| save.click())
            .await?;
        let floor = response.json::<Document<Floor>>()?.data;

        Toast::new(self.session.clone()).acknowledge(FLOOR_SAVED).await?;
        self.session.expect(&self.modal()).to_be_hidden().await?;
        Ok(floor)
    }

    /// Names in the floor list
    pub async fn floor_names(&self) -> E2eResult<Vec<String>> {
        self.floor_items().texts().await
    }

    /// Empty state when there are no floors, the list otherwise
    pub async fn assert_list_state(&self) -> E2eResult<usize> {
        let count = self.floor_items().count().await?;
        if count == 0 {
            self.session.expect(&self.empty_state()).to_be_visible().await?;
        } else {
            self.session.expect(&self.empty_state()).to_be_hidden().await?;
        }
        Ok(count)
    }

    /// Whether a floor is the selected one
    pub async fn is_selected(&self, name: &str) -> E2eResult<bool> {
        Ok(self
            .floor_item(name)
            .first()
            .attribute("aria-selected")
            .await?
            .as_deref()
            == Some("true"))
    }

    /// Click a floor and wait for it to be selected
    pub async fn select_floor(&self, name: &str) -> E2eResult<()> {
        let item = self.floor_item(name).first();
        item.click().await?;
        self.session
            .expect(&item)
            .to_have_attribute("aria-selected", "true")
            .await
    }

    /// Re-select the current floor and assert nothing moved
    pub async fn reselect_is_noop(&self, name: &str) -> E2eResult<()> {
        if !self.is_selected(name).await? {
            return Err(E2eError::assertion(
                format!("floor {name} selected before re-selecting"),
                true,
                false,
            ));
        }
        let url = self.session.url().await?;
        self.select_floor(name).await?;
        let after = self.session.url().await?;
        if url != after {
            return Err(E2eError::assertion("url after re-selecting floor", url, after));
        }
        Ok(())
    }

    /// Delete a floor through its row menu; requires `204` and the row gone
    pub async fn delete_floor(&self, name: &str) -> E2eResult<()> {
        tracing::info!(floor = name, "delete floor");
        let row = self.floor_item(name);
        row.first().hover().await?;
        row.locator(Selector::test_id("floor-more")).first().click().await?;
        self.session.locator(Selector::test_id("floor-delete")).click().await?;
        let confirm = self.session.locator(Selector::test_id("confirm-delete"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Delete, "/floors/").with_status(StatusRange::Any))
            .fire(|| confirm.click())
            .await?;
        response.expect_status(204)?;
        Toast::new(self.session.clone()).acknowledge(FLOOR_DELETED).await?;
        self.session.expect(&row).to_have_count(0).await
    }
}
