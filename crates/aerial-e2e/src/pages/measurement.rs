//! Measurement groups, sub-groups, items and volume readouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::{KeyEvent, MouseButton, PointerEvent};
use crate::locator::{Locator, Point, Selector};
use crate::network::{HttpMethod, ResponsePredicate, StatusRange};
use crate::pages::components::{Dropdown, Toast};
use crate::pages::{project_path, PageObject};
use crate::result::{E2eError, E2eResult, FailureKind};
use crate::retry::RetryPolicy;
use crate::service::backend::{Document, Resource};
use crate::service::vcm::{BasePlane, VolumeResponse};
use crate::session::Session;

/// Toast after any measurement delete
pub const MEASUREMENT_DELETED: &str = "deleted";

/// Budget for the bulk-delete button before falling back
pub const BULK_DELETE_PROBE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttributes {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementAttributes {
    pub name: String,
    /// `point`, `line`, `polygon` or `volume`
    pub kind: String,
    #[serde(default)]
    pub group_id: Option<String>,
}

pub type MeasurementGroup = Resource<GroupAttributes>;
pub type Measurement = Resource<MeasurementAttributes>;

/// Volume figures as displayed in the detail panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeReadout {
    pub cut: f64,
    pub fill: f64,
    pub volume: f64,
}

impl VolumeReadout {
    /// Displayed figures equal the service's, to display precision
    pub fn assert_matches(&self, api: &VolumeResponse, precision: f64) -> E2eResult<()> {
        let close = |a: f64, b: f64| (a - b).abs() <= precision;
        if close(self.cut, api.cut) && close(self.fill, api.fill) && close(self.volume, api.volume) {
            return Ok(());
        }
        Err(E2eError::assertion(
            "volume panel matches service",
            format!("cut {} fill {} volume {}", api.cut, api.fill, api.volume),
            format!("cut {} fill {} volume {}", self.cut, self.fill, self.volume),
        ))
    }
}

fn parse_figure(raw: &str) -> E2eResult<f64> {
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    numeric.parse().map_err(|e: std::num::ParseFloatError| E2eError::Decode {
        context: "volume readout".into(),
        message: e.to_string(),
        body: raw.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct MeasurementPage {
    session: Session,
}

impl PageObject for MeasurementPage {
    const NAME: &'static str = "measurement";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        project_path(&self.session, "/map?panel=measurements")
    }
}

impl MeasurementPage {
    /// Every measurement group row
    pub fn group_rows(&self) -> Locator {
        self.session.locator(Selector::test_id("group-row"))
    }

    /// Group row containing `name`
    pub fn group_row(&self, name: &str) -> Locator {
        self.group_rows().has_text(name)
    }

    /// Every measurement item
    pub fn items(&self) -> Locator {
        self.session.locator(Selector::test_id("measurement-item"))
    }

    /// Measurement item containing `name`
    pub fn item(&self, name: &str) -> Locator {
        self.items().has_text(name)
    }

    fn name_input(&self) -> Locator {
        self.session.locator(Selector::test_id("group-name-input"))
    }

    fn confirm_delete(&self) -> Locator {
        self.session.locator(Selector::test_id("confirm-delete"))
    }

    /// Volume base plane picker
    pub fn base_plane_select(&self) -> Dropdown {
        Dropdown::new(self.session.clone(), Selector::test_id("base-plane-select"))
    }

    fn toast(&self) -> Toast {
        Toast::new(self.session.clone())
    }

    async fn open_row_menu(&self, row: &Locator, menu_item: &str) -> E2eResult<()> {
        row.first().hover().await?;
        row.locator(Selector::test_id("group-more")).first().click().await?;
        self.session.locator(Selector::test_id(menu_item)).click().await
    }

    async fn save_group(&self, name: &str) -> E2eResult<MeasurementGroup> {
        self.name_input().fill(name).await?;
        let save = self.session.locator(Selector::test_id("group-save"));
        let response = self
            .session
            .correlator()
            .arm(
                ResponsePredicate::new(HttpMethod::Post, "/measurement-groups")
                    .with_status(StatusRange::Any),
            )
            .fire(|| save.click())
            .await?;
        let group = response.json::<Document<MeasurementGroup>>()?.data;
        self.session
            .expect(&self.group_row(name).first())
            .to_be_visible()
            .await?;
        Ok(group)
    }

    /// Create a top-level group
    pub async fn create_group(&self, name: &str) -> E2eResult<MeasurementGroup> {
        tracing::info!(group = name, "create measurement group");
        self.session.locator(Selector::test_id("group-add")).click().await?;
        self.save_group(name).await
    }

    /// Create a group nested under `parent`
    pub async fn create_sub_group(&self, parent: &str, name: &str) -> E2eResult<MeasurementGroup> {
        tracing::info!(parent, group = name, "create sub-group");
        self.open_row_menu(&self.group_row(parent), "group-add-subgroup")
            .await?;
        let group = self.save_group(name).await?;
        if group.attributes.parent_id.is_none() {
            return Err(E2eError::assertion(
                format!("sub-group {name} parent"),
                parent,
                "<none>",
            ));
        }
        Ok(group)
    }

    /// Draw a polygon on the map with points as fractions of the canvas box
    ///
    /// Each vertex is a click; Enter closes the shape.
    pub async fn draw_polygon(&self, vertices: &[(f64, f64)]) -> E2eResult<Measurement> {
        if vertices.len() < 3 {
            return Err(E2eError::config("a polygon needs at least three vertices"));
        }
        self.session.locator(Selector::test_id("tool-polygon")).click().await?;
        let canvas = self.session.locator_with_timeout(
            Selector::test_id("map-canvas"),
            self.session.timeouts().map_render,
        );
        let bbox = canvas.bounding_box().await?;
        let driver = self.session.driver();
        for &(fx, fy) in vertices {
            let point = Point::new(bbox.x + bbox.width * fx, bbox.y + bbox.height * fy);
            driver.pointer(PointerEvent::Move { point }).await?;
            driver
                .pointer(PointerEvent::Down {
                    point,
                    button: MouseButton::Left,
                    click_count: 1,
                })
                .await?;
            driver
                .pointer(PointerEvent::Up {
                    point,
                    button: MouseButton::Left,
                    click_count: 1,
                })
                .await?;
        }
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/measurements").with_status(StatusRange::Any))
            .fire(|| driver.key(KeyEvent::Press("Enter".into())))
            .await?;
        let measurement = response.json::<Document<Measurement>>()?.data;
        self.session
            .expect(&self.item(&measurement.attributes.name).first())
            .to_be_visible()
            .await?;
        Ok(measurement)
    }

    /// Choose a base plane for the selected volume item and return the
    /// service's figures
    pub async fn set_base_plane(&self, plane: BasePlane) -> E2eResult<VolumeResponse> {
        let select = self.base_plane_select();
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/vc/").with_status(StatusRange::Any))
            .fire(|| select.select(plane.label()))
            .await?;
        let volume: VolumeResponse = response.json()?;
        if volume.base_plane != plane {
            return Err(E2eError::assertion("volume base plane", plane, volume.base_plane));
        }
        Ok(volume)
    }

    /// Figures shown in the detail panel
    pub async fn volume_readout(&self) -> E2eResult<VolumeReadout> {
        let read = |id: &'static str| async move {
            let text = self.session.locator(Selector::test_id(id)).text().await?;
            parse_figure(&text)
        };
        Ok(VolumeReadout {
            cut: read("volume-cut").await?,
            fill: read("volume-fill").await?,
            volume: read("volume-net").await?,
        })
    }

    async fn confirm_and_expect_delete(&self, fragment: &str) -> E2eResult<()> {
        let confirm = self.confirm_delete();
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Delete, fragment).with_status(StatusRange::Any))
            .fire(|| confirm.click())
            .await?;
        response.expect_status(204)?;
        Ok(())
    }

    /// Delete a group (or sub-group) through its row menu
    pub async fn delete_group(&self, name: &str) -> E2eResult<()> {
        tracing::info!(group = name, "delete measurement group");
        let row = self.group_row(name);
        self.open_row_menu(&row, "group-delete").await?;
        self.confirm_and_expect_delete("/measurement-groups/").await?;
        self.toast().acknowledge(MEASUREMENT_DELETED).await?;
        self.session.expect(&row).to_have_count(0).await
    }

    /// Delete one measurement item
    pub async fn delete_item(&self, name: &str) -> E2eResult<()> {
        tracing::info!(item = name, "delete measurement");
        let row = self.item(name);
        row.first().hover().await?;
        row.locator(Selector::test_id("item-delete")).first().click().await?;
        self.confirm_and_expect_delete("/measurements/").await?;
        self.toast().acknowledge(MEASUREMENT_DELETED).await?;
        self.session.expect(&row).to_have_count(0).await
    }

    /// Hide then show a group's folder, which re-renders its toolbar
    pub async fn toggle_folder_visibility(&self, group: &str) -> E2eResult<()> {
        let toggle = self
            .group_row(group)
            .locator(Selector::test_id("group-visibility"))
            .first();
        toggle.click().await?;
        toggle.click().await
    }

    /// Select every item in a group and delete them together
    ///
    /// If the bulk-delete button never becomes actionable, the folder's
    /// visibility is toggled and the attempt repeated, at most twice.
    pub async fn bulk_delete(&self, group: &str) -> E2eResult<()> {
        tracing::info!(group, "bulk delete measurements");
        let policy = RetryPolicy::new(2)
            .with_delay(Duration::from_millis(200))
            .recover_from(FailureKind::Actionability);
        policy
            .run(
                "bulk delete",
                move || async move {
                    self.group_row(group)
                        .locator(Selector::test_id("group-select-all"))
                        .first()
                        .check()
                        .await?;
                    self.session
                        .locator(Selector::test_id("bulk-delete"))
                        .with_timeout(BULK_DELETE_PROBE.min(self.session.timeouts().action))
                        .click()
                        .await?;
                    self.confirm_and_expect_delete("/measurements").await
                },
                move |kind| async move {
                    tracing::warn!(?kind, group, "bulk delete button stuck; toggling folder visibility");
                    self.toggle_folder_visibility(group).await
                },
            )
            .await?;
        self.session
            .expect(&self.items())
            .to_have_count(0)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_figure() {
        assert_eq!(parse_figure("20 m³").unwrap(), 20.0);
        assert_eq!(parse_figure("-616.5 m³").unwrap(), -616.5);
        assert_eq!(parse_figure("1,234.5").unwrap(), 1234.5);
        assert!(parse_figure("n/a").is_err());
    }

    #[test]
    fn test_readout_matches_service() {
        let api = VolumeResponse {
            cut: 20.0,
            fill: -616.0,
            volume: -597.0,
            base_plane: BasePlane::Triangulation,
        };
        let ui = VolumeReadout {
            cut: 20.0,
            fill: -616.0,
            volume: -597.0,
        };
        ui.assert_matches(&api, 0.01).unwrap();
        let off = VolumeReadout { cut: 21.0, ..ui };
        assert!(off.assert_matches(&api, 0.01).is_err());
    }
}
