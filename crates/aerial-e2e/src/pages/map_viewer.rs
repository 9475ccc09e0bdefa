//! Map viewer: camera telemetry, zoom controls, canvas gestures, view mode
//! and screenshot comparison.
//!
//! The map renders to a canvas with no DOM-level pan or zoom API, so
//! gestures are synthesized as pointer sequences over the canvas box and
//! their effect is read back from the `data-*` telemetry on the container.

use std::fmt;
use std::time::Duration;

use crate::gesture::{self, Gesture, GesturePlan, MapTelemetry, TelemetryDelta};
use crate::locator::{Locator, Selector};
use crate::pages::{project_path, PageObject};
use crate::result::{E2eError, E2eResult};
use crate::session::Session;
use crate::visual::{compare_png_masked, MaskRegion, PixelDiff, DEFAULT_COLOR_THRESHOLD};
use crate::wait::{poll_until, WaitOptions};

/// Pause between synthetic pointer events, roughly human speed
pub const GESTURE_PAUSE: Duration = Duration::from_millis(10);

/// Bearing tolerance, in degrees, for a reset to count as north
pub const NORTH_TOLERANCE_DEG: f64 = 1e-6;

/// Whether a bearing points north, either side of 0/360
#[must_use]
pub fn is_north(rotation: f64) -> bool {
    let r = rotation.rem_euclid(360.0);
    r < NORTH_TOLERANCE_DEG || 360.0 - r < NORTH_TOLERANCE_DEG
}

/// 2D or 3D viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Orthographic map
    TwoD,
    /// Perspective scene
    ThreeD,
}

impl ViewMode {
    /// Value of the toggle's `data-mode`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
        }
    }

    fn parse(raw: &str) -> E2eResult<Self> {
        match raw {
            "2d" => Ok(Self::TwoD),
            "3d" => Ok(Self::ThreeD),
            other => Err(E2eError::Decode {
                context: "view mode".into(),
                message: "expected 2d or 3d".into(),
                body: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MapViewerPage {
    session: Session,
}

impl PageObject for MapViewerPage {
    const NAME: &'static str = "map-viewer";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        project_path(&self.session, "/map")
    }
}

impl MapViewerPage {
    /// Map canvas carrying the camera telemetry attributes
    pub fn canvas(&self) -> Locator {
        self.session.locator_with_timeout(
            Selector::test_id("map-canvas"),
            self.session.timeouts().map_render,
        )
    }

    /// Zoom-in control
    pub fn zoom_in_button(&self) -> Locator {
        self.session.locator(Selector::test_id("zoom-in"))
    }

    /// Zoom-out control
    pub fn zoom_out_button(&self) -> Locator {
        self.session.locator(Selector::test_id("zoom-out"))
    }

    /// 2D/3D switch; `data-mode` holds the current mode
    pub fn view_toggle(&self) -> Locator {
        self.session.locator(Selector::test_id("view-mode-toggle"))
    }

    /// Rotate-to-north control
    pub fn reset_north_button(&self) -> Locator {
        self.session.locator(Selector::test_id("reset-north"))
    }

    fn settle_options(&self) -> WaitOptions {
        WaitOptions::new().with_timeout(self.session.timeouts().assertion)
    }

    /// Current camera telemetry
    pub async fn telemetry(&self) -> E2eResult<MapTelemetry> {
        MapTelemetry::from_state(&self.canvas().state().await?)
    }

    /// Wait until telemetry satisfies `check` against `before`
    async fn await_effect(
        &self,
        description: &str,
        before: MapTelemetry,
        check: impl Fn(&MapTelemetry, &MapTelemetry) -> E2eResult<TelemetryDelta>,
    ) -> E2eResult<TelemetryDelta> {
        let check = &check;
        let settled = poll_until(description, &self.settle_options(), move || async move {
            let after = self.telemetry().await?;
            Ok(check(&before, &after).ok())
        })
        .await;
        match settled {
            Ok(delta) => Ok(delta),
            Err(E2eError::Timeout { .. }) => check(&before, &self.telemetry().await?),
            Err(err) => Err(err),
        }
    }

    /// Click a zoom button and wait for the zoom level to move that way
    pub async fn click_zoom(&self, zoom_in: bool) -> E2eResult<TelemetryDelta> {
        let before = self.telemetry().await?;
        let (button, expected) = if zoom_in {
            (self.zoom_in_button(), Gesture::ZoomIn { notches: 1 })
        } else {
            (self.zoom_out_button(), Gesture::ZoomOut { notches: 1 })
        };
        button.click().await?;
        self.await_effect("zoom button effect", before, |b, a| expected.verify(b, a))
            .await
    }

    /// Perform a gesture over the canvas and assert its telemetry effect
    pub async fn perform(&self, gesture: Gesture) -> E2eResult<TelemetryDelta> {
        self.perform_with(gesture, GesturePlan::default()).await
    }

    /// [`Self::perform`] with explicit start divisor and step count
    pub async fn perform_with(&self, gesture: Gesture, plan: GesturePlan) -> E2eResult<TelemetryDelta> {
        let bbox = self.canvas().bounding_box().await?;
        let before = self.telemetry().await?;
        let events = gesture.plan(&bbox, plan);
        tracing::info!(?gesture, events = events.len(), "map gesture");
        gesture::perform(self.session.driver().as_ref(), &events, GESTURE_PAUSE).await?;
        let delta = self
            .await_effect("map gesture effect", before, |b, a| gesture.verify(b, a))
            .await?;
        tracing::debug!(?delta, "gesture effect");
        Ok(delta)
    }

    /// Assert the camera does not move on its own for `window`
    pub async fn assert_stable(&self, window: Duration) -> E2eResult<()> {
        let before = self.telemetry().await?;
        tokio::time::sleep(window).await;
        let delta = self.telemetry().await?.delta(&before);
        if delta.is_zero() {
            return Ok(());
        }
        Err(E2eError::assertion(
            "map telemetry without a gesture",
            "no change",
            format!("{delta:?}"),
        ))
    }

    /// Current view mode
    pub async fn view_mode(&self) -> E2eResult<ViewMode> {
        let raw = self.view_toggle().attribute("data-mode").await?;
        ViewMode::parse(raw.as_deref().unwrap_or_default())
    }

    /// Switch to `mode`; no-op when already there
    pub async fn set_view_mode(&self, mode: ViewMode) -> E2eResult<()> {
        if self.view_mode().await? == mode {
            return Ok(());
        }
        self.view_toggle().click().await?;
        self.session
            .expect(&self.view_toggle())
            .to_have_attribute("data-mode", mode.as_str())
            .await
    }

    /// Rotate back to north
    pub async fn reset_north(&self) -> E2eResult<()> {
        self.reset_north_button().click().await?;
        let options = self.settle_options();
        poll_until("rotation reset", &options, move || async move {
            let rotation = self.telemetry().await?.map_rotation;
            Ok(is_north(rotation).then_some(()))
        })
        .await
    }

    /// Screenshot compared against a baseline within `MAX_PIXEL_DIFFERENCE`
    pub async fn compare_screenshot(&self, baseline: &[u8], masks: &[MaskRegion]) -> E2eResult<PixelDiff> {
        let max_pixels = self.session.env().max_pixel_difference()?;
        let actual = self.session.driver().screenshot().await?;
        let diff = compare_png_masked(baseline, &actual, DEFAULT_COLOR_THRESHOLD, masks)?;
        diff.assert_within(max_pixels)?;
        Ok(diff)
    }
}
