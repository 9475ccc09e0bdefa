//! Base layer panel.

use std::fmt;

use crate::assertion::assert_exactly_one_checked;
use crate::locator::{Locator, Selector};
use crate::pages::{project_path, PageObject};
use crate::result::{E2eError, E2eResult};
use crate::session::Session;

/// Mutually exclusive base layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseLayer {
    Orthomosaic2d,
    Terrain,
    Orthomosaic3d,
    PointCloud,
    MeshModel3d,
}

impl BaseLayer {
    pub const ALL: [Self; 5] = [
        Self::Orthomosaic2d,
        Self::Terrain,
        Self::Orthomosaic3d,
        Self::PointCloud,
        Self::MeshModel3d,
    ];

    /// Label in the panel
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Orthomosaic2d => "2D Orthomosaic",
            Self::Terrain => "Terrain",
            Self::Orthomosaic3d => "3D Orthomosaic",
            Self::PointCloud => "Point Cloud",
            Self::MeshModel3d => "3D Mesh Model",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.label() == label)
    }
}

impl fmt::Display for BaseLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct LayerPanel {
    session: Session,
}

impl PageObject for LayerPanel {
    const NAME: &'static str = "layers";

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

impl LayerPanel {
    /// Button that shows the panel
    pub fn toggle_button(&self) -> Locator {
        self.session.locator(Selector::test_id("layers-button"))
    }

    /// The panel itself
    pub fn panel(&self) -> Locator {
        self.session.locator(Selector::test_id("layer-panel"))
    }

    /// Radio for one base layer
    pub fn layer(&self, layer: BaseLayer) -> Locator {
        self.session.locator(Selector::role("radio", layer.label()))
    }

    /// Open the panel unless it is already showing
    pub async fn open_panel(&self) -> E2eResult<()> {
        if self.panel().is_visible().await? {
            return Ok(());
        }
        self.toggle_button().click().await?;
        self.session.expect(&self.panel()).to_be_visible().await
    }

    /// Click a layer and wait for it to read as checked
    ///
    /// Always clicks, even when already selected, so re-selection can be
    /// asserted as a no-op.
    pub async fn select(&self, layer: BaseLayer) -> E2eResult<()> {
        self.open_panel().await?;
        tracing::info!(%layer, "select base layer");
        let radio = self.layer(layer);
        radio.click().await?;
        self.session.expect(&radio).to_be_checked().await
    }

    /// Checked state of every layer, in panel order
    pub async fn checked_states(&self) -> E2eResult<Vec<(BaseLayer, bool)>> {
        let mut states = Vec::with_capacity(BaseLayer::ALL.len());
        for layer in BaseLayer::ALL {
            states.push((layer, self.layer(layer).is_checked().await?));
        }
        Ok(states)
    }

    /// The single checked layer
    pub async fn selected(&self) -> E2eResult<BaseLayer> {
        let states: Vec<(&str, bool)> = self
            .checked_states()
            .await?
            .into_iter()
            .map(|(layer, on)| (layer.label(), on))
            .collect();
        let label = assert_exactly_one_checked(&states)?;
        BaseLayer::from_label(&label)
            .ok_or_else(|| E2eError::driver(format!("unknown layer label {label}")))
    }

    /// `layer` is checked and every other layer is unchecked
    pub async fn assert_exclusive(&self, layer: BaseLayer) -> E2eResult<()> {
        let selected = self.selected().await?;
        if selected == layer {
            Ok(())
        } else {
            Err(E2eError::assertion("selected base layer", layer, selected))
        }
    }

    /// Re-select the current layer and assert neither the URL nor the
    /// selection moved
    pub async fn reselect_is_noop(&self) -> E2eResult<()> {
        let current = self.selected().await?;
        let url = self.session.url().await?;
        self.select(current).await?;
        self.assert_exclusive(current).await?;
        let after = self.session.url().await?;
        if url != after {
            return Err(E2eError::assertion("url after re-selecting base layer", url, after));
        }
        Ok(())
    }
}
