//! Page objects and the per-session page manager.
//!
//! A page object holds nothing but its [`Session`]: every accessor builds a
//! fresh [`Locator`](crate::locator::Locator) and re-queries the live UI.
//! Operations come in three flavours: state queries, single actions, and
//! composite workflows that pair an action with a correlated response.

pub mod components;
pub mod floor_plan;
pub mod issues;
pub mod layers;
pub mod login;
pub mod map_viewer;
pub mod measurement;
pub mod organization;
pub mod projects;
pub mod video_link;

use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::result::E2eResult;
use crate::session::Session;

pub use components::{Dropdown, Toast};
pub use floor_plan::FloorPlanPage;
pub use issues::IssuesPage;
pub use layers::LayerPanel;
pub use login::LoginPage;
pub use map_viewer::MapViewerPage;
pub use measurement::MeasurementPage;
pub use organization::OrganizationPage;
pub use projects::ProjectsPage;
pub use video_link::VideoLinkPage;

/// A wrapper over one screen or feature area
#[async_trait]
pub trait PageObject: Send + Sync + 'static {
    /// Name used in logs
    const NAME: &'static str;

    /// Build over a session
    fn new(session: Session) -> Self
    where
        Self: Sized;

    /// The session
    fn session(&self) -> &Session;

    /// Path under `BASE_URL` that shows this page
    fn url_path(&self) -> E2eResult<String>;

    /// Navigate to the page
    async fn open(&self) -> E2eResult<()> {
        let path = self.url_path()?;
        tracing::info!(page = Self::NAME, %path, "open page");
        self.session().goto_path(&path).await
    }
}

/// `/projects/{PROJECT_ID}{suffix}`
pub(crate) fn project_path(session: &Session, suffix: &str) -> E2eResult<String> {
    Ok(format!("/projects/{}{suffix}", session.env().project_id()?))
}

type CachedPage = (&'static str, Arc<dyn Any + Send + Sync>);

/// One lazily built instance of each page object per session
///
/// There is no invalidation: a new session needs a new manager.
pub struct PageManager {
    session: Session,
    pages: Mutex<HashMap<TypeId, CachedPage>>,
}

impl fmt::Debug for PageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pages = self.pages.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut names: Vec<&str> = pages.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("PageManager").field("pages", &names).finish_non_exhaustive()
    }
}

impl PageManager {
    /// Empty manager over a session
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// The session every page shares
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The page object of type `P`, built on first access
    pub fn get<P: PageObject>(&self) -> Arc<P> {
        let mut pages = self.pages.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((_, cached)) = pages.get(&TypeId::of::<P>()) {
            if let Ok(page) = Arc::clone(cached).downcast::<P>() {
                return page;
            }
        }
        tracing::debug!(page = P::NAME, "constructing page object");
        let page = Arc::new(P::new(self.session.clone()));
        let erased: Arc<dyn Any + Send + Sync> = page.clone();
        pages.insert(TypeId::of::<P>(), (P::NAME, erased));
        page
    }

    /// Number of pages built so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether no page has been built yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared [`LoginPage`]
    pub fn login(&self) -> Arc<LoginPage> {
        self.get()
    }

    /// Shared [`ProjectsPage`]
    pub fn projects(&self) -> Arc<ProjectsPage> {
        self.get()
    }

    /// Shared [`MapViewerPage`]
    pub fn map_viewer(&self) -> Arc<MapViewerPage> {
        self.get()
    }

    /// Shared [`LayerPanel`]
    pub fn layers(&self) -> Arc<LayerPanel> {
        self.get()
    }

    /// Shared [`FloorPlanPage`]
    pub fn floor_plan(&self) -> Arc<FloorPlanPage> {
        self.get()
    }

    /// Shared [`MeasurementPage`]
    pub fn measurement(&self) -> Arc<MeasurementPage> {
        self.get()
    }

    /// Shared [`IssuesPage`]
    pub fn issues(&self) -> Arc<IssuesPage> {
        self.get()
    }

    /// Shared [`OrganizationPage`]
    pub fn organization(&self) -> Arc<OrganizationPage> {
        self.get()
    }

    /// Shared [`VideoLinkPage`]
    pub fn video_links(&self) -> Arc<VideoLinkPage> {
        self.get()
    }

    /// Toast component
    #[must_use]
    pub fn toast(&self) -> Toast {
        Toast::new(self.session.clone())
    }
}
