//! End-to-end and API test suite for the Aerial drone-mapping platform.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  suites (tests/)                                              │
//! │     │ SuiteContext: steps, scratchpad, cleanup registry       │
//! │     ▼                                                         │
//! │  pages::*  ──► Locator / expect / ResponseCorrelator          │
//! │     │                  │                                      │
//! │     ▼                  ▼                                      │
//! │  Session ──────► dyn Driver ──► CdpDriver (chromium)          │
//! │                              └► MockDriver (scripted DOM)     │
//! │                                                               │
//! │  service::* ──► reqwest ──► backend / assets / volume service │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from the process environment (optionally seeded from
//! a `.env` file) through [`config::Env`]. Logging is `tracing`, installed by
//! [`logging::init`].

#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod assertion;
pub mod config;
pub mod driver;
pub mod fixture;
pub mod gesture;
pub mod locator;
pub mod logging;
pub mod network;
pub mod pages;
pub mod result;
pub mod retry;
pub mod service;
pub mod session;
pub mod visual;
pub mod wait;

/// Chromium driver over the DevTools protocol
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc)]
pub mod cdp;

pub use result::{E2eError, E2eResult, FailureKind};

/// Everything a test file usually needs
pub mod prelude {
    pub use super::assertion::{
        assert_exactly_one_checked, assert_same_issue, KnownDeviation, ISSUE_PINNED_ON_CREATE,
    };
    pub use super::config::{Credentials, DriverConfig, Env, Role, Timeouts};
    pub use super::driver::{
        Driver, ElementState, KeyEvent, MockDom, MockDriver, MockElement, MouseButton,
        NetworkEvent, PointerEvent, StorageState,
    };
    pub use super::fixture::{
        Cleaner, CleanupRegistry, CleanupReport, EntityKind, FakeData, TrackedEntity,
    };
    pub use super::gesture::{ExpectedEffect, Gesture, GesturePlan, MapTelemetry, TelemetryDelta};
    pub use super::locator::{BoundingBox, Locator, Point, Probe, Selector};
    pub use super::network::{
        CorrelatedResponse, HttpMethod, ResponseCorrelator, ResponsePredicate, StatusRange,
    };
    pub use super::pages::floor_plan::FloorDraft;
    pub use super::pages::layers::BaseLayer;
    pub use super::pages::map_viewer::ViewMode;
    pub use super::pages::{
        Dropdown, FloorPlanPage, IssuesPage, LayerPanel, LoginPage, MapViewerPage,
        MeasurementPage, OrganizationPage, PageManager, PageObject, ProjectsPage, Toast,
        VideoLinkPage,
    };
    pub use super::result::{E2eError, E2eResult, FailureKind};
    pub use super::retry::RetryPolicy;
    pub use super::service::backend::BackendCleaner;
    pub use super::service::vcm::BasePlane;
    pub use super::service::{ApiClient, Auth};
    pub use super::session::{Session, SuiteContext, SuiteOutcome};
    pub use super::visual::{compare_png, compare_png_masked, MaskRegion, PixelDiff};
    pub use super::wait::{expect, expect_url, poll_until, WaitOptions};

    #[cfg(feature = "browser")]
    pub use super::cdp::CdpDriver;
}
