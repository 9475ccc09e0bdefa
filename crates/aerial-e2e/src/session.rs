//! Session handle and shared suite context.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{Env, Timeouts};
use crate::driver::{Driver, StorageState};
use crate::fixture::{Cleaner, CleanupRegistry, CleanupReport, EntityKind, TrackedEntity};
use crate::locator::{Locator, LocatorOptions, Selector};
use crate::network::ResponseCorrelator;
use crate::pages::PageManager;
use crate::result::{E2eError, E2eResult};
use crate::wait::{expect, expect_url, LocatorExpect, UrlExpect};

/// One browser tab plus the configuration every page object needs
#[derive(Debug, Clone)]
pub struct Session {
    driver: Arc<dyn Driver>,
    env: Arc<Env>,
    timeouts: Timeouts,
    correlator: ResponseCorrelator,
}

impl Session {
    /// Wrap a driver with default budgets
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, env: Arc<Env>) -> Self {
        let timeouts = Timeouts::default();
        Self {
            correlator: ResponseCorrelator::new(Arc::clone(&driver)).with_timeout(timeouts.assertion),
            driver,
            env,
            timeouts,
        }
    }

    /// Replace the budgets
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.correlator = ResponseCorrelator::new(Arc::clone(&self.driver))
            .with_timeout(timeouts.assertion);
        self.timeouts = timeouts;
        self
    }

    /// Launch Chromium, restoring stored state when the file exists
    #[cfg(feature = "browser")]
    pub async fn launch(
        env: Arc<Env>,
        config: &crate::config::DriverConfig,
        stored: Option<&Path>,
    ) -> E2eResult<Self> {
        let driver = crate::cdp::CdpDriver::launch(config).await?;
        let session = Self::new(Arc::new(driver), env);
        if let Some(path) = stored.filter(|p| p.exists()) {
            session.restore_storage_state(path).await?;
        }
        Ok(session)
    }

    /// The driver
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The environment
    #[must_use]
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// The budgets
    #[must_use]
    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Response correlator bound to this tab
    #[must_use]
    pub const fn correlator(&self) -> &ResponseCorrelator {
        &self.correlator
    }

    /// Locator with the action budget
    #[must_use]
    pub fn locator(&self, selector: Selector) -> Locator {
        self.locator_with_timeout(selector, self.timeouts.action)
    }

    /// Locator with a custom budget
    #[must_use]
    pub fn locator_with_timeout(&self, selector: Selector, timeout: Duration) -> Locator {
        Locator::new(
            Arc::clone(&self.driver),
            selector,
            LocatorOptions {
                timeout,
                ..LocatorOptions::default()
            },
        )
    }

    /// Assertion with the assertion budget
    #[must_use]
    pub fn expect(&self, locator: &Locator) -> LocatorExpect {
        expect(locator).with_timeout(self.timeouts.assertion)
    }

    /// URL assertion with the assertion budget
    #[must_use]
    pub fn expect_url(&self) -> UrlExpect {
        expect_url(&self.driver).with_timeout(self.timeouts.assertion)
    }

    /// Navigate to `BASE_URL` + `path`
    pub async fn goto_path(&self, path: &str) -> E2eResult<()> {
        let url = join_url(&self.env.base_url()?, path);
        tracing::info!(%url, "navigate");
        self.driver.goto(&url).await
    }

    /// Current URL
    pub async fn url(&self) -> E2eResult<String> {
        self.driver.current_url().await
    }

    /// Persist cookies and local storage
    pub async fn save_storage_state(&self, path: &Path) -> E2eResult<StorageState> {
        let state = self.driver.storage_state().await?;
        state.save(path)?;
        tracing::info!(path = %path.display(), cookies = state.cookies.len(), "saved session");
        Ok(state)
    }

    /// Restore a saved session
    pub async fn restore_storage_state(&self, path: &Path) -> E2eResult<()> {
        let state = StorageState::load(path)?;
        self.driver.restore_storage_state(&state).await
    }

    /// Close the tab and browser
    pub async fn close(&self) -> E2eResult<()> {
        self.driver.close().await
    }
}

/// Join a base URL and a path with exactly one slash
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// =============================================================================
// SUITE CONTEXT
// =============================================================================

/// How a suite ended
#[derive(Debug)]
pub enum SuiteOutcome {
    /// Every step passed; fixtures deleted and session closed
    Cleaned(CleanupReport),
    /// A step failed; cleanup skipped and the session left open
    KeptForPostMortem {
        /// The still-open session
        session: Session,
        /// Fixtures that were not deleted
        pending: Vec<TrackedEntity>,
    },
}

/// Shared fixture for a block of dependent steps
///
/// Owns the session, the page manager, a typed scratchpad for values one
/// step hands to the next, and the cleanup registry. Once a step fails the
/// remaining steps are skipped, since they would run against broken state.
#[derive(Debug)]
pub struct SuiteContext {
    name: String,
    session: Session,
    pages: PageManager,
    scratch: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    cleanup: Mutex<CleanupRegistry>,
    all_passed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl SuiteContext {
    /// Start a suite over a session
    #[must_use]
    pub fn new(name: impl Into<String>, session: Session) -> Self {
        Self {
            name: name.into(),
            pages: PageManager::new(session.clone()),
            session,
            scratch: Mutex::new(HashMap::new()),
            cleanup: Mutex::new(CleanupRegistry::new()),
            all_passed: AtomicBool::new(true),
        }
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Page objects for this session
    #[must_use]
    pub const fn pages(&self) -> &PageManager {
        &self.pages
    }

    /// Whether no step has failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.all_passed.load(Ordering::SeqCst)
    }

    /// Store a value for later steps, replacing any value of the same type
    pub fn put<T: Any + Send + Sync>(&self, value: T) {
        lock(&self.scratch).insert(TypeId::of::<T>(), Box::new(value));
    }

    /// A clone of a stored value
    #[must_use]
    pub fn get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        lock(&self.scratch)
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    /// A stored value, or a fixture error naming the type
    pub fn require<T: Any + Send + Sync + Clone>(&self) -> E2eResult<T> {
        self.get::<T>().ok_or_else(|| E2eError::Fixture {
            message: format!("no {} stored by an earlier step", std::any::type_name::<T>()),
        })
    }

    /// Record a created entity
    pub fn track(&self, kind: EntityKind, id: impl Into<String>, label: impl Into<String>) {
        lock(&self.cleanup).track(kind, id, label);
    }

    /// Stop tracking an entity the suite deleted itself
    pub fn forget(&self, kind: EntityKind, id: &str) -> bool {
        lock(&self.cleanup).forget(kind, id)
    }

    /// Tracked entities
    #[must_use]
    pub fn tracked(&self) -> Vec<TrackedEntity> {
        lock(&self.cleanup).entities().to_vec()
    }

    /// Run one step, recording failure
    pub async fn step<T, Fut>(&self, name: &str, fut: Fut) -> E2eResult<T>
    where
        Fut: Future<Output = E2eResult<T>>,
    {
        if !self.all_passed() {
            tracing::warn!(suite = %self.name, step = name, "skipped after earlier failure");
            return Err(E2eError::Fixture {
                message: format!("step '{name}' skipped: an earlier step in '{}' failed", self.name),
            });
        }
        tracing::info!(suite = %self.name, step = name, "step");
        let result = fut.await;
        if let Err(err) = &result {
            tracing::error!(suite = %self.name, step = name, error = %err, "step failed");
            self.all_passed.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Clean up and close, or keep everything for post-mortem after a failure
    pub async fn finish(self, cleaner: &dyn Cleaner) -> E2eResult<SuiteOutcome> {
        let mut registry = self
            .cleanup
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.all_passed.load(Ordering::SeqCst) {
            tracing::warn!(
                suite = %self.name,
                pending = registry.len(),
                "a step failed; skipping cleanup and keeping the session open"
            );
            return Ok(SuiteOutcome::KeptForPostMortem {
                session: self.session,
                pending: registry.entities().to_vec(),
            });
        }
        let report = registry.run(cleaner).await;
        let closed = self.session.close().await;
        match (report, closed) {
            (Ok(report), Ok(())) => Ok(SuiteOutcome::Cleaned(report)),
            (Ok(report), Err(err)) => {
                tracing::warn!(suite = %self.name, deleted = report.deleted.len(), "cleanup done but close failed");
                Err(err)
            }
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(suite = %self.name, error = %close_err, "close failed after incomplete cleanup");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use async_trait::async_trait;

    struct NoopCleaner(Mutex<Vec<String>>);

    #[async_trait]
    impl Cleaner for NoopCleaner {
        async fn delete(&self, entity: &TrackedEntity) -> E2eResult<()> {
            self.0.lock().unwrap().push(entity.id.clone());
            Ok(())
        }
    }

    fn session() -> (Arc<MockDriver>, Session) {
        let driver = Arc::new(MockDriver::new());
        let env = Env::from_map([("BASE_URL", "https://app.example.test/")]);
        (driver.clone(), Session::new(driver, Arc::new(env)))
    }

    mod session_tests {
        use super::*;

        #[test]
        fn test_join_url() {
            assert_eq!(join_url("https://a/", "/projects"), "https://a/projects");
            assert_eq!(join_url("https://a", "projects"), "https://a/projects");
            assert_eq!(join_url("https://a", ""), "https://a");
        }

        #[tokio::test]
        async fn test_goto_path_uses_base_url() {
            let (driver, session) = session();
            session.goto_path("/projects").await.unwrap();
            assert_eq!(session.url().await.unwrap(), "https://app.example.test/projects");
            assert!(driver.was_called("goto:https://app.example.test/projects"));
        }

        #[tokio::test]
        async fn test_locator_uses_action_budget() {
            let (_, session) = session();
            let session = session.with_timeouts(Timeouts::default().scaled(10));
            let locator = session.locator(Selector::test_id("x"));
            assert_eq!(locator.options().timeout, Duration::from_millis(500));
        }

        #[tokio::test]
        async fn test_storage_state_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("session.json");
            let (driver, session) = session();
            session.save_storage_state(&path).await.unwrap();
            session.restore_storage_state(&path).await.unwrap();
            assert!(driver.was_called("storage_state"));
            assert!(driver.was_called("restore_storage_state"));
        }
    }

    mod suite_tests {
        use super::*;

        #[derive(Debug, Clone, PartialEq)]
        struct FloorName(String);

        #[tokio::test]
        async fn test_scratchpad_threads_values() {
            let (_, session) = session();
            let ctx = SuiteContext::new("floors", session);
            assert!(ctx.require::<FloorName>().is_err());
            ctx.put(FloorName("Level 4".into()));
            assert_eq!(ctx.get::<FloorName>(), Some(FloorName("Level 4".into())));
        }

        #[tokio::test]
        async fn test_passing_suite_cleans_and_closes() {
            let (driver, session) = session();
            let ctx = SuiteContext::new("groups", session);
            ctx.track(EntityKind::MeasurementGroup, "g1", "Group");
            ctx.track(EntityKind::SubGroup, "s1", "Sub");
            ctx.step("create", async { Ok(()) }).await.unwrap();

            let cleaner = NoopCleaner(Mutex::new(Vec::new()));
            let outcome = ctx.finish(&cleaner).await.unwrap();
            assert!(matches!(outcome, SuiteOutcome::Cleaned(ref r) if r.deleted.len() == 2));
            assert_eq!(*cleaner.0.lock().unwrap(), vec!["s1", "g1"]);
            assert!(driver.is_closed());
        }

        #[tokio::test]
        async fn test_incomplete_cleanup_returns_report_and_closes() {
            struct FailingCleaner;

            #[async_trait]
            impl Cleaner for FailingCleaner {
                async fn delete(&self, entity: &TrackedEntity) -> E2eResult<()> {
                    if entity.id == "g1" {
                        return Err(E2eError::driver("locked"));
                    }
                    Ok(())
                }
            }

            let (driver, session) = session();
            let ctx = SuiteContext::new("groups", session);
            ctx.track(EntityKind::MeasurementGroup, "g1", "Group");
            ctx.track(EntityKind::SubGroup, "s1", "Sub");
            ctx.step("create", async { Ok(()) }).await.unwrap();

            match ctx.finish(&FailingCleaner).await.unwrap_err() {
                E2eError::Cleanup { first, report } => {
                    assert!(first.contains("'Group'"));
                    assert_eq!(report.deleted[0].id, "s1");
                    assert_eq!(report.failed[0].0.id, "g1");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(driver.is_closed());
        }

        #[tokio::test]
        async fn test_failed_step_skips_rest_and_keeps_session() {
            let (driver, session) = session();
            let ctx = SuiteContext::new("groups", session);
            ctx.track(EntityKind::Floor, "f1", "Level 1");
            let err = ctx
                .step("create", async { Err::<(), _>(E2eError::driver("boom")) })
                .await
                .unwrap_err();
            assert!(matches!(err, E2eError::Driver { .. }));
            assert!(!ctx.all_passed());

            let skipped = ctx.step("delete", async { Ok(()) }).await.unwrap_err();
            assert!(skipped.to_string().contains("skipped"));

            let cleaner = NoopCleaner(Mutex::new(Vec::new()));
            match ctx.finish(&cleaner).await.unwrap() {
                SuiteOutcome::KeptForPostMortem { pending, .. } => assert_eq!(pending.len(), 1),
                SuiteOutcome::Cleaned(_) => panic!("cleanup should be skipped"),
            }
            assert!(cleaner.0.lock().unwrap().is_empty());
            assert!(!driver.is_closed());
        }
    }
}
