//! UI tests against a live deployment in Chromium
//!
//! Run with `cargo test -p aerial-e2e --features browser --test live_browser -- --ignored`.

#![cfg(feature = "browser")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use aerial_e2e::prelude::*;
use aerial_e2e::service::auth;

async fn launch() -> (Arc<Env>, Session) {
    aerial_e2e::logging::init();
    let env = Arc::new(Env::from_env());
    env.require_live().unwrap();
    let config = DriverConfig::default().with_no_sandbox();
    let stored = env.session_file();
    let session = Session::launch(Arc::clone(&env), &config, Some(&stored))
        .await
        .unwrap();
    (env, session)
}

async fn logged_in() -> (Arc<Env>, Session) {
    let (env, session) = launch().await;
    let login = LoginPage::new(session.clone());
    login.open().await.unwrap();
    if !login.is_logged_in().await.unwrap() {
        login
            .login(&env.credentials(Role::Default).unwrap())
            .await
            .unwrap();
        session.save_storage_state(&env.session_file()).await.unwrap();
    }
    (env, session)
}

async fn cleaner(env: &Env) -> BackendCleaner {
    let api = ApiClient::new(env.backend_url().unwrap()).unwrap();
    let token = auth::token(&api, &env.credentials(Role::Default).unwrap())
        .await
        .unwrap();
    BackendCleaner::new(api.with_auth(Auth::Bearer(token)), env.project_id().unwrap())
}

#[tokio::test]
#[ignore = "needs chromium and a live deployment"]
async fn live_login_lands_past_onboarding() {
    let (env, session) = launch().await;
    let login = LoginPage::new(session.clone());
    let credentials = env.credentials(Role::Default).unwrap();

    let body = login.login(&credentials).await.unwrap();
    assert!(!body.token().is_empty());
    assert!(login.probe_onboarding().await.is_absent());
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs chromium and a live deployment"]
async fn live_base_layers_are_exclusive() {
    let (_, session) = logged_in().await;
    let layers = LayerPanel::new(session.clone());
    layers.open().await.unwrap();

    for layer in BaseLayer::ALL {
        layers.select(layer).await.unwrap();
        layers.assert_exclusive(layer).await.unwrap();
    }
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs chromium and a live deployment"]
async fn live_map_gestures_move_the_camera() {
    let (_, session) = logged_in().await;
    let map = MapViewerPage::new(session.clone());
    map.open().await.unwrap();
    ProjectsPage::new(session.clone()).wait_for_map_ready().await.unwrap();

    map.assert_stable(std::time::Duration::from_secs(2)).await.unwrap();
    map.click_zoom(true).await.unwrap();
    map.perform(Gesture::ZoomOut { notches: 2 }).await.unwrap();
    map.perform(Gesture::Pan { dx: 200.0, dy: 0.0 }).await.unwrap();
    map.perform(Gesture::Rotate { pixels: 150.0 }).await.unwrap();
    map.reset_north().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs chromium and a live deployment"]
async fn live_floor_and_measurement_fixtures_are_cleaned_up() {
    let (env, session) = logged_in().await;
    let ctx = SuiteContext::new("indoor and measurements", session);
    let mut fake = FakeData::new();

    let floors = ctx.pages().floor_plan();
    floors.open().await.unwrap();
    let draft = FloorDraft {
        name: fake.unique_name("Floor"),
        plan: "Ground plan".to_string(),
        altitude: fake.altitude(),
    };
    if let Ok(floor) = ctx.step("create floor", floors.create_floor(&draft)).await {
        ctx.track(EntityKind::Floor, floor.id, &draft.name);
    }
    let _ = ctx.step("reselect floor", floors.reselect_is_noop(&draft.name)).await;

    let measurement = ctx.pages().measurement();
    let group_name = fake.unique_name("Group");
    let sub_name = fake.unique_name("Sub");
    let _ = ctx.step("open measurements", measurement.open()).await;
    if let Ok(group) = ctx.step("create group", measurement.create_group(&group_name)).await {
        ctx.track(EntityKind::MeasurementGroup, group.id, &group_name);
    }
    if let Ok(sub) = ctx
        .step("create sub-group", measurement.create_sub_group(&group_name, &sub_name))
        .await
    {
        ctx.track(EntityKind::SubGroup, sub.id.clone(), &sub_name);
        if ctx.step("delete sub-group", measurement.delete_group(&sub_name)).await.is_ok() {
            ctx.forget(EntityKind::SubGroup, &sub.id);
        }
    }

    let cleaner = cleaner(&env).await;
    match ctx.finish(&cleaner).await.unwrap() {
        SuiteOutcome::Cleaned(report) => assert!(report.failed.is_empty()),
        SuiteOutcome::KeptForPostMortem { pending, .. } => {
            panic!("suite failed; {} fixtures left for inspection", pending.len())
        }
    }
}

#[tokio::test]
#[ignore = "needs chromium and a live deployment"]
async fn live_issue_sidebar_matches_api() {
    let (env, session) = logged_in().await;
    let ctx = SuiteContext::new("issues", session);
    let issues = ctx.pages().issues();
    issues.open().await.unwrap();
    let title = FakeData::new().unique_name("Issue");

    let issue = ctx
        .step("create issue", issues.create_issue(&title, "created by the live suite"))
        .await
        .unwrap();
    ctx.track(EntityKind::Issue, issue.id.clone(), &title);
    let card = issues.read_card(&title).await.unwrap();
    let _ = ctx
        .step("sidebar matches", async { assert_same_issue(&card, &issue.attributes) })
        .await;
    let _ = ctx
        .step("pinned on create", async {
            ISSUE_PINNED_ON_CREATE.check(&issue.attributes.pinned)
        })
        .await;

    let cleaner = cleaner(&env).await;
    assert!(matches!(ctx.finish(&cleaner).await.unwrap(), SuiteOutcome::Cleaned(_)));
}
