//! API tests against a live deployment
//!
//! Run with `cargo test -p aerial-e2e --test live_api -- --ignored` and the
//! variables from `.env` in place.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use aerial_e2e::prelude::*;
use aerial_e2e::service::assets::{self, AssetsResponse, DownloadError};
use aerial_e2e::service::vcm::{self, ContentLengthResponse};
use aerial_e2e::service::{auth, decode_json};

fn env() -> Env {
    aerial_e2e::logging::init();
    Env::from_env()
}

#[tokio::test]
#[ignore = "needs a live deployment"]
async fn live_login_issues_token_for_account() {
    let env = env();
    let api = ApiClient::new(env.api_url().unwrap()).unwrap();
    let credentials = env.credentials(Role::Default).unwrap();

    let token = auth::token(&api, &credentials).await.unwrap();
    assert!(!token.is_empty());
}

#[tokio::test]
#[ignore = "needs a live deployment"]
async fn live_downloads_are_named_after_project_and_date() {
    let env = env();
    let api = ApiClient::new(env.api_url().unwrap())
        .unwrap()
        .with_auth(Auth::ApiKey(env.api_key().unwrap().to_string()));
    let project_id = env.project_id().unwrap();

    let listing: AssetsResponse = decode_json(assets::list_assets(&api, project_id).await.unwrap())
        .await
        .unwrap();
    for dataset in &listing.datasets {
        for file in dataset.available() {
            let response = assets::download_file(&api, &dataset.id, file).await.unwrap();
            assert_eq!(response.status(), 200, "{file}");
            assert_eq!(
                assets::response_filename(&response),
                Some(assets::expected_download_name(&listing.project_name, &dataset.date, file))
            );
        }
        for file in dataset.unavailable() {
            let response = assets::download_file(&api, &dataset.id, file).await.unwrap();
            assert_eq!(response.status(), 404, "{file}");
            let body: DownloadError = response.json().await.unwrap();
            assert!(body.is_not_found(), "{file}: {}", body.error);
        }
    }
}

#[tokio::test]
#[ignore = "needs a live deployment"]
async fn live_expired_key_is_rejected() {
    let env = env();
    let api = ApiClient::new(env.api_url().unwrap())
        .unwrap()
        .with_auth(Auth::ApiKey(env.expired_api_key().unwrap().to_string()));

    let response = assets::list_assets(&api, env.project_id().unwrap()).await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore = "needs a live deployment"]
async fn live_volume_service_reports_content_length() {
    let env = env();
    let api = ApiClient::new(env.vcm_url().unwrap()).unwrap();
    let content_id = std::env::var("VCM_CONTENT_ID").unwrap_or_else(|_| "1".to_string());

    let body: ContentLengthResponse = decode_json(vcm::content_length(&api, &content_id).await.unwrap())
        .await
        .unwrap();
    assert!(body.length > 0.0);
}
