//! Backend v2 resources used for fixtures and cross-surface checks.
//!
//! Bodies use the JSON:API envelope `{ "data": { "id", "type", "attributes" } }`.
//! Deletes answer `204 No Content`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{decode_json, expect_status, ApiClient};
use crate::fixture::{Cleaner, EntityKind, TrackedEntity};
use crate::result::{E2eError, E2eResult};

/// `{ "data": T }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    /// Payload
    pub data: T,
}

/// One JSON:API resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    /// Identifier
    pub id: String,
    /// Resource type
    #[serde(rename = "type")]
    pub kind: String,
    /// Attributes
    pub attributes: A,
}

/// Project attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAttributes {
    /// Display name
    pub name: String,
    /// Owning organization
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Centre latitude
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Centre longitude
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Indoor floor attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorAttributes {
    /// Display name
    pub name: String,
    /// Altitude in metres
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Issue attributes as returned on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueAttributes {
    /// Title
    pub title: String,
    /// Workflow status, e.g. `open`
    pub status: String,
    /// Creator display name
    pub created_by: String,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Pinned to the map
    #[serde(default)]
    pub pinned: bool,
}

/// Project resource
pub type Project = Resource<ProjectAttributes>;
/// Floor resource
pub type Floor = Resource<FloorAttributes>;
/// Issue resource
pub type Issue = Resource<IssueAttributes>;

fn project_path(project_id: &str) -> String {
    format!("/v2/projects/{project_id}")
}

/// GET a project
pub async fn get_project(client: &ApiClient, project_id: &str) -> E2eResult<Response> {
    client.get(&project_path(project_id)).await
}

/// GET the floors of a project
pub async fn list_floors(client: &ApiClient, project_id: &str) -> E2eResult<Response> {
    client.get(&format!("{}/floors", project_path(project_id))).await
}

/// GET one issue
pub async fn get_issue(client: &ApiClient, project_id: &str, issue_id: &str) -> E2eResult<Response> {
    client
        .get(&format!("{}/issues/{issue_id}", project_path(project_id)))
        .await
}

/// DELETE a floor
pub async fn delete_floor(client: &ApiClient, project_id: &str, floor_id: &str) -> E2eResult<Response> {
    client
        .delete(&format!("{}/floors/{floor_id}", project_path(project_id)))
        .await
}

/// DELETE a measurement group, sub-groups included
pub async fn delete_measurement_group(
    client: &ApiClient,
    project_id: &str,
    group_id: &str,
) -> E2eResult<Response> {
    client
        .delete(&format!("{}/measurement-groups/{group_id}", project_path(project_id)))
        .await
}

/// DELETE a single measurement
pub async fn delete_measurement(
    client: &ApiClient,
    project_id: &str,
    measurement_id: &str,
) -> E2eResult<Response> {
    client
        .delete(&format!("{}/measurements/{measurement_id}", project_path(project_id)))
        .await
}

/// DELETE an issue
pub async fn delete_issue(client: &ApiClient, project_id: &str, issue_id: &str) -> E2eResult<Response> {
    client
        .delete(&format!("{}/issues/{issue_id}", project_path(project_id)))
        .await
}

/// DELETE a video link
pub async fn delete_video_link(
    client: &ApiClient,
    project_id: &str,
    link_id: &str,
) -> E2eResult<Response> {
    client
        .delete(&format!("{}/video-links/{link_id}", project_path(project_id)))
        .await
}

/// DELETE an organization member
pub async fn remove_member(
    client: &ApiClient,
    organization_id: &str,
    member_id: &str,
) -> E2eResult<Response> {
    client
        .delete(&format!("/v2/organizations/{organization_id}/members/{member_id}"))
        .await
}

/// Require `204 No Content`
pub async fn expect_no_content(response: Response) -> E2eResult<()> {
    expect_status(response, StatusCode::NO_CONTENT).await.map(drop)
}

/// Decode a `{ "data": ... }` body
pub async fn decode_document<T: DeserializeOwned>(response: Response) -> E2eResult<T> {
    decode_json::<Document<T>>(response).await.map(|doc| doc.data)
}

/// Deletes tracked fixtures through the backend
///
/// A 404 counts as already deleted.
#[derive(Debug, Clone)]
pub struct BackendCleaner {
    client: ApiClient,
    project_id: String,
    organization_id: Option<String>,
}

impl BackendCleaner {
    /// Cleaner scoped to one project
    #[must_use]
    pub fn new(client: ApiClient, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            organization_id: None,
        }
    }

    /// Organization used for invited users
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

#[async_trait]
impl Cleaner for BackendCleaner {
    async fn delete(&self, entity: &TrackedEntity) -> E2eResult<()> {
        let (client, project, id) = (&self.client, self.project_id.as_str(), entity.id.as_str());
        let response = match entity.kind {
            EntityKind::MeasurementGroup | EntityKind::SubGroup => {
                delete_measurement_group(client, project, id).await?
            }
            EntityKind::MeasurementItem => delete_measurement(client, project, id).await?,
            EntityKind::Floor => delete_floor(client, project, id).await?,
            EntityKind::Issue => delete_issue(client, project, id).await?,
            EntityKind::VideoLink => delete_video_link(client, project, id).await?,
            EntityKind::InvitedUser => {
                let org = self.organization_id.as_deref().ok_or_else(|| {
                    E2eError::config("organization id required to remove invited users")
                })?;
                remove_member(client, org, id).await?
            }
        };
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(kind = %entity.kind, id, "already deleted");
            return Ok(());
        }
        expect_no_content(response).await
    }
}
