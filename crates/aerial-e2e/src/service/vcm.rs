//! Volume calculation service (elevation, cut/fill volume, profiles).
//!
//! The service is treated as a golden-output black box: tests pin exact
//! numbers for fixed input geometry.

use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ApiClient;
use crate::result::E2eResult;

/// `[longitude, latitude]`
pub type Coordinate = [f64; 2];

/// Reference surface for cut/fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasePlane {
    /// Triangulated from the polygon vertices
    Triangulation,
    /// Lowest vertex elevation
    LowestPoint,
    /// Highest vertex elevation
    HighestPoint,
    /// Mean vertex elevation
    Average,
    /// User-supplied elevation
    CustomElevation,
}

impl BasePlane {
    /// Every option, in the order the UI lists them
    pub const ALL: [Self; 5] = [
        Self::Triangulation,
        Self::LowestPoint,
        Self::HighestPoint,
        Self::Average,
        Self::CustomElevation,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Triangulation => "triangulation",
            Self::LowestPoint => "lowest_point",
            Self::HighestPoint => "highest_point",
            Self::Average => "average",
            Self::CustomElevation => "custom_elevation",
        }
    }

    /// Label in the measurement panel
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Triangulation => "Triangulation",
            Self::LowestPoint => "Lowest Point",
            Self::HighestPoint => "Highest Point",
            Self::Average => "Average",
            Self::CustomElevation => "Custom Elevation",
        }
    }
}

impl fmt::Display for BasePlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GeoJSON polygon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Always `"Polygon"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Rings; the first is the exterior
    pub coordinates: Vec<Vec<Coordinate>>,
}

impl Polygon {
    /// Single-ring polygon, closed if the ring is open
    #[must_use]
    pub fn from_ring(mut ring: Vec<Coordinate>) -> Self {
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        Self {
            kind: "Polygon".to_string(),
            coordinates: vec![ring],
        }
    }
}

/// `/elev/` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationRequest {
    /// Surface content
    pub content_id: String,
    /// Points to sample
    pub coordinates: Vec<Coordinate>,
}

/// `/elev/` result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElevationResponse {
    /// One elevation per requested point
    pub elevations: Vec<f64>,
}

/// `/vc/`, `/dbvc/` and `/sbvc/` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRequest {
    /// Surface content
    pub content_id: String,
    /// Measured area
    pub geometry: Polygon,
    /// Reference surface
    pub base_plane: BasePlane,
    /// Elevation for [`BasePlane::CustomElevation`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_elevation: Option<f64>,
    /// Design surface, for design-based volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_content_id: Option<String>,
    /// Comparison surface, for surface-based volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_content_id: Option<String>,
}

impl VolumeRequest {
    /// Plain volume request
    #[must_use]
    pub fn new(content_id: impl Into<String>, geometry: Polygon, base_plane: BasePlane) -> Self {
        Self {
            content_id: content_id.into(),
            geometry,
            base_plane,
            custom_elevation: None,
            design_content_id: None,
            surface_content_id: None,
        }
    }

    /// Custom base elevation
    #[must_use]
    pub fn with_custom_elevation(mut self, elevation: f64) -> Self {
        self.base_plane = BasePlane::CustomElevation;
        self.custom_elevation = Some(elevation);
        self
    }
}

/// Cut/fill result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeResponse {
    /// Material above the base plane
    pub cut: f64,
    /// Material below the base plane
    pub fill: f64,
    /// Net volume
    pub volume: f64,
    /// Plane the service used
    pub base_plane: BasePlane,
}

/// `/elev-prof/` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationProfileRequest {
    /// Surface content
    pub content_id: String,
    /// Polyline
    pub coordinates: Vec<Coordinate>,
    /// Sample count along the line
    pub samples: u32,
}

/// One profile sample
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProfilePoint {
    /// Distance along the line in metres
    pub distance: f64,
    /// Elevation in metres
    pub elevation: f64,
}

/// `/elev-prof/` result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElevationProfileResponse {
    /// Samples in order along the line
    pub profile: Vec<ProfilePoint>,
    /// Line length in metres
    pub length: f64,
}

/// `/contents/{id}/length` result
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ContentLengthResponse {
    /// Length in metres
    pub length: f64,
}

/// POST `/elev/`
pub async fn elevation(client: &ApiClient, request: &ElevationRequest) -> E2eResult<Response> {
    client.post_json("/elev/", request).await
}

/// POST `/vc/`
pub async fn volume(client: &ApiClient, request: &VolumeRequest) -> E2eResult<Response> {
    client.post_json("/vc/", request).await
}

/// POST `/dbvc/`, volume against a design surface
pub async fn design_volume(
    client: &ApiClient,
    request: &VolumeRequest,
    design_content_id: &str,
) -> E2eResult<Response> {
    let request = VolumeRequest {
        design_content_id: Some(design_content_id.to_string()),
        ..request.clone()
    };
    client.post_json("/dbvc/", &request).await
}

/// POST `/sbvc/`, volume between two surfaces
pub async fn surface_volume(
    client: &ApiClient,
    request: &VolumeRequest,
    surface_content_id: &str,
) -> E2eResult<Response> {
    let request = VolumeRequest {
        surface_content_id: Some(surface_content_id.to_string()),
        ..request.clone()
    };
    client.post_json("/sbvc/", &request).await
}

/// POST `/elev-prof/`
pub async fn elevation_profile(
    client: &ApiClient,
    request: &ElevationProfileRequest,
) -> E2eResult<Response> {
    client.post_json("/elev-prof/", request).await
}

/// GET `/contents/{id}/length`
pub async fn content_length(client: &ApiClient, content_id: &str) -> E2eResult<Response> {
    client.get(&format!("/contents/{content_id}/length")).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base_plane_wire_names() {
        for plane in BasePlane::ALL {
            let json = serde_json::to_value(plane).unwrap();
            assert_eq!(json, serde_json::Value::String(plane.as_str().into()));
        }
        let parsed: BasePlane = serde_json::from_str("\"triangulation\"").unwrap();
        assert_eq!(parsed, BasePlane::Triangulation);
    }

    #[test]
    fn test_polygon_is_closed() {
        let polygon = Polygon::from_ring(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        let ring = &polygon.coordinates[0];
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(Polygon::from_ring(ring.clone()).coordinates[0].len(), 4);
    }

    #[test]
    fn test_volume_request_body() {
        let request = VolumeRequest::new("c-1", Polygon::from_ring(vec![[0.0, 0.0]]), BasePlane::Average)
            .with_custom_elevation(12.5);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contentId"], "c-1");
        assert_eq!(json["basePlane"], "custom_elevation");
        assert_eq!(json["customElevation"], 12.5);
        assert_eq!(json["geometry"]["type"], "Polygon");
        assert!(json.get("designContentId").is_none());
    }

    #[test]
    fn test_volume_response_decodes() {
        let body: VolumeResponse = serde_json::from_str(
            r#"{"cut":20,"fill":-616,"volume":-597,"basePlane":"triangulation"}"#,
        )
        .unwrap();
        assert_eq!(body.cut, 20.0);
        assert_eq!(body.base_plane, BasePlane::Triangulation);
    }
}
