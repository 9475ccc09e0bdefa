//! External assets API: dataset listing and file download.

use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ApiClient;
use crate::result::E2eResult;

/// Listing endpoint
pub const ASSETS_PATH: &str = "/external/v1/assets";

/// Body returned when a file cannot be served
pub const FILE_NOT_FOUND: &str = "File Not Found";

/// Dataset listing for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsResponse {
    /// Project display name
    pub project_name: String,
    /// Datasets, newest first
    pub datasets: Vec<Dataset>,
}

impl AssetsResponse {
    /// Dataset by id
    #[must_use]
    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id == id)
    }
}

/// One capture date and its deliverables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Identifier
    pub id: String,
    /// Capture date as shown in file names
    pub date: String,
    /// File name to availability
    pub files: BTreeMap<String, bool>,
}

impl Dataset {
    /// Files that can be downloaded
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.files.iter().filter(|(_, ok)| **ok).map(|(name, _)| name.as_str())
    }

    /// Files listed but not yet processed
    pub fn unavailable(&self) -> impl Iterator<Item = &str> {
        self.files.iter().filter(|(_, ok)| !**ok).map(|(name, _)| name.as_str())
    }
}

/// `{ "error": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadError {
    /// Message
    pub error: String,
}

impl DownloadError {
    /// Generic message or the DTM-specific variant
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error == FILE_NOT_FOUND || self.error.to_lowercase().contains("not found")
    }
}

/// GET the dataset listing for a project
pub async fn list_assets(client: &ApiClient, project_id: &str) -> E2eResult<Response> {
    client.get_query(ASSETS_PATH, &[("project_id", project_id)]).await
}

/// GET one file of a dataset
pub async fn download_file(client: &ApiClient, dataset_id: &str, file: &str) -> E2eResult<Response> {
    client
        .get(&format!("{ASSETS_PATH}/datasets/{dataset_id}/files/{file}"))
        .await
}

/// File name from a `Content-Disposition` value
///
/// `filename*` (RFC 5987) wins over `filename`.
#[must_use]
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let value = value.trim().trim_matches('"');
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                match urlencoding::decode(encoded) {
                    Ok(name) => extended = Some(name.into_owned()),
                    Err(e) => tracing::debug!(%encoded, error = %e, "undecodable filename*"),
                }
            }
            "filename" => plain = Some(value.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }
    extended.or(plain).filter(|name| !name.is_empty())
}

/// Download name from a response's headers
#[must_use]
pub fn response_filename(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(content_disposition_filename)
}

/// `"{project}_{date}_{name}.{type}"`, splitting the file at its last dot
#[must_use]
pub fn expected_download_name(project_name: &str, dataset_date: &str, file: &str) -> String {
    match file.rsplit_once('.') {
        Some((name, ext)) => format!("{project_name}_{dataset_date}_{name}.{ext}"),
        None => format!("{project_name}_{dataset_date}_{file}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod filename_tests {
        use super::*;

        #[test]
        fn test_plain_filename() {
            assert_eq!(
                content_disposition_filename(r#"attachment; filename="Site_2024-01-05_orthophoto.tif""#),
                Some("Site_2024-01-05_orthophoto.tif".into())
            );
            assert_eq!(
                content_disposition_filename("attachment; filename=plain.las"),
                Some("plain.las".into())
            );
        }

        #[test]
        fn test_extended_filename_wins() {
            let header = r#"attachment; filename="fallback.tif"; filename*=UTF-8''Site%20A_2024_dsm.tif"#;
            assert_eq!(content_disposition_filename(header), Some("Site A_2024_dsm.tif".into()));
        }

        #[test]
        fn test_extended_filename_decodes_utf8() {
            let header = "attachment; filename*=UTF-8''%EC%84%9C%EC%9A%B8_2024_ortho.tif";
            assert_eq!(content_disposition_filename(header), Some("서울_2024_ortho.tif".into()));
        }

        #[test]
        fn test_extended_filename_order_does_not_matter() {
            let header = r#"attachment; filename*=UTF-8''dsm%2Bdtm.tif; filename="fallback.tif""#;
            assert_eq!(content_disposition_filename(header), Some("dsm+dtm.tif".into()));
        }

        #[test]
        fn test_invalid_extended_filename_falls_back_to_plain() {
            let header = r#"attachment; filename="fallback.tif"; filename*=UTF-8''bad%FF%FE.tif"#;
            assert_eq!(content_disposition_filename(header), Some("fallback.tif".into()));
        }

        #[test]
        fn test_missing_filename() {
            assert_eq!(content_disposition_filename("inline"), None);
            assert_eq!(content_disposition_filename(r#"attachment; filename="""#), None);
        }

        #[test]
        fn test_expected_name_splits_last_dot() {
            assert_eq!(
                expected_download_name("Site", "2024-01-05", "pointcloud_25.las"),
                "Site_2024-01-05_pointcloud_25.las"
            );
            assert_eq!(
                expected_download_name("Site", "d", "mesh.obj.zip"),
                "Site_d_mesh.obj.zip"
            );
            assert_eq!(expected_download_name("Site", "d", "README"), "Site_d_README");
        }
    }

    mod model_tests {
        use super::*;

        #[test]
        fn test_dataset_availability() {
            let body: AssetsResponse = serde_json::from_value(serde_json::json!({
                "project_name": "Site",
                "datasets": [{
                    "id": "d1",
                    "date": "2024-01-05",
                    "files": { "orthophoto.tif": true, "pointcloud_25.las": false }
                }]
            }))
            .unwrap();
            let dataset = body.dataset("d1").unwrap();
            assert_eq!(dataset.available().collect::<Vec<_>>(), vec!["orthophoto.tif"]);
            assert_eq!(dataset.unavailable().collect::<Vec<_>>(), vec!["pointcloud_25.las"]);
            assert!(body.dataset("d2").is_none());
        }

        #[test]
        fn test_not_found_variants() {
            let generic = DownloadError {
                error: FILE_NOT_FOUND.into(),
            };
            let dtm = DownloadError {
                error: "DTM file not found for this dataset".into(),
            };
            let other = DownloadError {
                error: "Forbidden".into(),
            };
            assert!(generic.is_not_found());
            assert!(dtm.is_not_found());
            assert!(!other.is_not_found());
        }
    }
}
