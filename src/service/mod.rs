//! Remote segmentation and storage endpoints.
//!
//! [`MaskService`] is the blocking contract: prepare a model on an image,
//! detect a mask from points, upload a PNG, fetch stored bytes. It runs on a
//! worker thread behind a `Transport`, never on the panel's thread.

mod http;

pub use http::HttpMaskService;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Bind the model to one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareRequest {
    #[serde(rename = "sam_model_name")]
    pub model: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subfolder: String,
}

/// Full point set plus threshold. Always complete, never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectRequest {
    pub positive_points: Vec<[i32; 2]>,
    pub negative_points: Vec<[i32; 2]>,
    pub threshold: f32,
}

/// Multipart upload of one mask PNG.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    /// Generated unique name; also the fallback handle.
    pub name: String,
    pub png: Vec<u8>,
    /// Storage type field, `input` for masks.
    pub kind: String,
    pub overwrite: bool,
}

/// Body of a successful upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subfolder: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Fetch stored image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub filename: String,
    pub kind: String,
    pub subfolder: String,
}

/// Blocking calls against the segmentation/storage server.
pub trait MaskService: Send {
    /// `Ok` means the model is ready for this image.
    fn prepare(&self, request: &PrepareRequest) -> Result<(), ServiceError>;

    /// Returns the encoded single-channel occupancy bitmap.
    fn detect(&self, request: &DetectRequest) -> Result<Vec<u8>, ServiceError>;

    /// Returns the storage handle (the server's name, or the request's name
    /// when the server doesn't report one).
    fn upload(&self, request: &UploadRequest) -> Result<String, ServiceError>;

    fn view(&self, request: &ViewRequest) -> Result<Vec<u8>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_wire_names() {
        let request = PrepareRequest {
            model: "auto".to_string(),
            filename: "cat.png".to_string(),
            kind: "input".to_string(),
            subfolder: String::new(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sam_model_name"], "auto");
        assert_eq!(value["type"], "input");
        assert_eq!(value["filename"], "cat.png");
        assert_eq!(value["subfolder"], "");
    }

    #[test]
    fn test_detect_wire_shape() {
        let request = DetectRequest {
            positive_points: vec![[10, 10], [50, 50]],
            negative_points: vec![[30, 30]],
            threshold: 0.5,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["positive_points"][1][0], 50);
        assert_eq!(value["negative_points"][0][1], 30);
        assert_eq!(value["threshold"], 0.5);
    }

    #[test]
    fn test_upload_response_without_name() {
        let response: UploadResponse = serde_json::from_str(r#"{"type": "input"}"#).unwrap();
        assert!(response.name.is_none());
        assert_eq!(response.kind.as_deref(), Some("input"));
    }
}
