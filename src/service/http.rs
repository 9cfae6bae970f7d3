//! HTTP implementation of [`MaskService`].

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::CONTENT_TYPE;

use super::{
    DetectRequest, MaskService, PrepareRequest, UploadRequest, UploadResponse, ViewRequest,
};
use crate::error::ServiceError;

/// Talks to `/sam/prepare`, `/sam/detect`, `/upload/image` and `/view`.
pub struct HttpMaskService {
    client: HttpClient,
    base_url: String,
}

impl HttpMaskService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map non-2xx responses to [`ServiceError::Status`].
fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ServiceError::Status {
        code: status.as_u16(),
        body,
    })
}

impl MaskService for HttpMaskService {
    fn prepare(&self, request: &PrepareRequest) -> Result<(), ServiceError> {
        log::debug!("POST /sam/prepare {:?}", request);
        let response = self
            .client
            .post(self.endpoint("/sam/prepare"))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()?;
        check(response)?;
        Ok(())
    }

    fn detect(&self, request: &DetectRequest) -> Result<Vec<u8>, ServiceError> {
        log::debug!(
            "POST /sam/detect ({} positive, {} negative, threshold {})",
            request.positive_points.len(),
            request.negative_points.len(),
            request.threshold
        );
        let response = self
            .client
            .post(self.endpoint("/sam/detect"))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()?;
        let bytes = check(response)?.bytes()?;
        if bytes.is_empty() {
            return Err(ServiceError::InvalidResponse(
                "detect returned an empty body".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }

    fn upload(&self, request: &UploadRequest) -> Result<String, ServiceError> {
        log::debug!("POST /upload/image {} ({} bytes)", request.name, request.png.len());
        let part = Part::bytes(request.png.clone())
            .file_name(request.name.clone())
            .mime_str("image/png")?;
        let form = Form::new()
            .part("image", part)
            .text("overwrite", if request.overwrite { "true" } else { "false" })
            .text("type", request.kind.clone());

        let response = self
            .client
            .post(self.endpoint("/upload/image"))
            .multipart(form)
            .send()?;
        let body = check(response)?.text()?;
        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::InvalidResponse(format!("upload response: {}", e)))?;

        Ok(parsed
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| request.name.clone()))
    }

    fn view(&self, request: &ViewRequest) -> Result<Vec<u8>, ServiceError> {
        log::debug!("GET /view {} ({})", request.filename, request.kind);
        let response = self
            .client
            .get(self.endpoint("/view"))
            .query(&[
                ("filename", request.filename.as_str()),
                ("type", request.kind.as_str()),
                ("subfolder", request.subfolder.as_str()),
            ])
            .send()?;
        Ok(check(response)?.bytes()?.to_vec())
    }
}
