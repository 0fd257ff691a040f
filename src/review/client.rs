// src/review/client.rs
//! HTTP client for the shipment backend's image endpoints.

use bevy::log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::error::ReviewError;
use super::extraction::ExtractionResult;
use super::payloads::{SerialNumberUpdateRequest, SerialNumberUpdateResponse};
use super::queue::{ExtractionBackend, UploadedImage};
use super::verification::VerificationBackend;

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReviewError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ReviewError::MissingToken);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn check(response: Response, action: &str) -> Result<Response, ReviewError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, action))
    }
}

/// Maps a non-success status (and its body, if any) to a readable error.
fn status_error(status: StatusCode, body: &str, action: &str) -> ReviewError {
    match status {
        StatusCode::UNAUTHORIZED => ReviewError::Unauthorized,
        StatusCode::FORBIDDEN => ReviewError::Forbidden(action.to_string()),
        _ => {
            let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
                ["message", "error"]
                    .iter()
                    .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
            });
            let message = from_json
                .or_else(|| {
                    let trimmed = body.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            ReviewError::Http {
                status: status.as_u16(),
                message,
            }
        }
    }
}

fn extraction_error(err: ReviewError) -> ReviewError {
    match err {
        ReviewError::Unauthorized | ReviewError::Forbidden(_) | ReviewError::ExtractionFailed(_) => err,
        other => ReviewError::ExtractionFailed(other.to_string()),
    }
}

impl ExtractionBackend for BackendClient {
    async fn extract_containers(
        &self,
        project_id: &str,
        image: &UploadedImage,
    ) -> Result<ExtractionResult, ReviewError> {
        let attempt = async {
            let part = Part::bytes(image.bytes.to_vec())
                .file_name(image.file_name.clone())
                .mime_str(image.mime)?;
            let form = Form::new()
                .part("file", part)
                .text("projectId", project_id.to_string())
                .text("description", format!("Container labels: {}", image.file_name));

            debug!("Uploading '{}' ({} bytes) for extraction.", image.file_name, image.bytes.len());
            let response = self
                .http
                .post(self.url("images/upload-and-extract"))
                .bearer_auth(&self.token)
                .multipart(form)
                .send()
                .await?;
            let response = Self::check(response, "upload images").await?;
            let body: Value = response.json().await?;

            if body.get("success").and_then(Value::as_bool) == Some(false) {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("the server could not read this image");
                return Err(ReviewError::ExtractionFailed(message.to_string()));
            }
            Ok::<_, ReviewError>(ExtractionResult::from_json(&body))
        };
        attempt.await.map_err(extraction_error)
    }
}

impl VerificationBackend for BackendClient {
    async fn update_serial_numbers(
        &self,
        request: &SerialNumberUpdateRequest,
    ) -> Result<SerialNumberUpdateResponse, ReviewError> {
        let response = self
            .http
            .post(self.url("images/update-serial-numbers"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let response = Self::check(response, "update serial numbers").await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(SerialNumberUpdateResponse {
                image_id: request.image_id.clone(),
                project_id: request.project_id.clone(),
                updated_count: request.updated_serials.len() as u32,
                ..Default::default()
            });
        }
        let parsed: SerialNumberUpdateResponse =
            serde_json::from_str(&text).map_err(|e| ReviewError::Decode(e.to_string()))?;
        info!(
            "Updated {} serial number(s) on image {}.",
            parsed.updated_count, request.image_id
        );
        Ok(parsed)
    }

    async fn verify_image(&self, remote_image_id: &str, verified: bool) -> Result<(), ReviewError> {
        let response = self
            .http
            .put(self.url(&format!("images/{}/verify", remote_image_id)))
            .bearer_auth(&self.token)
            .query(&[("isVerified", verified)])
            .send()
            .await?;
        Self::check(response, "verify images").await?;
        info!("Image {} marked verified={}.", remote_image_id, verified);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let client =
            BackendClient::new("http://localhost:8080/api/", "t", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("/images/upload-and-extract"),
            "http://localhost:8080/api/images/upload-and-extract"
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        assert_eq!(
            BackendClient::new("http://x", "  ", Duration::from_secs(1)).unwrap_err(),
            ReviewError::MissingToken
        );
    }

    #[test]
    fn auth_statuses_map_to_dedicated_errors() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "", "x"), ReviewError::Unauthorized);
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "", "verify images"),
            ReviewError::Forbidden("verify images".into())
        );
    }

    #[test]
    fn other_statuses_carry_the_server_message() {
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, r#"{"message":"bad project"}"#, "x"),
            ReviewError::Http {
                status: 400,
                message: "bad project".into()
            }
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "", "x"),
            ReviewError::Http {
                status: 500,
                message: "Internal Server Error".into()
            }
        );
    }

    #[test]
    fn transport_errors_become_extraction_failures() {
        let err = extraction_error(ReviewError::Network("refused".into()));
        assert_eq!(
            err.to_string(),
            "Extraction failed: Unable to connect to server: refused"
        );
        assert_eq!(extraction_error(ReviewError::Unauthorized), ReviewError::Unauthorized);
    }
}
