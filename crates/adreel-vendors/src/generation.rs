//! Video-generation vendor client.
//!
//! The vendor exposes a queue-style API: submit returns a request id, a
//! status endpoint reports `IN_QUEUE` / `IN_PROGRESS` / `COMPLETED` /
//! `FAILED`, and a result endpoint returns the rendered video URL once the
//! request completes. The vendor can also POST the status payload to a
//! per-segment webhook URL supplied at submit time.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VendorError, VendorResult};

/// One segment render submission.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    /// Presigned URL of the product image
    pub image_url: String,
    /// Per-segment motion prompt
    pub prompt: String,
    /// Generation seed, shared across a video's segments
    pub seed: u32,
    /// Segment length; always 8 for this product
    pub duration_seconds: u32,
    /// Output aspect ratio, e.g. "9:16"
    pub aspect_ratio: String,
    /// Status callback URL, if webhook delivery is wanted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Vendor-side status of a render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
}

impl RenderStatus {
    /// Parse the vendor's status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_QUEUE" => Some(RenderStatus::InQueue),
            "IN_PROGRESS" => Some(RenderStatus::InProgress),
            "COMPLETED" => Some(RenderStatus::Completed),
            "FAILED" => Some(RenderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Completed | RenderStatus::Failed)
    }
}

/// Status payload, returned by the status endpoint and also POSTed to the
/// per-segment webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderStatusPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderStatusPayload {
    /// The parsed status, rejecting strings outside the vendor contract.
    pub fn parsed(&self) -> VendorResult<RenderStatus> {
        RenderStatus::parse(&self.status).ok_or_else(|| {
            VendorError::invalid_response(format!("Unknown render status: {}", self.status))
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    video: ResultVideo,
}

#[derive(Debug, Deserialize)]
struct ResultVideo {
    url: String,
}

/// Client for the segment render vendor.
pub struct GenerationClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GenerationClient {
    /// Create a new client from the environment.
    pub fn new() -> VendorResult<Self> {
        let api_key = std::env::var("RENDER_API_KEY")
            .map_err(|_| VendorError::config_error("RENDER_API_KEY not set"))?;
        let base_url = std::env::var("RENDER_API_URL")
            .map_err(|_| VendorError::config_error("RENDER_API_URL not set"))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        })
    }

    /// Create a client with an explicit key and API base (used in tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Submit a segment render. Returns the vendor request id.
    pub async fn submit(&self, request: &RenderRequest) -> VendorResult<String> {
        let url = format!("{}/requests", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VendorError::from_status(status, error_text));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| VendorError::invalid_response(format!("Bad submit body: {}", e)))?;

        debug!(request_id = %body.request_id, "Submitted segment render");
        Ok(body.request_id)
    }

    /// Fetch the current status of a render request.
    pub async fn status(&self, request_id: &str) -> VendorResult<RenderStatusPayload> {
        let url = format!("{}/requests/{}/status", self.base_url, request_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VendorError::from_status(status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| VendorError::invalid_response(format!("Bad status body: {}", e)))
    }

    /// Fetch the output URL of a completed request.
    pub async fn result(&self, request_id: &str) -> VendorResult<String> {
        let url = format!("{}/requests/{}", self.base_url, request_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VendorError::from_status(status, error_text));
        }

        let body: ResultResponse = response
            .json()
            .await
            .map_err(|e| VendorError::invalid_response(format!("Bad result body: {}", e)))?;

        Ok(body.video.url)
    }

    /// Download a rendered file from the vendor's output URL.
    pub async fn download_output(&self, url: &str) -> VendorResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(VendorError::from_status(status, "Output download failed"));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RenderRequest {
        RenderRequest {
            image_url: "https://r2.example/img.png?sig=abc".to_string(),
            prompt: "slow pan".to_string(),
            seed: 54_321,
            duration_seconds: 8,
            aspect_ratio: "9:16".to_string(),
            webhook_url: None,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(RenderStatus::parse("IN_QUEUE"), Some(RenderStatus::InQueue));
        assert_eq!(
            RenderStatus::parse("IN_PROGRESS"),
            Some(RenderStatus::InProgress)
        );
        assert_eq!(
            RenderStatus::parse("COMPLETED"),
            Some(RenderStatus::Completed)
        );
        assert_eq!(RenderStatus::parse("FAILED"), Some(RenderStatus::Failed));
        assert_eq!(RenderStatus::parse("DONE"), None);
        assert!(RenderStatus::Completed.is_terminal());
        assert!(!RenderStatus::InQueue.is_terminal());
    }

    #[test]
    fn test_webhook_url_omitted_when_none() {
        let body = serde_json::to_value(request()).unwrap();
        assert!(body.get("webhook_url").is_none());
        assert_eq!(body["seed"], 54_321);
        assert_eq!(body["duration_seconds"], 8);
    }

    #[tokio::test]
    async fn test_submit_returns_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/requests"))
            .and(body_partial_json(json!({ "prompt": "slow pan" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "request_id": "req-1" })),
            )
            .mount(&server)
            .await;

        let client = GenerationClient::with_base_url("k", server.uri());
        let id = client.submit(&request()).await.unwrap();
        assert_eq!(id, "req-1");
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "IN_PROGRESS" })),
            )
            .mount(&server)
            .await;

        let client = GenerationClient::with_base_url("k", server.uri());
        let payload = client.status("req-1").await.unwrap();
        assert_eq!(payload.parsed().unwrap(), RenderStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failed_status_carries_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requests/req-2/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "FAILED",
                "error": "content policy"
            })))
            .mount(&server)
            .await;

        let client = GenerationClient::with_base_url("k", server.uri());
        let payload = client.status("req-2").await.unwrap();
        assert_eq!(payload.parsed().unwrap(), RenderStatus::Failed);
        assert_eq!(payload.error.as_deref(), Some("content policy"));
    }

    #[tokio::test]
    async fn test_result_returns_video_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video": { "url": "https://vendor.example/out.mp4" }
            })))
            .mount(&server)
            .await;

        let client = GenerationClient::with_base_url("k", server.uri());
        let url = client.result("req-1").await.unwrap();
        assert_eq!(url, "https://vendor.example/out.mp4");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/requests"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = GenerationClient::with_base_url("k", server.uri());
        let err = client.submit(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
