//! Concatenation vendor client.
//!
//! Multi-segment videos are stitched by a merge vendor: we submit the
//! ordered segment URLs plus a webhook URL, and the vendor POSTs a
//! callback with either the merged video URL or an error.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VendorError, VendorResult};

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    video_urls: &'a [String],
    webhook_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

/// Outcome field of a merge callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCallbackVideo {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCallbackPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<MergeCallbackVideo>,
}

/// Body the merge vendor POSTs to our webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCallback {
    pub status: MergeOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MergeCallbackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergeCallback {
    pub fn is_ok(&self) -> bool {
        self.status == MergeOutcome::Ok
    }

    /// Merged video URL, when the callback reports success and carries one.
    pub fn video_url(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.video.as_ref())
            .map(|v| v.url.as_str())
    }

    /// Error text for a failed merge, with a fallback for sparse callbacks.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "Merge vendor reported failure".to_string())
    }
}

/// Client for the segment merge vendor.
pub struct MergeClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl MergeClient {
    /// Create a new client from the environment.
    pub fn new() -> VendorResult<Self> {
        let api_key = std::env::var("MERGE_API_KEY")
            .map_err(|_| VendorError::config_error("MERGE_API_KEY not set"))?;
        let base_url = std::env::var("MERGE_API_URL")
            .map_err(|_| VendorError::config_error("MERGE_API_URL not set"))?;

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

    /// Submit a merge of the ordered segment URLs. Returns the vendor
    /// request id; the outcome arrives on the webhook.
    pub async fn submit(
        &self,
        video_urls: &[String],
        webhook_url: &str,
    ) -> VendorResult<String> {
        if video_urls.len() < 2 {
            return Err(VendorError::rejected(
                "Merge requires at least two segments",
            ));
        }

        let url = format!("{}/merge", self.base_url);
        let request = MergeRequest {
            video_urls,
            webhook_url,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&request)
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

        debug!(request_id = %body.request_id, segments = video_urls.len(), "Submitted merge");
        Ok(body.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_ok_callback_exposes_video_url() {
        let callback: MergeCallback = serde_json::from_value(json!({
            "status": "OK",
            "payload": { "video": { "url": "https://vendor.example/merged.mp4" } }
        }))
        .unwrap();

        assert!(callback.is_ok());
        assert_eq!(
            callback.video_url(),
            Some("https://vendor.example/merged.mp4")
        );
    }

    #[test]
    fn test_error_callback_has_no_url() {
        let callback: MergeCallback = serde_json::from_value(json!({
            "status": "ERROR",
            "error": "segment 2 unreadable"
        }))
        .unwrap();

        assert!(!callback.is_ok());
        assert_eq!(callback.video_url(), None);
        assert_eq!(callback.error_message(), "segment 2 unreadable");
    }

    #[test]
    fn test_sparse_error_callback_gets_fallback_message() {
        let callback: MergeCallback =
            serde_json::from_value(json!({ "status": "ERROR" })).unwrap();
        assert_eq!(callback.error_message(), "Merge vendor reported failure");
    }

    #[test]
    fn test_ok_callback_without_payload_has_no_url() {
        let callback: MergeCallback = serde_json::from_value(json!({ "status": "OK" })).unwrap();
        assert!(callback.is_ok());
        assert_eq!(callback.video_url(), None);
    }

    #[tokio::test]
    async fn test_submit_returns_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/merge"))
            .and(body_partial_json(json!({
                "webhook_url": "https://api.example/webhooks/merge/v1?token=t"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "request_id": "merge-1" })),
            )
            .mount(&server)
            .await;

        let client = MergeClient::with_base_url("k", server.uri());
        let urls = vec![
            "https://r2.example/seg0.mp4".to_string(),
            "https://r2.example/seg1.mp4".to_string(),
        ];
        let id = client
            .submit(&urls, "https://api.example/webhooks/merge/v1?token=t")
            .await
            .unwrap();
        assert_eq!(id, "merge-1");
    }

    #[tokio::test]
    async fn test_single_url_is_rejected_locally() {
        let client = MergeClient::with_base_url("k", "http://localhost:1");
        let urls = vec!["https://r2.example/seg0.mp4".to_string()];
        let err = client.submit(&urls, "https://api.example/hook").await;
        assert!(matches!(err, Err(VendorError::Rejected(_))));
    }
}
