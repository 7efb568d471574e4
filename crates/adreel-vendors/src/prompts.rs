//! Prompt-generation client.
//!
//! Asks a Gemini-style generateContent API for one motion prompt per
//! segment. The reply is a JSON object `{ "prompts": string[] }`, which
//! models like to wrap in markdown code fences; those are stripped before
//! parsing. Wrong-length prompt lists are padded with the base prompt or
//! truncated so the caller always gets exactly one prompt per segment.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{VendorError, VendorResult};

/// Default API base for the prompt vendor.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Models tried in order until one succeeds.
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Client for the prompt-generation API.
pub struct PromptClient {
    api_key: String,
    base_url: String,
    models: Vec<String>,
    client: Client,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// The vendor-defined prompt contract.
#[derive(Debug, Deserialize)]
struct PromptsPayload {
    prompts: Vec<String>,
}

impl PromptClient {
    /// Create a new client from the environment.
    pub fn new() -> VendorResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| VendorError::config_error("GEMINI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            client: Client::new(),
        })
    }

    /// Create a client with an explicit key and API base (used in tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            client: Client::new(),
        }
    }

    /// Override the model fallback list.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Generate exactly `segment_count` motion prompts for a video.
    ///
    /// Models are tried in order; the first parseable reply wins.
    pub async fn generate_segment_prompts(
        &self,
        base_prompt: &str,
        segment_count: u32,
    ) -> VendorResult<Vec<String>> {
        let prompt = build_prompt(base_prompt, segment_count);
        let mut last_error = None;

        for model in &self.models {
            match self.call_generate_content(model, &prompt).await {
                Ok(prompts) => {
                    info!(model = %model, count = prompts.len(), "Got segment prompts");
                    return Ok(normalize_prompts(prompts, base_prompt, segment_count as usize));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Prompt model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| VendorError::config_error("No prompt models configured")))
    }

    async fn call_generate_content(&self, model: &str, prompt: &str) -> VendorResult<Vec<String>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VendorError::from_status(status, error_text));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| VendorError::invalid_response(format!("Bad generateContent body: {}", e)))?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| VendorError::invalid_response("No content in model response"))?;

        let payload: PromptsPayload =
            serde_json::from_str(strip_code_fences(text)).map_err(|e| {
                VendorError::PromptContract(format!("Failed to parse prompts JSON: {}", e))
            })?;

        if payload.prompts.is_empty() {
            return Err(VendorError::PromptContract(
                "Model returned an empty prompts array".to_string(),
            ));
        }

        Ok(payload.prompts)
    }
}

/// Build the instruction sent to the model.
fn build_prompt(base_prompt: &str, segment_count: u32) -> String {
    format!(
        r#"You are directing a short product marketing video rendered in {segment_count} consecutive 8-second shots.

Base direction from the user:
{base_prompt}

Write one camera/motion prompt per shot. Shots play back to back, so keep
subject and style continuous while varying the motion.

Return ONLY a single JSON object with this schema and nothing else:
{{
  "prompts": ["prompt for shot 1", "prompt for shot 2"]
}}

The "prompts" array must contain exactly {segment_count} entries.
"#
    )
}

/// Strip markdown code fences from model output.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = if let Some(rest) = text.strip_prefix("```json") {
        rest
    } else if let Some(rest) = text.strip_prefix("```") {
        rest
    } else {
        text
    };
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Force the prompt list to exactly `segment_count` entries.
///
/// Blank entries and missing tail entries become the base prompt; extras
/// are dropped.
fn normalize_prompts(prompts: Vec<String>, base_prompt: &str, segment_count: usize) -> Vec<String> {
    let mut prompts: Vec<String> = prompts
        .into_iter()
        .map(|p| {
            let trimmed = p.trim().to_string();
            if trimmed.is_empty() {
                base_prompt.to_string()
            } else {
                trimmed
            }
        })
        .collect();

    if prompts.len() > segment_count {
        warn!(
            got = prompts.len(),
            want = segment_count,
            "Model returned extra prompts, truncating"
        );
        prompts.truncate(segment_count);
    } else if prompts.len() < segment_count {
        warn!(
            got = prompts.len(),
            want = segment_count,
            "Model returned too few prompts, padding with base prompt"
        );
        while prompts.len() < segment_count {
            prompts.push(base_prompt.to_string());
        }
    }

    prompts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
    }

    #[test]
    fn test_strip_code_fences() {
        let bare = r#"{"prompts":["a"]}"#;
        assert_eq!(strip_code_fences(bare), bare);
        assert_eq!(
            strip_code_fences("```json\n{\"prompts\":[\"a\"]}\n```"),
            "{\"prompts\":[\"a\"]}"
        );
        assert_eq!(
            strip_code_fences("```\n{\"prompts\":[\"a\"]}\n```"),
            "{\"prompts\":[\"a\"]}"
        );
    }

    #[test]
    fn test_normalize_pads_and_truncates() {
        let padded = normalize_prompts(vec!["a".to_string()], "base", 3);
        assert_eq!(padded, vec!["a", "base", "base"]);

        let truncated = normalize_prompts(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            "base",
            2,
        );
        assert_eq!(truncated, vec!["a", "b"]);

        let blanks = normalize_prompts(vec!["  ".to_string(), "b".to_string()], "base", 2);
        assert_eq!(blanks, vec!["base", "b"]);
    }

    #[tokio::test]
    async fn test_generates_prompts_from_fenced_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_response(
                "```json\n{\"prompts\":[\"slow pan\",\"orbit shot\"]}\n```",
            )))
            .mount(&server)
            .await;

        let client = PromptClient::with_base_url("test-key", server.uri());
        let prompts = client
            .generate_segment_prompts("sneaker on a pedestal", 2)
            .await
            .unwrap();

        assert_eq!(prompts, vec!["slow pan", "orbit shot"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(model_response("{\"prompts\":[\"dolly in\"]}")),
            )
            .mount(&server)
            .await;

        let client = PromptClient::with_base_url("test-key", server.uri());
        let prompts = client.generate_segment_prompts("base", 1).await.unwrap();
        assert_eq!(prompts, vec!["dolly in"]);
    }

    #[tokio::test]
    async fn test_short_reply_is_padded_to_segment_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(model_response("{\"prompts\":[\"only one\"]}")),
            )
            .mount(&server)
            .await;

        let client = PromptClient::with_base_url("test-key", server.uri());
        let prompts = client.generate_segment_prompts("fallback", 3).await.unwrap();
        assert_eq!(prompts, vec!["only one", "fallback", "fallback"]);
    }

    #[tokio::test]
    async fn test_all_models_failing_returns_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = PromptClient::with_base_url("test-key", server.uri());
        let err = client.generate_segment_prompts("base", 1).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
