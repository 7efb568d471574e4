//! Signed webhook tokens.
//!
//! Vendor callbacks land on public endpoints, so every webhook URL we hand
//! out carries an HMAC-signed token binding it to one video (and, for render
//! callbacks, one segment). The handler verifies the token before touching
//! any state; a bad or expired token means the callback is dropped.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{VendorError, VendorResult};

/// Default token lifetime (24 hours). Renders finish in minutes, but vendor
/// retry queues can redeliver callbacks much later.
pub const DEFAULT_WEBHOOK_TTL_SECS: u64 = 86400;

/// Scope of a webhook token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookScope {
    Render,
    Merge,
}

impl WebhookScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookScope::Render => "render",
            WebhookScope::Merge => "merge",
        }
    }
}

/// Token payload embedded in webhook URLs (HMAC-signed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookToken {
    /// Video ID.
    pub vid: String,
    /// Scope (render/merge).
    pub scope: String,
    /// Segment index, for render callbacks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seg: Option<u32>,
    /// Expiry timestamp (Unix seconds).
    pub exp: u64,
}

impl WebhookToken {
    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Token for one segment's render callback.
    pub fn render(video_id: &str, segment_index: u32, ttl: Duration) -> Self {
        Self {
            vid: video_id.to_string(),
            scope: WebhookScope::Render.as_str().to_string(),
            seg: Some(segment_index),
            exp: Self::now() + ttl.as_secs(),
        }
    }

    /// Token for a video's merge callback.
    pub fn merge(video_id: &str, ttl: Duration) -> Self {
        Self {
            vid: video_id.to_string(),
            scope: WebhookScope::Merge.as_str().to_string(),
            seg: None,
            exp: Self::now() + ttl.as_secs(),
        }
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Self::now() >= self.exp
    }

    /// Does this token authorize the given render callback?
    pub fn authorizes_render(&self, video_id: &str, segment_index: u32) -> bool {
        self.scope == WebhookScope::Render.as_str()
            && self.vid == video_id
            && self.seg == Some(segment_index)
    }

    /// Does this token authorize the given merge callback?
    pub fn authorizes_merge(&self, video_id: &str) -> bool {
        self.scope == WebhookScope::Merge.as_str() && self.vid == video_id
    }

    /// Encode the payload to base64 JSON.
    fn try_encode(&self) -> VendorResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| {
            VendorError::config_error(format!("Failed to serialize webhook token: {}", e))
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a payload from base64 JSON.
    fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Sign the token with HMAC-SHA256.
    ///
    /// Returns an error if token encoding or HMAC key creation fails.
    pub fn sign(&self, secret: &str) -> VendorResult<String> {
        type HmacSha256 = Hmac<Sha256>;

        let payload = self.try_encode()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| VendorError::config_error(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify a signed token.
    ///
    /// Returns `None` if the token is malformed, expired, or the signature
    /// does not check out. Returns an error only for configuration issues
    /// (invalid HMAC key).
    pub fn verify(signed: &str, secret: &str) -> VendorResult<Option<Self>> {
        type HmacSha256 = Hmac<Sha256>;

        let parts: Vec<&str> = signed.splitn(2, '.').collect();
        if parts.len() != 2 {
            return Ok(None);
        }

        let (payload, sig_encoded) = (parts[0], parts[1]);
        let sig_bytes = match URL_SAFE_NO_PAD.decode(sig_encoded) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| VendorError::config_error(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload.as_bytes());

        if mac.verify_slice(&sig_bytes).is_err() {
            return Ok(None);
        }

        let token = match Self::decode(payload) {
            Some(t) => t,
            None => return Ok(None),
        };

        if token.is_expired() {
            return Ok(None);
        }

        Ok(Some(token))
    }
}

/// Build the full render callback URL for one segment.
pub fn render_webhook_url(
    public_base_url: &str,
    video_id: &str,
    segment_index: u32,
    secret: &str,
) -> VendorResult<String> {
    let token = WebhookToken::render(
        video_id,
        segment_index,
        Duration::from_secs(DEFAULT_WEBHOOK_TTL_SECS),
    );
    let signed = token.sign(secret)?;
    Ok(format!(
        "{}/webhooks/render/{}/{}?token={}",
        public_base_url.trim_end_matches('/'),
        video_id,
        segment_index,
        signed
    ))
}

/// Build the full merge callback URL for a video.
pub fn merge_webhook_url(
    public_base_url: &str,
    video_id: &str,
    secret: &str,
) -> VendorResult<String> {
    let token = WebhookToken::merge(video_id, Duration::from_secs(DEFAULT_WEBHOOK_TTL_SECS));
    let signed = token.sign(secret)?;
    Ok(format!(
        "{}/webhooks/merge/{}?token={}",
        public_base_url.trim_end_matches('/'),
        video_id,
        signed
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    #[test]
    fn test_sign_verify_round_trip() {
        let token = WebhookToken::render("vid-1", 2, Duration::from_secs(60));
        let signed = token.sign(SECRET).unwrap();

        let verified = WebhookToken::verify(&signed, SECRET).unwrap().unwrap();
        assert_eq!(verified.vid, "vid-1");
        assert_eq!(verified.seg, Some(2));
        assert!(verified.authorizes_render("vid-1", 2));
        assert!(!verified.authorizes_render("vid-1", 3));
        assert!(!verified.authorizes_merge("vid-1"));
    }

    #[test]
    fn test_merge_token_scope() {
        let token = WebhookToken::merge("vid-1", Duration::from_secs(60));
        let signed = token.sign(SECRET).unwrap();

        let verified = WebhookToken::verify(&signed, SECRET).unwrap().unwrap();
        assert!(verified.authorizes_merge("vid-1"));
        assert!(!verified.authorizes_merge("vid-2"));
        assert!(!verified.authorizes_render("vid-1", 0));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = WebhookToken::merge("vid-1", Duration::from_secs(60));
        let signed = token.sign(SECRET).unwrap();

        let verified = WebhookToken::verify(&signed, "other-secret").unwrap();
        assert!(verified.is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = WebhookToken {
            vid: "vid-1".to_string(),
            scope: "merge".to_string(),
            seg: None,
            exp: 0,
        };
        let signed = token.sign(SECRET).unwrap();

        let verified = WebhookToken::verify(&signed, SECRET).unwrap();
        assert!(verified.is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = WebhookToken::merge("vid-1", Duration::from_secs(60));
        let signed = token.sign(SECRET).unwrap();

        let other = WebhookToken::merge("vid-2", Duration::from_secs(60));
        let other_payload = other.sign(SECRET).unwrap();
        let forged = format!(
            "{}.{}",
            other_payload.split('.').next().unwrap(),
            signed.split('.').nth(1).unwrap()
        );

        assert!(WebhookToken::verify(&forged, SECRET).unwrap().is_none());
    }

    #[test]
    fn test_garbage_input_rejected() {
        assert!(WebhookToken::verify("not-a-token", SECRET).unwrap().is_none());
        assert!(WebhookToken::verify("a.b", SECRET).unwrap().is_none());
        assert!(WebhookToken::verify("", SECRET).unwrap().is_none());
    }

    #[test]
    fn test_webhook_urls_embed_signed_token() {
        let url = render_webhook_url("https://api.example/", "vid-1", 0, SECRET).unwrap();
        assert!(url.starts_with("https://api.example/webhooks/render/vid-1/0?token="));

        let token_str = url.split("token=").nth(1).unwrap();
        let verified = WebhookToken::verify(token_str, SECRET).unwrap().unwrap();
        assert!(verified.authorizes_render("vid-1", 0));

        let merge_url = merge_webhook_url("https://api.example", "vid-9", SECRET).unwrap();
        assert!(merge_url.starts_with("https://api.example/webhooks/merge/vid-9?token="));
    }
}
