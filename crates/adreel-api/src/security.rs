//! Input screening: URL checks for server-side fetches and text
//! sanitization for user-supplied fields.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

/// Maximum URL length accepted for server-side fetches.
const MAX_URL_LENGTH: usize = 2048;

/// Maximum motion prompt length.
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Maximum title length.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Prefixes a server-side fetch must never reach: loopback, RFC 1918
/// ranges, link-local (which covers cloud metadata IPs), and metadata
/// hostnames. Product images can live on any public host, so screening is
/// deny-list only.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    r"^https?://127\.",
    r"^https?://localhost",
    r"^https?://10\.",
    r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.",
    r"^https?://192\.168\.",
    r"^https?://169\.254\.",
    r"^https?://\[::1\]",
    r"^https?://\[fd",
    r"^https?://\[fe80",
    r"^https?://metadata\.",
];

static BLOCKED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BLOCKED_URL_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Result of URL validation.
#[derive(Debug)]
pub enum UrlValidationResult {
    Valid(String),
    /// Malformed, empty, or a non-HTTP scheme.
    Invalid(String),
    /// Targets an internal or metadata endpoint.
    Blocked(String),
    TooLong,
}

impl UrlValidationResult {
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) | Self::Blocked(msg) => Err(msg),
            Self::TooLong => Err(format!(
                "URL exceeds maximum length of {MAX_URL_LENGTH} characters"
            )),
        }
    }
}

/// Screen an image URL before the server fetches it: length, http(s)
/// scheme, a real host, and none of the blocked internal prefixes.
pub fn validate_image_url(url: &str) -> UrlValidationResult {
    let url = url.trim();
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {e}")),
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return UrlValidationResult::Invalid(format!(
            "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
            parsed.scheme()
        ));
    }
    if parsed.host_str().is_none() {
        return UrlValidationResult::Invalid("URL must have a valid host".to_string());
    }

    if let Some(pattern) = BLOCKED.iter().find(|p| p.is_match(url)) {
        warn!(url = %url, pattern = pattern.as_str(), "Blocked URL pattern");
        return UrlValidationResult::Blocked(
            "URL appears to target an internal or restricted endpoint".to_string(),
        );
    }

    UrlValidationResult::Valid(url.to_string())
}

/// Strip control characters (keeping newlines and tabs) and cap the length.
pub fn sanitize_prompt(input: &str) -> String {
    input
        .chars()
        .filter(|c| matches!(c, '\n' | '\t') || !c.is_control())
        .take(MAX_PROMPT_LENGTH)
        .collect()
}

/// Trim and cap a title.
pub fn sanitize_title(input: &str) -> String {
    input.trim().chars().take(MAX_TITLE_LENGTH).collect()
}

/// Video IDs are 8-64 characters of ASCII alphanumerics and hyphens.
pub fn is_valid_video_id(id: &str) -> bool {
    (8..=64).contains(&id.len())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_image_urls_pass() {
        assert!(matches!(
            validate_image_url("https://cdn.example.com/products/shoe.png"),
            UrlValidationResult::Valid(_)
        ));
        assert!(matches!(
            validate_image_url("http://images.shop.io/a.jpg"),
            UrlValidationResult::Valid(_)
        ));
    }

    #[test]
    fn test_blocked_internal_ips() {
        for url in [
            "http://127.0.0.1/image.png",
            "http://localhost/image.png",
            "http://192.168.1.1/image.png",
            "http://169.254.169.254/latest/meta-data/",
            "http://metadata.google.internal/computeMetadata/v1/",
            "http://[::1]/image.png",
        ] {
            assert!(
                matches!(validate_image_url(url), UrlValidationResult::Blocked(_)),
                "{url} should be blocked"
            );
        }
    }

    #[test]
    fn test_invalid_protocols() {
        assert!(matches!(
            validate_image_url("ftp://cdn.example.com/image.png"),
            UrlValidationResult::Invalid(_)
        ));
        assert!(matches!(
            validate_image_url("file:///etc/passwd"),
            UrlValidationResult::Invalid(_)
        ));
        assert!(matches!(
            validate_image_url("javascript:alert(1)"),
            UrlValidationResult::Invalid(_)
        ));
        assert!(matches!(
            validate_image_url("   "),
            UrlValidationResult::Invalid(_)
        ));
    }

    #[test]
    fn test_video_id_validation() {
        assert!(is_valid_video_id("12345678"));
        assert!(is_valid_video_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_video_id("short"));
        assert!(!is_valid_video_id("has/slash-but-long-enough"));
        assert!(!is_valid_video_id("has..dots-but-long-enough"));
    }

    #[test]
    fn test_sanitize_title_trims_and_caps() {
        assert_eq!(sanitize_title("  Summer drop  "), "Summer drop");
        let long = "x".repeat(MAX_TITLE_LENGTH + 50);
        assert_eq!(sanitize_title(&long).len(), MAX_TITLE_LENGTH);
    }

    #[test]
    fn test_sanitize_prompt_strips_control_chars() {
        assert_eq!(sanitize_prompt("spin\u{0000} the\nshoe"), "spin the\nshoe");
    }
}
