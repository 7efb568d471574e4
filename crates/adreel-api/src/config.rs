//! API configuration.

use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_MAX_BODY_BYTES: usize = 15 * 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size (multipart uploads included)
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Public base URL vendors call back on (no trailing slash)
    pub public_base_url: String,
    /// Secret for signing webhook callback tokens
    pub webhook_signing_secret: String,
    /// Emails allowed to call the admin surface (lowercased)
    pub admin_emails: HashSet<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: DEFAULT_MAX_BODY_BYTES,
            environment: "development".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            webhook_signing_secret: String::new(),
            admin_emails: HashSet::new(),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}

/// Comma-separated list variable; `None` when unset or all-blank.
fn env_list(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

impl ApiConfig {
    /// Read the configuration from the environment, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("API_HOST", defaults.host),
            port: env_parsed("API_PORT").unwrap_or(defaults.port),
            cors_origins: env_list("CORS_ORIGINS").unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parsed("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parsed("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            request_timeout: env_parsed("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parsed("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: env_or("ENVIRONMENT", defaults.environment),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            webhook_signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_default(),
            admin_emails: env_list("ADMIN_EMAILS")
                .map(|emails| emails.into_iter().map(|e| e.to_lowercase()).collect())
                .unwrap_or_default(),
        }
    }

    /// Address the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Check whether an email is on the admin allow-list.
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(&email.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert!(!config.is_production());
        assert!(config.admin_emails.is_empty());
    }

    #[test]
    fn test_admin_email_check_is_case_insensitive() {
        let mut config = ApiConfig::default();
        config.admin_emails.insert("ops@adreel.app".to_string());
        assert!(config.is_admin_email("Ops@AdReel.app"));
        assert!(!config.is_admin_email("someone@else.com"));
    }
}
