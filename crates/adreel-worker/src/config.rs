//! Environment-driven worker settings.

use std::time::Duration;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse(name).map(Duration::from_secs)
}

/// Tunables for the render worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent render jobs
    pub concurrency: usize,
    /// Delay between vendor status polls
    pub poll_interval: Duration,
    /// How long a single segment may stay non-terminal at the vendor
    pub segment_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Cadence of the stalled-delivery reclaim scan
    pub claim_interval: Duration,
    /// How long a delivery must sit unacked before another consumer may
    /// reclaim it (crash recovery)
    pub claim_min_idle: Duration,
    /// Public base URL of the API, for vendor callback URLs
    pub public_base_url: Option<String>,
    /// Secret the API verifies callback tokens with
    pub webhook_signing_secret: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_secs(5),
            segment_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            public_base_url: None,
            webhook_signing_secret: None,
        }
    }
}

impl WorkerConfig {
    /// Build from environment variables. Unset or unparsable values keep
    /// their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("WORKER_CONCURRENCY").unwrap_or(defaults.concurrency),
            poll_interval: env_secs("RENDER_POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
            segment_timeout: env_secs("RENDER_POLL_TIMEOUT_SECS")
                .unwrap_or(defaults.segment_timeout),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT")
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS")
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS")
                .unwrap_or(defaults.claim_min_idle),
            public_base_url: std::env::var("PUBLIC_BASE_URL").ok(),
            webhook_signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET").ok(),
        }
    }

    /// Callback URL configuration, when both halves are present.
    pub fn webhook_config(&self) -> Option<(&str, &str)> {
        match (
            self.public_base_url.as_deref(),
            self.webhook_signing_secret.as_deref(),
        ) {
            (Some(base), Some(secret)) if !base.is_empty() && !secret.is_empty() => {
                Some((base, secret))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_requires_both_halves() {
        let mut config = WorkerConfig {
            public_base_url: Some("https://api.adreel.app".to_string()),
            webhook_signing_secret: None,
            ..WorkerConfig::default()
        };
        assert!(config.webhook_config().is_none());

        config.webhook_signing_secret = Some("secret".to_string());
        assert_eq!(
            config.webhook_config(),
            Some(("https://api.adreel.app", "secret"))
        );
    }

    #[test]
    fn test_webhook_config_rejects_empty_strings() {
        let config = WorkerConfig {
            public_base_url: Some(String::new()),
            webhook_signing_secret: Some("secret".to_string()),
            ..WorkerConfig::default()
        };
        assert!(config.webhook_config().is_none());
    }
}
