//! Cached service-account tokens for Firestore.
//!
//! Refreshing a token on every request would add a round trip to the Google
//! auth endpoint per Firestore call. This cache holds the current token,
//! refreshes it shortly before expiry, and collapses concurrent refreshes
//! into a single request behind a write lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the provider does not report one. OAuth access
/// tokens are typically valid for 60 minutes.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope granting Firestore access via the REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct Entry {
    token: String,
    expires_at: Instant,
}

impl Entry {
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    entry: RwLock<Option<Entry>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            entry: RwLock::new(None),
        }
    }

    /// Drop the cached token, forcing a refresh on the next call. Used when
    /// Firestore rejects a request with ACCESS_TOKEN_EXPIRED.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let entry = self.entry.read().await;
            if let Some(e) = entry.as_ref() {
                if e.fresh() {
                    return Ok(e.token.clone());
                }
            }
        }

        let mut entry = self.entry.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(e) = entry.as_ref() {
            if e.fresh() {
                return Ok(e.token.clone());
            }
        }

        self.refresh(&mut entry).await
    }

    async fn refresh(&self, entry: &mut Option<Entry>) -> FirestoreResult<String> {
        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                let expires_at = {
                    let now = Utc::now();
                    let exp = token.expires_at();
                    if exp > now {
                        match (exp - now).to_std() {
                            Ok(ttl) => Instant::now() + ttl,
                            Err(_) => Instant::now() + FALLBACK_TTL,
                        }
                    } else {
                        // Provider handed back an already-expired token;
                        // retry on the next request.
                        Instant::now()
                    }
                };

                *entry = Some(Entry {
                    token: access_token.clone(),
                    expires_at,
                });

                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                // Keep serving the previous token while it is still valid.
                if let Some(existing) = entry.as_ref() {
                    if existing.usable() {
                        warn!(error = %e, "Token refresh failed, reusing current token");
                        return Ok(existing.token.clone());
                    }
                }

                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_freshness_window() {
        let entry = Entry {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(entry.fresh());
        assert!(entry.usable());

        // Inside the refresh margin: usable but no longer fresh.
        let entry = Entry {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!entry.fresh());
        assert!(entry.usable());
    }

    #[test]
    fn test_scope_targets_datastore() {
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }
}
