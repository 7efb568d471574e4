//! Firebase ID token authentication.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Where Google publishes the current Firebase token-signing keys.
const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Expected `iss` prefix; the project ID completes it.
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// How long a fetched key set is trusted before refetching.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Claims decoded from a Firebase ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Firebase user ID
    pub sub: String,
    /// Account email, when the identity provider supplies one
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    /// `https://securetoken.google.com/<project-id>`
    pub iss: String,
    /// The Firebase project ID
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Caller identity established from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl From<IdTokenClaims> for AuthUser {
    fn from(claims: IdTokenClaims) -> Self {
        let IdTokenClaims {
            sub,
            email,
            email_verified,
            ..
        } = claims;
        Self {
            uid: sub,
            email,
            email_verified: email_verified.unwrap_or(false),
        }
    }
}

impl AuthUser {
    /// Whether this user's email is on the admin allow-list.
    pub fn is_admin(&self, config: &ApiConfig) -> bool {
        self.email
            .as_deref()
            .map(|email| config.is_admin_email(email))
            .unwrap_or(false)
    }

    /// Reject non-admin callers.
    pub fn require_admin(&self, config: &ApiConfig) -> Result<(), ApiError> {
        if self.is_admin(config) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize)]
struct JwkKey {
    kid: String,
    /// RSA modulus, base64url-encoded
    n: String,
    /// RSA public exponent
    e: String,
}

struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Google signing keys, cached and refetched on expiry or rotation.
pub struct JwksCache {
    http: Client,
    key_set: RwLock<KeySet>,
    validation: Validation,
}

impl JwksCache {
    /// Create the cache and do the initial key fetch.
    pub async fn new() -> anyhow::Result<Self> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .context("FIREBASE_PROJECT_ID or GCP_PROJECT_ID must be set")?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("{FIREBASE_ISSUER_PREFIX}{project_id}")]);
        validation.set_audience(&[&project_id]);

        let cache = Self {
            http: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            key_set: RwLock::new(KeySet {
                keys: HashMap::new(),
                fetched_at: Instant::now(),
            }),
            validation,
        };
        cache.refresh().await.context("initial JWKS fetch failed")?;

        Ok(cache)
    }

    /// Fetch the current key set from Google and swap it in.
    async fn refresh(&self) -> anyhow::Result<()> {
        debug!("Fetching Firebase signing keys");

        let jwks: JwksResponse = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, "Skipping unparseable JWK: {e}"),
            }
        }
        if keys.is_empty() {
            anyhow::bail!("JWKS endpoint returned no usable keys");
        }

        let mut set = self.key_set.write().await;
        set.keys = keys;
        set.fetched_at = Instant::now();
        debug!(count = set.keys.len(), "Refreshed Firebase signing keys");
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Option<DecodingKey> {
        {
            let set = self.key_set.read().await;
            if set.fetched_at.elapsed() < JWKS_CACHE_TTL {
                if let Some(key) = set.keys.get(kid) {
                    return Some(key.clone());
                }
            }
        }

        // Stale set or unknown kid. Google rotates keys, so an unknown kid
        // right after rotation is expected; refetch before giving up.
        if let Err(e) = self.refresh().await {
            warn!("JWKS refresh failed: {e:#}");
        }
        self.key_set.read().await.keys.get(kid).cloned()
    }

    /// Verify an ID token and return its claims.
    pub async fn verify_token(&self, token: &str) -> Result<IdTokenClaims, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthorized("Token missing key ID"))?;

        let key = self
            .key_for(&kid)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown signing key"))?;

        let token_data = decode::<IdTokenClaims>(token, &key, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {e}")))?;
        Ok(token_data.claims)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(parts).ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let claims = state.jwks.verify_token(token).await?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(email: Option<&str>) -> IdTokenClaims {
        IdTokenClaims {
            sub: "user-1".to_string(),
            email: email.map(String::from),
            email_verified: Some(true),
            iss: "https://securetoken.google.com/adreel-test".to_string(),
            aud: "adreel-test".to_string(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn test_auth_user_from_claims() {
        let user = AuthUser::from(claims(Some("a@b.com")));
        assert_eq!(user.uid, "user-1");
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert!(user.email_verified);
    }

    #[test]
    fn test_admin_gate() {
        let mut config = ApiConfig::default();
        config.admin_emails.insert("ops@adreel.app".to_string());

        let admin = AuthUser::from(claims(Some("OPS@adreel.app")));
        assert!(admin.require_admin(&config).is_ok());

        let plain = AuthUser::from(claims(Some("user@example.com")));
        assert!(plain.require_admin(&config).is_err());

        let no_email = AuthUser::from(claims(None));
        assert!(no_email.require_admin(&config).is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Bearer abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc.def.ghi"));

        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
