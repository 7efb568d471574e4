//! API middleware.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;

/// Per-IP rate limiter using governor.
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Maximum number of IPs to track in the rate limiter cache.
/// Caps memory growth when traffic arrives from many addresses.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// How long an idle per-IP limiter stays cached.
const LIMITER_TTL: Duration = Duration::from_secs(3600);

const CORS_MAX_AGE: Duration = Duration::from_secs(600);

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

struct CachedLimiter {
    limiter: Arc<IpRateLimiter>,
    created: Instant,
}

/// IP-keyed rate limiter cache with TTL-based eviction.
#[derive(Clone)]
pub struct RateLimiterCache {
    limiters: Arc<RwLock<HashMap<IpAddr, CachedLimiter>>>,
    quota: Quota,
}

impl RateLimiterCache {
    pub fn new(requests_per_second: u32) -> Self {
        let per_second =
            NonZeroU32::new(requests_per_second).unwrap_or_else(|| NonZeroU32::new(10).unwrap());
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            quota: Quota::per_second(per_second),
        }
    }

    /// Check whether a request from `ip` fits inside the quota.
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.limiter_for(ip).await.check().is_ok()
    }

    async fn limiter_for(&self, ip: IpAddr) -> Arc<IpRateLimiter> {
        if let Some(entry) = self.limiters.read().await.get(&ip) {
            return Arc::clone(&entry.limiter);
        }

        let mut limiters = self.limiters.write().await;
        if limiters.len() >= MAX_RATE_LIMITER_ENTRIES {
            Self::evict(&mut limiters);
        }

        let entry = limiters.entry(ip).or_insert_with(|| CachedLimiter {
            limiter: Arc::new(RateLimiter::direct(self.quota)),
            created: Instant::now(),
        });
        Arc::clone(&entry.limiter)
    }

    /// Drop expired limiters, then the oldest entries if still over capacity.
    fn evict(limiters: &mut HashMap<IpAddr, CachedLimiter>) {
        let now = Instant::now();
        limiters.retain(|_, entry| now.duration_since(entry.created) < LIMITER_TTL);

        if limiters.len() > MAX_RATE_LIMITER_ENTRIES {
            let mut by_age: Vec<(IpAddr, Instant)> =
                limiters.iter().map(|(ip, entry)| (*ip, entry.created)).collect();
            by_age.sort_by_key(|(_, created)| *created);

            let excess = limiters.len() - MAX_RATE_LIMITER_ENTRIES;
            for (ip, _) in by_age.into_iter().take(excess) {
                limiters.remove(&ip);
            }
            warn!(removed = excess, "Rate limiter cache over capacity");
        }
    }
}

/// Create the CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    // A wildcard origin cannot be combined with credentials; tower-http
    // panics if Any is mixed with allow_credentials(true).
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .max_age(CORS_MAX_AGE);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::CONTENT_DISPOSITION,
        ])
        .max_age(CORS_MAX_AGE)
}

const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
    (
        "Permissions-Policy",
        "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()",
    ),
    ("Cross-Origin-Resource-Policy", "same-origin"),
    ("X-Permitted-Cross-Domain-Policies", "none"),
];

/// Attach the standard security headers to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Propagate or mint an `X-Request-ID`, exposing it to handlers via
/// request extensions and echoing it on the response.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = match request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value.to_owned(),
        None => Uuid::new_v4().to_string(),
    };

    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(&REQUEST_ID_HEADER, value);
    }
    response
}

/// Paths probed by orchestration; logging them would drown everything else.
const QUIET_PATHS: [&str; 3] = ["/health", "/healthz", "/ready"];

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    // Path only: webhook callbacks carry signed tokens in the query string.
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    if !QUIET_PATHS.contains(&path.as_str()) {
        info!(
            %method,
            path,
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    }

    response
}

/// Rate limiting middleware backed by the per-IP limiter cache.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ip) = extract_client_ip(&request) else {
        // No address to key on, let the request through.
        return next.run(request).await;
    };

    if !rate_limiter.check(ip).await {
        warn!(%ip, "Rate limit exceeded");
        metrics::record_rate_limit_hit(request.uri().path());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "1")],
            "Rate limit exceeded. Please try again later.",
        )
            .into_response();
    }

    next.run(request).await
}

/// Client IP from proxy headers, falling back to the socket address.
fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let header_value =
        |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());

    // First hop in X-Forwarded-For is the original client.
    header_value("X-Forwarded-For")
        .and_then(|chain| chain.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| header_value("X-Real-IP").and_then(|ip| ip.trim().parse().ok()))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<std::net::SocketAddr>>()
                .map(|info| info.0.ip())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();

        let ip = extract_client_ip(&request);
        assert_eq!(ip, Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_real_ip() {
        let request = Request::builder()
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();

        let ip = extract_client_ip(&request);
        assert_eq!(ip, Some("198.51.100.2".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_rate_limiter_cache_allows_within_quota() {
        let cache = RateLimiterCache::new(100);
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert!(cache.check(ip).await);
    }

    #[tokio::test]
    async fn test_rate_limiter_cache_blocks_burst() {
        let cache = RateLimiterCache::new(1);
        let ip: IpAddr = "192.0.2.2".parse().unwrap();

        // First request passes, immediate follow-ups exhaust the quota
        assert!(cache.check(ip).await);
        let mut blocked = false;
        for _ in 0..5 {
            if !cache.check(ip).await {
                blocked = true;
                break;
            }
        }
        assert!(blocked);
    }

    #[tokio::test]
    async fn test_security_headers_cover_response() {
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        for (name, _) in SECURITY_HEADERS {
            assert!(response.headers().contains_key(name), "missing {name}");
        }
    }
}
