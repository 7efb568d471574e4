//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.
//!
//! When the environment carries enough configuration for `AppState::new`
//! these exercise the real router; otherwise they fall back to a stub app
//! that still wears the stateless middleware, so header and CORS checks
//! keep working without credentials.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

/// The Prometheus recorder can only be installed once per process.
static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS.get_or_init(adreel_api::metrics::init_metrics).clone()
}

async fn test_app() -> axum::Router {
    use adreel_api::{create_router, ApiConfig, AppState};

    dotenvy::dotenv().ok();

    match AppState::new(ApiConfig::from_env()).await {
        Ok(state) => create_router(state, Some(metrics_handle())),
        Err(_) => stub_app(),
    }
}

/// Bare router carrying the same stateless layers as the real one.
fn stub_app() -> axum::Router {
    use adreel_api::middleware::{cors_layer, request_id, security_headers};
    use axum::routing::get;

    let handle = metrics_handle();
    axum::Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/metrics", get(move || async move { handle.render() }))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(axum::middleware::from_fn(request_id))
        .layer(cors_layer(&["*".to_string()]))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = test_app().await.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let response = test_app().await.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_preflight() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/videos")
        .header(header::ORIGIN, "http://localhost:3000")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = test_app().await.oneshot(request).await.unwrap();

    // The CORS layer answers preflights before routing happens.
    assert!(
        response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT,
        "unexpected preflight status {}",
        response.status()
    );
}

#[tokio::test]
async fn test_security_headers() {
    let response = test_app().await.oneshot(get_request("/health")).await.unwrap();

    let headers = response.headers();
    assert!(headers.contains_key("X-Content-Type-Options"));
    assert!(headers.contains_key("X-Frame-Options"));
    assert!(headers.contains_key("X-Request-ID"));
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let response = test_app()
        .await
        .oneshot(post_json("/api/videos", "{}"))
        .await
        .unwrap();

    // Without a bearer token the auth extractor must reject the request
    // before any handler logic runs. The stub app has no such route at all.
    assert!(
        response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::NOT_FOUND,
        "unexpected status {}",
        response.status()
    );
}

#[tokio::test]
async fn test_webhooks_reject_missing_token() {
    let response = test_app()
        .await
        .oneshot(post_json("/webhooks/merge/some-video-id", r#"{"status":"OK"}"#))
        .await
        .unwrap();

    // Missing ?token= must never be treated as authorized.
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::NOT_FOUND,
        "unexpected status {}",
        response.status()
    );
}

#[tokio::test]
#[ignore = "requires full app setup"]
async fn test_rate_limiting() {
    let app = test_app().await;

    for attempt in 0..20 {
        let request = Request::builder()
            .uri("/api/videos")
            .header("X-Forwarded-For", "192.168.1.100")
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            println!("Rate limited after {} requests", attempt + 1);
            return;
        }
    }

    // Twenty requests under the limit means the configured quota is higher
    // than this probe; nothing to assert either way.
}

/// Live smoke test against a running server.
#[tokio::test]
#[ignore = "requires a running API server"]
async fn test_create_video_endpoint() {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("ADREEL_TEST_API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());
    let token = std::env::var("ADREEL_TEST_ID_TOKEN").unwrap_or_default();

    let client = reqwest::Client::new();
    let mut request = client
        .post(format!("{}/api/videos", base_url))
        .json(&serde_json::json!({
            "prompt": "Slow orbit around the product with soft studio lighting",
            "image_key": "teams/test/images/integration.png",
            "duration_seconds": 16,
            "aspect_ratio": "9:16"
        }));

    if !token.is_empty() {
        request = request.bearer_auth(token);
    }

    match request.send().await {
        Ok(resp) => {
            println!("Create endpoint responded with status {}", resp.status());
            assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        }
        Err(e) => {
            println!("Request failed (expected if server not running): {}", e);
        }
    }
}
