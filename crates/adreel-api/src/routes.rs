//! API routes.

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::admin::{fail_video, queue_status, update_user_subscription};
use crate::handlers::invitations::{
    accept_invitation, create_invitation, decline_invitation, list_my_invitations,
    list_team_invitations, revoke_invitation,
};
use crate::handlers::subscription::get_subscription;
use crate::handlers::teams::{
    create_team, get_team, get_team_usage, list_team_members, list_teams, remove_team_member,
    update_team,
};
use crate::handlers::uploads::{fetch_image, upload_image};
use crate::handlers::videos::{
    create_video, delete_video, get_download_url, get_video, get_video_status, list_videos,
};
use crate::handlers::webhooks::{merge_webhook, render_webhook};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let upload_routes = Router::new()
        .route("/uploads", post(upload_image))
        .route("/uploads/fetch", post(fetch_image));

    let video_routes = Router::new()
        .route("/videos", post(create_video))
        .route("/videos", get(list_videos))
        .route("/videos/:video_id", get(get_video))
        .route("/videos/:video_id", delete(delete_video))
        .route("/videos/:video_id/status", get(get_video_status))
        .route("/videos/:video_id/download-url", get(get_download_url));

    let team_routes = Router::new()
        .route("/teams", post(create_team))
        .route("/teams", get(list_teams))
        .route("/teams/:team_id", get(get_team))
        .route("/teams/:team_id", patch(update_team))
        .route("/teams/:team_id/members", get(list_team_members))
        .route("/teams/:team_id/members/:user_id", delete(remove_team_member))
        .route("/teams/:team_id/usage", get(get_team_usage))
        // Invitations hang off the team they belong to
        .route("/teams/:team_id/invitations", post(create_invitation))
        .route("/teams/:team_id/invitations", get(list_team_invitations))
        .route(
            "/teams/:team_id/invitations/:invitation_id",
            delete(revoke_invitation),
        );

    let invitation_routes = Router::new()
        .route("/invitations", get(list_my_invitations))
        .route("/invitations/:invitation_id/accept", post(accept_invitation))
        .route("/invitations/:invitation_id/decline", post(decline_invitation));

    let subscription_routes = Router::new().route("/subscription", get(get_subscription));

    // Video recovery and subscription management (allow-listed emails only)
    let admin_routes = Router::new()
        .route("/admin/users/:uid/subscription", patch(update_user_subscription))
        .route("/admin/videos/:team_id/:video_id/fail", post(fail_video))
        .route("/admin/queue/status", get(queue_status));

    // Rate limiter for authenticated API routes
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Separate, tighter limiter for the public webhook routes. Vendors
    // burst when several segments finish together, so it sits above the
    // per-user rate but still shields against junk floods.
    let webhook_rate_limiter = std::sync::Arc::new(RateLimiterCache::new(30));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(video_routes)
        .merge(team_routes)
        .merge(invitation_routes)
        .merge(subscription_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter.clone(),
            rate_limit_middleware,
        ));

    // Vendor callbacks: no auth header, gated by signed tokens instead
    let webhook_routes = Router::new()
        .route(
            "/webhooks/render/:video_id/:segment_index",
            post(render_webhook),
        )
        .route("/webhooks/merge/:video_id", post(merge_webhook))
        .layer(middleware::from_fn_with_state(
            webhook_rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Request body size limit, covering multipart uploads
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
