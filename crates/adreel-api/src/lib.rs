//! Axum HTTP API server.
//!
//! This crate provides:
//! - Generation submission, video CRUD, and delivery URLs
//! - Vendor webhook endpoints for render and merge callbacks
//! - Teams, invitations, subscriptions, and usage
//! - Firebase ID token verification
//! - Rate limiting, security headers, and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{QuotaService, TeamService, TimeoutSweeper};
pub use state::AppState;
