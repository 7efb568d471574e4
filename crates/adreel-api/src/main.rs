//! API server binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use adreel_api::{create_router, metrics, ApiConfig, AppState, TimeoutSweeper};

fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive("adreel=info".parse().unwrap());
    let registry = tracing_subscriber::registry().with(filter);

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    let config = ApiConfig::from_env();
    info!(host = %config.host, port = config.port, "Starting adreel-api");

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    // Prometheus endpoint is on unless explicitly disabled
    let metrics_handle = match std::env::var("METRICS_ENABLED").as_deref() {
        Ok("false") | Ok("0") => None,
        _ => {
            info!("Prometheus metrics enabled at /metrics");
            Some(metrics::init_metrics())
        }
    };

    let sweeper = TimeoutSweeper::new(
        Arc::clone(&state.status_cache),
        Arc::clone(&state.progress),
        Arc::clone(&state.firestore),
    );
    tokio::spawn(async move { sweeper.run().await });

    let addr = config.listen_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    let app = create_router(state, metrics_handle);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
