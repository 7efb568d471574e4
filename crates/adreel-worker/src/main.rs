//! Render worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use adreel_queue::JobQueue;
use adreel_worker::{JobExecutor, WorkerConfig};

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

    let config = WorkerConfig::from_env();
    info!(concurrency = config.concurrency, "Starting adreel-worker");

    let queue = match JobQueue::from_env() {
        Ok(queue) => queue,
        Err(e) => {
            error!("Failed to connect to the job queue: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(config, queue));

    // Translate Ctrl+C into a graceful drain
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
