//! Worker process: pulls jobs from the queue and drives them through the
//! generation engine, relaying progress to connected clients.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prism_engine::{EngineClient, SessionRegistry};
use prism_events::EventBus;
use prism_orchestrator::{JobQueue, WorkerContext, WorkerPool};
use prism_relay::{run_forwarder, run_heartbeat, RelayManager};
use prism_store::{AssetStore, JobStore, MemoryAssetStore, MemoryJobStore};

mod config;

use config::WorkerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prism_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        engine_url = %config.engine_url,
        workers = config.workers,
        queue_capacity = config.queue_capacity,
        "Loaded worker configuration"
    );

    // --- Engine ---
    let engine = EngineClient::new(config.engine_url.clone());
    if engine.health_check().await {
        tracing::info!("Engine is reachable");
    } else {
        tracing::warn!(
            engine_url = %config.engine_url,
            "Engine is not reachable; jobs will fail until it comes up"
        );
    }

    // --- Shared state ---
    let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let assets: Arc<dyn AssetStore> = Arc::new(MemoryAssetStore::new());
    let queue = Arc::new(JobQueue::new(config.queue_capacity));
    let sessions = Arc::new(SessionRegistry::new());
    let bus = Arc::new(EventBus::default());

    // --- Relay ---
    let relay = Arc::new(RelayManager::new());
    let relay_cancel = CancellationToken::new();
    let heartbeat_handle = tokio::spawn(run_heartbeat(
        Arc::clone(&relay),
        config.heartbeat_interval(),
        relay_cancel.clone(),
    ));
    let forwarder_handle = tokio::spawn(run_forwarder(
        Arc::clone(&bus),
        Arc::clone(&relay),
        relay_cancel.clone(),
    ));
    tracing::info!("Relay started (heartbeat, forwarder)");

    // --- Worker pool ---
    let ctx = Arc::new(WorkerContext {
        queue: Arc::clone(&queue),
        jobs,
        assets,
        engine,
        sessions,
        bus: Arc::clone(&bus),
        retry: config.retry_policy(),
        poll: config.poll_policy(),
        client_id: config.client_id.clone(),
    });
    let pool_cancel = CancellationToken::new();
    let pool = WorkerPool::start(Arc::clone(&ctx), config.workers, pool_cancel.clone());
    tracing::info!(workers = config.workers, "Worker pool started");

    shutdown_signal().await;

    // --- Graceful shutdown ---
    // Stop claiming new jobs; in-flight jobs run to a terminal state.
    pool_cancel.cancel();
    pool.join().await;
    tracing::info!("Worker pool drained");

    relay_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;

    let connections = relay.connection_count().await;
    tracing::info!(connections, "Closing remaining relay connections");
    relay.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the process
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
