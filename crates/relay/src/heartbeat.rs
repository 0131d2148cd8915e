//! Periodic liveness sweep over all relay connections.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::manager::RelayManager;

/// Interval between heartbeat sweeps.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Run the heartbeat loop until `shutdown` fires.
///
/// Each tick closes connections that never answered the previous ping
/// and pings everyone else. A connection therefore has one full
/// interval to answer before it is dropped.
pub async fn run_heartbeat(
    manager: Arc<RelayManager>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick would close nothing and ping everyone;
    // harmless, but skipping it keeps the cadence uniform.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Heartbeat task stopping");
                return;
            }
            _ = ticker.tick() => {
                let closed = manager.sweep_and_ping().await;
                let count = manager.connection_count().await;
                tracing::debug!(count, closed, "Relay heartbeat sweep");
            }
        }
    }
}
