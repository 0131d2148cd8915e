//! Bridges the event bus into per-user relay delivery.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use prism_events::EventBus;

use crate::manager::RelayManager;

/// Route every bus event to the owning user's connections until
/// `shutdown` fires or the bus is dropped.
///
/// A lagged receiver only costs the dropped events; clients
/// resynchronize through the job API.
pub async fn run_forwarder(
    bus: Arc<EventBus>,
    manager: Arc<RelayManager>,
    shutdown: CancellationToken,
) {
    let mut rx = bus.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Event forwarder stopping");
                return;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    let reached = manager.publish(event.user_id, event.clone()).await;
                    tracing::trace!(
                        job_id = %event.job_id,
                        user_id = %event.user_id,
                        reached,
                        "Relayed job event"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event forwarder lagged behind the bus");
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Event bus closed, forwarder stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RelayMessage;
    use prism_events::JobEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn forwards_events_to_the_owning_user() {
        let bus = Arc::new(EventBus::default());
        let manager = Arc::new(RelayManager::new());
        let user = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let (_, mut user_rx) = manager.subscribe(user).await;
        let (_, mut stranger_rx) = manager.subscribe(stranger).await;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_forwarder(
            Arc::clone(&bus),
            Arc::clone(&manager),
            shutdown.clone(),
        ));
        // Single-threaded test runtime: one yield lets the forwarder
        // subscribe before anything is published.
        tokio::task::yield_now().await;

        let job_id = Uuid::new_v4();
        bus.publish(JobEvent::completed(job_id, user, vec!["out.png".to_string()]));

        let message = user_rx.recv().await.expect("event for owner");
        let RelayMessage::Event(event) = message else {
            panic!("expected an event message");
        };
        assert_eq!(event.job_id, job_id);
        assert!(stranger_rx.try_recv().is_err());

        shutdown.cancel();
        task.await.expect("forwarder task");
    }
}
