//! Realtime relay: per-user fan-out of job events to live connections.
//!
//! The transport layer (out of scope here) registers one channel per
//! live client connection; the relay routes each [`JobEvent`] to every
//! channel of the owning user. Delivery is best-effort and at-most-once:
//! closed channels are pruned, there is no replay buffer.

pub mod forwarder;
pub mod heartbeat;
pub mod manager;

pub use forwarder::run_forwarder;
pub use heartbeat::run_heartbeat;
pub use manager::{ConnectionId, RelayManager, RelayMessage};
