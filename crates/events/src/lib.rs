//! Job lifecycle events and the in-process bus carrying them.
//!
//! Workers publish a [`JobEvent`] whenever a job makes observable
//! progress; the relay subscribes and fans each event out to the owning
//! user's live connections.

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::{JobEvent, JobEventKind};
