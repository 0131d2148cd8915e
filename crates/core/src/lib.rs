//! Shared domain types for the Prism generation platform.
//!
//! This crate has no I/O and no internal dependencies. It defines the
//! vocabulary every other crate speaks: job kinds, account tiers, credit
//! costing, validated parameter sets, the error taxonomy, and the retry
//! policy combinators used by the engine client and the worker pool.

pub mod cost;
pub mod error;
pub mod job;
pub mod params;
pub mod retry;
pub mod tier;
pub mod types;

pub use error::CoreError;
pub use job::JobKind;
pub use tier::Tier;
