//! # Runtime
//!
//! The machinery around the reconciler: caches, the work queue, the worker pool
//! and process bootstrap.
//!
//! ## Module Structure
//!
//! - [`queue`] - deduplicating, rate-limited work queue
//! - [`mirror`] - watch-backed resource caches with change notifications
//! - [`resync`] - periodic re-enqueue of every Crypt
//! - [`workers`] - cache-sync gate and worker pool
//! - [`error_policy`] - retry decisions and watch error reporting
//! - [`initialization`] - bootstrap of every component
//! - [`shutdown`] - signal handling

pub mod error_policy;
pub mod initialization;
pub mod mirror;
pub mod queue;
pub mod resync;
pub mod shutdown;
pub mod workers;
