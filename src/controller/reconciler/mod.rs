//! # Reconciler
//!
//! One convergence pass per Crypt key: compute the matched namespaces, fetch each
//! definition's payload, and create or replace every target secret. In cascade
//! mode the reconciler also removes a deleted Crypt's targets.
//!
//! ## Module Structure
//!
//! - `types` - reconciler state, errors and pass reports
//! - `sync` - the convergence pass
//! - `cleanup` - cascade deletion of a Crypt's targets

mod cleanup;
mod sync;
mod types;

pub use types::{CleanupReport, Reconciler, ReconcilerError, SyncReport, TriggerSource, UpsertOutcome};
