//! # Configuration
//!
//! - [`controller`] - process-level settings read from environment variables
//! - [`store`] - secret store settings read from the `--store-config` file

pub mod controller;
pub mod store;

pub use controller::{CleanupMode, ControllerConfig};
pub use store::{ConsulConfig, StoreConfig, VaultConfig};
