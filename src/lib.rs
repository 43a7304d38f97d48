//! Crypt Controller Library
//!
//! Keeps Kubernetes Secrets in sync with payloads held in an external secret
//! store. A `Crypt` resource names the store keys to materialize and the
//! namespaces (regular expressions) that should receive them.
//!
//! ## Quick Start
//!
//! ```rust
//! use crypt_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
