//! # Custom Resource Definitions
//!
//! CRD types for the Crypt controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `Crypt` specification and secret definitions
//! - `status.rs` - Status type (present in the schema, not populated by the controller)

mod spec;
mod status;

pub use spec::{Crypt, CryptSpec, SecretDefinition};
pub use status::CryptStatus;
