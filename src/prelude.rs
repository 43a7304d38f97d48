//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use crypt_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconciler types
pub use crate::controller::reconciler::{
    CleanupReport, Reconciler, ReconcilerError, SyncReport, TriggerSource,
};

// Seams for target writes, events and payload lookup
pub use crate::controller::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use crate::controller::secrets::{KubeSecretWriter, SecretApiError, SecretWriter};
pub use crate::store::{Payload, SecretStore, StoreError, StoreFactory};

// Runtime building blocks
pub use crate::runtime::mirror::{mirror, Mirror, MirrorError, MirrorFeed, MirrorHandler};
pub use crate::runtime::queue::WorkQueue;

// Config types
pub use crate::config::{CleanupMode, ControllerConfig, StoreConfig};
