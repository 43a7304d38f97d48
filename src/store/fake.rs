//! # Fake Store
//!
//! Resolves every key to an empty payload named "fake".

use super::{Payload, SecretStore, StoreError};
use async_trait::async_trait;

#[derive(Debug, Default, Clone, Copy)]
pub struct FakeStore;

#[async_trait]
impl SecretStore for FakeStore {
    async fn get(&self, _key: &str) -> Result<Payload, StoreError> {
        Ok(Payload::new("fake"))
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}
