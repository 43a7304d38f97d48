//! # Empty Store
//!
//! A store with nothing in it. Useful for dry runs: every pass degrades to
//! "key not found" for each pair.

use super::{Payload, SecretStore, StoreError};
use async_trait::async_trait;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyStore;

#[async_trait]
impl SecretStore for EmptyStore {
    async fn get(&self, key: &str) -> Result<Payload, StoreError> {
        Err(StoreError::not_found(key))
    }

    fn backend(&self) -> &'static str {
        "empty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_key_is_missing() {
        let store = EmptyStore;
        assert!(matches!(
            store.get("test/foo").await,
            Err(StoreError::NotFound { key }) if key == "test/foo"
        ));
    }
}
