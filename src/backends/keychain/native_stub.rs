//! Stub implementation for builds without OS keychain support.

use super::vault::{Vault, VaultAddress};
use crate::{KeyStoreError, Result};
use async_trait::async_trait;

const UNSUPPORTED: &str = "OS keychain storage requires the 'keychain' feature on macOS, Windows or Linux";

/// Stub native vault.
///
/// Construction always fails with [`KeyStoreError::Unsupported`], so callers
/// that explicitly ask for the keychain learn it was denied.
pub struct NativeVault {
    _private: (),
}

impl NativeVault {
    /// Always returns [`KeyStoreError::Unsupported`].
    pub fn new(_service: impl Into<String>) -> Result<Self> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }
}

#[async_trait]
impl Vault for NativeVault {
    fn name(&self) -> &str {
        "native"
    }

    async fn probe(&self) -> Result<()> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }

    async fn insert(&self, _address: &VaultAddress, _data: &[u8]) -> Result<()> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }

    async fn query(&self, _address: &VaultAddress) -> Result<Vec<u8>> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }

    async fn delete(&self, _address: &VaultAddress) -> Result<()> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }

    async fn query_all(&self, _service: &str) -> Result<Vec<VaultAddress>> {
        Err(KeyStoreError::Unsupported(UNSUPPORTED.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_is_unsupported() {
        let result = NativeVault::new("teleport");
        assert!(matches!(result, Err(KeyStoreError::Unsupported(_))));
    }
}
