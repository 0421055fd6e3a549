//! In-memory vault for testing.
//!
//! Behaves like an OS keychain (no upsert, distinct not-found errors) and
//! supports error injection to simulate locked or failing vaults.

use super::vault::{Vault, VaultAddress};
use crate::{KeyStoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory vault.
///
/// Clones share the same entries, so a test can keep a handle for
/// inspection after moving the vault into a
/// [`KeychainKeyStore`](crate::KeychainKeyStore). Injected errors are
/// per-clone.
///
/// # Example
///
/// ```
/// use clientkeys::{MemoryVault, Vault, VaultAddress, KeyStoreError};
///
/// #[tokio::main]
/// async fn main() -> clientkeys::Result<()> {
///     let vault = MemoryVault::new();
///     let addr = VaultAddress::new("teleport", "alice", "proxy");
///
///     vault.insert(&addr, b"data").await?;
///     assert!(matches!(
///         vault.insert(&addr, b"again").await,
///         Err(KeyStoreError::AlreadyExists(_))
///     ));
///
///     vault.delete(&addr).await?;
///     assert!(vault.query(&addr).await.unwrap_err().is_not_found());
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct MemoryVault {
    entries: Arc<RwLock<HashMap<VaultAddress, Vec<u8>>>>,

    /// Makes `probe()` fail with `BackendUnavailable`
    pub unavailable: bool,
    /// Error to return from `query_all()`
    pub query_all_error: Option<String>,
    /// Error to return from `insert()`
    pub insert_error: Option<String>,
    /// Account whose `delete()` fails
    pub fail_delete_account: Option<String>,
}

impl MemoryVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes raw bytes at an address, replacing what is there.
    ///
    /// Useful for planting corrupt or empty entries.
    pub async fn set_raw(&self, address: VaultAddress, data: impl Into<Vec<u8>>) {
        let mut entries = self.entries.write().await;
        entries.insert(address, data.into());
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns true if an entry exists at `address`.
    pub async fn contains(&self, address: &VaultAddress) -> bool {
        self.entries.read().await.contains_key(address)
    }
}

#[async_trait]
impl Vault for MemoryVault {
    fn name(&self) -> &str {
        "memory"
    }

    async fn probe(&self) -> Result<()> {
        if self.unavailable {
            return Err(KeyStoreError::BackendUnavailable(
                "memory vault marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn insert(&self, address: &VaultAddress, data: &[u8]) -> Result<()> {
        if let Some(ref err) = self.insert_error {
            return Err(KeyStoreError::Vault(err.clone()));
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(address) {
            return Err(KeyStoreError::AlreadyExists(address.to_string()));
        }
        entries.insert(address.clone(), data.to_vec());
        Ok(())
    }

    async fn query(&self, address: &VaultAddress) -> Result<Vec<u8>> {
        let entries = self.entries.read().await;
        entries
            .get(address)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(address.to_string()))
    }

    async fn delete(&self, address: &VaultAddress) -> Result<()> {
        if self.fail_delete_account.as_deref() == Some(address.account.as_str()) {
            return Err(KeyStoreError::Vault(format!(
                "delete refused for {}",
                address
            )));
        }

        let mut entries = self.entries.write().await;
        entries
            .remove(address)
            .ok_or_else(|| KeyStoreError::NotFound(address.to_string()))?;
        Ok(())
    }

    async fn query_all(&self, service: &str) -> Result<Vec<VaultAddress>> {
        if let Some(ref err) = self.query_all_error {
            return Err(KeyStoreError::Vault(err.clone()));
        }

        let entries = self.entries.read().await;
        let mut addresses: Vec<VaultAddress> = entries
            .keys()
            .filter(|addr| addr.service == service)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| (&a.label, &a.account).cmp(&(&b.label, &b.account)));
        Ok(addresses)
    }
}
