//! OS vault abstraction.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Addressing triple of one vault entry.
///
/// Credential records use `service` = the configured service name
/// (`"teleport"` by default), `account` = username, `label` = proxy host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VaultAddress {
    /// Namespace shared by every entry this crate writes
    pub service: String,
    /// Username
    pub account: String,
    /// Proxy host
    pub label: String,
}

impl VaultAddress {
    /// Creates an address.
    pub fn new(
        service: impl Into<String>,
        account: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            label: label.into(),
        }
    }

    /// `account@label`, i.e. `username@proxy_host`.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.account, self.label)
    }
}

impl fmt::Display for VaultAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.service, self.account, self.label)
    }
}

/// Vault is the OS-native secure credential storage a
/// [`KeychainKeyStore`](crate::KeychainKeyStore) writes to.
///
/// Every operation reports a missing entry as
/// [`KeyStoreError::NotFound`](crate::KeyStoreError::NotFound), distinct
/// from other failures.
///
/// # Implementations
///
/// - [`NativeVault`](crate::NativeVault): the platform keychain via `keyring`
/// - [`MemoryVault`](crate::MemoryVault): in-memory, for tests
#[async_trait]
pub trait Vault: Send + Sync {
    /// Returns the vault name (e.g., "native", "memory").
    fn name(&self) -> &str;

    /// Checks the vault is reachable in this session.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::BackendUnavailable`](crate::KeyStoreError::BackendUnavailable)
    /// - [`KeyStoreError::Unsupported`](crate::KeyStoreError::Unsupported)
    async fn probe(&self) -> Result<()>;

    /// Inserts a new entry. There is no upsert: inserting at an occupied
    /// address fails with
    /// [`KeyStoreError::AlreadyExists`](crate::KeyStoreError::AlreadyExists).
    async fn insert(&self, address: &VaultAddress, data: &[u8]) -> Result<()>;

    /// Reads an entry's data.
    async fn query(&self, address: &VaultAddress) -> Result<Vec<u8>>;

    /// Removes an entry.
    async fn delete(&self, address: &VaultAddress) -> Result<()>;

    /// Addresses of every entry under `service`, across all accounts and labels.
    async fn query_all(&self, service: &str) -> Result<Vec<VaultAddress>>;
}
