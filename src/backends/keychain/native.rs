//! Platform keychain via the `keyring` crate.
//!
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use super::indexed::{EntryStore, IndexedVault};
use super::vault::{Vault, VaultAddress};
use crate::{KeyStoreError, Result};
use async_trait::async_trait;
use keyring::Entry;
use std::sync::Arc;

/// Keyring entries as a blocking [`EntryStore`].
struct KeyringEntries;

impl EntryStore for KeyringEntries {
    fn get(&self, service: &str, user: &str) -> Result<Vec<u8>> {
        entry(service, user)?
            .get_secret()
            .map_err(|e| map_keyring_error(e, user))
    }

    fn set(&self, service: &str, user: &str, data: &[u8]) -> Result<()> {
        entry(service, user)?
            .set_secret(data)
            .map_err(|e| map_keyring_error(e, user))
    }

    fn remove(&self, service: &str, user: &str) -> Result<()> {
        entry(service, user)?
            .delete_credential()
            .map_err(|e| map_keyring_error(e, user))
    }
}

/// The OS keychain.
///
/// Each address is stored as keyring user `<proxy_host>/<username>` under
/// its service. Keyrings cannot list their entries portably, so an index
/// entry per service records every stored address for `query_all`.
pub struct NativeVault {
    inner: IndexedVault<KeyringEntries>,
}

impl NativeVault {
    /// Creates a vault handle for `service`.
    pub fn new(service: impl Into<String>) -> Result<Self> {
        Ok(Self {
            inner: IndexedVault::new(Arc::new(KeyringEntries), service),
        })
    }
}

#[async_trait]
impl Vault for NativeVault {
    fn name(&self) -> &str {
        "native"
    }

    async fn probe(&self) -> Result<()> {
        self.inner.probe().await
    }

    async fn insert(&self, address: &VaultAddress, data: &[u8]) -> Result<()> {
        self.inner.insert(address, data).await
    }

    async fn query(&self, address: &VaultAddress) -> Result<Vec<u8>> {
        self.inner.query(address).await
    }

    async fn delete(&self, address: &VaultAddress) -> Result<()> {
        self.inner.delete(address).await
    }

    async fn query_all(&self, service: &str) -> Result<Vec<VaultAddress>> {
        self.inner.query_all(service).await
    }
}

fn entry(service: &str, user: &str) -> Result<Entry> {
    Entry::new(service, user).map_err(|e| map_keyring_error(e, user))
}

fn map_keyring_error(err: keyring::Error, what: &str) -> KeyStoreError {
    match err {
        keyring::Error::NoEntry => KeyStoreError::NotFound(what.to_string()),
        keyring::Error::NoStorageAccess(e) => {
            KeyStoreError::BackendUnavailable(format!("{}: {}", what, e))
        }
        // BadEncoding carries the stored bytes; report only the kind
        keyring::Error::BadEncoding(_) => {
            KeyStoreError::Vault(format!("{}: entry is not valid UTF-8", what))
        }
        other => KeyStoreError::Vault(format!("{}: {}", what, other)),
    }
}
