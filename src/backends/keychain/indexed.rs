//! Vault over a flat credential store, with a per-service index.
//!
//! OS keyrings address entries by `(service, user)` and cannot list them
//! portably. [`IndexedVault`] maps each [`VaultAddress`] to one keyring user
//! and keeps an index entry per service so `query_all` can enumerate.

use super::vault::{Vault, VaultAddress};
use crate::{KeyStoreError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keyring user of the per-service index entry.
pub(crate) const INDEX_USER: &str = "__index__";

/// Keyring user of the availability probe entry.
pub(crate) const PROBE_USER: &str = "__probe__";

/// Separates label and account in a keyring user. Identity validation
/// forbids it in accounts, and the reserved users above never contain it.
const USER_SEPARATOR: char = '/';

/// Blocking `(service, user) -> bytes` credential store.
///
/// `get` and `remove` report a missing entry as
/// [`KeyStoreError::NotFound`]. `set` overwrites.
pub(crate) trait EntryStore: Send + Sync + 'static {
    fn get(&self, service: &str, user: &str) -> Result<Vec<u8>>;
    fn set(&self, service: &str, user: &str, data: &[u8]) -> Result<()>;
    fn remove(&self, service: &str, user: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
    account: String,
    label: String,
}

impl IndexEntry {
    fn of(address: &VaultAddress) -> Self {
        Self {
            account: address.account.clone(),
            label: address.label.clone(),
        }
    }
}

/// Keyring user for an address: `<label>/<account>`.
///
/// Unambiguous because the account may not contain the separator.
pub(crate) fn keyring_user(address: &VaultAddress) -> Result<String> {
    if address.account.contains(USER_SEPARATOR) {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "vault account may not contain '{}': {}",
            USER_SEPARATOR, address.account
        )));
    }
    Ok(format!("{}{}{}", address.label, USER_SEPARATOR, address.account))
}

/// [`Vault`] implementation shared by the native keychain and tests.
///
/// The index row for an address is written before its secret and removed
/// after it, so every stored secret is listed. A listed address without a
/// secret is harmless: deleting it reports `NotFound`. Index updates are
/// serialized within the process only.
pub(crate) struct IndexedVault<S> {
    store: Arc<S>,
    service: String,
    index_lock: Mutex<()>,
}

impl<S: EntryStore> IndexedVault<S> {
    pub(crate) fn new(store: Arc<S>, service: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
            index_lock: Mutex::new(()),
        }
    }

    async fn read_index(&self, service: &str) -> Result<Vec<IndexEntry>> {
        let store = Arc::clone(&self.store);
        let service = service.to_string();
        blocking(move || match store.get(&service, INDEX_USER) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                KeyStoreError::Vault(format!("keychain index for {} is corrupt: {}", service, e))
            }),
            Err(KeyStoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        })
        .await
    }

    async fn write_index(&self, index: Vec<IndexEntry>) -> Result<()> {
        let store = Arc::clone(&self.store);
        let service = self.service.clone();
        blocking(move || {
            if index.is_empty() {
                return match store.remove(&service, INDEX_USER) {
                    Ok(()) | Err(KeyStoreError::NotFound(_)) => Ok(()),
                    Err(e) => Err(e),
                };
            }
            let data = serde_json::to_vec(&index)?;
            store.set(&service, INDEX_USER, &data)
        })
        .await
    }

    async fn update_index(&self, address: &VaultAddress, present: bool) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        let mut index = self.read_index(&self.service).await?;
        let item = IndexEntry::of(address);
        let listed = index.contains(&item);

        match (present, listed) {
            (true, false) => index.push(item),
            (false, true) => index.retain(|e| e != &item),
            _ => return Ok(()),
        }

        self.write_index(index).await
    }

    async fn unlist(&self, address: &VaultAddress) {
        if let Err(e) = self.update_index(address, false).await {
            warn!(address = %address, error = %e, "failed to update keychain index");
        }
    }
}

#[async_trait]
impl<S: EntryStore> Vault for IndexedVault<S> {
    fn name(&self) -> &str {
        "indexed"
    }

    async fn probe(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let service = self.service.clone();
        blocking(move || {
            store
                .set(&service, PROBE_USER, b"probe")
                .map_err(|e| KeyStoreError::BackendUnavailable(e.to_string()))?;
            if let Err(e) = store.remove(&service, PROBE_USER) {
                warn!(service = %service, error = %e, "failed to remove keychain probe entry");
            }
            Ok(())
        })
        .await
    }

    async fn insert(&self, address: &VaultAddress, data: &[u8]) -> Result<()> {
        let user = keyring_user(address)?;

        let existing = {
            let store = Arc::clone(&self.store);
            let (service, user) = (address.service.clone(), user.clone());
            blocking(move || match store.get(&service, &user) {
                Ok(_) => Ok(true),
                Err(KeyStoreError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            })
            .await?
        };
        if existing {
            return Err(KeyStoreError::AlreadyExists(address.to_string()));
        }

        self.update_index(address, true).await?;

        let store = Arc::clone(&self.store);
        let service = address.service.clone();
        let data = Zeroizing::new(data.to_vec());
        let written = blocking(move || store.set(&service, &user, &data)).await;

        if let Err(e) = written {
            self.unlist(address).await;
            return Err(e);
        }

        debug!(address = %address, "inserted keychain entry");
        Ok(())
    }

    async fn query(&self, address: &VaultAddress) -> Result<Vec<u8>> {
        let user = keyring_user(address)?;
        let store = Arc::clone(&self.store);
        let service = address.service.clone();
        blocking(move || store.get(&service, &user)).await
    }

    async fn delete(&self, address: &VaultAddress) -> Result<()> {
        let user = keyring_user(address)?;
        let store = Arc::clone(&self.store);
        let service = address.service.clone();
        let result = blocking(move || store.remove(&service, &user)).await;

        // stale rows go too, whether or not the secret was there
        match &result {
            Ok(()) | Err(KeyStoreError::NotFound(_)) => self.unlist(address).await,
            Err(_) => {}
        }

        result
    }

    async fn query_all(&self, service: &str) -> Result<Vec<VaultAddress>> {
        let index = self.read_index(service).await?;
        Ok(index
            .into_iter()
            .map(|e| VaultAddress::new(service, e.account, e.label))
            .collect())
    }
}

/// Runs a keyring call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KeyStoreError::Other(anyhow::anyhow!("keychain task failed: {}", e)))?
}
