//! Keychain key store implementation.

use super::record;
use super::vault::{Vault, VaultAddress};
use super::NativeVault;
use crate::backend::{apply_options, delete_options};
use crate::key::identity;
use crate::validation::validate_identity;
use crate::{
    CertPool, Certificate, FsKeyStore, Key, KeyOption, KeyStoreError, LocalKeyStore, PublicKey,
    Result,
};
use async_trait::async_trait;
use tracing::{debug, info};
use zeroize::Zeroize;

const BACKEND_NAME: &str = "keychain";

/// Key store that keeps private keys and certificates in an OS vault.
///
/// Each record is one vault entry at `(service, username, proxy_host)`.
/// Trusted CA bundles and known-host keys are not sensitive and are
/// forwarded to the embedded [`FsKeyStore`]; this store never puts them in
/// the vault. Key options run against the embedded store's root.
///
/// # Example
///
/// ```
/// use clientkeys::{FsKeyStore, Key, KeychainKeyStore, LocalKeyStore, MemoryVault};
///
/// #[tokio::main]
/// async fn main() -> clientkeys::Result<()> {
///     let dir = tempfile::tempdir()?;
///     let fs = FsKeyStore::new(dir.path()).await?;
///     let store = KeychainKeyStore::new(MemoryVault::new(), fs, "teleport").await?;
///
///     let key = Key::new("proxy", "alice", b"private".to_vec()).with_cert(b"cert".to_vec());
///     store.add_key(&key).await?;
///     assert_eq!(store.get_key("proxy", "alice", &[]).await?, key);
///     Ok(())
/// }
/// ```
pub struct KeychainKeyStore<V> {
    vault: V,
    fs: FsKeyStore,
    service: String,
}

impl<V: Vault> KeychainKeyStore<V> {
    /// Wraps `vault`, probing it first.
    ///
    /// # Errors
    ///
    /// Whatever `vault.probe()` reports, typically
    /// [`KeyStoreError::BackendUnavailable`] or [`KeyStoreError::Unsupported`].
    pub async fn new(vault: V, fs: FsKeyStore, service: impl Into<String>) -> Result<Self> {
        vault.probe().await?;

        let service = service.into();
        debug!(vault = vault.name(), service = %service, "keychain key store ready");
        Ok(Self { vault, fs, service })
    }

    /// The embedded filesystem store.
    pub fn filesystem(&self) -> &FsKeyStore {
        &self.fs
    }

    /// The vault.
    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Service namespace of this store's vault entries.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn address(&self, proxy_host: &str, username: &str) -> VaultAddress {
        VaultAddress::new(&self.service, username, proxy_host)
    }
}

impl KeychainKeyStore<NativeVault> {
    /// Opens the OS keychain.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::Unsupported`]: built without the `keychain` feature
    ///   or on a platform without a supported keychain
    /// - [`KeyStoreError::BackendUnavailable`]: the keychain cannot be used in
    ///   this session (locked, no Secret Service, etc.)
    pub async fn native(fs: FsKeyStore, service: impl Into<String>) -> Result<Self> {
        let service = service.into();
        let vault = NativeVault::new(service.clone())?;
        Self::new(vault, fs, service).await
    }
}

#[async_trait]
impl<V: Vault> LocalKeyStore for KeychainKeyStore<V> {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn add_key(&self, key: &Key) -> Result<()> {
        key.validate()?;
        let id = key.identity();
        let address = self.address(&key.proxy_host, &key.username);
        let mut data = record::encode(key)?;

        // vaults have no upsert: clear the slot, then insert
        match self.vault.delete(&address).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                data.zeroize();
                return Err(KeyStoreError::store_op(BACKEND_NAME, "add", id, e));
            }
        }

        let result = self.vault.insert(&address, &data).await;
        data.zeroize();
        result.map_err(|e| KeyStoreError::store_op(BACKEND_NAME, "add", id.clone(), e))?;

        debug!(identity = %id, "stored key in keychain");
        Ok(())
    }

    async fn get_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<Key> {
        validate_identity(proxy_host, username)?;
        let id = identity(proxy_host, username);

        let mut data = match self.vault.query(&self.address(proxy_host, username)).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Err(KeyStoreError::NotFound(id)),
            Err(e) => return Err(KeyStoreError::store_op(BACKEND_NAME, "get", id, e)),
        };

        // an empty entry means nothing is stored
        if data.is_empty() {
            return Err(KeyStoreError::NotFound(id));
        }

        let decoded = record::decode(&data, proxy_host, username);
        data.zeroize();
        let mut key = decoded?;

        apply_options(self.fs.root(), &mut key, opts).await?;
        Ok(key)
    }

    async fn delete_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<()> {
        validate_identity(proxy_host, username)?;
        let id = identity(proxy_host, username);

        match self.vault.delete(&self.address(proxy_host, username)).await {
            Ok(()) => debug!(identity = %id, "deleted key from keychain"),
            Err(e) if e.is_not_found() => debug!(identity = %id, "no keychain entry to delete"),
            Err(e) => return Err(KeyStoreError::store_op(BACKEND_NAME, "delete", id, e)),
        }

        delete_options(self.fs.root(), proxy_host, username, opts).await
    }

    async fn delete_keys(&self) -> Result<()> {
        let addresses = self.vault.query_all(&self.service).await.map_err(|e| {
            KeyStoreError::store_op(BACKEND_NAME, "enumerate", self.service.clone(), e)
        })?;

        let mut removed = 0;
        for address in &addresses {
            match self.vault.delete(address).await {
                Ok(()) => removed += 1,
                // removed by someone else since enumeration
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(KeyStoreError::PartialPurgeFailure {
                        identity: address.identity(),
                        removed,
                        source: Box::new(e),
                    })
                }
            }
        }

        // records written to disk before the keychain was in use
        self.fs.delete_keys().await?;

        info!(removed, service = %self.service, "purged all keys from keychain");
        Ok(())
    }

    async fn add_known_host_keys(&self, hostname: &str, keys: &[PublicKey]) -> Result<()> {
        self.fs.add_known_host_keys(hostname, keys).await
    }

    async fn get_known_host_keys(&self, hostname: &str) -> Result<Vec<PublicKey>> {
        self.fs.get_known_host_keys(hostname).await
    }

    async fn save_certs(&self, proxy_host: &str, certs: &[Certificate]) -> Result<()> {
        self.fs.save_certs(proxy_host, certs).await
    }

    async fn get_certs(&self, proxy_host: &str) -> Result<CertPool> {
        self.fs.get_certs(proxy_host).await
    }

    async fn get_certs_pem(&self, proxy_host: &str) -> Result<Vec<u8>> {
        self.fs.get_certs_pem(proxy_host).await
    }
}
