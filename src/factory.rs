//! Backend selection and the [`KeyStore`] facade.

use crate::backends::keychain::native_supported;
use crate::{
    BackendType, CertPool, Certificate, Config, FsKeyStore, Key, KeyOption, KeychainKeyStore,
    LocalKeyStore, NativeVault, PublicKey, Result,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Creates the backend described by `config`.
///
/// Under [`BackendType::Auto`] the OS keychain is probed once. If it is not
/// built in or not usable, the filesystem backend is returned instead.
///
/// # Errors
///
/// - the storage root cannot be resolved or created
/// - [`BackendType::Keychain`] was requested and the keychain is
///   unsupported ([`KeyStoreError::Unsupported`](crate::KeyStoreError::Unsupported))
///   or unusable ([`KeyStoreError::BackendUnavailable`](crate::KeyStoreError::BackendUnavailable))
pub async fn new_backend(config: &Config) -> Result<Box<dyn LocalKeyStore>> {
    let root = config.key_dir()?;
    let fs = FsKeyStore::new(&root).await?;

    match config.backend {
        BackendType::Filesystem => Ok(Box::new(fs)),
        BackendType::Keychain => {
            let store = KeychainKeyStore::native(fs, config.service.as_str()).await?;
            Ok(Box::new(store))
        }
        BackendType::Auto => {
            if !native_supported() {
                debug!("keychain support not built in, using filesystem key store");
                return Ok(Box::new(fs));
            }

            match KeychainKeyStore::<NativeVault>::native(fs.clone(), config.service.as_str()).await {
                Ok(store) => Ok(Box::new(store)),
                Err(e) => {
                    warn!(error = %e, "keychain unavailable, falling back to filesystem key store");
                    Ok(Box::new(fs))
                }
            }
        }
    }
}

/// The key store clients use.
///
/// Wraps whichever backend was selected at construction. The choice is made
/// once and never revisited.
///
/// # Example
///
/// ```
/// use clientkeys::{BackendType, Config, KeyStore, LocalKeyStore};
///
/// #[tokio::main]
/// async fn main() -> clientkeys::Result<()> {
///     let dir = tempfile::tempdir()?;
///     let config = Config::new(BackendType::Filesystem).with_key_dir(dir.path());
///
///     let store = KeyStore::new(config).await?;
///     assert_eq!(store.backend_name(), "fs");
///     assert!(store.get_key("proxy", "alice", &[]).await.unwrap_err().is_not_found());
///     Ok(())
/// }
/// ```
pub struct KeyStore {
    inner: Box<dyn LocalKeyStore>,
}

impl KeyStore {
    /// Selects and opens a backend. See [`new_backend`].
    pub async fn new(config: Config) -> Result<Self> {
        let inner = new_backend(&config).await?;
        info!(backend = inner.name(), requested = %config.backend, "key store initialized");
        Ok(Self { inner })
    }

    /// Wraps an already constructed backend.
    pub fn from_backend(backend: impl LocalKeyStore + 'static) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    /// Name of the selected backend ("fs" or "keychain").
    pub fn backend_name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl LocalKeyStore for KeyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn add_key(&self, key: &Key) -> Result<()> {
        self.inner.add_key(key).await
    }

    async fn get_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<Key> {
        self.inner.get_key(proxy_host, username, opts).await
    }

    async fn delete_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<()> {
        self.inner.delete_key(proxy_host, username, opts).await
    }

    async fn delete_keys(&self) -> Result<()> {
        self.inner.delete_keys().await
    }

    async fn add_known_host_keys(&self, hostname: &str, keys: &[PublicKey]) -> Result<()> {
        self.inner.add_known_host_keys(hostname, keys).await
    }

    async fn get_known_host_keys(&self, hostname: &str) -> Result<Vec<PublicKey>> {
        self.inner.get_known_host_keys(hostname).await
    }

    async fn save_certs(&self, proxy_host: &str, certs: &[Certificate]) -> Result<()> {
        self.inner.save_certs(proxy_host, certs).await
    }

    async fn get_certs(&self, proxy_host: &str) -> Result<CertPool> {
        self.inner.get_certs(proxy_host).await
    }

    async fn get_certs_pem(&self, proxy_host: &str) -> Result<Vec<u8>> {
        self.inner.get_certs_pem(proxy_host).await
    }
}
