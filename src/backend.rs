//! Key store trait definition.
//!
//! This module defines the [`LocalKeyStore`] trait that every storage backend
//! implements, and the [`KeyOption`] hook used to compose extra lookups into
//! `get_key`/`delete_key`.

use crate::backends::fs::{load_cert_pool, remove_cert_bundle};
use crate::{CertPool, Certificate, Key, PublicKey, Result};
use async_trait::async_trait;
use std::path::Path;

/// LocalKeyStore persists session credentials for a client.
///
/// Credential records are addressed by `(proxy_host, username)`. Trusted CA
/// bundles are addressed by proxy host and known-host keys by hostname.
///
/// # Implementations
///
/// - [`FsKeyStore`](crate::FsKeyStore): everything on disk
/// - [`KeychainKeyStore`](crate::KeychainKeyStore): private keys and
///   certificates in an OS vault, everything else in an embedded `FsKeyStore`
/// - [`KeyStore`](crate::KeyStore): the facade that picks one of the above
///
/// # Concurrency
///
/// Stores do not serialize writers. Concurrent `add_key` calls for one
/// identity are last-write-wins. `delete_keys` enumerates and then deletes,
/// so a record added for an already enumerated identity while it runs may
/// be removed as well.
///
/// # Example
///
/// ```no_run
/// use clientkeys::{Config, Key, KeyStore, LocalKeyStore};
///
/// #[tokio::main]
/// async fn main() -> clientkeys::Result<()> {
///     let store = KeyStore::new(Config::default()).await?;
///
///     let key = Key::new("proxy.example.com", "alice", b"private".to_vec())
///         .with_cert(b"ssh-ed25519-cert-v01@openssh.com AAAA".to_vec());
///     store.add_key(&key).await?;
///
///     let loaded = store.get_key("proxy.example.com", "alice", &[]).await?;
///     assert_eq!(loaded, key);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LocalKeyStore: Send + Sync {
    /// Returns the backend name (e.g., "fs", "keychain").
    fn name(&self) -> &str;

    // ========================================================================
    // Credential Records
    // ========================================================================

    /// Stores a credential record, replacing any record at the same identity.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::InvalidIdentity`](crate::KeyStoreError::InvalidIdentity):
    ///   proxy host or username empty or unsafe
    /// - [`KeyStoreError::InvalidKey`](crate::KeyStoreError::InvalidKey):
    ///   no private key or no certificate
    async fn add_key(&self, key: &Key) -> Result<()>;

    /// Loads the credential record for an identity and applies `opts` to it.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`](crate::KeyStoreError::NotFound):
    ///   nothing stored for this identity (the user has no active session)
    /// - [`KeyStoreError::DecodeError`](crate::KeyStoreError::DecodeError):
    ///   a record exists but cannot be parsed
    /// - any error returned by an option; the partial result is discarded
    async fn get_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<Key>;

    /// Removes the credential record for an identity and runs the
    /// side-deletions of `opts`.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`](crate::KeyStoreError::NotFound):
    ///   nothing stored (filesystem backend; the vault backend is idempotent)
    async fn delete_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<()>;

    /// Removes every credential record for every identity.
    ///
    /// Trusted CA bundles and known-host keys are left alone.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::PartialPurgeFailure`](crate::KeyStoreError::PartialPurgeFailure):
    ///   the purge stopped partway; names the identity that failed
    async fn delete_keys(&self) -> Result<()>;

    // ========================================================================
    // Known Hosts
    // ========================================================================

    /// Trusts `keys` for `hostname`, in addition to keys already trusted.
    async fn add_known_host_keys(&self, hostname: &str, keys: &[PublicKey]) -> Result<()>;

    /// Keys trusted for `hostname`; empty if none.
    async fn get_known_host_keys(&self, hostname: &str) -> Result<Vec<PublicKey>>;

    // ========================================================================
    // Trusted CA Bundles
    // ========================================================================

    /// Replaces the trusted CA bundle for a proxy.
    async fn save_certs(&self, proxy_host: &str, certs: &[Certificate]) -> Result<()>;

    /// Trusted CA bundle for a proxy as a certificate pool.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`](crate::KeyStoreError::NotFound): no bundle saved
    async fn get_certs(&self, proxy_host: &str) -> Result<CertPool>;

    /// Trusted CA bundle for a proxy as raw PEM.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`](crate::KeyStoreError::NotFound): no bundle saved
    async fn get_certs_pem(&self, proxy_host: &str) -> Result<Vec<u8>>;
}

/// An extra lookup composed into `get_key` and `delete_key`.
///
/// Options receive the filesystem storage root, including when the vault
/// backend is active (they then operate on its embedded filesystem store).
#[async_trait]
pub trait KeyOption: Send + Sync {
    /// Enriches a loaded record. An error fails the whole `get_key`.
    async fn apply(&self, root: &Path, key: &mut Key) -> Result<()>;

    /// Side-deletion run by `delete_key` after the record is removed.
    async fn delete(&self, root: &Path, proxy_host: &str, username: &str) -> Result<()>;
}

/// Attaches the proxy's trusted CA bundle on read; removes it on delete.
///
/// Reading fails with `NotFound` if the proxy has no saved bundle. Deleting
/// tolerates a missing bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithTrustedCerts;

#[async_trait]
impl KeyOption for WithTrustedCerts {
    async fn apply(&self, root: &Path, key: &mut Key) -> Result<()> {
        let pool = load_cert_pool(root, &key.proxy_host).await?;
        key.trusted_certs = pool.iter().cloned().collect();
        Ok(())
    }

    async fn delete(&self, root: &Path, proxy_host: &str, _username: &str) -> Result<()> {
        remove_cert_bundle(root, proxy_host).await
    }
}

/// Runs `opts` in order against a loaded record.
pub(crate) async fn apply_options(root: &Path, key: &mut Key, opts: &[&dyn KeyOption]) -> Result<()> {
    for opt in opts {
        opt.apply(root, key).await?;
    }
    Ok(())
}

/// Runs the side-deletions of `opts` in order.
pub(crate) async fn delete_options(
    root: &Path,
    proxy_host: &str,
    username: &str,
    opts: &[&dyn KeyOption],
) -> Result<()> {
    for opt in opts {
        opt.delete(root, proxy_host, username).await?;
    }
    Ok(())
}
