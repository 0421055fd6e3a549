//! Clientkeys - local credential store for remote-access clients.
//!
//! Clientkeys persists per-proxy session material (private keys, signed SSH
//! and TLS certificates, trusted CA bundles, known-host keys) and hands it
//! back on later connections. Private keys and certificates go to the OS
//! keychain when one is usable and to a directory on disk otherwise; CA
//! bundles and known hosts always live on disk.
//!
//! # Features
//!
//! - **One interface**: [`LocalKeyStore`] is implemented by every backend and
//!   by the [`KeyStore`] facade
//! - **Async/Await**: built on tokio
//! - **Replace, never patch**: storing a key for an identity replaces the old
//!   record entirely
//! - **Safe bulk logout**: [`LocalKeyStore::delete_keys`] purges exactly this
//!   client's records and reports partial failures
//! - **Secret hygiene**: private keys are zeroed on drop and never appear in
//!   `Debug` output or error messages
//!
//! # Quick Start
//!
//! ```no_run
//! use clientkeys::{Config, Key, KeyStore, LocalKeyStore, WithTrustedCerts};
//!
//! #[tokio::main]
//! async fn main() -> clientkeys::Result<()> {
//!     // Keychain if usable, ~/.tsh otherwise
//!     let store = KeyStore::new(Config::from_env()?).await?;
//!
//!     let key = Key::new("proxy.example.com", "alice", b"private".to_vec())
//!         .with_cert(b"ssh-ed25519-cert-v01@openssh.com AAAA".to_vec());
//!     store.add_key(&key).await?;
//!
//!     match store.get_key("proxy.example.com", "alice", &[&WithTrustedCerts]).await {
//!         Ok(key) => println!("{} trusts {} CAs", key.identity(), key.trusted_certs.len()),
//!         Err(e) if e.is_not_found() => println!("not logged in"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! | Backend | Feature Flag | Platforms | Notes |
//! |---------|-------------|-----------|-------|
//! | Filesystem | always | all | `~/.tsh/keys/<proxy>/<user>/` |
//! | Keychain | `keychain` | macOS, Windows, Linux | via the `keyring` crate |
//! | Memory vault | `mock` (default) | all | in-memory vault for tests |
//!
//! ```toml
//! [dependencies]
//! clientkeys = { version = "0.1", features = ["keychain"] }
//! ```

pub mod backend;
pub mod backends;
pub mod certs;
pub mod config;
pub mod error;
pub mod factory;
pub mod key;
pub mod known_hosts;
pub mod validation;

pub use backend::{KeyOption, LocalKeyStore, WithTrustedCerts};
pub use backends::fs::FsKeyStore;
#[cfg(feature = "mock")]
pub use backends::keychain::MemoryVault;
pub use backends::keychain::{KeychainKeyStore, NativeVault, Vault, VaultAddress};
pub use certs::{CertPool, Certificate};
pub use config::{BackendType, Config};
pub use error::{KeyStoreError, Result};
pub use factory::KeyStore;
pub use key::Key;
pub use known_hosts::PublicKey;
