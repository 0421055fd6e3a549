//! OS keychain backend.
//!
//! Private keys and certificates go to an OS vault, one entry per identity at
//! `(service, username, proxy_host)`. Trusted CA bundles and known-host keys
//! stay on disk through an embedded [`FsKeyStore`](crate::FsKeyStore).
//!
//! # Platform Support
//!
//! [`NativeVault`] talks to the platform keychain through the `keyring` crate
//! and is compiled with the `keychain` feature on macOS, Windows and Linux.
//! Elsewhere, or without the feature, it is a stub whose constructor returns
//! [`KeyStoreError::Unsupported`](crate::KeyStoreError::Unsupported).
//!
//! [`MemoryVault`] (feature `mock`, on by default) stands in for the keychain
//! in tests.

mod backend;
mod record;
mod vault;

#[cfg(feature = "mock")]
mod memory;

#[cfg(any(
    test,
    all(
        feature = "keychain",
        any(target_os = "macos", target_os = "windows", target_os = "linux")
    )
))]
mod indexed;

#[cfg(all(
    feature = "keychain",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
mod native;
#[cfg(all(
    feature = "keychain",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
pub use native::NativeVault;

#[cfg(not(all(
    feature = "keychain",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
)))]
mod native_stub;
#[cfg(not(all(
    feature = "keychain",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
)))]
pub use native_stub::NativeVault;

pub use backend::KeychainKeyStore;
#[cfg(feature = "mock")]
pub use memory::MemoryVault;
pub use vault::{Vault, VaultAddress};

/// Returns true if this build can talk to an OS keychain at all.
///
/// A `true` result does not mean the keychain is usable in this session;
/// [`Vault::probe`] answers that.
pub fn native_supported() -> bool {
    cfg!(all(
        feature = "keychain",
        any(target_os = "macos", target_os = "windows", target_os = "linux")
    ))
}
