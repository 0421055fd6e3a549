//! Configuration types for key store initialization.

use crate::{KeyStoreError, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Default vault service namespace.
pub const DEFAULT_SERVICE: &str = "teleport";

/// Directory under the home directory used when no key directory is set.
pub const DEFAULT_KEY_DIR: &str = ".tsh";

/// Environment variable selecting the backend (`auto`, `fs` or `keychain`).
pub const ENV_BACKEND: &str = "CLIENTKEYS_BACKEND";
/// Environment variable overriding the storage root.
pub const ENV_HOME: &str = "CLIENTKEYS_HOME";
/// Environment variable overriding the vault service name.
pub const ENV_SERVICE: &str = "CLIENTKEYS_SERVICE";

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// OS keychain when usable in this session, filesystem otherwise
    #[default]
    Auto,
    /// Filesystem only
    Filesystem,
    /// OS keychain; fails instead of falling back
    Keychain,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Filesystem => write!(f, "fs"),
            Self::Keychain => write!(f, "keychain"),
        }
    }
}

impl FromStr for BackendType {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "fs" | "file" | "filesystem" => Ok(Self::Filesystem),
            "keychain" | "keyring" | "vault" => Ok(Self::Keychain),
            other => Err(KeyStoreError::Other(anyhow::anyhow!(
                "unknown backend: {} (expected auto, fs or keychain)",
                other
            ))),
        }
    }
}

/// Configuration for creating a [`KeyStore`](crate::KeyStore).
///
/// ```
/// use clientkeys::{BackendType, Config};
///
/// let config = Config::new(BackendType::Filesystem)
///     .with_key_dir("/tmp/keys")
///     .with_service("myclient");
///
/// assert_eq!(config.key_dir().unwrap().to_str(), Some("/tmp/keys"));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend selection
    pub backend: BackendType,

    /// Storage root (default: `~/.tsh`)
    pub key_dir: Option<PathBuf>,

    /// Vault service namespace (default: "teleport")
    pub service: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            key_dir: None,
            service: DEFAULT_SERVICE.to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration for the specified backend.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Reads overrides from `CLIENTKEYS_BACKEND`, `CLIENTKEYS_HOME` and
    /// `CLIENTKEYS_SERVICE`. Unset or empty variables keep the defaults.
    ///
    /// # Errors
    ///
    /// Fails if `CLIENTKEYS_BACKEND` names an unknown backend.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(backend) = var(ENV_BACKEND) {
            config.backend = backend.parse()?;
        }
        if let Some(home) = var(ENV_HOME) {
            config.key_dir = Some(PathBuf::from(home));
        }
        if let Some(service) = var(ENV_SERVICE) {
            config.service = service;
        }
        Ok(config)
    }

    /// Sets the storage root.
    pub fn with_key_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_dir = Some(path.into());
        self
    }

    /// Sets the vault service namespace.
    ///
    /// Every vault entry this store writes lives under this service, and
    /// `delete_keys` purges exactly this namespace.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Resolves the storage root, defaulting to `~/.tsh`.
    ///
    /// # Errors
    ///
    /// Fails if no key directory is set and the home directory is unknown.
    pub fn key_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.key_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_KEY_DIR))
            .ok_or_else(|| {
                KeyStoreError::Other(anyhow::anyhow!(
                    "cannot determine home directory; set {} or Config::with_key_dir",
                    ENV_HOME
                ))
            })
    }
}
