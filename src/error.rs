//! Error types for key store operations.

use thiserror::Error;

/// Result type alias using [`KeyStoreError`].
pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// Errors that can occur during key store operations.
///
/// Error messages carry identities (`username@proxy`), paths and reasons only.
/// Private key bytes and certificate contents never appear in them.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No record or entry exists at the requested identity.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entry already exists at this address (vault inserts only).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Stored bytes could not be parsed as a credential record.
    #[error("cannot decode stored record for {identity}: {reason}")]
    DecodeError {
        /// Identity whose record failed to decode
        identity: String,
        /// Parser diagnostic (never the stored bytes)
        reason: String,
    },

    /// The OS vault is not accessible in this session.
    #[error("key store backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The vault backend is not supported on this platform or build.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A bulk delete stopped partway.
    #[error("purge aborted at {identity} after removing {removed} entries: {source}")]
    PartialPurgeFailure {
        /// Identity whose deletion failed
        identity: String,
        /// Entries removed before the failure
        removed: usize,
        /// Underlying error
        #[source]
        source: Box<KeyStoreError>,
    },

    /// Proxy host, username or hostname is not usable as an identity.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Credential record is missing required material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Certificate data is not valid PEM/DER.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Public key is not in authorized-keys form.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The OS vault reported a failure.
    #[error("vault error: {0}")]
    Vault(String),

    /// Store operation failed with context.
    #[error("{backend}: {operation} {identity}: {source}")]
    StoreOperation {
        /// Backend name
        backend: String,
        /// Operation name (add, get, delete, etc.)
        operation: String,
        /// Identity or resource the operation addressed
        identity: String,
        /// Underlying error
        #[source]
        source: Box<KeyStoreError>,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeyStoreError {
    /// Creates a store operation error with context.
    ///
    /// # Example
    ///
    /// ```
    /// use clientkeys::KeyStoreError;
    ///
    /// let err = KeyStoreError::NotFound("alice@proxy.example.com".to_string());
    /// let wrapped = KeyStoreError::store_op("fs", "get", "alice@proxy.example.com", err);
    ///
    /// assert_eq!(
    ///     wrapped.to_string(),
    ///     "fs: get alice@proxy.example.com: not found: alice@proxy.example.com"
    /// );
    /// assert!(wrapped.is_not_found());
    /// ```
    pub fn store_op(
        backend: impl Into<String>,
        operation: impl Into<String>,
        identity: impl Into<String>,
        err: KeyStoreError,
    ) -> Self {
        Self::StoreOperation {
            backend: backend.into(),
            operation: operation.into(),
            identity: identity.into(),
            source: Box::new(err),
        }
    }

    /// Returns true if this error (or the error it wraps) means "nothing stored".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::StoreOperation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if the stored record exists but cannot be decoded.
    pub fn is_decode_error(&self) -> bool {
        match self {
            Self::DecodeError { .. } => true,
            Self::StoreOperation { source, .. } => source.is_decode_error(),
            _ => false,
        }
    }
}
