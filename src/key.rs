//! Credential records.

use crate::certs::Certificate;
use crate::validation::validate_identity;
use crate::{KeyStoreError, Result};
use std::fmt;
use zeroize::Zeroize;

/// A user's session key material for one proxy.
///
/// Uniquely addressed by `(proxy_host, username)`. Storing a `Key` for an
/// identity that already has one replaces it entirely.
///
/// The private key buffer is zeroed when the value is dropped, and `Debug`
/// prints only byte counts.
///
/// # Example
///
/// ```
/// use clientkeys::Key;
///
/// let key = Key::new("proxy.example.com", "alice", b"private".to_vec())
///     .with_cert(b"ssh-ed25519-cert-v01@openssh.com AAAA".to_vec());
///
/// assert_eq!(key.identity(), "alice@proxy.example.com");
/// assert!(key.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    /// Proxy the session was issued by
    pub proxy_host: String,

    /// Authenticated principal
    pub username: String,

    /// Private key bytes (sensitive)
    pub priv_key: Vec<u8>,

    /// Public key matching `priv_key` (authorized-keys form, may be empty)
    pub pub_key: Vec<u8>,

    /// Signed SSH certificate (may be empty if `tls_cert` is set)
    pub cert: Vec<u8>,

    /// Signed X.509 certificate, PEM (may be empty if `cert` is set)
    pub tls_cert: Vec<u8>,

    /// Trusted CAs for the proxy, attached on read by
    /// [`WithTrustedCerts`](crate::WithTrustedCerts). Never written by `add_key`.
    pub trusted_certs: Vec<Certificate>,
}

impl Key {
    /// Creates a record holding only a private key; add certificates with
    /// the `with_*` builders.
    pub fn new(
        proxy_host: impl Into<String>,
        username: impl Into<String>,
        priv_key: Vec<u8>,
    ) -> Self {
        Self {
            proxy_host: proxy_host.into(),
            username: username.into(),
            priv_key,
            pub_key: Vec::new(),
            cert: Vec::new(),
            tls_cert: Vec::new(),
            trusted_certs: Vec::new(),
        }
    }

    /// Sets the public key.
    pub fn with_pub_key(mut self, pub_key: Vec<u8>) -> Self {
        self.pub_key = pub_key;
        self
    }

    /// Sets the SSH certificate.
    pub fn with_cert(mut self, cert: Vec<u8>) -> Self {
        self.cert = cert;
        self
    }

    /// Sets the TLS certificate.
    pub fn with_tls_cert(mut self, tls_cert: Vec<u8>) -> Self {
        self.tls_cert = tls_cert;
        self
    }

    /// `username@proxy_host`, the form used in logs and error messages.
    pub fn identity(&self) -> String {
        identity(&self.proxy_host, &self.username)
    }

    /// Checks the record can be stored: valid identity, a private key, and at
    /// least one certificate.
    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.proxy_host, &self.username)?;

        if self.priv_key.is_empty() {
            return Err(KeyStoreError::InvalidKey(format!(
                "{}: private key is empty",
                self.identity()
            )));
        }

        if self.cert.is_empty() && self.tls_cert.is_empty() {
            return Err(KeyStoreError::InvalidKey(format!(
                "{}: no certificate",
                self.identity()
            )));
        }

        Ok(())
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.priv_key.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("proxy_host", &self.proxy_host)
            .field("username", &self.username)
            .field("priv_key", &format_args!("<{} bytes>", self.priv_key.len()))
            .field("pub_key", &format_args!("<{} bytes>", self.pub_key.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("tls_cert", &format_args!("<{} bytes>", self.tls_cert.len()))
            .field("trusted_certs", &self.trusted_certs.len())
            .finish()
    }
}

/// Formats an identity as `username@proxy_host`.
pub(crate) fn identity(proxy_host: &str, username: &str) -> String {
    format!("{}@{}", username, proxy_host)
}
