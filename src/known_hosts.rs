//! Known-host public keys.
//!
//! Keys use the OpenSSH authorized-keys text form (`<algorithm> <base64>
//! [comment]`) and are parsed with `ssh-key`, so the blob must be a
//! well-formed key of the algorithm it is labelled with. Two keys are equal
//! when their key data match; the comment is ignored.

use crate::validation::validate_hostname;
use crate::{KeyStoreError, Result};
use base64::Engine;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// An SSH public key accepted for a host.
#[derive(Debug, Clone)]
pub struct PublicKey {
    inner: ssh_key::PublicKey,
    blob: Vec<u8>,
}

impl PublicKey {
    /// Decodes a wire-format key blob.
    pub fn from_blob(blob: impl Into<Vec<u8>>) -> Result<Self> {
        let blob = blob.into();
        let inner = ssh_key::PublicKey::from_bytes(&blob)
            .map_err(|e| KeyStoreError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { inner, blob })
    }

    /// Parses the authorized-keys form.
    ///
    /// # Example
    ///
    /// ```
    /// use clientkeys::PublicKey;
    ///
    /// let key = PublicKey::parse(
    ///     "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB host-ca",
    /// )
    /// .unwrap();
    /// assert_eq!(key.algorithm(), "ssh-ed25519");
    /// assert_eq!(key.comment(), Some("host-ca"));
    ///
    /// // label and key data disagree
    /// assert!(PublicKey::parse(
    ///     "ssh-rsa AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB"
    /// )
    /// .is_err());
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let mut fields = line.split_whitespace();
        let (algorithm, encoded) = match (fields.next(), fields.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(KeyStoreError::InvalidPublicKey(
                    "expected '<algorithm> <base64>'".to_string(),
                ))
            }
        };

        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| KeyStoreError::InvalidPublicKey(format!("bad base64: {}", e)))?;

        let inner = ssh_key::PublicKey::from_openssh(line)
            .map_err(|e| KeyStoreError::InvalidPublicKey(e.to_string()))?;

        if inner.algorithm().as_str() != algorithm {
            return Err(KeyStoreError::InvalidPublicKey(format!(
                "labelled {} but holds a {} key",
                algorithm,
                inner.algorithm().as_str()
            )));
        }

        Ok(Self { inner, blob })
    }

    /// Sets a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.inner.set_comment(comment);
        self
    }

    /// Algorithm name, e.g. `ssh-ed25519`.
    pub fn algorithm(&self) -> String {
        self.inner.algorithm().as_str().to_string()
    }

    /// Wire-format key blob.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Optional trailing comment.
    pub fn comment(&self) -> Option<&str> {
        Some(self.inner.comment()).filter(|c| !c.is_empty())
    }

    /// The parsed `ssh-key` value, for fingerprints and verification.
    pub fn as_ssh_key(&self) -> &ssh_key::PublicKey {
        &self.inner
    }

    /// Authorized-keys encoding without the comment.
    pub fn to_authorized_key(&self) -> String {
        format!(
            "{} {}",
            self.algorithm(),
            base64::engine::general_purpose::STANDARD.encode(&self.blob)
        )
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.blob == other.blob
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.blob.hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_authorized_key())?;
        if let Some(comment) = self.comment() {
            write!(f, " {}", comment)?;
        }
        Ok(())
    }
}

impl FromStr for PublicKey {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One line of the known-hosts file: `<hostname> <algorithm> <base64> [comment]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KnownHostLine {
    pub hostname: String,
    pub key: PublicKey,
}

impl KnownHostLine {
    pub fn new(hostname: &str, key: PublicKey) -> Result<Self> {
        validate_hostname(hostname)?;
        Ok(Self {
            hostname: hostname.to_string(),
            key,
        })
    }

    /// Parses a line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (hostname, rest) = line.split_once(char::is_whitespace).ok_or_else(|| {
            KeyStoreError::InvalidPublicKey("known-hosts line has no key".to_string())
        })?;

        Ok(Some(Self {
            hostname: hostname.to_string(),
            key: PublicKey::parse(rest)?,
        }))
    }
}

impl fmt::Display for KnownHostLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.hostname, self.key)
    }
}
