//! Identity validation shared by all backends.
//!
//! Proxy hosts and usernames become directory names in the filesystem layout
//! and account/label strings in the vault, so both backends apply the same
//! rules before touching storage.

use crate::{KeyStoreError, Result};

/// Characters that would let a name escape its directory or confuse the
/// known-hosts line format.
const FORBIDDEN_CHARS: &str = "/\\ \t\n\r";

/// Maximum allowed length for an identity component.
const MAX_NAME_LENGTH: usize = 255;

/// Validates one component of a credential identity (proxy host or username).
///
/// Rejects:
/// - Empty names
/// - Names longer than 255 bytes
/// - Null bytes and other control characters
/// - Path separators and whitespace
/// - `.`/`..` and names starting with `.` (reserved for staging files)
///
/// # Example
///
/// ```
/// use clientkeys::validation::validate_identity_part;
///
/// assert!(validate_identity_part("proxy", "proxy.example.com:3080").is_ok());
/// assert!(validate_identity_part("username", "alice@example.com").is_ok());
///
/// assert!(validate_identity_part("username", "").is_err());
/// assert!(validate_identity_part("username", "../etc").is_err());
/// ```
pub fn validate_identity_part(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "{} cannot be empty",
            what
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "{} exceeds maximum length of {} bytes",
            what, MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "{} contains control characters",
            what
        )));
    }

    if name.chars().any(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "{} contains a path separator or whitespace",
            what
        )));
    }

    if name.starts_with('.') {
        return Err(KeyStoreError::InvalidIdentity(format!(
            "{} cannot start with '.'",
            what
        )));
    }

    Ok(())
}

/// Validates a `(proxy_host, username)` pair.
pub fn validate_identity(proxy_host: &str, username: &str) -> Result<()> {
    validate_identity_part("proxy host", proxy_host)?;
    validate_identity_part("username", username)
}

/// Validates a known-hosts hostname. Same rules as an identity component.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    validate_identity_part("hostname", hostname)
}
