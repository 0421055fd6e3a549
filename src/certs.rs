//! Trusted CA certificates and PEM handling.
//!
//! Certificates are kept as DER bytes. The on-disk bundle format is a plain
//! concatenation of `CERTIFICATE` PEM blocks so external tooling can read it.

use crate::{KeyStoreError, Result};
use base64::Engine;
use std::fmt;

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";
const PEM_TAIL: &str = "-----";
const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const PEM_LINE_WIDTH: usize = 64;

/// A single DER-encoded X.509 certificate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    /// Wraps DER bytes.
    ///
    /// Only the outer ASN.1 SEQUENCE header is checked: its tag, and that its
    /// length matches the data. The certificate itself is not parsed or
    /// verified; that is left to the TLS library consuming the pool.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        check_der_sequence(&der)?;
        Ok(Self(der))
    }

    /// Parses every `CERTIFICATE` block in `pem`.
    pub fn parse_pem(pem: &[u8]) -> Result<Vec<Self>> {
        parse_pem_blocks(pem)?
            .into_iter()
            .filter(|(label, _)| label == CERTIFICATE_LABEL)
            .map(|(_, der)| Self::from_der(der))
            .collect()
    }

    /// DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    /// PEM encoding of this certificate (one block, trailing newline).
    pub fn to_pem(&self) -> String {
        let body = base64::engine::general_purpose::STANDARD.encode(&self.0);
        let mut out = String::with_capacity(body.len() + 64);
        out.push_str("-----BEGIN CERTIFICATE-----\n");
        for chunk in body.as_bytes().chunks(PEM_LINE_WIDTH) {
            // base64 output is ASCII
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push('\n');
        }
        out.push_str("-----END CERTIFICATE-----\n");
        out
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({} bytes)", self.0.len())
    }
}

/// A set of trusted CA certificates, ready to hand to a TLS verifier.
///
/// Insertion order is preserved and duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertPool {
    certs: Vec<Certificate>,
}

impl CertPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool from a PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::InvalidCertificate`] if the bundle is malformed
    /// or holds no `CERTIFICATE` block.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let certs = Certificate::parse_pem(pem)?;
        if certs.is_empty() {
            return Err(KeyStoreError::InvalidCertificate(
                "no CERTIFICATE blocks in bundle".to_string(),
            ));
        }

        let mut pool = Self::new();
        for cert in certs {
            pool.add(cert);
        }
        Ok(pool)
    }

    /// Adds a certificate. Returns false if it was already present.
    pub fn add(&mut self, cert: Certificate) -> bool {
        if self.certs.contains(&cert) {
            return false;
        }
        self.certs.push(cert);
        true
    }

    /// Returns true if the pool holds `cert`.
    pub fn contains(&self, cert: &Certificate) -> bool {
        self.certs.contains(cert)
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Returns true if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Iterates over the certificates.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter()
    }

    /// Concatenated PEM encoding of the pool.
    pub fn to_pem(&self) -> Vec<u8> {
        self.certs
            .iter()
            .map(Certificate::to_pem)
            .collect::<String>()
            .into_bytes()
    }
}

impl FromIterator<Certificate> for CertPool {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        let mut pool = Self::new();
        for cert in iter {
            pool.add(cert);
        }
        pool
    }
}

/// Splits PEM text into `(label, decoded body)` pairs.
fn parse_pem_blocks(pem: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| KeyStoreError::InvalidCertificate("PEM data is not UTF-8".to_string()))?;

    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match current.take() {
            None => {
                if let Some(label) = pem_label(line, PEM_BEGIN) {
                    current = Some((label.to_string(), String::new()));
                }
                // text outside blocks is ignored
            }
            Some((label, body)) => {
                if let Some(end_label) = pem_label(line, PEM_END) {
                    if end_label != label {
                        return Err(KeyStoreError::InvalidCertificate(format!(
                            "PEM block {} closed as {}",
                            label, end_label
                        )));
                    }
                    let der = base64::engine::general_purpose::STANDARD
                        .decode(body.as_bytes())
                        .map_err(|e| {
                            KeyStoreError::InvalidCertificate(format!(
                                "bad base64 in PEM block: {}",
                                e
                            ))
                        })?;
                    blocks.push((label, der));
                } else {
                    let mut body = body;
                    body.push_str(line);
                    current = Some((label, body));
                }
            }
        }
    }

    if let Some((label, _)) = current {
        return Err(KeyStoreError::InvalidCertificate(format!(
            "unterminated PEM block {}",
            label
        )));
    }

    Ok(blocks)
}

/// Checks `der` is exactly one non-empty DER SEQUENCE.
fn check_der_sequence(der: &[u8]) -> Result<()> {
    match der.first() {
        None => return Err(invalid_der("empty certificate")),
        Some(0x30) => {}
        Some(_) => return Err(invalid_der("DER data is not an ASN.1 SEQUENCE")),
    }

    let first = *der.get(1).ok_or_else(|| invalid_der("truncated DER length"))?;
    let (header_len, body_len) = if first < 0x80 {
        (2, usize::from(first))
    } else {
        let count = usize::from(first & 0x7f);
        if count == 0 || count > 4 {
            return Err(invalid_der("unsupported DER length encoding"));
        }
        let bytes = der
            .get(2..2 + count)
            .ok_or_else(|| invalid_der("truncated DER length"))?;
        // long form must be minimal
        if bytes[0] == 0 || (count == 1 && bytes[0] < 0x80) {
            return Err(invalid_der("non-minimal DER length"));
        }
        let len = bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (2 + count, len)
    };

    if body_len == 0 {
        return Err(invalid_der("empty SEQUENCE"));
    }
    if header_len.checked_add(body_len) != Some(der.len()) {
        return Err(invalid_der("DER length does not match data"));
    }
    Ok(())
}

fn invalid_der(reason: &str) -> KeyStoreError {
    KeyStoreError::InvalidCertificate(reason.to_string())
}

fn pem_label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix(PEM_TAIL)
}
