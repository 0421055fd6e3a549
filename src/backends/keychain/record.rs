//! Vault encoding of credential records.
//!
//! A record is stored as a versioned JSON envelope with byte fields in
//! base64, so it survives vaults that only hold text and can be checked
//! for identity and version on the way back.

use crate::key::identity;
use crate::{Key, KeyStoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct VaultRecord {
    version: u32,
    proxy_host: String,
    username: String,
    #[serde(with = "b64")]
    priv_key: Vec<u8>,
    #[serde(with = "b64", default)]
    pub_key: Vec<u8>,
    #[serde(with = "b64", default)]
    cert: Vec<u8>,
    #[serde(with = "b64", default)]
    tls_cert: Vec<u8>,
    stored_at: DateTime<Utc>,
}

impl Drop for VaultRecord {
    fn drop(&mut self) {
        self.priv_key.zeroize();
    }
}

/// Serializes everything but `trusted_certs`, which live on disk.
pub(crate) fn encode(key: &Key) -> Result<Vec<u8>> {
    let record = VaultRecord {
        version: RECORD_VERSION,
        proxy_host: key.proxy_host.clone(),
        username: key.username.clone(),
        priv_key: key.priv_key.clone(),
        pub_key: key.pub_key.clone(),
        cert: key.cert.clone(),
        tls_cert: key.tls_cert.clone(),
        stored_at: Utc::now(),
    };

    Ok(serde_json::to_vec(&record)?)
}

/// Parses stored bytes, checking they belong to the requested identity.
pub(crate) fn decode(data: &[u8], proxy_host: &str, username: &str) -> Result<Key> {
    let id = identity(proxy_host, username);
    let decode_error = |reason: String| KeyStoreError::DecodeError {
        identity: id.clone(),
        reason,
    };

    // position only; serde_json messages may quote the offending value
    let mut record: VaultRecord = serde_json::from_slice(data).map_err(|e| {
        decode_error(format!(
            "{:?} error at line {} column {}",
            e.classify(),
            e.line(),
            e.column()
        ))
    })?;

    if record.version != RECORD_VERSION {
        return Err(decode_error(format!(
            "unsupported record version {}",
            record.version
        )));
    }

    if record.proxy_host != proxy_host || record.username != username {
        return Err(decode_error(format!(
            "record belongs to {}",
            identity(&record.proxy_host, &record.username)
        )));
    }

    let mut key = Key::new(proxy_host, username, std::mem::take(&mut record.priv_key));
    key.pub_key = std::mem::take(&mut record.pub_key);
    key.cert = std::mem::take(&mut record.cert);
    key.tls_cert = std::mem::take(&mut record.tls_cert);
    Ok(key)
}

mod b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
