//! Filesystem key store.
//!
//! Layout under the storage root:
//!
//! ```text
//! keys/<proxy_host>/<username>/key       private key (0600)
//! keys/<proxy_host>/<username>/key.pub   public key
//! keys/<proxy_host>/<username>/cert.pub  SSH certificate
//! keys/<proxy_host>/<username>/tls.pem   TLS certificate
//! keys/<proxy_host>/<username>/generation  write stamp
//! cas/<proxy_host>.pem                   trusted CA bundle
//! known_hosts                            "<hostname> <algorithm> <base64>" lines
//! ```
//!
//! Credential records live only under `keys/`, so purging them never
//! touches CA bundles or known hosts.
//!
//! A record directory is replaced whole by renaming. Every write stamps it
//! with a fresh generation, and readers compare the stamp before and after
//! reading the files, retrying if a writer swapped the directory meanwhile.

use crate::backend::{apply_options, delete_options};
use crate::key::identity;
use crate::known_hosts::KnownHostLine;
use crate::validation::{validate_hostname, validate_identity, validate_identity_part};
use crate::{
    CertPool, Certificate, Key, KeyOption, KeyStoreError, LocalKeyStore, PublicKey, Result,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BACKEND_NAME: &str = "fs";

const KEYS_DIR: &str = "keys";
const CAS_DIR: &str = "cas";
const KNOWN_HOSTS_FILE: &str = "known_hosts";

const PRIV_KEY_FILE: &str = "key";
const PUB_KEY_FILE: &str = "key.pub";
const SSH_CERT_FILE: &str = "cert.pub";
const TLS_CERT_FILE: &str = "tls.pem";
const GENERATION_FILE: &str = "generation";

/// Reads of one record give up after this many concurrent replacements.
const MAX_READ_ATTEMPTS: usize = 16;

const PRIVATE_FILE_MODE: u32 = 0o600;
const PUBLIC_FILE_MODE: u32 = 0o644;

/// Disk-backed key store.
///
/// The default backend and the fallback when no OS vault is usable. Also
/// embedded by [`KeychainKeyStore`](crate::KeychainKeyStore) for CA bundles
/// and known hosts.
///
/// # Example
///
/// ```no_run
/// use clientkeys::{FsKeyStore, Key, LocalKeyStore};
///
/// #[tokio::main]
/// async fn main() -> clientkeys::Result<()> {
///     let store = FsKeyStore::new("/home/alice/.tsh").await?;
///
///     let key = Key::new("proxy.example.com", "alice", b"private".to_vec())
///         .with_tls_cert(b"-----BEGIN CERTIFICATE-----...".to_vec());
///     store.add_key(&key).await?;
///
///     store.delete_key("proxy.example.com", "alice", &[]).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FsKeyStore {
    root: PathBuf,
}

impl FsKeyStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// The root directory is restricted to its owner (0700 on Unix).
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_private_dir(&root)
            .await
            .map_err(|e| KeyStoreError::store_op(BACKEND_NAME, "open", root.display().to_string(), e))?;

        debug!(root = %root.display(), "opened filesystem key store");
        Ok(Self { root })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn keys_dir(&self) -> PathBuf {
        self.root.join(KEYS_DIR)
    }

    fn proxy_dir(&self, proxy_host: &str) -> PathBuf {
        self.keys_dir().join(proxy_host)
    }

    fn identity_dir(&self, proxy_host: &str, username: &str) -> PathBuf {
        self.proxy_dir(proxy_host).join(username)
    }

    fn known_hosts_path(&self) -> PathBuf {
        self.root.join(KNOWN_HOSTS_FILE)
    }

    /// Writes the record into a hidden staging directory and swaps it in.
    async fn write_key(&self, key: &Key) -> Result<()> {
        let proxy_dir = self.proxy_dir(&key.proxy_host);
        ensure_private_dir(&self.keys_dir()).await?;
        ensure_private_dir(&proxy_dir).await?;

        let staging = proxy_dir.join(format!(".{}.{}.tmp", key.username, Uuid::new_v4()));
        fs::create_dir(&staging).await?;

        if let Err(e) = write_key_files(&staging, key).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        let target = self.identity_dir(&key.proxy_host, &key.username);
        let retired = proxy_dir.join(format!(".{}.{}.old", key.username, Uuid::new_v4()));

        let replaced = match fs::rename(&target, &retired).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e.into());
            }
        };

        if let Err(e) = fs::rename(&staging, &target).await {
            if replaced {
                let _ = fs::rename(&retired, &target).await;
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }

        if replaced {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "failed to remove replaced key directory");
            }
        }

        Ok(())
    }

    /// Reads a record, retrying while a concurrent write replaces it.
    async fn read_key(&self, proxy_host: &str, username: &str) -> Result<Key> {
        let dir = self.identity_dir(proxy_host, username);
        let generation = dir.join(GENERATION_FILE);

        for _ in 0..MAX_READ_ATTEMPTS {
            let before = read_optional(&generation).await?;

            let key = match read_key_files(&dir, proxy_host, username).await {
                Ok(key) => key,
                // directory moved aside after the stamp was read
                Err(KeyStoreError::NotFound(_)) if !before.is_empty() => continue,
                Err(e) => return Err(e),
            };

            if read_optional(&generation).await? == before {
                return Ok(key);
            }
            debug!(identity = %identity(proxy_host, username), "record replaced during read, retrying");
        }

        Err(KeyStoreError::Other(anyhow::anyhow!(
            "record for {} kept changing while being read",
            identity(proxy_host, username)
        )))
    }

    /// Every `(proxy_host, username)` with a stored record.
    async fn list_identities(&self) -> Result<Vec<(String, String)>> {
        let mut identities = Vec::new();

        let mut proxies = match fs::read_dir(self.keys_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(identities),
            Err(e) => return Err(e.into()),
        };

        while let Some(proxy) = proxies.next_entry().await? {
            if !proxy.file_type().await?.is_dir() {
                continue;
            }
            let proxy_host = proxy.file_name().to_string_lossy().into_owned();

            let mut users = fs::read_dir(proxy.path()).await?;
            while let Some(user) = users.next_entry().await? {
                let username = user.file_name().to_string_lossy().into_owned();
                if username.starts_with('.') || !user.file_type().await?.is_dir() {
                    continue;
                }
                identities.push((proxy_host.clone(), username));
            }
        }

        Ok(identities)
    }

    async fn read_known_hosts(&self) -> Result<String> {
        match fs::read_to_string(self.known_hosts_path()).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl LocalKeyStore for FsKeyStore {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn add_key(&self, key: &Key) -> Result<()> {
        key.validate()?;

        self.write_key(key)
            .await
            .map_err(|e| KeyStoreError::store_op(BACKEND_NAME, "add", key.identity(), e))?;

        debug!(identity = %key.identity(), "stored key on disk");
        Ok(())
    }

    async fn get_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<Key> {
        validate_identity(proxy_host, username)?;

        let mut key = self.read_key(proxy_host, username).await.map_err(|e| match e {
            KeyStoreError::NotFound(_) => e,
            e => KeyStoreError::store_op(BACKEND_NAME, "get", identity(proxy_host, username), e),
        })?;

        apply_options(&self.root, &mut key, opts).await?;
        Ok(key)
    }

    async fn delete_key(
        &self,
        proxy_host: &str,
        username: &str,
        opts: &[&dyn KeyOption],
    ) -> Result<()> {
        validate_identity(proxy_host, username)?;
        let id = identity(proxy_host, username);

        match fs::remove_dir_all(self.identity_dir(proxy_host, username)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(KeyStoreError::NotFound(id)),
            Err(e) => return Err(KeyStoreError::store_op(BACKEND_NAME, "delete", id, e.into())),
        }

        // only succeeds once the proxy has no records left
        let _ = fs::remove_dir(self.proxy_dir(proxy_host)).await;

        delete_options(&self.root, proxy_host, username, opts).await?;

        debug!(identity = %id, "deleted key from disk");
        Ok(())
    }

    async fn delete_keys(&self) -> Result<()> {
        let identities = self.list_identities().await.map_err(|e| {
            KeyStoreError::store_op(BACKEND_NAME, "list", self.keys_dir().display().to_string(), e)
        })?;

        let mut removed = 0;
        for (proxy_host, username) in &identities {
            match fs::remove_dir_all(self.identity_dir(proxy_host, username)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(KeyStoreError::PartialPurgeFailure {
                        identity: identity(proxy_host, username),
                        removed,
                        source: Box::new(e.into()),
                    })
                }
            }
        }

        // leftover staging directories and empty proxy directories
        match fs::remove_dir_all(self.keys_dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(KeyStoreError::store_op(
                    BACKEND_NAME,
                    "purge",
                    self.keys_dir().display().to_string(),
                    e.into(),
                ))
            }
        }

        info!(removed, "purged all keys from disk");
        Ok(())
    }

    async fn add_known_host_keys(&self, hostname: &str, keys: &[PublicKey]) -> Result<()> {
        validate_hostname(hostname)?;

        let content = self.read_known_hosts().await.map_err(|e| {
            KeyStoreError::store_op(BACKEND_NAME, "read known hosts", hostname, e)
        })?;

        let mut trusted: HashSet<PublicKey> = parse_known_hosts(&content, hostname)
            .into_iter()
            .collect();

        let mut updated = content;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }

        let mut added = 0;
        for key in keys {
            if trusted.insert(key.clone()) {
                let line = KnownHostLine::new(hostname, key.clone())?;
                updated.push_str(&line.to_string());
                updated.push('\n');
                added += 1;
            }
        }

        if added == 0 {
            return Ok(());
        }

        write_atomic(&self.known_hosts_path(), updated.as_bytes(), PUBLIC_FILE_MODE)
            .await
            .map_err(|e| KeyStoreError::store_op(BACKEND_NAME, "write known hosts", hostname, e))?;

        debug!(hostname, added, "added known host keys");
        Ok(())
    }

    async fn get_known_host_keys(&self, hostname: &str) -> Result<Vec<PublicKey>> {
        validate_hostname(hostname)?;

        let content = self.read_known_hosts().await.map_err(|e| {
            KeyStoreError::store_op(BACKEND_NAME, "read known hosts", hostname, e)
        })?;

        Ok(parse_known_hosts(&content, hostname))
    }

    async fn save_certs(&self, proxy_host: &str, certs: &[Certificate]) -> Result<()> {
        validate_identity_part("proxy host", proxy_host)?;

        if certs.is_empty() {
            return Err(KeyStoreError::InvalidCertificate(format!(
                "no certificates to save for {}",
                proxy_host
            )));
        }

        let pool: CertPool = certs.iter().cloned().collect();
        let path = cert_bundle_path(&self.root, proxy_host);

        async {
            ensure_private_dir(&self.root.join(CAS_DIR)).await?;
            write_atomic(&path, &pool.to_pem(), PUBLIC_FILE_MODE).await
        }
        .await
        .map_err(|e| KeyStoreError::store_op(BACKEND_NAME, "save certs", proxy_host, e))?;

        debug!(proxy_host, count = pool.len(), "saved trusted CA bundle");
        Ok(())
    }

    async fn get_certs(&self, proxy_host: &str) -> Result<CertPool> {
        validate_identity_part("proxy host", proxy_host)?;
        load_cert_pool(&self.root, proxy_host).await
    }

    async fn get_certs_pem(&self, proxy_host: &str) -> Result<Vec<u8>> {
        validate_identity_part("proxy host", proxy_host)?;
        read_cert_bundle(&self.root, proxy_host).await
    }
}

/// Path of a proxy's trusted CA bundle.
pub(crate) fn cert_bundle_path(root: &Path, proxy_host: &str) -> PathBuf {
    root.join(CAS_DIR).join(format!("{}.pem", proxy_host))
}

/// Raw PEM of a proxy's trusted CA bundle; `NotFound` if none is saved.
pub(crate) async fn read_cert_bundle(root: &Path, proxy_host: &str) -> Result<Vec<u8>> {
    match fs::read(cert_bundle_path(root, proxy_host)).await {
        Ok(pem) => Ok(pem),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(KeyStoreError::NotFound(format!(
            "trusted certificates for {}",
            proxy_host
        ))),
        Err(e) => Err(KeyStoreError::store_op(
            BACKEND_NAME,
            "read certs",
            proxy_host,
            e.into(),
        )),
    }
}

/// Parsed CA bundle; a bundle that no longer parses is a `DecodeError`.
pub(crate) async fn load_cert_pool(root: &Path, proxy_host: &str) -> Result<CertPool> {
    let pem = read_cert_bundle(root, proxy_host).await?;
    CertPool::from_pem(&pem).map_err(|e| KeyStoreError::DecodeError {
        identity: format!("trusted certificates for {}", proxy_host),
        reason: e.to_string(),
    })
}

/// Removes a proxy's CA bundle. A missing bundle is not an error.
pub(crate) async fn remove_cert_bundle(root: &Path, proxy_host: &str) -> Result<()> {
    match fs::remove_file(cert_bundle_path(root, proxy_host)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KeyStoreError::store_op(
            BACKEND_NAME,
            "delete certs",
            proxy_host,
            e.into(),
        )),
    }
}

/// Trusted keys for `hostname`, deduplicated, in file order.
///
/// Lines that fail to parse are skipped so one bad entry does not hide
/// the rest of the file.
fn parse_known_hosts(content: &str, hostname: &str) -> Vec<PublicKey> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        match KnownHostLine::parse(line) {
            Ok(Some(entry)) if entry.hostname == hostname => {
                if seen.insert(entry.key.clone()) {
                    keys.push(entry.key);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed known_hosts line"),
        }
    }

    keys
}

async fn read_key_files(dir: &Path, proxy_host: &str, username: &str) -> Result<Key> {
    let priv_key = match fs::read(dir.join(PRIV_KEY_FILE)).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(KeyStoreError::NotFound(identity(proxy_host, username)))
        }
        Err(e) => return Err(e.into()),
    };

    let mut key = Key::new(proxy_host, username, priv_key);
    key.pub_key = read_optional(&dir.join(PUB_KEY_FILE)).await?;
    key.cert = read_optional(&dir.join(SSH_CERT_FILE)).await?;
    key.tls_cert = read_optional(&dir.join(TLS_CERT_FILE)).await?;
    Ok(key)
}

async fn write_key_files(dir: &Path, key: &Key) -> Result<()> {
    write_file(&dir.join(PRIV_KEY_FILE), &key.priv_key, PRIVATE_FILE_MODE).await?;

    let optional = [
        (PUB_KEY_FILE, &key.pub_key),
        (SSH_CERT_FILE, &key.cert),
        (TLS_CERT_FILE, &key.tls_cert),
    ];
    for (name, data) in optional {
        if !data.is_empty() {
            write_file(&dir.join(name), data, PRIVATE_FILE_MODE).await?;
        }
    }

    let stamp = Uuid::new_v4().to_string();
    write_file(&dir.join(GENERATION_FILE), stamp.as_bytes(), PUBLIC_FILE_MODE).await?;

    Ok(())
}

async fn read_optional(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Creates `path` (and parents) and restricts it to its owner on Unix.
async fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).await?.permissions();
        perms.set_mode(0o700);
        fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

/// Creates a new file with `mode` (Unix) and writes `data` to it.
async fn write_file(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let mut file = fs::File::create(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().await?.permissions();
        perms.set_mode(mode);
        fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Replaces `path` with `data` via a temporary file and rename.
async fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = write_file(&tmp, data, mode).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WithTrustedCerts;
    use tempfile::tempdir;

    const HOST_KEY_1: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB";
    const HOST_KEY_2: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC";

    fn key(proxy: &str, user: &str, material: &[u8]) -> Key {
        Key::new(proxy, user, material.to_vec())
            .with_pub_key(HOST_KEY_1.as_bytes().to_vec())
            .with_cert(b"ssh-ed25519-cert-v01@openssh.com AAAA".to_vec())
            .with_tls_cert(b"-----BEGIN CERTIFICATE-----\nMEA=\n-----END CERTIFICATE-----\n".to_vec())
    }

    fn ca(seed: u8) -> Certificate {
        let mut der = vec![0x30, 0x10];
        der.extend(std::iter::repeat(seed).take(0x10));
        Certificate::from_der(der).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_get_key() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let stored = key("proxy", "alice", b"priv-1");
        store.add_key(&stored).await.unwrap();

        let loaded = store.get_key("proxy", "alice", &[]).await.unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_add_key_replaces_record() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        store.add_key(&key("proxy", "alice", b"priv-1")).await.unwrap();

        // second record has no TLS cert; nothing from the first may survive
        let second = Key::new("proxy", "alice", b"priv-2".to_vec()).with_cert(b"cert-2".to_vec());
        store.add_key(&second).await.unwrap();

        let loaded = store.get_key("proxy", "alice", &[]).await.unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.tls_cert.is_empty());

        // no staging or retired directories left behind
        let mut entries = fs::read_dir(dir.path().join("keys/proxy")).await.unwrap();
        let mut names = Vec::new();
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["alice".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reader_never_sees_mixed_record() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let a = Key::new("proxy", "alice", b"priv-A".to_vec())
            .with_cert(b"cert-A".to_vec())
            .with_tls_cert(b"tls-A".to_vec());
        let b = Key::new("proxy", "alice", b"priv-B".to_vec())
            .with_cert(b"cert-B".to_vec())
            .with_tls_cert(b"tls-B".to_vec());
        store.add_key(&a).await.unwrap();

        let writer = {
            let store = store.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move {
                for i in 0..300 {
                    let next = if i % 2 == 0 { &b } else { &a };
                    store.add_key(next).await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            match store.get_key("proxy", "alice", &[]).await {
                Ok(loaded) => {
                    assert!(
                        loaded == a || loaded == b,
                        "mixed record: priv={:?} cert={:?} tls={:?}",
                        String::from_utf8_lossy(&loaded.priv_key),
                        String::from_utf8_lossy(&loaded.cert),
                        String::from_utf8_lossy(&loaded.tls_cert),
                    );
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => panic!("read failed: {}", e),
            }
        }
        writer.await.unwrap();

        assert_eq!(store.get_key("proxy", "alice", &[]).await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let result = store.get_key("proxy", "nobody", &[]).await;
        assert!(matches!(result, Err(KeyStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_key() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let missing = store.delete_key("proxy", "alice", &[]).await;
        assert!(matches!(missing, Err(KeyStoreError::NotFound(_))));

        store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();
        store.delete_key("proxy", "alice", &[]).await.unwrap();

        let result = store.get_key("proxy", "alice", &[]).await;
        assert!(matches!(result, Err(KeyStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_keys_keeps_cas_and_known_hosts() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        store.add_key(&key("proxyA", "alice", b"a")).await.unwrap();
        store.add_key(&key("proxyB", "bob", b"b")).await.unwrap();
        store.save_certs("proxyA", &[ca(1)]).await.unwrap();
        let host_key = PublicKey::parse(HOST_KEY_1).unwrap();
        store.add_known_host_keys("node1", &[host_key.clone()]).await.unwrap();

        store.delete_keys().await.unwrap();

        assert!(store.get_key("proxyA", "alice", &[]).await.unwrap_err().is_not_found());
        assert!(store.get_key("proxyB", "bob", &[]).await.unwrap_err().is_not_found());
        assert_eq!(store.get_certs("proxyA").await.unwrap().len(), 1);
        assert_eq!(store.get_known_host_keys("node1").await.unwrap(), vec![host_key]);
    }

    #[tokio::test]
    async fn test_delete_keys_on_empty_store() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();
        store.delete_keys().await.unwrap();
    }

    #[tokio::test]
    async fn test_known_hosts_union() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let k1 = PublicKey::parse(HOST_KEY_1).unwrap();
        let k2 = PublicKey::parse(HOST_KEY_2).unwrap();

        store.add_known_host_keys("host1", &[k1.clone()]).await.unwrap();
        store.add_known_host_keys("host1", &[k2.clone(), k1.clone()]).await.unwrap();
        store.add_known_host_keys("host2", &[k2.clone()]).await.unwrap();

        let keys = store.get_known_host_keys("host1").await.unwrap();
        assert_eq!(keys, vec![k1, k2.clone()]);
        assert_eq!(store.get_known_host_keys("host2").await.unwrap(), vec![k2]);
        assert!(store.get_known_host_keys("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_known_hosts_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        fs::write(
            dir.path().join(KNOWN_HOSTS_FILE),
            format!("garbage\nhost1 ssh-rsa AAAAC3NzaC1lZDI1NTE5\nhost1 {}\n", HOST_KEY_2),
        )
        .await
        .unwrap();

        let keys = store.get_known_host_keys("host1").await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_certs_pem_matches_pool() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        assert!(store.get_certs("proxy").await.unwrap_err().is_not_found());
        assert!(store.get_certs_pem("proxy").await.unwrap_err().is_not_found());

        store.save_certs("proxy", &[ca(1), ca(2), ca(1)]).await.unwrap();

        let pool = store.get_certs("proxy").await.unwrap();
        let pem = store.get_certs_pem("proxy").await.unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(CertPool::from_pem(&pem).unwrap(), pool);
    }

    #[tokio::test]
    async fn test_save_empty_certs_rejected() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let result = store.save_certs("proxy", &[]).await;
        assert!(matches!(result, Err(KeyStoreError::InvalidCertificate(_))));
    }

    #[tokio::test]
    async fn test_corrupt_bundle_is_decode_error() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        fs::create_dir_all(dir.path().join(CAS_DIR)).await.unwrap();
        fs::write(cert_bundle_path(dir.path(), "proxy"), b"not pem").await.unwrap();

        assert!(store.get_certs("proxy").await.unwrap_err().is_decode_error());
    }

    #[tokio::test]
    async fn test_with_trusted_certs_option() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();
        store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();

        // option fails without a bundle, and so does the whole call
        let result = store.get_key("proxy", "alice", &[&WithTrustedCerts]).await;
        assert!(result.unwrap_err().is_not_found());

        store.save_certs("proxy", &[ca(4)]).await.unwrap();
        let loaded = store.get_key("proxy", "alice", &[&WithTrustedCerts]).await.unwrap();
        assert_eq!(loaded.trusted_certs, vec![ca(4)]);

        store.delete_key("proxy", "alice", &[&WithTrustedCerts]).await.unwrap();
        assert!(store.get_certs("proxy").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_identity() {
        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();

        let result = store.get_key("../outside", "alice", &[]).await;
        assert!(matches!(result, Err(KeyStoreError::InvalidIdentity(_))));

        let bad = Key::new("proxy", "", b"priv".to_vec()).with_cert(b"c".to_vec());
        assert!(matches!(
            store.add_key(&bad).await,
            Err(KeyStoreError::InvalidIdentity(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FsKeyStore::new(dir.path()).await.unwrap();
        store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();

        let meta = fs::metadata(dir.path().join("keys/proxy/alice/key")).await.unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
