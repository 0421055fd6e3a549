//! Behavior every backend shares, checked through the `KeyStore` facade.
//!
//! The keychain backend runs against `MemoryVault`. Tests against the real
//! OS keychain live next to `NativeVault` and are ignored by default.

#![cfg(feature = "mock")]

use clientkeys::{
    BackendType, Certificate, Config, FsKeyStore, Key, KeyStore, KeyStoreError, KeychainKeyStore,
    LocalKeyStore, MemoryVault, PublicKey, WithTrustedCerts,
};
use tempfile::{tempdir, TempDir};

const HOST_KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB";
const HOST_KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC";

async fn fs_store() -> (KeyStore, TempDir) {
    let dir = tempdir().expect("tempdir");
    let config = Config::new(BackendType::Filesystem).with_key_dir(dir.path());
    let store = KeyStore::new(config).await.expect("open fs store");
    (store, dir)
}

async fn keychain_store() -> (KeyStore, TempDir) {
    let dir = tempdir().expect("tempdir");
    let fs = FsKeyStore::new(dir.path()).await.expect("open fs store");
    let keychain = KeychainKeyStore::new(MemoryVault::new(), fs, "teleport")
        .await
        .expect("open keychain store");
    (KeyStore::from_backend(keychain), dir)
}

async fn all_stores() -> Vec<(KeyStore, TempDir)> {
    vec![fs_store().await, keychain_store().await]
}

fn key(proxy: &str, user: &str, material: &[u8]) -> Key {
    Key::new(proxy, user, material.to_vec())
        .with_pub_key(format!("ssh-ed25519 {}", HOST_KEY_A).into_bytes())
        .with_cert(format!("ssh-ed25519-cert-v01@openssh.com {}", user).into_bytes())
        .with_tls_cert(b"-----BEGIN CERTIFICATE-----\nMEA=\n-----END CERTIFICATE-----\n".to_vec())
}

fn ca(seed: u8) -> Certificate {
    Certificate::from_der(vec![0x30, 0x04, seed, seed, seed, seed]).expect("valid DER")
}

fn host_key(blob: &str) -> PublicKey {
    PublicKey::parse(&format!("ssh-ed25519 {}", blob)).expect("valid public key")
}

#[tokio::test]
async fn test_add_then_get_returns_equal_record() {
    for (store, _dir) in all_stores().await {
        let stored = key("proxy.example.com", "alice", b"alice-private");
        store.add_key(&stored).await.unwrap();

        let loaded = store.get_key("proxy.example.com", "alice", &[]).await.unwrap();
        assert_eq!(loaded, stored, "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn test_second_add_replaces_first() {
    for (store, _dir) in all_stores().await {
        store.add_key(&key("proxy", "alice", b"first")).await.unwrap();
        store.add_key(&key("proxy", "alice", b"second")).await.unwrap();

        let loaded = store.get_key("proxy", "alice", &[]).await.unwrap();
        assert_eq!(loaded.priv_key, b"second".to_vec(), "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn test_never_written_identity_is_not_found() {
    for (store, _dir) in all_stores().await {
        let err = store.get_key("proxy", "nobody", &[]).await.unwrap_err();
        assert!(
            matches!(err, KeyStoreError::NotFound(_)),
            "backend {}: {:?}",
            store.backend_name(),
            err
        );
    }
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    for (store, _dir) in all_stores().await {
        store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();
        store.delete_key("proxy", "alice", &[]).await.unwrap();

        let err = store.get_key("proxy", "alice", &[]).await.unwrap_err();
        assert!(err.is_not_found(), "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn test_delete_of_missing_record() {
    let (fs, _fs_dir) = fs_store().await;
    assert!(matches!(
        fs.delete_key("proxy", "nobody", &[]).await,
        Err(KeyStoreError::NotFound(_))
    ));

    let (keychain, _keychain_dir) = keychain_store().await;
    keychain.delete_key("proxy", "nobody", &[]).await.unwrap();
}

#[tokio::test]
async fn test_delete_keys_keeps_cas_and_known_hosts() {
    for (store, _dir) in all_stores().await {
        let name = store.backend_name().to_string();

        store.add_key(&key("proxyA", "alice", b"a")).await.unwrap();
        store.add_key(&key("proxyB", "bob", b"b")).await.unwrap();
        store.save_certs("proxyA", &[ca(1)]).await.unwrap();
        store.add_known_host_keys("node1", &[host_key(HOST_KEY_A)]).await.unwrap();

        store.delete_keys().await.unwrap();

        assert!(store.get_key("proxyA", "alice", &[]).await.unwrap_err().is_not_found(), "{}", name);
        assert!(store.get_key("proxyB", "bob", &[]).await.unwrap_err().is_not_found(), "{}", name);

        let pool = store.get_certs("proxyA").await.unwrap();
        assert!(pool.contains(&ca(1)), "{}", name);
        assert_eq!(store.get_known_host_keys("node1").await.unwrap().len(), 1, "{}", name);
    }
}

#[tokio::test]
async fn test_known_host_keys_union() {
    for (store, _dir) in all_stores().await {
        let k1 = host_key(HOST_KEY_A);
        let k2 = host_key(HOST_KEY_B);

        store.add_known_host_keys("host1", &[k1.clone()]).await.unwrap();
        store.add_known_host_keys("host1", &[k2.clone()]).await.unwrap();
        store.add_known_host_keys("host1", &[k1.clone()]).await.unwrap();

        let keys = store.get_known_host_keys("host1").await.unwrap();
        assert_eq!(keys, vec![k1, k2], "backend {}", store.backend_name());
        assert!(store.get_known_host_keys("host2").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_certs_pem_matches_pool() {
    for (store, _dir) in all_stores().await {
        store.save_certs("proxy", &[ca(1), ca(2)]).await.unwrap();

        let pool = store.get_certs("proxy").await.unwrap();
        let pem = store.get_certs_pem("proxy").await.unwrap();
        let decoded = Certificate::parse_pem(&pem).unwrap();

        assert_eq!(decoded.len(), pool.len());
        assert!(decoded.iter().all(|c| pool.contains(c)), "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn test_missing_certs_are_not_found() {
    for (store, _dir) in all_stores().await {
        assert!(store.get_certs("proxy").await.unwrap_err().is_not_found());
        assert!(store.get_certs_pem("proxy").await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn test_with_trusted_certs_option() {
    for (store, _dir) in all_stores().await {
        store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();

        // no bundle yet: the option fails the whole read
        let err = store
            .get_key("proxy", "alice", &[&WithTrustedCerts])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        store.save_certs("proxy", &[ca(7)]).await.unwrap();
        let loaded = store
            .get_key("proxy", "alice", &[&WithTrustedCerts])
            .await
            .unwrap();
        assert_eq!(loaded.trusted_certs, vec![ca(7)], "backend {}", store.backend_name());

        store
            .delete_key("proxy", "alice", &[&WithTrustedCerts])
            .await
            .unwrap();
        assert!(store.get_certs("proxy").await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn test_invalid_input_rejected() {
    for (store, _dir) in all_stores().await {
        let no_cert = Key::new("proxy", "alice", b"priv".to_vec());
        assert!(matches!(
            store.add_key(&no_cert).await,
            Err(KeyStoreError::InvalidKey(_))
        ));

        let traversal = key("..", "alice", b"priv");
        assert!(matches!(
            store.add_key(&traversal).await,
            Err(KeyStoreError::InvalidIdentity(_))
        ));

        assert!(matches!(
            store.get_key("proxy", "", &[]).await,
            Err(KeyStoreError::InvalidIdentity(_))
        ));
    }
}

#[tokio::test]
async fn test_identities_are_isolated() {
    for (store, _dir) in all_stores().await {
        store.add_key(&key("proxyA", "alice", b"a")).await.unwrap();
        store.add_key(&key("proxyA", "bob", b"b")).await.unwrap();
        store.add_key(&key("proxyB", "alice", b"c")).await.unwrap();

        store.delete_key("proxyA", "alice", &[]).await.unwrap();

        assert_eq!(
            store.get_key("proxyA", "bob", &[]).await.unwrap().priv_key,
            b"b".to_vec()
        );
        assert_eq!(
            store.get_key("proxyB", "alice", &[]).await.unwrap().priv_key,
            b"c".to_vec()
        );
    }
}

#[tokio::test]
async fn test_keychain_store_keeps_keys_off_disk() {
    let (store, dir) = keychain_store().await;
    store.add_key(&key("proxy", "alice", b"priv")).await.unwrap();

    assert!(!dir.path().join("keys").exists());
}
