//! File-backed store tests.

use tether_client::{CredentialStore, FileStore};
use tether_core::{CredentialPair, KeyValueStore, StoreError, SystemEnv};

#[tokio::test]
async fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("session.json"));

    assert_eq!(store.get("accessToken").await.unwrap(), None);
    store.remove("accessToken").await.unwrap();
    assert!(!store.path().exists());
}

#[tokio::test]
async fn pair_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    let pair = CredentialPair::new("a.b.c", "d.e.f");

    CredentialStore::new(FileStore::new(&path), SystemEnv).write(&pair).await.unwrap();

    let reopened = CredentialStore::new(FileStore::new(&path), SystemEnv);
    assert_eq!(reopened.read().await, Some(pair));

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["accessToken"], "a.b.c");
    assert_eq!(json["refreshToken"], "d.e.f");
}

#[tokio::test]
async fn clear_removes_pair_and_keeps_other_keys() {
    let dir = tempfile::tempdir().unwrap();
    let backing = FileStore::new(dir.path().join("session.json"));
    backing.set("theme", "dark").await.unwrap();

    let store = CredentialStore::new(backing.clone(), SystemEnv);
    store.write(&CredentialPair::new("a", "r")).await.unwrap();
    store.clear().await.unwrap();

    assert_eq!(store.read().await, None);
    assert_eq!(backing.get("theme").await.unwrap().as_deref(), Some("dark"));
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"{not json").unwrap();
    let store = FileStore::new(&path);

    assert!(matches!(store.get("accessToken").await, Err(StoreError::Corrupt(_))));
    assert_eq!(CredentialStore::new(store, SystemEnv).read().await, None);
}

#[tokio::test]
async fn concurrent_writes_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("session.json"));

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.set(&format!("key-{i}"), "v").await })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    for i in 0..16 {
        assert_eq!(store.get(&format!("key-{i}")).await.unwrap().as_deref(), Some("v"));
    }
    assert!(!dir.path().join("session.json.tmp").exists());
}
