use std::sync::Arc;

use cloud_gateway::{GatewayError, StorageAdapter};
use cloud_gateway_providers::ObjectStoreStorage;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;

fn in_memory() -> (ObjectStoreStorage, Arc<InMemory>) {
    let store = Arc::new(InMemory::new());
    (ObjectStoreStorage::new("mem", store.clone()), store)
}

#[tokio::test]
async fn put_get_round_trip() {
    let (storage, _) = in_memory();
    let bytes = vec![0u8, 159, 146, 150, 255];

    let stored = storage.put("reports/q1.xlsx", bytes.clone()).await.unwrap();
    assert_eq!(stored.key, "reports/q1.xlsx");
    assert_eq!(stored.size_bytes, 5);

    assert_eq!(storage.get("reports/q1.xlsx").await.unwrap(), bytes);
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let (storage, _) = in_memory();
    let result = storage.get("nope.xlsx").await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn delete_missing_succeeds() {
    let (storage, _) = in_memory();
    storage.put("a.txt", b"a".to_vec()).await.unwrap();
    storage.delete("a.txt").await.unwrap();
    storage.delete("a.txt").await.unwrap();
    assert!(storage.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_filters_on_partial_segment() {
    let (storage, _) = in_memory();
    for key in ["reports/q1.xlsx", "reports/q2.xlsx", "reports-old/q1.xlsx", "other.txt"] {
        storage.put(key, b"x".to_vec()).await.unwrap();
    }

    let mut keys: Vec<String> = storage
        .list(Some("reports/q"))
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["reports/q1.xlsx", "reports/q2.xlsx"]);

    let all = storage.list(Some("rep")).await.unwrap();
    assert_eq!(all.len(), 3);

    assert!(storage.list(Some("missing/")).await.unwrap().is_empty());
}

#[tokio::test]
async fn root_prefix_is_hidden_from_callers() {
    let store = Arc::new(InMemory::new());
    let dev = ObjectStoreStorage::new("dev", store.clone()).with_root("dev/reports");
    let prod = ObjectStoreStorage::new("prod", store.clone()).with_root("prod/reports");

    dev.put("q1.xlsx", b"dev".to_vec()).await.unwrap();
    prod.put("q1.xlsx", b"prod".to_vec()).await.unwrap();

    let listed = dev.list(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "q1.xlsx");
    assert_eq!(dev.get("q1.xlsx").await.unwrap(), b"dev");
    assert_eq!(prod.get("/q1.xlsx").await.unwrap(), b"prod");

    // The underlying store sees the full path.
    let raw = store.get(&Path::from("dev/reports/q1.xlsx")).await.unwrap();
    assert_eq!(raw.bytes().await.unwrap().to_vec(), b"dev");
}

#[tokio::test]
async fn zero_byte_directory_markers_are_skipped() {
    let (storage, store) = in_memory();
    store
        .put(&Path::from("reports"), Vec::<u8>::new().into())
        .await
        .unwrap();
    storage.put("reports/q1.xlsx", b"x".to_vec()).await.unwrap();
    storage.put("empty.txt", Vec::new()).await.unwrap();

    let mut keys: Vec<String> = storage
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    keys.sort();
    // A genuinely empty file is still listed.
    assert_eq!(keys, vec!["empty.txt", "reports/q1.xlsx"]);
}

#[tokio::test]
async fn probe_succeeds_on_reachable_store() {
    let (storage, _) = in_memory();
    storage.probe().await.unwrap();
}

#[tokio::test]
async fn local_filesystem_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap());
    let storage = ObjectStoreStorage::new("local", store).with_root("uploads");

    let stored = storage.put("sheets/a.xlsx", b"hello".to_vec()).await.unwrap();
    assert_eq!(stored.key, "sheets/a.xlsx");
    assert_eq!(stored.size_bytes, 5);
    assert!(dir.path().join("uploads/sheets/a.xlsx").exists());

    let listed = storage.list(Some("sheets/")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(storage.get("sheets/a.xlsx").await.unwrap(), b"hello");

    storage.delete("sheets/a.xlsx").await.unwrap();
    storage.delete("sheets/a.xlsx").await.unwrap();
    assert!(matches!(
        storage.get("sheets/a.xlsx").await,
        Err(GatewayError::NotFound(_))
    ));
}
