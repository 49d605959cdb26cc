//! In-memory store implementations for tests and demos.
//!
//! Both stores are `Clone` (shared interior state behind `Arc`), so a test
//! can keep a handle and inspect what the orchestrator wrote.
//! [`MemoryObjectStore`] additionally supports failure injection per object
//! name, which is how the partial-upload-failure paths get exercised without
//! a flaky network.

use super::{DocumentStore, ObjectStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An object stored in memory.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// In-memory [`ObjectStore`] with injectable per-name failures.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    fail_names: Arc<Mutex<HashSet<String>>>,
    seq: Arc<AtomicU64>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `put` whose name contains `fragment` fail.
    pub fn fail_puts_matching(&self, fragment: impl Into<String>) {
        self.fail_names.lock().unwrap().insert(fragment.into());
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Whether an object is stored under `url`.
    pub fn contains(&self, url: &str) -> bool {
        self.objects.lock().unwrap().contains_key(url)
    }

    /// Remove an object directly, simulating out-of-band deletion.
    pub fn evict(&self, url: &str) -> bool {
        self.objects.lock().unwrap().remove(url).is_some()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<String, StoreError> {
        let injected = self
            .fail_names
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| name.contains(fragment.as_str()));
        if injected {
            return Err(StoreError::Backend(format!(
                "injected failure for '{name}'"
            )));
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let url = format!("memory://receipts/{seq:06}-{name}");
        self.objects.lock().unwrap().insert(
            url.clone(),
            StoredObject {
                bytes: bytes.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        match self.objects.lock().unwrap().remove(url) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(url.to_string())),
        }
    }
}

/// In-memory [`DocumentStore`]: collections of JSON records keyed by id.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, HashMap<String, serde_json::Value>>>>,
    seq: Arc<AtomicU64>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in `collection`.
    pub fn record_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn create(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, StoreError> {
        let id = format!("doc-{:06}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), record);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap();
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;

        // Top-level field merge, matching document-store update semantics.
        if let (Some(target), Some(fields)) = (record.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
            Ok(())
        } else {
            Err(StoreError::Backend(
                "update requires JSON objects on both sides".into(),
            ))
        }
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(records) = self.collections.lock().unwrap().get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn object_store_round_trips() {
        let store = MemoryObjectStore::new();
        let url = store.put(b"abc", "receipt-00.jpg", "image/jpeg").await.unwrap();
        assert!(url.starts_with("memory://receipts/"));
        assert!(store.contains(&url));

        store.delete(&url).await.unwrap();
        assert!(!store.contains(&url));
    }

    #[tokio::test]
    async fn deleting_a_missing_object_reports_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.delete("memory://receipts/nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_failures_only_hit_matching_names() {
        let store = MemoryObjectStore::new();
        store.fail_puts_matching("receipt-01");

        assert!(store.put(b"a", "receipt-00.jpg", "image/jpeg").await.is_ok());
        assert!(store.put(b"b", "receipt-01.jpg", "image/jpeg").await.is_err());
        assert!(store.put(b"c", "receipt-02.jpg", "image/jpeg").await.is_ok());
    }

    #[tokio::test]
    async fn document_store_merges_updates() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("expenses", json!({"amount": 100, "memo": "a"}))
            .await
            .unwrap();

        store
            .update("expenses", &id, json!({"amount": 250}))
            .await
            .unwrap();

        let record = store.get("expenses", &id).await.unwrap().unwrap();
        assert_eq!(record["amount"], 250);
        assert_eq!(record["memo"], "a");
    }

    #[tokio::test]
    async fn document_delete_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let id = store.create("expenses", json!({})).await.unwrap();
        store.delete("expenses", &id).await.unwrap();
        store.delete("expenses", &id).await.unwrap();
        assert_eq!(store.record_count("expenses"), 0);
    }
}
