//! In-memory store implementation for testing.
//!
//! Provides [`MemoryStore`] for unit testing without filesystem or network access.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::key::normalize_key;
use crate::store::{ObjectStore, StoreError, StoreErrorKind, StoredObject};

/// Backend identifier for error messages.
const BACKEND: &str = "Memory";

/// A mutating operation recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// An object was written.
    Put {
        /// Object key.
        key: String,
        /// Written content (lossy UTF-8 for readability in assertions).
        body: String,
    },
    /// An object was deleted.
    Delete {
        /// Object key.
        key: String,
    },
    /// Empty directories were pruned.
    Prune,
}

/// In-memory object store for testing.
///
/// Stores objects in a sorted map and journals every mutating operation so tests
/// can assert on ordering and write counts. Keys behave like a flat key space,
/// except that [`head`](ObjectStore::head) rejects directory-shaped keys (a key
/// that is a prefix of other keys).
///
/// # Example
///
/// ```ignore
/// use kiln_store::{MemoryStore, ObjectStore};
///
/// let store = MemoryStore::new().with_object("index.json", "[]", "application/json");
/// let object = store.get("index.json").await;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    journal: RwLock<Vec<StoreOp>>,
    torn_down: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without journaling it.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_object(
        self,
        key: &str,
        body: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        self.objects.write().unwrap().insert(
            normalize_key(key).to_owned(),
            StoredObject::new(body, content_type),
        );
        self
    }

    /// Current object at `key`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().unwrap().get(normalize_key(key)).cloned()
    }

    /// Current object at `key` as text, if any.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.object(key).map(|o| o.text())
    }

    /// All stored keys in sorted order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().unwrap().keys().cloned().collect()
    }

    /// Every journaled operation in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn journal(&self) -> Vec<StoreOp> {
        self.journal.read().unwrap().clone()
    }

    /// Keys of every journaled put, in order (duplicates kept).
    #[must_use]
    pub fn puts(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Keys of every journaled delete, in order.
    #[must_use]
    pub fn deletes(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Delete { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Forget journaled operations (objects are kept).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear_journal(&self) {
        self.journal.write().unwrap().clear();
    }

    /// True once [`teardown`](ObjectStore::teardown) was called.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn record(&self, op: StoreOp) {
        self.journal.write().unwrap().push(op);
    }

    fn is_directory(objects: &BTreeMap<String, StoredObject>, key: &str) -> bool {
        let prefix = format!("{key}/");
        objects.keys().any(|k| k.starts_with(&prefix))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> StoredObject {
        if self.is_torn_down() {
            return StoredObject::empty();
        }
        self.object(key).unwrap_or_default()
    }

    async fn head(&self, key: &str) -> Result<(), StoreError> {
        if self.is_torn_down() {
            return Err(StoreError::new(StoreErrorKind::Unavailable)
                .with_key(key)
                .with_backend(BACKEND));
        }
        let key = normalize_key(key);
        let objects = self.objects.read().unwrap();
        if objects.contains_key(key) && !Self::is_directory(&objects, key) {
            Ok(())
        } else {
            Err(StoreError::not_a_file(key).with_backend(BACKEND))
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        if self.is_torn_down() {
            return Ok(());
        }
        let key = normalize_key(key).to_owned();
        self.record(StoreOp::Put {
            key: key.clone(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        self.objects
            .write()
            .unwrap()
            .insert(key, StoredObject::new(body, content_type));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.is_torn_down() {
            return Ok(());
        }
        let key = normalize_key(key).to_owned();
        self.objects.write().unwrap().remove(&key);
        self.record(StoreOp::Delete { key });
        Ok(())
    }

    async fn prune_empty_directories(&self, _exclude: &[String]) -> Result<(), StoreError> {
        if !self.is_torn_down() {
            self.record(StoreOp::Prune);
        }
        Ok(())
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::ObjectStoreExt;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_memory_store_is_send_sync() {
        assert_send_sync::<MemoryStore>();
    }

    #[tokio::test]
    async fn test_get_missing_is_empty() {
        let store = MemoryStore::new();

        assert!(store.get("missing.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();

        store
            .put("a/b/c.txt", b"hi".to_vec(), "text/plain")
            .await
            .unwrap();

        let object = store.get("a/b/c.txt").await;
        assert_eq!(object.text(), "hi");
        assert_eq!(object.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_put_twice_is_idempotent() {
        let store = MemoryStore::new();

        store.put_text("k", "v", "text/plain").await.unwrap();
        store.put_text("k", "v", "text/plain").await.unwrap();

        assert_eq!(store.get_text("k").await, "v");
        assert_eq!(store.keys(), vec!["k".to_owned()]);
    }

    #[tokio::test]
    async fn test_delete_twice_never_fails() {
        let store = MemoryStore::new().with_object("k", "v", "text/plain");

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();

        assert!(store.object("k").is_none());
    }

    #[tokio::test]
    async fn test_head_file_and_directory() {
        let store = MemoryStore::new().with_object("a/b.txt", "x", "text/plain");

        assert!(store.head("a/b.txt").await.is_ok());
        let err = store.head("a").await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotAFile);
        let err = store.head("missing").await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotAFile);
    }

    #[tokio::test]
    async fn test_journal_records_order() {
        let store = MemoryStore::new();

        store.delete("old.html").await.unwrap();
        store.prune_empty_directories(&[]).await.unwrap();
        store.put_text("new.html", "<p>", "text/html").await.unwrap();

        assert_eq!(
            store.journal(),
            vec![
                StoreOp::Delete {
                    key: "old.html".to_owned()
                },
                StoreOp::Prune,
                StoreOp::Put {
                    key: "new.html".to_owned(),
                    body: "<p>".to_owned()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_fails_soft() {
        let store = MemoryStore::new().with_object("k", "v", "text/plain");

        store.teardown();

        assert!(store.is_torn_down());
        assert!(store.get("k").await.is_empty());
        assert!(store.put_text("k", "w", "text/plain").await.is_ok());
        assert!(store.delete("k").await.is_ok());
        assert_eq!(
            store.head("k").await.unwrap_err().kind,
            StoreErrorKind::Unavailable
        );
        assert!(store.journal().is_empty());
    }
}
