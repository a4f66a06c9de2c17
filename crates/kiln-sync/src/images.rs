//! Image object URLs and orphan cleanup.
//!
//! Images are loaded through the router and exposed under transient
//! `blob:kiln/<uuid>` handles. When the image list of the selected page shrinks,
//! or a page is deleted, the orphaned objects are revoked and deleted.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use kiln_site::{ArtifactKind, PageNode};
use kiln_store::{ObjectStore, StoredObject};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:kiln/";

/// Registry of transient object URLs keyed by object key.
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<String, (String, StoredObject)>>,
}

impl ObjectUrlRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` under `key`, replacing any previous URL.
    pub fn register(&self, key: &str, object: StoredObject) -> String {
        let url = format!("{URL_PREFIX}{}", Uuid::new_v4());
        self.lock().insert(key.to_owned(), (url.clone(), object));
        url
    }

    /// URL registered for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|(url, _)| url.clone())
    }

    /// Object behind a registered URL.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<StoredObject> {
        self.lock()
            .values()
            .find(|(u, _)| u == url)
            .map(|(_, object)| object.clone())
    }

    /// Revoke the URL of `key`. Returns whether one was registered.
    pub fn revoke(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn revoke_all(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, StoredObject)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks the images of the selected page.
pub struct ImageAssetTracker {
    store: Arc<dyn ObjectStore>,
    urls: ObjectUrlRegistry,
    selection: Mutex<Option<(String, BTreeSet<String>)>>,
}

impl ImageAssetTracker {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            urls: ObjectUrlRegistry::new(),
            selection: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn urls(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    /// Load an image and return its object URL. `None` if nothing is stored.
    pub async fn object_url(&self, key: &str) -> Option<String> {
        if let Some(url) = self.urls.get(key) {
            return Some(url);
        }
        let object = self.store.get(key).await;
        if object.is_empty() {
            return None;
        }
        Some(self.urls.register(key, object))
    }

    /// Observe the selected page.
    ///
    /// When the same page is observed again, images it no longer references are
    /// revoked and deleted. Returns the deleted keys.
    pub async fn on_selection(&self, page: &PageNode) -> Vec<String> {
        let current: BTreeSet<String> = page.image_keys().into_iter().collect();
        let removed: Vec<String> = {
            let mut selection = self.selection();
            let removed = match selection.as_ref() {
                Some((id, previous)) if *id == page.id => {
                    previous.difference(&current).cloned().collect()
                }
                _ => Vec::new(),
            };
            *selection = Some((page.id.clone(), current));
            removed
        };

        self.remove(&removed).await;
        removed
    }

    /// Delete every image and editor artifact of `page` and its descendants.
    /// Returns the deleted keys.
    pub async fn on_deleted(&self, page: &PageNode) -> Vec<String> {
        let mut keys = Vec::new();
        let mut ids = BTreeSet::new();
        page.walk(&mut |node| {
            ids.insert(node.id.clone());
            keys.extend(node.image_keys());
            keys.extend(ArtifactKind::ALL.iter().map(|kind| kind.key(&node.id)));
        });

        {
            let mut selection = self.selection();
            if selection.as_ref().is_some_and(|(id, _)| ids.contains(id)) {
                *selection = None;
            }
        }

        self.remove(&keys).await;
        keys
    }

    /// Id of the page last observed by [`Self::on_selection`].
    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.selection().as_ref().map(|(id, _)| id.clone())
    }

    /// Forget the selection and revoke every URL.
    pub fn clear(&self) {
        *self.selection() = None;
        self.urls.revoke_all();
    }

    async fn remove(&self, keys: &[String]) {
        for key in keys {
            self.urls.revoke(key);
        }
        let results = join_all(keys.iter().map(|key| self.store.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(key = %key, error = %e, "Failed to delete orphaned object");
            }
        }
    }

    fn selection(&self) -> MutexGuard<'_, Option<(String, BTreeSet<String>)>> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use kiln_site::Image;
    use kiln_store::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;

    fn page(id: &str, images: &[&str]) -> PageNode {
        let mut node = PageNode::new(id);
        node.images = images.iter().map(|url| Image::new(*url)).collect();
        node
    }

    fn tracker() -> (Arc<MemoryStore>, ImageAssetTracker) {
        let store = Arc::new(
            MemoryStore::new()
                .with_object("images/a.png", "a", "image/png")
                .with_object("images/b.png", "b", "image/png"),
        );
        let tracker = ImageAssetTracker::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        (store, tracker)
    }

    #[tokio::test]
    async fn test_object_url_registers_once() {
        let (_, tracker) = tracker();

        let url = tracker.object_url("images/a.png").await.unwrap();

        assert!(url.starts_with("blob:kiln/"));
        assert_eq!(tracker.object_url("images/a.png").await, Some(url.clone()));
        assert_eq!(tracker.urls().resolve(&url).unwrap().body, b"a");
        assert_eq!(tracker.object_url("images/missing.png").await, None);
    }

    #[tokio::test]
    async fn test_removed_image_is_revoked_and_deleted() {
        let (store, tracker) = tracker();
        tracker.object_url("images/a.png").await;
        tracker.on_selection(&page("p", &["images/a.png", "images/b.png"])).await;

        let removed = tracker.on_selection(&page("p", &["images/b.png"])).await;

        assert_eq!(removed, vec!["images/a.png"]);
        assert_eq!(store.deletes(), vec!["images/a.png"]);
        assert_eq!(tracker.urls().get("images/a.png"), None);
    }

    #[tokio::test]
    async fn test_added_image_deletes_nothing() {
        let (store, tracker) = tracker();
        tracker.on_selection(&page("p", &["images/a.png"])).await;

        let removed = tracker
            .on_selection(&page("p", &["images/a.png", "images/b.png"]))
            .await;

        assert!(removed.is_empty());
        assert!(store.deletes().is_empty());
    }

    #[tokio::test]
    async fn test_switching_pages_deletes_nothing() {
        let (store, tracker) = tracker();
        tracker.on_selection(&page("p1", &["images/a.png"])).await;

        tracker.on_selection(&page("p2", &[])).await;
        tracker.on_selection(&page("p1", &["images/a.png"])).await;

        assert!(store.deletes().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_subtree_removes_images_and_artifacts() {
        let (store, tracker) = tracker();
        tracker.object_url("images/b.png").await;
        let subtree = page("p", &["images/a.png"]).with_child(page("c", &["images/b.png"]));

        let deleted = tracker.on_deleted(&subtree).await;

        assert_eq!(
            deleted,
            vec![
                "images/a.png",
                "pages/p.vue",
                "pages/p.jsonld",
                "docs/p.md",
                "images/b.png",
                "pages/c.vue",
                "pages/c.jsonld",
                "docs/c.md",
            ]
        );
        assert_eq!(store.deletes(), deleted);
        assert!(tracker.urls().is_empty());
    }

    #[tokio::test]
    async fn test_clear_revokes_everything() {
        let (_, tracker) = tracker();
        tracker.object_url("images/a.png").await;
        tracker.object_url("images/b.png").await;

        tracker.clear();

        assert!(tracker.urls().is_empty());
    }
}
