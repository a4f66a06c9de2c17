//! In-memory site state and the change events it emits.
//!
//! Every mutation records the debounced write families it invalidates. Loading
//! state during hydration is silent: it mirrors storage and triggers nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiln_site::{ArtifactKind, ContentTree, FeedItem, FeedState, Importmap, Record};
use serde_json::Value;

use crate::debouncer::Debouncer;
use crate::task::SyncTask;

/// Site data mirrored from the active scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SiteData {
    pub tree: ContentTree,
    pub importmap: Importmap,
    pub fonts: Vec<Value>,
    pub feed: FeedState,
    /// Public domain from `CNAME`, empty when unset.
    pub domain: String,
}

/// Shared site state with change tracking.
pub struct SiteState {
    data: Mutex<SiteData>,
    importmap_edited: Mutex<bool>,
    tree_unreadable: Mutex<bool>,
    scheduler: Arc<Debouncer<SyncTask>>,
}

impl SiteState {
    #[must_use]
    pub fn new(scheduler: Arc<Debouncer<SyncTask>>) -> Self {
        Self {
            data: Mutex::new(SiteData::default()),
            importmap_edited: Mutex::new(false),
            tree_unreadable: Mutex::new(false),
            scheduler,
        }
    }

    /// Scheduler receiving change events.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Debouncer<SyncTask>> {
        &self.scheduler
    }

    /// Read the current data.
    pub fn read<R>(&self, f: impl FnOnce(&SiteData) -> R) -> R {
        f(&self.lock())
    }

    /// Copy of the current data.
    #[must_use]
    pub fn snapshot(&self) -> SiteData {
        self.lock().clone()
    }

    /// Replace all data without emitting change events.
    pub fn load(&self, data: SiteData) {
        *self.lock() = data;
        *self.edited() = false;
        *self.unreadable() = false;
    }

    /// Mark the stored tree as unparseable.
    ///
    /// Tree-derived writes are withheld until the tree is mutated, so a corrupt
    /// `index.json` is never replaced by the placeholder tree.
    pub fn mark_tree_unreadable(&self) {
        *self.unreadable() = true;
    }

    /// Whether the tree mirrors storage or has been edited since.
    #[must_use]
    pub fn tree_readable(&self) -> bool {
        !*self.unreadable()
    }

    /// Drop all data without emitting change events.
    pub fn clear(&self) {
        self.load(SiteData::default());
    }

    /// Mutate the page tree.
    pub fn update_tree<R>(&self, f: impl FnOnce(&mut ContentTree) -> R) -> R {
        let result = f(&mut self.lock().tree);
        *self.unreadable() = false;
        self.schedule(&SyncTask::TREE);
        result
    }

    /// Mutate the importmap. Marks it as edited so the next reconciliation persists it.
    pub fn update_importmap<R>(&self, f: impl FnOnce(&mut Importmap) -> R) -> R {
        let result = f(&mut self.lock().importmap);
        *self.edited() = true;
        self.schedule(&[SyncTask::Importmap, SyncTask::Pages]);
        result
    }

    /// Force static-entry bindings to the build's files.
    ///
    /// Schedules a page pass when a binding drifted. Returns whether any did.
    pub fn reconcile_importmap(&self, static_entries: &[(String, String)]) -> bool {
        let changed = self.lock().importmap.reconcile(static_entries);
        if changed {
            self.schedule(&[SyncTask::Pages]);
        }
        changed
    }

    /// Read and reset the importmap edit flag.
    pub fn take_importmap_edited(&self) -> bool {
        std::mem::take(&mut *self.edited())
    }

    /// Set the public domain. No-op when unchanged.
    pub fn set_domain(&self, domain: &str) {
        let domain = domain.trim();
        {
            let mut data = self.lock();
            if data.domain == domain {
                return;
            }
            domain.clone_into(&mut data.domain);
        }
        self.schedule(&SyncTask::DOMAIN);
    }

    pub fn set_feed_items(&self, items: Vec<FeedItem>) {
        self.lock().feed.items = items;
        self.schedule(&[SyncTask::Feed]);
    }

    pub fn set_fonts(&self, fonts: Vec<Value>) {
        self.lock().fonts = fonts;
        self.schedule(&[SyncTask::Fonts]);
    }

    /// Mirror a parsed buffer onto its page node.
    ///
    /// Writes only when the record differs from the node's current value.
    /// Returns whether the node changed.
    pub fn set_record(&self, id: &str, kind: ArtifactKind, record: Record) -> bool {
        {
            let mut data = self.lock();
            let Some(slot) = data.tree.find_mut(id).and_then(|n| kind.record_mut(n)) else {
                return false;
            };
            if *slot == record {
                return false;
            }
            *slot = record;
        }
        match kind {
            ArtifactKind::JsonLd => self.schedule(&[SyncTask::Pages]),
            _ => self.schedule(&SyncTask::TREE),
        }
        true
    }

    fn schedule(&self, tasks: &[SyncTask]) {
        for task in tasks {
            self.scheduler.record(task.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, SiteData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edited(&self) -> MutexGuard<'_, bool> {
        self.importmap_edited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn unreadable(&self) -> MutexGuard<'_, bool> {
        self.tree_unreadable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
