//! Debounced regeneration of published artifacts.
//!
//! [`SyncEngine`] owns the site state, the editor buffers and the image tracker.
//! Mutations record write families in one keyed [`Debouncer`]; the engine runs
//! each family once it has been quiet for the debounce delay. Hydration on scope
//! activation loads the site and reconciles build assets against the runtime.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use kiln_site::{
    ArtifactKind, ContentTree, FeedState, Importmap, MANIFEST_KEY, Manifest, PageTemplate,
    SiteError, loc_html_key, path_html_key, render_sitemap,
};
use kiln_store::{ObjectStore, ObjectStoreExt};
use tokio::sync::{OnceCell, watch};
use tokio::time::{Instant, sleep_until};

use crate::debouncer::Debouncer;
use crate::editor::EditorModelCache;
use crate::images::ImageAssetTracker;
use crate::router::Scope;
use crate::state::{SiteData, SiteState};
use crate::task::SyncTask;

/// Passes of [`SyncEngine::flush`] before giving up on a task that keeps
/// rescheduling itself.
const MAX_FLUSH_PASSES: usize = 16;

const INDEX_KEY: &str = "index.json";
const FONTS_KEY: &str = "fonts.json";
const IMPORTMAP_KEY: &str = "index.importmap";
const CNAME_KEY: &str = "CNAME";
const SITEMAP_KEY: &str = "sitemap.xml";
const FEED_JSON_KEY: &str = "feed.json";
const FEED_ATOM_KEY: &str = "feed.xml";
const FEED_RSS_KEY: &str = "feed-rss.xml";
const TEMPLATE_KEY: &str = "index.html";

/// Engine tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Quiet period before a write family runs.
    pub debounce: Duration,
    /// Directory names never pruned.
    pub prune_exclude: Vec<String>,
    /// Files probed during manifest reconciliation; missing ones are uploaded
    /// from the runtime and never deleted.
    pub probe_files: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            prune_exclude: vec!["node_modules".to_owned(), ".git".to_owned()],
            probe_files: vec!["robots.txt".to_owned(), FONTS_KEY.to_owned()],
        }
    }
}

/// Outcome of manifest reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Remote build assets no longer produced by the runtime build.
    pub deleted: Vec<String>,
    /// Runtime build assets copied to the active scope.
    pub uploaded: Vec<String>,
}

/// Runtime template and build manifest, read once.
struct RuntimeAssets {
    index_html: String,
    manifest: Manifest,
}

/// A published `(loc, path)` pair.
type Published = (Option<String>, Option<String>);

/// Keeps storage in step with the in-memory site.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<dyn ObjectStore>,
    options: SyncOptions,
    scheduler: Arc<Debouncer<SyncTask>>,
    state: Arc<SiteState>,
    editors: EditorModelCache,
    images: ImageAssetTracker,
    assets: OnceCell<RuntimeAssets>,
    published: Mutex<Vec<Published>>,
}

impl SyncEngine {
    /// Create an engine writing to `store` and reading build output from `runtime`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        runtime: Arc<dyn ObjectStore>,
        options: SyncOptions,
    ) -> Self {
        let scheduler = Arc::new(Debouncer::new(options.debounce));
        let state = Arc::new(SiteState::new(Arc::clone(&scheduler)));
        Self {
            editors: EditorModelCache::new(Arc::clone(&store), Arc::clone(&state)),
            images: ImageAssetTracker::new(Arc::clone(&store)),
            store,
            runtime,
            options,
            scheduler,
            state,
            assets: OnceCell::new(),
            published: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<SiteState> {
        &self.state
    }

    #[must_use]
    pub fn editors(&self) -> &EditorModelCache {
        &self.editors
    }

    #[must_use]
    pub fn images(&self) -> &ImageAssetTracker {
        &self.images
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Debouncer<SyncTask>> {
        &self.scheduler
    }

    /// Load the site from the active scope and reconcile build assets.
    ///
    /// Missing or invalid objects fall back to empty defaults.
    pub async fn hydrate(&self) -> ManifestDiff {
        let (index, fonts, importmap, feed, cname, remote_manifest) = tokio::join!(
            self.store.get_text(INDEX_KEY),
            self.store.get_text(FONTS_KEY),
            self.store.get_text(IMPORTMAP_KEY),
            self.store.get_text(FEED_JSON_KEY),
            self.store.get_text(CNAME_KEY),
            self.store.get_text(MANIFEST_KEY),
        );

        let (tree, tree_readable) = match ContentTree::from_index_json(&index) {
            Ok(tree) => (tree, true),
            Err(e) => {
                tracing::warn!(
                    key = %INDEX_KEY,
                    error = %e,
                    "Stored tree does not parse, keeping it"
                );
                (ContentTree::new(), false)
            }
        };
        let data = SiteData {
            tree,
            importmap: lenient(IMPORTMAP_KEY, Importmap::parse(&importmap)).unwrap_or_default(),
            fonts: parse_fonts(&fonts),
            feed: lenient(FEED_JSON_KEY, FeedState::parse(&feed)).unwrap_or_default(),
            domain: cname.trim().to_owned(),
        };
        tracing::info!(
            pages = data.tree.pages().len(),
            domain = %data.domain,
            "Site hydrated"
        );
        self.state.load(data);
        if !tree_readable {
            self.state.mark_tree_unreadable();
        }

        for task in [
            SyncTask::Importmap,
            SyncTask::Pages,
            SyncTask::Sitemap,
            SyncTask::Feed,
        ] {
            self.scheduler.record(task);
        }

        self.reconcile_manifest(&remote_manifest).await
    }

    /// Drop everything tied to the previous scope.
    pub fn deactivate(&self) {
        self.scheduler.clear();
        self.state.clear();
        self.editors.dispose_all();
        self.images.clear();
        self.published().clear();
        tracing::debug!("Site state cleared");
    }

    /// Schedule every write family.
    pub fn regenerate_all(&self) {
        self.state.update_importmap(|_| ());
        for task in SyncTask::TREE {
            self.scheduler.record(task);
        }
        if self.state.read(|d| !d.domain.is_empty()) {
            self.scheduler.record(SyncTask::Cname);
        }
    }

    /// Remove page `id` with its subtree, its artifacts and its images.
    ///
    /// Returns `false` when no such page exists.
    pub async fn delete_page(&self, id: &str) -> bool {
        let Some(node) = self.state.update_tree(|tree| tree.remove(id)) else {
            return false;
        };
        node.walk(&mut |n| self.editors.dispose_page(&n.id));
        self.images.on_deleted(&node).await;
        true
    }

    /// Observe the selected page for image cleanup.
    pub async fn select_page(&self, id: &str) -> Vec<String> {
        let Some(node) = self.state.read(|d| d.tree.find(id).cloned()) else {
            return Vec::new();
        };
        self.images.on_selection(&node).await
    }

    /// Run every pending task now, including tasks scheduled while flushing.
    pub async fn flush(&self) {
        for _ in 0..MAX_FLUSH_PASSES {
            let tasks = self.scheduler.drain_all();
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                self.run_task(task).await;
            }
        }
        tracing::warn!("Sync tasks kept rescheduling, giving up flush");
    }

    /// Drive the scheduler until `shutdown` resolves, then flush.
    ///
    /// Scope activation triggers hydration; clearing the scope deactivates.
    pub async fn run(&self, mut scope: watch::Receiver<Scope>, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                () = &mut shutdown => break,
                changed = scope.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let active = scope.borrow_and_update().is_active();
                    self.deactivate();
                    if active {
                        self.hydrate().await;
                    }
                }
                () = self.scheduler.notified() => {}
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for task in self.scheduler.drain_ready() {
                        self.run_task(task).await;
                    }
                }
            }
        }
        self.flush().await;
    }

    /// Execute one task.
    pub async fn run_task(&self, task: SyncTask) {
        tracing::debug!(task = %task, "Running sync task");
        match task {
            SyncTask::Index => self.write_index().await,
            SyncTask::Fonts => self.write_fonts().await,
            SyncTask::Importmap => self.write_importmap().await,
            SyncTask::Cname => self.write_cname().await,
            SyncTask::Buffer { id, kind } => self.editors.persist(&id, kind).await,
            SyncTask::Pages => self.write_pages().await,
            SyncTask::Sitemap => self.write_sitemap().await,
            SyncTask::Feed => self.write_feed().await,
            SyncTask::Images => self.sweep_images().await,
        }
    }

    /// Re-observe the selected page so images dropped from it are deleted.
    async fn sweep_images(&self) {
        if let Some(id) = self.images.selected() {
            self.select_page(&id).await;
        }
    }

    /// Tree-derived writes wait until an unparseable stored tree is replaced.
    fn tree_writable(&self, key: &str) -> bool {
        let readable = self.state.tree_readable();
        if !readable {
            tracing::warn!(key = %key, "Stored tree is unreadable, write withheld");
        }
        readable
    }

    async fn write_index(&self) {
        if !self.tree_writable(INDEX_KEY) {
            return;
        }
        match self.state.read(|d| d.tree.to_index_json()) {
            Ok(json) => self.put(INDEX_KEY, &json, "application/json").await,
            Err(e) => render_failed(INDEX_KEY, &e),
        }
    }

    async fn write_fonts(&self) {
        match self.state.read(|d| serde_json::to_string(&d.fonts)) {
            Ok(json) => self.put(FONTS_KEY, &json, "application/json").await,
            Err(e) => render_failed(FONTS_KEY, &SiteError::from(e)),
        }
    }

    async fn write_cname(&self) {
        let domain = self.state.read(|d| d.domain.clone());
        if domain.is_empty() {
            self.delete(CNAME_KEY).await;
        } else {
            self.put(CNAME_KEY, &domain, "text/plain").await;
        }
    }

    /// Reconcile static-entry bindings and persist the importmap when it changed
    /// or was edited.
    async fn write_importmap(&self) {
        let entries = self.assets().await.manifest.static_entries();
        let drifted = self.state.reconcile_importmap(&entries);
        let edited = self.state.take_importmap_edited();
        if !drifted && !edited {
            return;
        }
        match self.state.read(|d| d.importmap.to_json()) {
            Ok(json) => {
                self.put(IMPORTMAP_KEY, &json, "application/importmap+json")
                    .await;
            }
            Err(e) => render_failed(IMPORTMAP_KEY, &e),
        }
    }

    /// Publish per-page HTML.
    ///
    /// Targets published by the previous pass that no longer exist are deleted
    /// and empty directories pruned before the current set is written.
    async fn write_pages(&self) {
        if !self.tree_writable(TEMPLATE_KEY) {
            return;
        }
        let addressed: Vec<String> = self.state.read(|d| {
            d.tree
                .pages()
                .into_iter()
                .filter(|p| p.path.is_some())
                .map(|p| p.id.clone())
                .collect()
        });
        for id in &addressed {
            self.editors.get_or_create(id, ArtifactKind::JsonLd).await;
        }

        let (pages, importmap, domain, title) = self.state.read(|d| {
            (
                d.tree.pages(),
                d.importmap.clone(),
                d.domain.clone(),
                d.tree.site_title().unwrap_or_default().to_owned(),
            )
        });

        let current: Vec<Published> = pages
            .iter()
            .map(|p| (p.loc.clone().filter(|l| !l.is_empty()), p.path.clone()))
            .collect();
        let live: BTreeSet<String> = pages.iter().flat_map(|p| p.html_keys()).collect();
        let previous = std::mem::take(&mut *self.published());
        let stale: BTreeSet<String> = previous
            .iter()
            .flat_map(published_keys)
            .filter(|key| !live.contains(key))
            .collect();

        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "Removing unpublished pages");
            join_all(stale.iter().map(|key| self.delete(key))).await;
        }
        if let Err(e) = self
            .store
            .prune_empty_directories(&self.options.prune_exclude)
            .await
        {
            tracing::error!(error = %e, "Failed to prune empty directories");
        }
        *self.published() = current;

        let index_html = &self.assets().await.index_html;
        if index_html.is_empty() {
            tracing::warn!("Runtime index.html is unavailable, pages not published");
            return;
        }
        let template = match PageTemplate::new(index_html, &importmap, &title) {
            Ok(template) => template,
            Err(e) => return render_failed(TEMPLATE_KEY, &e),
        };

        let mut rendered = Vec::new();
        for page in &pages {
            let keys = page.html_keys();
            if keys.is_empty() {
                continue;
            }
            match template.render(page, &domain) {
                Ok(html) => rendered.extend(keys.into_iter().map(|key| (key, html.clone()))),
                Err(e) => render_failed(&page.id, &e),
            }
        }
        join_all(
            rendered
                .iter()
                .map(|(key, html)| self.put(key, html, "text/html")),
        )
        .await;
        tracing::debug!(count = rendered.len(), "Pages published");
    }

    async fn write_sitemap(&self) {
        if !self.tree_writable(SITEMAP_KEY) {
            return;
        }
        let (pages, domain) = self.state.read(|d| (d.tree.pages(), d.domain.clone()));
        if domain.is_empty() {
            return;
        }
        match render_sitemap(&pages, &domain) {
            Ok(xml) => self.put(SITEMAP_KEY, &xml, "application/xml").await,
            Err(e) => render_failed(SITEMAP_KEY, &e),
        }
    }

    /// `feed.json` is always written; XML feeds need a domain and a site title.
    async fn write_feed(&self) {
        let (feed, domain, title) = self.state.read(|d| {
            (
                d.feed.clone(),
                d.domain.clone(),
                d.tree.site_title().map(str::to_owned),
            )
        });

        match feed.render_json(title.as_deref(), &domain) {
            Ok(json) => self.put(FEED_JSON_KEY, &json, "application/feed+json").await,
            Err(e) => render_failed(FEED_JSON_KEY, &e),
        }

        let Some(title) = title.filter(|_| !domain.is_empty()) else {
            return;
        };
        match feed.render_atom(&title, &domain) {
            Ok(xml) => self.put(FEED_ATOM_KEY, &xml, "application/atom+xml").await,
            Err(e) => render_failed(FEED_ATOM_KEY, &e),
        }
        match feed.render_rss(&title, &domain) {
            Ok(xml) => self.put(FEED_RSS_KEY, &xml, "application/rss+xml").await,
            Err(e) => render_failed(FEED_RSS_KEY, &e),
        }
    }

    /// Delete remote-only build assets and upload runtime-only ones.
    ///
    /// Probe files missing from the scope count as local, so they are never
    /// deleted and get uploaded when the runtime has them. The manifest itself is
    /// always local so it is republished.
    async fn reconcile_manifest(&self, remote_manifest: &str) -> ManifestDiff {
        let local_manifest = &self.assets().await.manifest;
        if local_manifest.is_empty() {
            tracing::warn!("Runtime build manifest is unavailable, skipping asset reconciliation");
            return ManifestDiff::default();
        }
        let remote = Manifest::parse_lenient(remote_manifest).files();
        let mut local = local_manifest.files();

        let probes = join_all(self.options.probe_files.iter().map(|f| self.store.head(f))).await;
        for (file, probe) in self.options.probe_files.iter().zip(probes) {
            if probe.is_err() {
                local.insert(file.clone());
            }
        }

        let deleted: Vec<String> = remote.difference(&local).cloned().collect();
        local.insert(MANIFEST_KEY.to_owned());
        let missing: Vec<String> = local.difference(&remote).cloned().collect();

        join_all(deleted.iter().map(|key| self.delete(key))).await;

        let mut uploaded = Vec::new();
        for key in missing {
            let object = self.runtime.get(&key).await;
            if object.is_empty() {
                continue;
            }
            match self.store.put(&key, object.body, &object.content_type).await {
                Ok(()) => uploaded.push(key),
                Err(e) => tracing::error!(key = %key, error = %e, "Failed to upload build asset"),
            }
        }

        tracing::info!(
            deleted = deleted.len(),
            uploaded = uploaded.len(),
            "Build assets reconciled"
        );
        ManifestDiff { deleted, uploaded }
    }

    async fn assets(&self) -> &RuntimeAssets {
        self.assets
            .get_or_init(|| async {
                let (index_html, manifest) = tokio::join!(
                    self.runtime.get_text(TEMPLATE_KEY),
                    self.runtime.get_text(MANIFEST_KEY),
                );
                RuntimeAssets {
                    index_html,
                    manifest: Manifest::parse_lenient(&manifest),
                }
            })
            .await
    }

    async fn put(&self, key: &str, text: &str, content_type: &str) {
        if let Err(e) = self.store.put_text(key, text, content_type).await {
            tracing::error!(key = %key, error = %e, "Failed to write");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::error!(key = %key, error = %e, "Failed to delete");
        }
    }

    fn published(&self) -> MutexGuard<'_, Vec<Published>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn published_keys((loc, path): &Published) -> Vec<String> {
    loc.as_deref()
        .map(loc_html_key)
        .into_iter()
        .chain(path.as_deref().map(path_html_key))
        .collect()
}

fn parse_fonts(content: &str) -> Vec<serde_json::Value> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    lenient(FONTS_KEY, serde_json::from_str(content).map_err(SiteError::from)).unwrap_or_default()
}

fn lenient<T>(key: &str, result: Result<T, SiteError>) -> Option<T> {
    result
        .inspect_err(|e| tracing::warn!(key = %key, error = %e, "Ignoring invalid object"))
        .ok()
}

fn render_failed(key: &str, err: &SiteError) {
    tracing::error!(key = %key, error = %err, "Failed to render");
}
