//! Editor buffers for per-page artifacts.
//!
//! A buffer is created on first access, seeded from storage (or the artifact
//! default when nothing is stored) and written back through the debounced
//! scheduler after each edit. Structured buffers mirror their parsed content onto
//! the page node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use kiln_site::ArtifactKind;
use kiln_store::{ObjectStore, ObjectStoreExt};

use crate::state::SiteState;
use crate::task::SyncTask;

type BufferKey = (String, ArtifactKind);

/// Text buffer of one page artifact.
#[derive(Debug)]
pub struct EditorBuffer {
    id: String,
    kind: ArtifactKind,
    content: RwLock<String>,
}

impl EditorBuffer {
    fn new(id: String, kind: ArtifactKind, content: String) -> Self {
        Self {
            id,
            kind,
            content: RwLock::new(content),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Object key backing this buffer.
    #[must_use]
    pub fn key(&self) -> String {
        self.kind.key(&self.id)
    }

    #[must_use]
    pub fn content(&self) -> String {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_content(&self, content: String) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = content;
    }
}

/// Cache of editor buffers keyed by page id and artifact kind.
pub struct EditorModelCache {
    store: Arc<dyn ObjectStore>,
    state: Arc<SiteState>,
    buffers: Mutex<HashMap<BufferKey, Arc<EditorBuffer>>>,
    message: Mutex<Option<String>>,
}

impl EditorModelCache {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, state: Arc<SiteState>) -> Self {
        Self {
            store,
            state,
            buffers: Mutex::new(HashMap::new()),
            message: Mutex::new(None),
        }
    }

    /// Cached buffer, if any.
    #[must_use]
    pub fn get(&self, id: &str, kind: ArtifactKind) -> Option<Arc<EditorBuffer>> {
        self.buffers().get(&(id.to_owned(), kind)).map(Arc::clone)
    }

    /// Return the buffer for `(id, kind)`, loading it on first access.
    ///
    /// A buffer without stored content is seeded with the kind's default, which
    /// is persisted right away.
    pub async fn get_or_create(&self, id: &str, kind: ArtifactKind) -> Arc<EditorBuffer> {
        if let Some(buffer) = self.get(id, kind) {
            return buffer;
        }

        let key = kind.key(id);
        let stored = self.store.get(&key).await;
        let absent = stored.is_empty();
        let content = if absent {
            kind.default_content().to_owned()
        } else {
            stored.text()
        };

        let (buffer, created) = {
            let mut buffers = self.buffers();
            match buffers.get(&(id.to_owned(), kind)) {
                // Another caller finished loading first.
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let buffer = Arc::new(EditorBuffer::new(id.to_owned(), kind, content));
                    buffers.insert((id.to_owned(), kind), Arc::clone(&buffer));
                    (buffer, true)
                }
            }
        };

        if created {
            tracing::debug!(key = %key, absent, "Editor buffer created");
            self.mirror(&buffer);
            if absent {
                self.write(&buffer).await;
            }
        }
        buffer
    }

    /// Replace the content of a buffer and schedule its write.
    pub async fn edit(&self, id: &str, kind: ArtifactKind, content: impl Into<String>) {
        let buffer = self.get_or_create(id, kind).await;
        buffer.set_content(content.into());
        self.state.scheduler().record(SyncTask::buffer(id, kind));
        self.mirror(&buffer);
    }

    /// Write a buffer to storage. Disposed buffers are skipped.
    pub async fn persist(&self, id: &str, kind: ArtifactKind) {
        if let Some(buffer) = self.get(id, kind) {
            self.write(&buffer).await;
        }
    }

    /// Drop every buffer of page `id` and its pending writes.
    pub fn dispose_page(&self, id: &str) {
        self.buffers().retain(|(buffer_id, _), _| buffer_id != id);
        self.state.scheduler().cancel_where(
            |task| matches!(task, SyncTask::Buffer { id: task_id, .. } if task_id == id),
        );
    }

    /// Drop every buffer.
    pub fn dispose_all(&self) {
        self.buffers().clear();
        *self.message_slot() = None;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers().is_empty()
    }

    /// Diagnostic from the last structured parse, `None` when it succeeded.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.message_slot().clone()
    }

    /// Parse a structured buffer onto its page node.
    fn mirror(&self, buffer: &EditorBuffer) {
        if !buffer.kind.is_structured() {
            return;
        }
        let parsed = buffer.kind.parse(&buffer.content());
        if let Some(message) = &parsed.message {
            tracing::debug!(key = %buffer.key(), error = %message, "Buffer does not parse");
        }
        *self.message_slot() = parsed.message;
        self.state.set_record(&buffer.id, buffer.kind, parsed.record);
    }

    async fn write(&self, buffer: &EditorBuffer) {
        let key = buffer.key();
        if let Err(e) = self
            .store
            .put_text(&key, &buffer.content(), buffer.kind.content_type())
            .await
        {
            tracing::error!(key = %key, error = %e, "Failed to save editor buffer");
        }
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<BufferKey, Arc<EditorBuffer>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn message_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.message.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
