//! Read-only runtime backend for the kiln object store.
//!
//! [`StaticReadStore`] serves the files of the site runtime build: the page
//! template, the build manifest and the hashed assets. It is the fallback store
//! while no bucket is selected and the source of truth for assets uploaded
//! during manifest reconciliation.
//!
//! Two sources are supported:
//! - a local build directory (`{dir}/{key}`)
//! - an HTTP base URL (`{url}/{key}`), fetched with `ureq`
//!
//! Writes and deletes are silently ignored.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use kiln_store::{ObjectStore, StoreError, StoreErrorKind, StoredObject, guess_content_type};
use ureq::Agent;

/// Backend identifier for error messages.
const BACKEND: &str = "Static";

/// Where runtime files are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSource {
    /// Local build output directory.
    Dir(PathBuf),
    /// Base URL the runtime is served from.
    Url(String),
}

/// Read-only store over the runtime build.
pub struct StaticReadStore {
    source: RuntimeSource,
    agent: Agent,
}

impl StaticReadStore {
    /// Create a store reading from `source`.
    #[must_use]
    pub fn new(source: RuntimeSource) -> Self {
        let source = match source {
            RuntimeSource::Url(url) => RuntimeSource::Url(url.trim_end_matches('/').to_owned()),
            dir @ RuntimeSource::Dir(_) => dir,
        };
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { source, agent }
    }

    /// Create a store over a local build directory.
    #[must_use]
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(RuntimeSource::Dir(dir.into()))
    }

    /// Create a store over an HTTP base URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(RuntimeSource::Url(url.into()))
    }

    /// The configured source.
    #[must_use]
    pub fn source(&self) -> &RuntimeSource {
        &self.source
    }

    fn file_path(dir: &Path, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
            .then(|| dir.join(relative))
    }

    async fn fetch(&self, url: String) -> Option<StoredObject> {
        let agent = self.agent.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<Option<StoredObject>, ureq::Error> {
            let response = agent.get(&url).call()?;
            if !response.status().is_success() {
                tracing::debug!(url = %url, status = response.status().as_u16(), "runtime fetch failed");
                return Ok(None);
            }
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let body = response.into_body().read_to_vec()?;
            Ok(Some(StoredObject::new(body, content_type)))
        })
        .await;

        match result {
            Ok(Ok(object)) => object,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "runtime fetch error");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "runtime fetch task failed");
                None
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StaticReadStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> StoredObject {
        let object = match &self.source {
            RuntimeSource::Dir(dir) => match Self::file_path(dir, key) {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .ok()
                    .map(|body| StoredObject::new(body, guess_content_type(key))),
                None => None,
            },
            RuntimeSource::Url(base) => {
                let key = key.trim_start_matches('/');
                self.fetch(format!("{base}/{key}")).await
            }
        };
        let mut object = object.unwrap_or_default();
        if !object.is_empty() && object.content_type.is_empty() {
            guess_content_type(key).clone_into(&mut object.content_type);
        }
        object
    }

    async fn head(&self, key: &str) -> Result<(), StoreError> {
        let is_file = match &self.source {
            RuntimeSource::Dir(dir) => match Self::file_path(dir, key) {
                Some(path) => tokio::fs::metadata(&path)
                    .await
                    .is_ok_and(|m| m.is_file()),
                None => false,
            },
            RuntimeSource::Url(_) => !self.get(key).await.is_empty(),
        };
        if is_file {
            Ok(())
        } else {
            Err(StoreError::not_a_file(key).with_backend(BACKEND))
        }
    }

    async fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        tracing::trace!(key, "ignoring write to read-only runtime store");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        tracing::trace!(key, "ignoring delete on read-only runtime store");
        Ok(())
    }
}

/// Error returned when a caller requires a writable backend.
#[must_use]
pub fn read_only_error(key: &str) -> StoreError {
    StoreError::new(StoreErrorKind::ReadOnly)
        .with_key(key)
        .with_backend(BACKEND)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn runtime() -> (TempDir, StaticReadStore) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".vite")).unwrap();
        fs::write(tmp.path().join(".vite/manifest.json"), "{}").unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        let store = StaticReadStore::from_dir(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn test_get_reads_runtime_file() {
        let (_tmp, store) = runtime();

        let object = store.get("index.html").await;

        assert_eq!(object.text(), "<html></html>");
        assert_eq!(object.content_type, "text/html");
    }

    #[tokio::test]
    async fn test_get_missing_is_empty() {
        let (_tmp, store) = runtime();

        assert!(store.get("assets/missing.js").await.is_empty());
    }

    #[tokio::test]
    async fn test_get_rejects_parent_segments() {
        let (_tmp, store) = runtime();

        assert!(store.get("../secret").await.is_empty());
    }

    #[tokio::test]
    async fn test_head() {
        let (_tmp, store) = runtime();

        assert!(store.head(".vite/manifest.json").await.is_ok());
        assert_eq!(
            store.head(".vite").await.unwrap_err().kind,
            StoreErrorKind::NotAFile
        );
    }

    #[tokio::test]
    async fn test_writes_are_ignored() {
        let (tmp, store) = runtime();

        store
            .put("new.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap();
        store.delete("index.html").await.unwrap();

        assert!(!tmp.path().join("new.txt").exists());
        assert!(tmp.path().join("index.html").exists());
    }

    #[test]
    fn test_url_source_trims_trailing_slash() {
        let store = StaticReadStore::from_url("https://example.com/runtime/");

        assert_eq!(
            store.source(),
            &RuntimeSource::Url("https://example.com/runtime".to_owned())
        );
    }

    #[test]
    fn test_read_only_error() {
        let err = read_only_error("k");

        assert_eq!(err.kind, StoreErrorKind::ReadOnly);
        assert_eq!(err.to_string(), "[Static] Read only (key: k)");
    }
}
