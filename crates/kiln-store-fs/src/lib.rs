//! Local directory backend for the kiln object store.
//!
//! [`LocalDirectoryStore`] maps object keys onto files below a granted root
//! directory. Keys are resolved segment by segment; the last segment is looked up
//! as a file first and as a directory second, so ambiguous keys such as `docs`
//! resolve to whichever entry exists.
//!
//! Writes go through a temporary sibling file that is renamed into place, so a
//! reader never observes a half-written object. The temporary file is removed on
//! every failure path.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kiln_store::{ObjectStore, StoreError, StoreErrorKind, StoredObject, guess_content_type};
use tokio::io::AsyncWriteExt;

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// What a key resolved to below the root.
#[derive(Debug, PartialEq, Eq)]
enum Entry {
    File(PathBuf),
    Directory(PathBuf),
}

/// Hierarchical object store rooted at a local directory.
///
/// The root is held until [`teardown`](ObjectStore::teardown); afterwards every
/// operation fails soft, mirroring a revoked directory handle.
pub struct LocalDirectoryStore {
    root: RwLock<Option<PathBuf>>,
    tmp_counter: AtomicU64,
}

impl LocalDirectoryStore {
    /// Open a store rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root: RwLock::new(Some(root)),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Root directory, or `None` after teardown.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Display name of the root directory (used as the scope name).
    #[must_use]
    pub fn name(&self) -> String {
        self.root()
            .and_then(|r| r.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default()
    }

    fn unavailable(key: &str) -> StoreError {
        StoreError::new(StoreErrorKind::Unavailable)
            .with_key(key)
            .with_backend(BACKEND)
    }

    /// Split a key into path segments, collapsing empty ones.
    ///
    /// Rejects `..` and `.` segments so a key can never escape the root.
    fn segments(key: &str) -> Result<Vec<&str>, StoreError> {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let escapes = segments.iter().any(|s| {
            Path::new(s)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        });
        if escapes {
            return Err(StoreError::new(StoreErrorKind::InvalidPath)
                .with_key(key)
                .with_backend(BACKEND));
        }
        Ok(segments)
    }

    /// Resolve a key to an existing entry below the root.
    async fn resolve(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let Some(mut current) = self.root() else {
            return Err(Self::unavailable(key));
        };
        let segments = Self::segments(key)?;
        let Some((last, parents)) = segments.split_last() else {
            return Ok(Some(Entry::Directory(current)));
        };

        for segment in parents {
            current.push(segment);
            match tokio::fs::metadata(&current).await {
                Ok(meta) if meta.is_dir() => {}
                _ => return Ok(None),
            }
        }

        current.push(last);
        match tokio::fs::metadata(&current).await {
            Ok(meta) if meta.is_file() => Ok(Some(Entry::File(current))),
            Ok(meta) if meta.is_dir() => Ok(Some(Entry::Directory(current))),
            _ => Ok(None),
        }
    }

    /// Target path for a write, creating parent directories one level at a time.
    async fn prepare_parent(&self, key: &str) -> Result<(PathBuf, String), StoreError> {
        let Some(mut current) = self.root() else {
            return Err(Self::unavailable(key));
        };
        let segments = Self::segments(key)?;
        let Some((name, parents)) = segments.split_last() else {
            return Err(StoreError::new(StoreErrorKind::InvalidPath)
                .with_key(key)
                .with_backend(BACKEND));
        };

        for segment in parents {
            current.push(segment);
            match tokio::fs::create_dir(&current).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !tokio::fs::metadata(&current)
                        .await
                        .is_ok_and(|m| m.is_dir())
                    {
                        return Err(StoreError::not_a_file(key).with_backend(BACKEND));
                    }
                }
                Err(e) => return Err(StoreError::io(e, Some(key)).with_backend(BACKEND)),
            }
        }

        Ok((current, (*name).to_owned()))
    }

    async fn write_atomic(
        &self,
        dir: &Path,
        name: &str,
        body: &[u8],
    ) -> Result<(), io::Error> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = TempFile::new(dir.join(format!(".{name}.{}.{n}.tmp", std::process::id())));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp.path())
            .await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(tmp.path(), dir.join(name)).await?;
        tmp.persist();
        Ok(())
    }
}

/// Temporary file removed on drop unless persisted.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl ObjectStore for LocalDirectoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> StoredObject {
        match self.resolve(key).await {
            Ok(Some(Entry::File(path))) => match tokio::fs::read(&path).await {
                Ok(body) => StoredObject::new(body, guess_content_type(key)),
                Err(e) => {
                    tracing::debug!(key, error = %e, "read failed");
                    StoredObject::empty()
                }
            },
            Ok(_) => StoredObject::empty(),
            Err(e) => {
                tracing::debug!(key, error = %e, "resolve failed");
                StoredObject::empty()
            }
        }
    }

    async fn head(&self, key: &str) -> Result<(), StoreError> {
        match self.resolve(key).await? {
            Some(Entry::File(_)) => Ok(()),
            _ => Err(StoreError::not_a_file(key).with_backend(BACKEND)),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let (dir, name) = self.prepare_parent(key).await?;
        self.write_atomic(&dir, &name, &body)
            .await
            .map_err(|e| StoreError::io(e, Some(key)).with_backend(BACKEND))?;
        tracing::debug!(key, bytes = body.len(), "written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let result = match self.resolve(key).await? {
            Some(Entry::File(path)) => tokio::fs::remove_file(path).await,
            Some(Entry::Directory(path)) => tokio::fs::remove_dir(path).await,
            None => Ok(()),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(StoreError::io(e, Some(key)).with_backend(BACKEND))
            }
            _ => Ok(()),
        }
    }

    async fn prune_empty_directories(&self, exclude: &[String]) -> Result<(), StoreError> {
        let Some(root) = self.root() else {
            return Ok(());
        };
        let exclude = exclude.to_vec();
        tokio::task::spawn_blocking(move || prune_dir(&root, &exclude))
            .await
            .map_err(|e| {
                StoreError::new(StoreErrorKind::Other)
                    .with_backend(BACKEND)
                    .with_source(e)
            })?
            .map_err(|e| StoreError::io(e, None).with_backend(BACKEND))
    }

    fn teardown(&self) {
        self.root
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

/// Remove empty subdirectories of `dir`, bottom-up.
///
/// Removal failures (the directory still has files) are ignored; only listing
/// errors on `dir` itself are reported.
fn prune_dir(dir: &Path, exclude: &[String]) -> Result<(), io::Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if exclude.contains(&name) {
            continue;
        }
        let path = entry.path();
        if let Err(e) = prune_dir(&path, exclude) {
            tracing::debug!(path = %path.display(), error = %e, "skipping directory");
            continue;
        }
        if fs::remove_dir(&path).is_ok() {
            tracing::debug!(path = %path.display(), "removed empty directory");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, LocalDirectoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = LocalDirectoryStore::new(tmp.path().to_path_buf());
        (tmp, store)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (tmp, store) = store();

        store
            .put("a/b/c.txt", b"hi".to_vec(), "text/plain")
            .await
            .unwrap();

        let object = store.get("a/b/c.txt").await;
        assert_eq!(object.text(), "hi");
        assert_eq!(object.content_type, "text/plain");
        assert!(tmp.path().join("a/b/c.txt").is_file());
    }

    #[tokio::test]
    async fn test_get_missing_is_empty() {
        let (_tmp, store) = store();

        assert!(store.get("missing/file.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_get_directory_is_empty() {
        let (_tmp, store) = store();
        store.put("a/b.txt", b"x".to_vec(), "text/plain").await.unwrap();

        assert!(store.get("a").await.is_empty());
    }

    #[tokio::test]
    async fn test_head_distinguishes_files_and_directories() {
        let (_tmp, store) = store();
        store.put("a/b.txt", b"x".to_vec(), "text/plain").await.unwrap();

        assert!(store.head("a/b.txt").await.is_ok());
        assert_eq!(
            store.head("a").await.unwrap_err().kind,
            StoreErrorKind::NotAFile
        );
        assert_eq!(
            store.head("nope").await.unwrap_err().kind,
            StoreErrorKind::NotAFile
        );
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_tmp, store) = store();

        store.put("k.txt", b"one".to_vec(), "text/plain").await.unwrap();
        store.put("k.txt", b"two".to_vec(), "text/plain").await.unwrap();

        assert_eq!(store.get("k.txt").await.text(), "two");
    }

    #[tokio::test]
    async fn test_put_leaves_no_temporary_files() {
        let (tmp, store) = store();

        store.put("dir/k.txt", b"one".to_vec(), "text/plain").await.unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path().join("dir"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.txt".to_owned()]);
    }

    #[tokio::test]
    async fn test_put_through_file_segment_fails() {
        let (_tmp, store) = store();
        store.put("a", b"file".to_vec(), "text/plain").await.unwrap();

        let err = store
            .put("a/b.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap_err();

        assert_eq!(err.kind, StoreErrorKind::NotAFile);
    }

    #[tokio::test]
    async fn test_collapses_empty_segments() {
        let (_tmp, store) = store();

        store.put("a//b.txt", b"x".to_vec(), "text/plain").await.unwrap();

        assert_eq!(store.get("a/b.txt").await.text(), "x");
    }

    #[tokio::test]
    async fn test_rejects_parent_segments() {
        let (_tmp, store) = store();

        let err = store
            .put("../escape.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap_err();

        assert_eq!(err.kind, StoreErrorKind::InvalidPath);
        assert!(store.get("../escape.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_tmp, store) = store();
        store.put("k.txt", b"x".to_vec(), "text/plain").await.unwrap();

        store.delete("k.txt").await.unwrap();
        store.delete("k.txt").await.unwrap();

        assert!(store.get("k.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_removes_emptied_directories() {
        let (tmp, store) = store();
        store.put("a/b/c.txt", b"hi".to_vec(), "text/plain").await.unwrap();
        store.delete("a/b/c.txt").await.unwrap();

        store.prune_empty_directories(&[]).await.unwrap();

        assert!(!tmp.path().join("a/b").exists());
        assert!(!tmp.path().join("a").exists());
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn test_prune_keeps_directories_with_files() {
        let (tmp, store) = store();
        store.put("a/keep.txt", b"x".to_vec(), "text/plain").await.unwrap();
        fs::create_dir_all(tmp.path().join("a/empty")).unwrap();

        store.prune_empty_directories(&[]).await.unwrap();

        assert!(tmp.path().join("a/keep.txt").is_file());
        assert!(!tmp.path().join("a/empty").exists());
    }

    #[tokio::test]
    async fn test_prune_skips_excluded_names() {
        let (tmp, store) = store();
        fs::create_dir_all(tmp.path().join(".git/refs")).unwrap();
        fs::create_dir_all(tmp.path().join("node_modules")).unwrap();

        store
            .prune_empty_directories(&[".git".to_owned(), "node_modules".to_owned()])
            .await
            .unwrap();

        assert!(tmp.path().join(".git/refs").is_dir());
        assert!(tmp.path().join("node_modules").is_dir());
    }

    #[tokio::test]
    async fn test_teardown_fails_soft() {
        let (_tmp, store) = store();
        store.put("k.txt", b"x".to_vec(), "text/plain").await.unwrap();

        store.teardown();

        assert!(store.root().is_none());
        assert!(store.get("k.txt").await.is_empty());
        assert_eq!(
            store.put("k.txt", b"y".to_vec(), "text/plain").await.unwrap_err().kind,
            StoreErrorKind::Unavailable
        );
        assert!(store.prune_empty_directories(&[]).await.is_ok());
    }

    #[test]
    fn test_name_is_root_directory_name() {
        let store = LocalDirectoryStore::new(PathBuf::from("/sites/my-blog"));

        assert_eq!(store.name(), "my-blog");
    }
}
