//! Object store trait and error types.
//!
//! Provides the core [`ObjectStore`] trait for abstracting object access across
//! backends, along with [`StoreError`] for unified error handling.
//!
//! # Key Convention
//!
//! All key parameters are **object keys**: slash-delimited relative paths without a
//! leading slash:
//! - `"index.json"` - top-level object
//! - `"pages/abc.vue"` - nested object
//! - `"blog/post/index.html"` - published page
//!
//! Backends map keys onto their own layout (S3 keys, directory entries, URLs).

use async_trait::async_trait;

/// Object content with its MIME type.
///
/// An empty body means the object is absent: read paths never fail, they return
/// an empty object instead.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw object bytes.
    pub body: Vec<u8>,
    /// MIME content type (may be empty when the backend does not know it).
    pub content_type: String,
}

impl StoredObject {
    /// Create an object from bytes and a content type.
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    /// The empty response returned for missing objects.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the object has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Body decoded as UTF-8 (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Object does not exist.
    NotFound,
    /// Key is missing or resolves to a directory (existence probe failure).
    NotAFile,
    /// Permission denied.
    PermissionDenied,
    /// Invalid key (e.g. escapes the store root).
    InvalidPath,
    /// Backend is not connected or was torn down.
    Unavailable,
    /// Backend does not accept writes.
    ReadOnly,
    /// Operation timed out.
    Timeout,
    /// Other/unknown error category.
    Other,
}

/// Retry guidance.
#[derive(Debug, PartialEq, Eq, Default)]
pub enum ErrorStatus {
    /// Don't retry (not found, invalid key, authentication).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
}

/// Store error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Object key context (if applicable).
    pub key: Option<String>,
    /// Backend identifier (e.g., "Fs", "S3", "Memory").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            status: ErrorStatus::Permanent,
            key: None,
            backend: None,
            source: None,
        }
    }

    /// Attach key context.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a "not a file" error for an existence probe.
    #[must_use]
    pub fn not_a_file(key: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotAFile).with_key(key)
    }

    /// Create a store error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error, key: Option<&str>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StoreErrorKind::PermissionDenied,
            std::io::ErrorKind::TimedOut => StoreErrorKind::Timeout,
            _ => StoreErrorKind::Other,
        };
        let status = match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
                ErrorStatus::Temporary
            }
            _ => ErrorStatus::Permanent,
        };
        let mut error = Self::new(kind).with_status(status).with_source(err);
        if let Some(k) = key {
            error = error.with_key(k);
        }
        error
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (key: a/b.txt)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::NotAFile => "Not a file",
            StoreErrorKind::PermissionDenied => "Permission denied",
            StoreErrorKind::InvalidPath => "Invalid path",
            StoreErrorKind::Unavailable => "Unavailable",
            StoreErrorKind::ReadOnly => "Read only",
            StoreErrorKind::Timeout => "Timeout",
            StoreErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(key) = &self.key {
            write!(f, " (key: {key})")?;
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Object store abstraction shared by every backend.
///
/// Implementations must be cheap to share behind an `Arc` and must never panic on
/// missing data. After [`teardown`](Self::teardown) every operation fails soft:
/// reads return empty objects and writes become no-ops or return
/// [`StoreErrorKind::Unavailable`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier for logs and errors.
    fn backend(&self) -> &'static str;

    /// Read an object.
    ///
    /// Returns an empty [`StoredObject`] when the key is missing or the backend is
    /// unavailable.
    async fn get(&self, key: &str) -> StoredObject;

    /// Probe whether `key` resolves to a file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::NotAFile`] if the key is missing or names a
    /// directory, or a transport error kind if the probe could not be made.
    async fn head(&self, key: &str) -> Result<(), StoreError>;

    /// Write an object, creating intermediate segments as needed.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Recursively remove directories that contain no files.
    ///
    /// Directories whose name is in `exclude` are left alone together with their
    /// contents. Flat key-space backends keep the default no-op.
    async fn prune_empty_directories(&self, exclude: &[String]) -> Result<(), StoreError> {
        let _ = exclude;
        Ok(())
    }

    /// Release live resources (network client, directory handle).
    fn teardown(&self) {}
}

/// Text convenience methods for [`ObjectStore`].
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    /// Read an object as UTF-8 text; empty string when missing.
    async fn get_text(&self, key: &str) -> String {
        self.get(key).await.text()
    }

    /// Write a UTF-8 text object.
    async fn put_text(&self, key: &str, text: &str, content_type: &str) -> Result<(), StoreError> {
        self.put(key, text.as_bytes().to_vec(), content_type).await
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_object_empty() {
        let object = StoredObject::empty();

        assert!(object.is_empty());
        assert_eq!(object.text(), "");
        assert_eq!(object.content_type, "");
    }

    #[test]
    fn test_stored_object_text() {
        let object = StoredObject::new("hi".as_bytes(), "text/plain");

        assert!(!object.is_empty());
        assert_eq!(object.text(), "hi");
        assert_eq!(object.content_type, "text/plain");
    }

    #[test]
    fn test_store_error_new() {
        let err = StoreError::new(StoreErrorKind::NotFound);

        assert_eq!(err.kind, StoreErrorKind::NotFound);
        assert_eq!(err.status, ErrorStatus::Permanent);
        assert!(err.key.is_none());
        assert!(err.backend.is_none());
    }

    #[test]
    fn test_store_error_not_a_file() {
        let err = StoreError::not_a_file("docs");

        assert_eq!(err.kind, StoreErrorKind::NotAFile);
        assert_eq!(err.key.as_deref(), Some("docs"));
    }

    #[test]
    fn test_store_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StoreError::new(StoreErrorKind::NotFound).with_source(io_err);

        assert!(err.downcast_source::<std::io::Error>().is_some());
    }

    #[test]
    fn test_store_error_io_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = StoreError::io(io_err, Some("a.txt"));

        assert_eq!(err.kind, StoreErrorKind::PermissionDenied);
        assert_eq!(err.key.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_store_error_io_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = StoreError::io(io_err, None);

        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert_eq!(err.status, ErrorStatus::Temporary);
    }

    #[test]
    fn test_store_error_display_simple() {
        let err = StoreError::new(StoreErrorKind::NotAFile);

        assert_eq!(err.to_string(), "Not a file");
    }

    #[test]
    fn test_store_error_display_full() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StoreError::new(StoreErrorKind::NotFound)
            .with_backend("Fs")
            .with_key("a/b.txt")
            .with_source(io_err);

        assert_eq!(
            err.to_string(),
            "[Fs] Not found: file not found (key: a/b.txt)"
        );
    }

    #[test]
    fn test_store_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }

    #[test]
    fn test_object_store_is_object_safe() {
        fn assert_dyn(_: Option<&dyn ObjectStore>) {}
        assert_dyn(None);
    }
}
