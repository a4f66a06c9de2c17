//! [`RemoteStore`]: object store over one S3 bucket.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use kiln_store::{ErrorStatus, ObjectStore, StoreError, StoreErrorKind, StoredObject, normalize_key};

use crate::error_chain;

/// Backend identifier for error messages.
const BACKEND: &str = "S3";

/// Object store over a single S3 bucket.
///
/// The client is dropped on [`teardown`](ObjectStore::teardown); from then on reads
/// return empty objects, probes fail with [`StoreErrorKind::Unavailable`] and
/// writes are skipped.
pub struct RemoteStore {
    bucket: String,
    client: RwLock<Option<Client>>,
}

impl RemoteStore {
    /// Wrap an already configured client.
    #[must_use]
    pub fn new(bucket: impl Into<String>, client: Client) -> Self {
        Self {
            bucket: bucket.into(),
            client: RwLock::new(Some(client)),
        }
    }

    /// Bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// True while the client is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn client(&self) -> Option<Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sdk_error<E, R>(err: &SdkError<E, R>, key: &str) -> StoreError
    where
        E: std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let (kind, status) = match err {
            SdkError::TimeoutError(_) => (StoreErrorKind::Timeout, ErrorStatus::Temporary),
            SdkError::DispatchFailure(_) => (StoreErrorKind::Unavailable, ErrorStatus::Temporary),
            _ => (StoreErrorKind::Other, ErrorStatus::Permanent),
        };
        StoreError::new(kind)
            .with_status(status)
            .with_key(key)
            .with_backend(BACKEND)
            .with_source(std::io::Error::other(error_chain(err)))
    }

    fn unavailable(key: &str) -> StoreError {
        StoreError::new(StoreErrorKind::Unavailable)
            .with_key(key)
            .with_backend(BACKEND)
    }
}

#[async_trait]
impl ObjectStore for RemoteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> StoredObject {
        let Some(client) = self.client() else {
            return StoredObject::empty();
        };
        let key = normalize_key(key);

        let output = match client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if !e
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    tracing::debug!(key = %key, error = %error_chain(&e), "S3 get failed");
                }
                return StoredObject::empty();
            }
        };

        let content_type = output.content_type().unwrap_or_default().to_owned();
        match output.body.collect().await {
            Ok(bytes) => StoredObject::new(bytes.into_bytes().to_vec(), content_type),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "S3 body read failed");
                StoredObject::empty()
            }
        }
    }

    async fn head(&self, key: &str) -> Result<(), StoreError> {
        let Some(client) = self.client() else {
            return Err(Self::unavailable(key));
        };
        let key = normalize_key(key);

        match client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(_)) => {
                Err(StoreError::not_a_file(key).with_backend(BACKEND))
            }
            Err(e) => Err(Self::sdk_error(&e, key)),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let Some(client) = self.client() else {
            tracing::debug!(key, "skipping write, S3 client torn down");
            return Ok(());
        };
        let key = normalize_key(key);

        client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Self::sdk_error(&e, key))?;

        tracing::debug!(key = %key, "Uploaded");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let Some(client) = self.client() else {
            tracing::debug!(key, "skipping delete, S3 client torn down");
            return Ok(());
        };
        let key = normalize_key(key);

        client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::sdk_error(&e, key))?;

        tracing::debug!(key = %key, "Deleted");
        Ok(())
    }

    fn teardown(&self) {
        let previous = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::debug!(bucket = %self.bucket, "S3 client torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .endpoint_url("http://127.0.0.1:9")
            .force_path_style(true)
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_new_is_connected() {
        let store = RemoteStore::new("site", offline_client());

        assert_eq!(store.bucket(), "site");
        assert!(store.is_connected());
    }

    #[tokio::test]
    async fn test_teardown_fails_soft() {
        let store = RemoteStore::new("site", offline_client());

        store.teardown();
        store.teardown();

        assert!(!store.is_connected());
        assert!(store.get("index.json").await.is_empty());
        assert!(store.put("k", b"v".to_vec(), "text/plain").await.is_ok());
        assert!(store.delete("k").await.is_ok());
        let err = store.head("k").await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Unavailable);
        assert_eq!(err.backend, Some("S3"));
    }
}
