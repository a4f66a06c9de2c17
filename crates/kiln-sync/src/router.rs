//! Scope-aware dispatch over the storage backends.
//!
//! Exactly one scope is active at a time: a remote bucket, a local directory, or
//! nothing. Reads fall through directory, remote, then the read-only runtime
//! fallback. Writes only reach storage while a scope is active.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use kiln_store::{ObjectStore, StoreError, StoredObject};
use kiln_store_fs::LocalDirectoryStore;
use kiln_store_s3::{ConnectError, Credential, CredentialError, CredentialStore, S3Connector};
use tokio::sync::watch;

/// Errors raised while activating a scope.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The remote service rejected the credential. Holds the service message.
    #[error("{0}")]
    Authentication(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("Cannot open directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ConnectError> for RouterError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Authentication { message, .. } => Self::Authentication(message),
        }
    }
}

/// Produces authenticated remote stores.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `bucket` and verify the credential.
    async fn connect(
        &self,
        bucket: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn ObjectStore>, RouterError>;
}

#[async_trait]
impl Connector for S3Connector {
    async fn connect(
        &self,
        bucket: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn ObjectStore>, RouterError> {
        let store = S3Connector::connect(self, bucket, credential).await?;
        Ok(Arc::new(store))
    }
}

/// The active persistence target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    None,
    Bucket(String),
    Directory { name: String, root: PathBuf },
}

impl Scope {
    /// Bucket or directory name; `None` without a scope.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Bucket(name) | Self::Directory { name, .. } => Some(name),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Default)]
struct Active {
    bucket: Option<String>,
    remote: Option<Arc<dyn ObjectStore>>,
    directory: Option<Arc<LocalDirectoryStore>>,
}

/// Routes store operations to the backend of the active scope.
///
/// The router is itself an [`ObjectStore`], so the rest of the engine never
/// needs to know which backend is live.
pub struct StorageRouter {
    active: RwLock<Active>,
    fallback: Arc<dyn ObjectStore>,
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    scope: watch::Sender<Scope>,
}

impl StorageRouter {
    /// Create a router with no active scope.
    #[must_use]
    pub fn new(
        fallback: Arc<dyn ObjectStore>,
        connector: Arc<dyn Connector>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            active: RwLock::new(Active::default()),
            fallback,
            connector,
            credentials,
            scope: watch::Sender::new(Scope::None),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Read-only runtime store used without a scope.
    #[must_use]
    pub fn fallback(&self) -> &Arc<dyn ObjectStore> {
        &self.fallback
    }

    /// Current scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope.borrow().clone()
    }

    /// Observe scope changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Scope> {
        self.scope.subscribe()
    }

    /// Activate a remote bucket.
    ///
    /// The previous scope is torn down first. On failure no scope is active.
    pub async fn activate_bucket(&self, name: &str, pin: Option<&str>) -> Result<(), RouterError> {
        self.clear();

        let credential = self.credentials.get(name, pin)?;
        let remote = self.connector.connect(name, &credential).await?;

        {
            let mut active = self.write();
            active.bucket = Some(name.to_owned());
            active.remote = Some(remote);
        }
        tracing::info!(bucket = name, "Bucket activated");
        self.scope.send_replace(Scope::Bucket(name.to_owned()));
        Ok(())
    }

    /// Activate a local directory. It shadows any remote store.
    pub async fn open_directory(&self, root: PathBuf) -> Result<Scope, RouterError> {
        self.clear();

        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|source| RouterError::Directory {
                path: root.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(RouterError::Directory {
                path: root,
                source: io::Error::from(io::ErrorKind::NotADirectory),
            });
        }

        let directory = Arc::new(LocalDirectoryStore::new(root.clone()));
        let name = directory.name();
        {
            let mut active = self.write();
            active.bucket = Some(name.clone());
            active.directory = Some(directory);
        }
        tracing::info!(directory = %root.display(), "Directory opened");
        let scope = Scope::Directory { name, root };
        self.scope.send_replace(scope.clone());
        Ok(scope)
    }

    /// Tear down the active scope.
    ///
    /// Operations already holding the old backend fail soft afterwards.
    pub fn clear(&self) {
        let previous = std::mem::take(&mut *self.write());
        if let Some(remote) = previous.remote {
            remote.teardown();
        }
        if let Some(directory) = previous.directory {
            directory.teardown();
        }
        if let Some(bucket) = previous.bucket {
            tracing::info!(bucket = %bucket, "Scope cleared");
        }
        self.scope.send_if_modified(|scope| {
            let changed = scope.is_active();
            *scope = Scope::None;
            changed
        });
    }

    fn reader(&self) -> Arc<dyn ObjectStore> {
        let active = self.read();
        if let Some(directory) = &active.directory {
            return Arc::clone(directory) as Arc<dyn ObjectStore>;
        }
        active
            .remote
            .as_ref()
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    fn writer(&self) -> Option<Arc<dyn ObjectStore>> {
        let active = self.read();
        active.bucket.as_ref()?;
        if let Some(directory) = &active.directory {
            return Some(Arc::clone(directory) as Arc<dyn ObjectStore>);
        }
        active.remote.as_ref().map(Arc::clone)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Active> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Active> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for StorageRouter {
    fn backend(&self) -> &'static str {
        self.reader().backend()
    }

    async fn get(&self, key: &str) -> StoredObject {
        self.reader().get(key).await
    }

    async fn head(&self, key: &str) -> Result<(), StoreError> {
        self.reader().head(key).await
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        match self.writer() {
            Some(store) => store.put(key, body, content_type).await,
            None => {
                tracing::debug!(key = %key, "No active scope, skipping write");
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.writer() {
            Some(store) => store.delete(key).await,
            None => Ok(()),
        }
    }

    async fn prune_empty_directories(&self, exclude: &[String]) -> Result<(), StoreError> {
        match self.writer() {
            Some(store) => store.prune_empty_directories(exclude).await,
            None => Ok(()),
        }
    }

    fn teardown(&self) {
        self.clear();
    }
}
