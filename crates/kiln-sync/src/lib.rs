//! Storage routing and artifact synchronization for kiln.
//!
//! - [`StorageRouter`]: one [`ObjectStore`](kiln_store::ObjectStore) facade over the
//!   active scope (remote bucket or local directory) with a read-only runtime
//!   fallback
//! - [`SyncEngine`]: debounced regeneration of every published artifact, hydration
//!   on scope activation and build asset reconciliation
//! - [`EditorModelCache`]: per-page editor buffers written back after edits
//! - [`ImageAssetTracker`]: transient image URLs and orphaned image cleanup
//!
//! # Example
//!
//! ```ignore
//! let router = Arc::new(StorageRouter::new(runtime, Arc::new(S3Connector::new()), credentials));
//! let engine = SyncEngine::new(Arc::clone(&router) as _, runtime, SyncOptions::default());
//!
//! router.activate_bucket("my-site", None).await?;
//! engine.hydrate().await;
//! engine.flush().await;
//! ```

mod debouncer;
mod editor;
mod engine;
mod images;
mod router;
mod state;
mod task;

pub use debouncer::Debouncer;
pub use editor::{EditorBuffer, EditorModelCache};
pub use engine::{ManifestDiff, SyncEngine, SyncOptions};
pub use images::{ImageAssetTracker, ObjectUrlRegistry};
pub use router::{Connector, RouterError, Scope, StorageRouter};
pub use state::{SiteData, SiteState};
pub use task::SyncTask;
