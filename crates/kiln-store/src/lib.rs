//! Object store abstraction for the kiln site engine.
//!
//! This crate provides the [`ObjectStore`] trait: one capability contract that the
//! remote bucket backend, the local directory backend and the read-only runtime
//! backend all implement. The rest of the engine only ever talks to this trait.
//!
//! # Contract
//!
//! - [`ObjectStore::get`] never fails. A missing key yields an empty [`StoredObject`].
//! - [`ObjectStore::head`] is an existence probe. It fails with
//!   [`StoreErrorKind::NotAFile`] when the key is missing or names a directory.
//! - [`ObjectStore::put`] overwrites unconditionally and creates parent segments.
//! - [`ObjectStore::delete`] is idempotent.
//! - [`ObjectStore::prune_empty_directories`] is only meaningful for hierarchical
//!   backends and defaults to a no-op.
//!
//! # Example
//!
//! ```ignore
//! use kiln_store::{MemoryStore, ObjectStore, ObjectStoreExt};
//!
//! let store = MemoryStore::new();
//! store.put("a/b/c.txt", b"hi".to_vec(), "text/plain").await?;
//! assert_eq!(store.get_text("a/b/c.txt").await, "hi");
//! ```

mod content_type;
mod key;
#[cfg(feature = "mock")]
mod memory;
mod store;

pub use content_type::guess_content_type;
pub use key::{normalize_key, split_key};
#[cfg(feature = "mock")]
pub use memory::{MemoryStore, StoreOp};
pub use store::{
    ErrorStatus, ObjectStore, ObjectStoreExt, StoreError, StoreErrorKind, StoredObject,
};
