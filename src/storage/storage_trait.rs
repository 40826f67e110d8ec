//! Object Store Trait
//!
//! This module defines the `ObjectStore` trait, the interface every binary blob backend
//! implements.
//!
//! Implementors of this trait are responsible for:
//! - Writing an object under a caller-chosen name
//! - Reading an object back, reporting a missing object as `None`
//!
//! Naming, hashing and backend selection live in `ObjectStorage`, so a backend only
//! moves bytes.

use crate::error_handling::types::StorageError;
use crate::storage::types::ObjectLocation;

/// The `ObjectStore` trait defines the interface for binary object backends.
///
/// All methods are blocking and return a `Result` to handle potential storage errors.
/// Async callers run them on the blocking thread pool.
pub trait ObjectStore: Send + Sync {
    /// Writes `data` at `location`, overwriting nothing that already exists under a
    /// random name.
    ///
    /// - `content_type` - MIME type recorded by backends that support it.
    fn put(&self, location: &ObjectLocation, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Reads the object at `location`.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, StorageError>;
}
