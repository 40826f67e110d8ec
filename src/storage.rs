//! Storage subsystem
//!
//! This module provides the persistence layer: binary objects (generated images, chat
//! attachments) and the relational database holding every record that points at them.
//!
//! Components:
//! - `storage_trait`: the ObjectStore trait every blob backend implements.
//! - `types`: shared data types used by storage backends.
//! - `file_storage`: local filesystem backend.
//! - `bucket_storage`: Cloud Storage backend over its JSON API.
//! - `object_storage`: backend-agnostic save/load with naming and hashing.
//! - `database_storage`: SeaORM connection and schema creation for SQLite.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod bucket_storage;
pub mod database_storage;
pub mod db_entities;
pub mod file_storage;
pub mod object_storage;
pub mod storage_trait;
pub mod types;

pub use object_storage::ObjectStorage;
pub use types::{StorageBackend, StoredObject};
