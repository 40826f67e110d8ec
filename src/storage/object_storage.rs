use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::configuration::StorageTarget;
use crate::error_handling::types::StorageError;
use crate::storage::file_storage::FileStorage;
use crate::storage::storage_trait::ObjectStore;
use crate::storage::types::{ObjectLocation, StorageBackend, StoredObject};

/// Backend-agnostic entry point for binary objects.
///
/// Callers describe *where* with a [`StorageTarget`] when saving and get a
/// [`StoredObject`] back. Loading with the same backend, bucket, object name and local
/// directory returns the same bytes, whichever backend wrote them.
#[derive(Clone)]
pub struct ObjectStorage {
    instance_dir: PathBuf,
    remote: Arc<dyn ObjectStore>,
}

impl ObjectStorage {
    pub fn new(instance_dir: impl Into<PathBuf>, remote: Arc<dyn ObjectStore>) -> Self {
        Self {
            instance_dir: instance_dir.into(),
            remote,
        }
    }

    /// Resolves a configured local directory; relative paths hang off the instance dir.
    pub fn local_dir(&self, local_dir: &str) -> PathBuf {
        let path = Path::new(local_dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.instance_dir.join(path)
        }
    }

    /// Persists `data` under `{prefix}/{random id}{extension}` on the target's backend.
    pub fn save(
        &self,
        target: &StorageTarget,
        data: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let backend = target.storage_backend();
        let object_name = build_object_name(&target.prefix, extension);
        let bucket = match backend {
            StorageBackend::Gcs => Some(target.bucket_name().map(str::to_string).ok_or_else(|| {
                StorageError::NotConfigured("a bucket is required for the gcs backend".into())
            })?),
            StorageBackend::Local => None,
        };
        let location = ObjectLocation {
            bucket: bucket.clone(),
            object_name: object_name.clone(),
        };
        match backend {
            StorageBackend::Gcs => self.remote.put(&location, data, content_type)?,
            StorageBackend::Local => {
                FileStorage::new(self.local_dir(&target.local_dir))?.put(&location, data, content_type)?
            }
        }
        Ok(StoredObject {
            storage_backend: backend,
            bucket,
            object_name,
            byte_size: data.len() as i64,
            sha256: sha256_hex(data),
        })
    }

    /// Loads an object, `Ok(None)` when it does not exist on its backend.
    pub fn load(
        &self,
        backend: &str,
        bucket: Option<&str>,
        object_name: &str,
        local_dir: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let location = ObjectLocation {
            bucket: bucket.map(str::to_string),
            object_name: object_name.to_string(),
        };
        match StorageBackend::parse(backend) {
            StorageBackend::Gcs => self.remote.get(&location),
            StorageBackend::Local => {
                let dir = self.local_dir(local_dir);
                if !dir.exists() {
                    debug!("Local dir {} does not exist", dir.display());
                    return Ok(None);
                }
                FileStorage::new(dir)?.get(&location)
            }
        }
    }
}

/// `{prefix}/{uuid hex}{extension}`, or just the id when the prefix is blank.
pub fn build_object_name(prefix: &str, extension: &str) -> String {
    let id = format!("{}{}", Uuid::new_v4().simple(), extension);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        id
    } else {
        format!("{}/{}", prefix, id)
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
