use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use log::{debug, error, info};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::ObjectStore;
use crate::storage::types::ObjectLocation;

/// Local filesystem backend. Object names map to paths below `base_path`.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create storage dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed
        })?;
        debug!("FileStorage initialized at {}", base_path.display());
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // Only plain relative components are accepted.
    fn object_path(&self, object_name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(object_name);
        let is_safe = !object_name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_safe {
            error!("Rejected object name {:?}", object_name);
            return Err(StorageError::ReadFailed);
        }
        Ok(self.base_path.join(relative))
    }
}

impl ObjectStore for FileStorage {
    fn put(&self, location: &ObjectLocation, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.object_path(&location.object_name).map_err(|_| StorageError::WriteFailed)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create dir {}: {}", parent.display(), e);
                StorageError::WriteFailed
            })?;
        }
        let mut f = File::create(&path).map_err(|e| {
            error!("Failed to create object file {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        f.write_all(data).map_err(|e| {
            error!("Write failed {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        info!("Stored {} byte(s) at {}", data.len(), path.display());
        Ok(())
    }

    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, StorageError> {
        let path = match self.object_path(&location.object_name) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        let mut buf = Vec::new();
        match File::open(&path).and_then(|mut f| f.read_to_end(&mut buf)) {
            Ok(_) => {
                debug!("Read {} byte(s) from {}", buf.len(), path.display());
                Ok(Some(buf))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Object {} not found", path.display());
                Ok(None)
            }
            Err(e) => {
                error!("Read failed {}: {}", path.display(), e);
                Err(StorageError::ReadFailed)
            }
        }
    }
}
