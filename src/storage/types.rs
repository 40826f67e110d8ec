use serde::{Deserialize, Serialize};

/// Storage backends an object can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Gcs,
}

impl StorageBackend {
    /// Normalizes a backend name: blank means `local`, comparison is case-insensitive.
    /// Unknown names fall back to `local`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "gcs" => StorageBackend::Gcs,
            "" | "local" => StorageBackend::Local,
            other => {
                log::warn!("Unknown storage backend '{}', using local", other);
                StorageBackend::Local
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::Gcs => "gcs",
        }
    }
}

/// Result of a successful save, enough to load the object back later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub storage_backend: StorageBackend,
    pub bucket: Option<String>,
    pub object_name: String,
    pub byte_size: i64,
    pub sha256: String,
}

/// Address of an object on a single backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: Option<String>,
    pub object_name: String,
}
