use serde::Deserialize;

use crate::storage::types::StorageBackend;

/// Upper bounds applied to every decoded image.
///
/// A value of `0` disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_pixels: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 4096,
            max_height: 4096,
            max_pixels: 4096 * 4096,
        }
    }
}

impl ImageLimits {
    pub fn unlimited() -> Self {
        Self {
            max_width: 0,
            max_height: 0,
            max_pixels: 0,
        }
    }
}

/// Where one family of binary objects is written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageTarget {
    /// `local` or `gcs`; empty means `local`
    pub backend: String,
    pub bucket: Option<String>,
    /// Directory for the local backend, relative paths resolve against the instance dir
    pub local_dir: String,
    /// Object name prefix
    pub prefix: String,
}

impl Default for StorageTarget {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            bucket: None,
            local_dir: "generated_images".to_string(),
            prefix: String::new(),
        }
    }
}

impl StorageTarget {
    pub fn local(local_dir: &str, prefix: &str) -> Self {
        Self {
            backend: "local".to_string(),
            bucket: None,
            local_dir: local_dir.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn storage_backend(&self) -> StorageBackend {
        StorageBackend::parse(&self.backend)
    }

    /// Bucket name with surrounding whitespace removed, `None` when blank.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}
