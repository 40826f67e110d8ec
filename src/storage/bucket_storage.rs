use std::time::Duration;

use log::{debug, error, info};
use reqwest::blocking::Client as HttpClient;
use reqwest::{StatusCode, Url};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::ObjectStore;
use crate::storage::types::ObjectLocation;

/// Cloud Storage backend speaking the JSON API (`/storage/v1`, `/upload/storage/v1`).
pub struct BucketStorage {
    api_base: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl BucketStorage {
    pub fn new(api_base: &str, access_token: Option<String>) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            access_token,
            timeout: Duration::from_secs(60),
        }
    }

    // Built per call: the blocking client must not live on an async worker.
    fn client(&self) -> Result<HttpClient, StorageError> {
        HttpClient::builder().timeout(self.timeout).build().map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            StorageError::ConnectionFailed
        })
    }

    fn url_with_segments(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            error!("Invalid bucket api base {}: {}", self.api_base, e);
            StorageError::NotConfigured("bucket_api.api_base".into())
        })?;
        url.path_segments_mut()
            .map_err(|_| StorageError::NotConfigured("bucket_api.api_base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET {base}/storage/v1/b/{bucket}/o/{object}?alt=media`
    pub fn download_url(&self, bucket: &str, object_name: &str) -> Result<Url, StorageError> {
        let mut url = self.url_with_segments(&["storage", "v1", "b", bucket, "o", object_name])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// `POST {base}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}`
    pub fn upload_url(&self, bucket: &str, object_name: &str) -> Result<Url, StorageError> {
        let mut url = self.url_with_segments(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ObjectStore for BucketStorage {
    fn put(&self, location: &ObjectLocation, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let bucket = location
            .bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("a bucket is required for the gcs backend".into()))?;
        let url = self.upload_url(bucket, &location.object_name)?;
        let response = self
            .authorize(self.client()?.post(url))
            .header("Content-Type", content_type)
            .body(data.to_vec())
            .send()
            .map_err(|e| {
                error!("Upload to gs://{}/{} failed: {}", bucket, location.object_name, e);
                StorageError::WriteFailed
            })?;
        if !response.status().is_success() {
            error!(
                "Upload to gs://{}/{} returned {}",
                bucket,
                location.object_name,
                response.status()
            );
            return Err(StorageError::WriteFailed);
        }
        info!("Stored {} byte(s) at gs://{}/{}", data.len(), bucket, location.object_name);
        Ok(())
    }

    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(bucket) = location.bucket.as_deref() else {
            debug!("No bucket for {}, treating as missing", location.object_name);
            return Ok(None);
        };
        let url = self.download_url(bucket, &location.object_name)?;
        let response = self.authorize(self.client()?.get(url)).send().map_err(|e| {
            error!("Download of gs://{}/{} failed: {}", bucket, location.object_name, e);
            StorageError::ReadFailed
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("gs://{}/{} not found", bucket, location.object_name);
                Ok(None)
            }
            status if status.is_success() => {
                let bytes = response.bytes().map_err(|e| {
                    error!("Reading gs://{}/{} failed: {}", bucket, location.object_name, e);
                    StorageError::ReadFailed
                })?;
                Ok(Some(bytes.to_vec()))
            }
            status => {
                error!("Download of gs://{}/{} returned {}", bucket, location.object_name, status);
                Err(StorageError::ReadFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names_are_escaped_in_download_url() {
        let storage = BucketStorage::new("https://storage.example.test/", None);
        let url = storage.download_url("bucket-a", "chat/abc.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example.test/storage/v1/b/bucket-a/o/chat%2Fabc.png?alt=media"
        );
    }

    #[test]
    fn test_upload_url_carries_name_query() {
        let storage = BucketStorage::new("https://storage.example.test", None);
        let url = storage.upload_url("bucket-a", "gen/x.jpg").unwrap();
        assert_eq!(url.path(), "/upload/storage/v1/b/bucket-a/o");
        assert!(url.query().unwrap_or_default().contains("name=gen%2Fx.jpg"));
    }

    #[test]
    fn test_missing_bucket() {
        let storage = BucketStorage::new("https://storage.example.test", None);
        let location = ObjectLocation {
            bucket: None,
            object_name: "a.png".into(),
        };
        assert_eq!(storage.get(&location).unwrap(), None);
        assert!(matches!(
            storage.put(&location, b"x", "image/png"),
            Err(StorageError::NotConfigured(_))
        ));
    }
}
