//! Object storage for profile images.
//!
//! [`HttpObjectStorage`] talks to a Supabase-style storage REST API:
//!
//! - upload: `POST {url}/storage/v1/object/{bucket}/{path}` with the service
//!   key as bearer token and `x-upsert: true`
//! - public URL: `{url}/storage/v1/object/public/{bucket}/{path}`
//!
//! [`MemoryObjectStorage`] keeps objects in a map for tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::config::StorageConfig;

/// Errors from the object storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storage service answered with a non-success status.
    #[error("upload rejected ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for logs.
        body: String,
    },

    /// Local backend failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A bucket that accepts uploads and serves them publicly.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload (or overwrite) the object at `path`.
    async fn put(&self, path: &str, content_type: &str, body: Vec<u8>)
    -> Result<(), StorageError>;

    /// Publicly resolvable URL for the object at `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Storage REST API client.
#[derive(Clone)]
pub struct HttpObjectStorage {
    inner: Arc<HttpObjectStorageInner>,
}

struct HttpObjectStorageInner {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: SecretString,
}

impl HttpObjectStorage {
    /// Create a client for the configured bucket.
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            inner: Arc::new(HttpObjectStorageInner {
                client: reqwest::Client::new(),
                base_url: config.url.trim_end_matches('/').to_owned(),
                bucket: config.bucket.clone(),
                service_key: config.service_key.clone(),
            }),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.inner.base_url, self.inner.bucket, path
        )
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), StorageError> {
        let response = self
            .inner
            .client
            .post(self.object_url(path))
            .bearer_auth(self.inner.service_key.expose_secret())
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(path = %path, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.inner.base_url, self.inner.bucket, path
        )
    }
}

/// An object held by [`MemoryObjectStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// In-memory bucket for tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStorage {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a stored object.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(path).cloned())
    }

    /// Paths of all stored objects.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), StorageError> {
        self.objects
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_owned()))?
            .insert(
                path.to_owned(),
                StoredObject {
                    content_type: content_type.to_owned(),
                    body,
                },
            );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_urls() {
        let storage = HttpObjectStorage::new(&StorageConfig {
            url: "https://abc.storage.example/".to_owned(),
            bucket: "delivery-assets".to_owned(),
            service_key: SecretString::from("k"),
        });

        assert_eq!(
            storage.object_url("profile-images/kp_1_5.png"),
            "https://abc.storage.example/storage/v1/object/delivery-assets/profile-images/kp_1_5.png"
        );
        assert_eq!(
            storage.public_url("profile-images/kp_1_5.png"),
            "https://abc.storage.example/storage/v1/object/public/delivery-assets/profile-images/kp_1_5.png"
        );
    }

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryObjectStorage::new("https://cdn.test/");
        storage
            .put("a/b.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();

        let stored = storage.get("a/b.png").unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.body, vec![1, 2, 3]);
        assert_eq!(storage.public_url("a/b.png"), "https://cdn.test/a/b.png");
    }
}
