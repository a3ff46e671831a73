//! S3-compatible object storage container.
//!
//! Uses the `object_store` crate for S3, MinIO, and other S3-compatible services.
//! Objects are materialized into a local cache directory on fetch so callers
//! always receive a local file handle.
//!
//! # Configuration
//!
//! ```toml
//! [[secondaries]]
//! type = "s3"
//! bucket = "attachments"
//! region = "us-east-1"
//! prefix = "mirror/"
//! cache_dir = "./cache/s3"
//!
//! # Optional: For MinIO or other S3-compatible services
//! endpoint = "http://localhost:9000"
//! force_path_style = true
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::local::DEFAULT_TARGET_PREFIX;
use crate::path::RelativePath;
use crate::traits::{ArtifactSource, AttachmentContainer};

/// Configuration for S3 storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Optional prefix for all object keys
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional custom endpoint (for MinIO, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Use path-style requests (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Optional access key (if not using IAM/env credentials)
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Optional secret key
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow HTTP (non-HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

impl S3Config {
    /// Create a new S3 configuration for AWS.
    pub fn aws(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            prefix: None,
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }

    /// Create configuration for MinIO or other S3-compatible services.
    pub fn minio(bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            prefix: None,
            endpoint: Some(endpoint.into()),
            force_path_style: true,
            access_key_id: None,
            secret_access_key: None,
            allow_http: true,
        }
    }

    /// Set optional prefix for all object keys.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

/// S3-compatible object storage container.
#[derive(Clone)]
pub struct S3Container {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    cache_dir: PathBuf,
    target_prefix: String,
    name: String,
}

impl S3Container {
    /// Create a new S3 container from configuration.
    ///
    /// Fetched objects are downloaded below `cache_dir`.
    pub fn new(config: S3Config, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        if config.force_path_style {
            builder = builder.with_virtual_hosted_style_request(false);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut container = Self::from_store(
            Arc::new(store),
            config.prefix.unwrap_or_default(),
            cache_dir,
        );
        container.name = format!("s3:{}", config.bucket);
        Ok(container)
    }

    /// Create from an existing ObjectStore instance.
    pub fn from_store(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        let prefix = prefix.into();
        let name = format!("object-store:{}", prefix.trim_end_matches('/'));
        Self {
            store,
            prefix,
            cache_dir: cache_dir.into(),
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
            name,
        }
    }

    /// Generate keys under a different target prefix.
    pub fn with_target_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target_prefix = prefix.into();
        self
    }

    /// Local directory holding materialized objects.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Convert RelativePath to object_store Path.
    fn to_object_path(&self, path: &RelativePath) -> Result<ObjectPath> {
        path.validate()?;
        let path_str = if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        };
        Ok(ObjectPath::from(path_str))
    }

    /// Write a downloaded object to its cache path.
    ///
    /// The bytes land in a uniquely named sibling first and are renamed into
    /// place, so a handle handed to an earlier caller never sees a truncated
    /// or half-written file.
    async fn materialize(&self, local: &Path, data: &[u8]) -> Result<()> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = local.with_file_name(format!(
            ".{}.{}.part",
            file_name,
            uuid::Uuid::new_v4().simple()
        ));

        fs::write(&staging, data).await?;
        if let Err(e) = fs::rename(&staging, local).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn evict_cached(&self, path: &RelativePath) -> Result<()> {
        match fs::remove_file(path.to_path_buf(&self.cache_dir)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for S3Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Container")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

#[async_trait]
impl AttachmentContainer for S3Container {
    #[instrument(skip(self, source), fields(container = %self.name, source = %source.path.display()))]
    async fn save(&self, source: &ArtifactSource) -> Result<RelativePath> {
        let key = source.key_or_generate(&self.target_prefix)?;
        let obj_path = self.to_object_path(&key)?;

        let data = match fs::read(&source.path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(source.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Writing {} bytes to s3://{}", data.len(), obj_path);
        self.store.put(&obj_path, data.into()).await?;

        // A stale local copy would shadow the new object on the next fetch.
        self.evict_cached(&key).await?;
        Ok(key)
    }

    #[instrument(skip(self), fields(container = %self.name, path = %path))]
    async fn fetch(&self, path: &RelativePath) -> Result<Option<PathBuf>> {
        let obj_path = self.to_object_path(path)?;
        debug!("Reading from s3://{}", obj_path);

        let data = match self.store.get(&obj_path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(StorageError::from(e)),
        };

        let local = path.to_path_buf(&self.cache_dir);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.materialize(&local, &data).await?;
        Ok(Some(local))
    }

    #[instrument(skip(self), fields(container = %self.name, path = %path))]
    async fn delete(&self, path: &RelativePath) -> Result<bool> {
        let obj_path = self.to_object_path(path)?;
        debug!("Deleting s3://{}", obj_path);

        let existed = match self.store.head(&obj_path).await {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => false,
            Err(e) => return Err(StorageError::from(e)),
        };

        if existed {
            match self.store.delete(&obj_path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(StorageError::from(e)),
            }
        }

        self.evict_cached(path).await?;
        Ok(existed)
    }

    fn relative_path_of(&self, handle: &Path) -> Result<Option<RelativePath>> {
        match handle.strip_prefix(&self.cache_dir) {
            Ok(relative) if relative.as_os_str().is_empty() => Ok(None),
            Ok(relative) => Ok(Some(RelativePath::from_path(relative))),
            Err(_) => Ok(None),
        }
    }

    fn target_prefix(&self) -> &str {
        &self.target_prefix
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    fn create_test_container(prefix: &str) -> (S3Container, Arc<InMemory>, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(InMemory::new());
        let container = S3Container::from_store(store.clone(), prefix, temp.path().join("cache"));
        (container, store, temp)
    }

    async fn write_source(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).await.unwrap();
        path
    }

    #[test]
    fn test_s3_config_aws() {
        let config = S3Config::aws("my-bucket", "us-west-2");
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.region, "us-west-2");
        assert!(!config.force_path_style);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_s3_config_minio() {
        let config = S3Config::minio("local-bucket", "http://localhost:9000");
        assert_eq!(config.bucket, "local-bucket");
        assert!(config.force_path_style);
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
    }

    #[test]
    fn test_to_object_path_with_prefix() {
        let (container, _store, _temp) = create_test_container("mirror/");
        let obj_path = container
            .to_object_path(&RelativePath::new("uploads/a.txt"))
            .unwrap();
        assert_eq!(obj_path.as_ref(), "mirror/uploads/a.txt");
    }

    #[tokio::test]
    async fn test_replica_save_and_fetch() {
        let (container, store, temp) = create_test_container("mirror");
        let source = write_source(&temp, "a.txt", b"replicated").await;
        let key = RelativePath::new("uploads/a.txt");

        let saved = container
            .save(&ArtifactSource::replica(&source, key.clone()))
            .await
            .unwrap();
        assert_eq!(saved, key);

        let stored = store
            .get(&ObjectPath::from("mirror/uploads/a.txt"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored, Bytes::from_static(b"replicated"));

        let handle = container.fetch(&key).await.unwrap().unwrap();
        assert!(handle.starts_with(container.cache_dir()));
        assert_eq!(fs::read(&handle).await.unwrap(), b"replicated");
        assert_eq!(container.relative_path_of(&handle).unwrap(), Some(key));
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let (container, _store, _temp) = create_test_container("");
        let result = container.fetch(&RelativePath::new("uploads/none.txt")).await;
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_cache() {
        let (container, _store, temp) = create_test_container("");
        let source = write_source(&temp, "a.txt", b"x").await;
        let key = container.save(&ArtifactSource::upload(&source)).await.unwrap();
        let handle = container.fetch(&key).await.unwrap().unwrap();

        assert!(container.delete(&key).await.unwrap());
        assert!(!handle.exists());
        assert!(container.fetch(&key).await.unwrap().is_none());
        assert!(!container.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_missing_source() {
        let (container, _store, temp) = create_test_container("");
        let result = container
            .save(&ArtifactSource::upload(temp.path().join("missing.bin")))
            .await;
        assert!(matches!(result.unwrap_err(), StorageError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_see_whole_object() {
        let (container, _store, temp) = create_test_container("");
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let source = write_source(&temp, "large.bin", &payload).await;
        let key = container.save(&ArtifactSource::upload(&source)).await.unwrap();
        let container = Arc::new(container);

        for _ in 0..20 {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let container = container.clone();
                    let key = key.clone();
                    tokio::spawn(async move {
                        let handle = container.fetch(&key).await.unwrap().unwrap();
                        fs::read(&handle).await.unwrap()
                    })
                })
                .collect();

            for reader in readers {
                let data = reader.await.unwrap();
                assert_eq!(data.len(), payload.len());
                assert!(data == payload);
            }
        }

        // Staging files never outlive a fetch
        let handle = container.fetch(&key).await.unwrap().unwrap();
        let entries = std::fs::read_dir(handle.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    // Integration tests require actual S3/MinIO - run with:
    // cargo test -p attache-storage --features s3 -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_s3_integration() {
        let config = S3Config::minio("test-bucket", "http://localhost:9000")
            .with_credentials("minioadmin", "minioadmin");
        let temp = TempDir::new().unwrap();
        let container = S3Container::new(config, temp.path().join("cache")).unwrap();
        let source = write_source(&temp, "integration.bin", b"integration test data").await;

        let key = container.save(&ArtifactSource::upload(&source)).await.unwrap();
        let handle = container.fetch(&key).await.unwrap().unwrap();
        assert_eq!(fs::read(&handle).await.unwrap(), b"integration test data");

        assert!(container.delete(&key).await.unwrap());
        assert!(container.fetch(&key).await.unwrap().is_none());
    }
}
