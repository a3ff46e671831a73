//! Core container trait definitions.
//!
//! The `AttachmentContainer` trait is the capability contract every storage
//! medium (local filesystem, S3, ...) implements. The replication layer only
//! ever holds `Arc<dyn AttachmentContainer>`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path::RelativePath;

/// A locally available file handed to a container's `save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    /// Local file holding the bytes to store
    pub path: PathBuf,
    /// Key to store under; `None` lets the container assign one
    pub key: Option<RelativePath>,
}

impl ArtifactSource {
    /// A fresh upload. The receiving container picks the key.
    pub fn upload(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: None,
        }
    }

    /// A copy of an artifact already persisted elsewhere under `key`.
    pub fn replica(path: impl Into<PathBuf>, key: RelativePath) -> Self {
        Self {
            path: path.into(),
            key: Some(key),
        }
    }

    /// Whether this source carries a key assigned by another container.
    pub fn is_replica(&self) -> bool {
        self.key.is_some()
    }

    /// Resolve the key to store under.
    ///
    /// Replicas keep their key. Uploads get
    /// `<prefix>/<yyyyMMdd>/<uuid><.ext>`, with the extension taken from the
    /// source file name.
    pub fn key_or_generate(&self, target_prefix: &str) -> Result<RelativePath> {
        let key = match &self.key {
            Some(key) => key.clone(),
            None => {
                let day = chrono::Local::now().format("%Y%m%d");
                let id = uuid::Uuid::new_v4().simple();
                let ext = self
                    .path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                    .unwrap_or_default();
                let prefix = target_prefix.trim_matches('/');
                if prefix.is_empty() {
                    RelativePath::new(format!("{}/{}{}", day, id, ext))
                } else {
                    RelativePath::new(format!("{}/{}/{}{}", prefix, day, id, ext))
                }
            }
        };
        key.validate()?;
        Ok(key)
    }
}

/// Uniform capability set of an attachment storage medium.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one container instance serves all
/// concurrent requests of the process.
///
/// # Error Handling
///
/// Absence is not an error. `fetch` and `relative_path_of` return `Ok(None)`
/// and `delete` returns `Ok(false)` when there is nothing to act on;
/// `StorageError` is reserved for real failures (I/O, network, bad keys).
#[async_trait]
pub trait AttachmentContainer: Send + Sync {
    /// Persist the source file and return the key it is stored under.
    ///
    /// Replicas must be stored under their given key.
    async fn save(&self, source: &ArtifactSource) -> Result<RelativePath>;

    /// Resolve a key to a local file holding the artifact.
    ///
    /// Remote containers materialize the object locally first.
    async fn fetch(&self, path: &RelativePath) -> Result<Option<PathBuf>>;

    /// Remove the artifact. Returns `true` if something was deleted.
    async fn delete(&self, path: &RelativePath) -> Result<bool>;

    /// Map a local handle produced by this container back to its key.
    fn relative_path_of(&self, handle: &Path) -> Result<Option<RelativePath>>;

    /// Request-target prefix under which this container's attachments are
    /// served, e.g. `/attachment`.
    fn target_prefix(&self) -> &str;

    /// Human-readable identity used in logs and metrics.
    fn name(&self) -> &str;
}
