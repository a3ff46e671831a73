//! Local filesystem container.
//!
//! This is the usual primary container: attachments live as plain files under
//! a root directory (typically the web root) so they can be served directly.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::path::RelativePath;
use crate::traits::{ArtifactSource, AttachmentContainer};

/// Default request-target prefix for locally served attachments.
pub const DEFAULT_TARGET_PREFIX: &str = "/attachment";

/// Local filesystem container.
///
/// Stores each artifact at `root/<key>`, the key's segments mapped onto the
/// host's directory separator.
#[derive(Debug, Clone)]
pub struct LocalContainer {
    root: PathBuf,
    target_prefix: String,
    name: String,
}

impl LocalContainer {
    /// Create a container rooted at `root`.
    ///
    /// The root is created lazily on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        Self {
            root,
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
            name,
        }
    }

    /// Serve (and generate keys) under a different target prefix.
    pub fn with_target_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target_prefix = prefix.into();
        self
    }

    /// Get the root directory of this container.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_fs_path(&self, path: &RelativePath) -> Result<PathBuf> {
        path.validate()?;
        Ok(path.to_path_buf(&self.root))
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentContainer for LocalContainer {
    #[instrument(skip(self, source), fields(container = %self.name, source = %source.path.display()))]
    async fn save(&self, source: &ArtifactSource) -> Result<RelativePath> {
        let key = source.key_or_generate(&self.target_prefix)?;
        let fs_path = self.to_fs_path(&key)?;

        if !fs::try_exists(&source.path).await? {
            return Err(StorageError::NotFound(source.path.display().to_string()));
        }

        // Replicating onto the very file we were handed is a no-op.
        if fs_path == source.path {
            debug!("Source already stored at {:?}", fs_path);
            return Ok(key);
        }

        self.ensure_parent(&fs_path).await?;
        let size = fs::copy(&source.path, &fs_path).await?;
        debug!("Stored {} bytes at {:?}", size, fs_path);
        Ok(key)
    }

    #[instrument(skip(self), fields(container = %self.name, path = %path))]
    async fn fetch(&self, path: &RelativePath) -> Result<Option<PathBuf>> {
        let fs_path = self.to_fs_path(path)?;
        match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_file() => Ok(Some(fs_path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(container = %self.name, path = %path))]
    async fn delete(&self, path: &RelativePath) -> Result<bool> {
        let fs_path = self.to_fs_path(path)?;
        debug!("Deleting {:?}", fs_path);

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn relative_path_of(&self, handle: &Path) -> Result<Option<RelativePath>> {
        match handle.strip_prefix(&self.root) {
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
