//! Backend-agnostic attachment keys.
//!
//! Every container addresses artifacts by a [`RelativePath`]: a
//! forward-slash separated key that is identical across the local filesystem,
//! object stores and any other medium.
//!
//! # Examples
//!
//! ```
//! use attache_storage::RelativePath;
//!
//! let path = RelativePath::new(r"attachment\20261016\report.pdf");
//! assert_eq!(path.as_str(), "attachment/20261016/report.pdf");
//!
//! // Leading slashes from request targets are dropped
//! let path = RelativePath::new("/attachment/20261016/report.pdf");
//! assert_eq!(path.to_string(), "attachment/20261016/report.pdf");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};

/// Normalized key of a stored attachment.
///
/// Backslashes are rewritten to forward slashes and leading slashes are
/// stripped when the key is built, whatever separator the producing backend
/// uses natively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Build a normalized key.
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path.as_ref().replace('\\', "/");
        Self(normalized.trim_start_matches('/').to_string())
    }

    /// Build a key from a filesystem path relative to some container root.
    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// File extension of the last segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Segments of the key, skipping empty ones.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Check that the key can be joined onto a container root without
    /// escaping it.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(StorageError::InvalidPath("empty attachment path".to_string()));
        }
        if self.segments().any(|s| s == ".." || s.contains(':')) {
            return Err(StorageError::InvalidPath(self.0.clone()));
        }
        Ok(())
    }

    /// Join onto a base directory using the host separator.
    pub fn to_path_buf(&self, base: &Path) -> PathBuf {
        self.segments().fold(base.to_path_buf(), |path, s| path.join(s))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RelativePath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for RelativePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}
