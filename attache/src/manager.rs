//! Replication across one primary and any number of secondary containers.
//!
//! - **save**: primary first (must succeed), then the persisted file is copied
//!   to every secondary. Secondary failures are logged and ignored.
//! - **fetch**: primary first, then secondaries in registration order. First
//!   existing hit wins.
//! - **delete**: secondaries first, then primary. The primary's answer is the
//!   result.
//!
//! The secondary list is copy-on-write: every mutation builds a new `Vec` and
//! swaps the `Arc`, so an operation iterates one consistent snapshot.

use attache_storage::{ArtifactSource, AttachmentContainer, RelativePath, StorageError};
use futures::future::join_all;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::{Error, Result};

type Containers = Arc<Vec<Arc<dyn AttachmentContainer>>>;

/// A fetched attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Local file holding the artifact
    pub path: PathBuf,
    /// Name of the container that served it
    pub backend: String,
}

/// Outcome of routing a request target through [`AttachmentManager::fetch_target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRoute {
    /// Not an attachment target of the current primary
    NotServed,
    /// An attachment target that no reachable container holds
    Missing,
    Served(Attachment),
}

pub struct AttachmentManager {
    primary: RwLock<Arc<dyn AttachmentContainer>>,
    secondaries: RwLock<Containers>,
}

impl AttachmentManager {
    pub fn new(primary: Arc<dyn AttachmentContainer>) -> Self {
        Self::with_secondaries(primary, Vec::new())
    }

    pub fn with_secondaries(
        primary: Arc<dyn AttachmentContainer>,
        secondaries: Vec<Arc<dyn AttachmentContainer>>,
    ) -> Self {
        Self {
            primary: RwLock::new(primary),
            secondaries: RwLock::new(Arc::new(secondaries)),
        }
    }

    /// Current primary container.
    pub fn primary(&self) -> Arc<dyn AttachmentContainer> {
        self.primary.read().clone()
    }

    /// Replace the primary. Operations already running keep the old one.
    pub fn set_primary(&self, container: Arc<dyn AttachmentContainer>) {
        debug!("Primary container set to {}", container.name());
        *self.primary.write() = container;
    }

    /// Snapshot of the secondary containers in registration order.
    pub fn secondaries(&self) -> Containers {
        self.secondaries.read().clone()
    }

    /// Append a secondary container.
    pub fn add_secondary(&self, container: Arc<dyn AttachmentContainer>) {
        debug!("Adding secondary container {}", container.name());
        let mut guard = self.secondaries.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(container);
        *guard = Arc::new(next);
    }

    /// Replace all secondary containers.
    pub fn set_secondaries(&self, containers: Vec<Arc<dyn AttachmentContainer>>) {
        *self.secondaries.write() = Arc::new(containers);
    }

    /// Store an uploaded file and replicate it.
    ///
    /// Returns the key assigned by the primary. Fails only when the primary
    /// fails, in which case no secondary is contacted.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub async fn save(&self, source: &Path) -> Result<RelativePath> {
        let primary = self.primary();
        let primary_failure = |err: StorageError| Error::PrimaryWrite {
            backend: primary.name().to_string(),
            source: err,
        };

        let key = primary
            .save(&ArtifactSource::upload(source))
            .await
            .map_err(primary_failure)?;
        let handle = primary
            .fetch(&key)
            .await
            .map_err(primary_failure)?
            .ok_or_else(|| primary_failure(StorageError::NotFound(key.to_string())))?;
        debug!("Primary {} stored {}", primary.name(), key);

        // Secondaries copy what the primary persisted, not the caller's file.
        let replica = ArtifactSource::replica(handle, key.clone());
        let secondaries = self.secondaries();
        let targets = mirrors_of(&secondaries, &primary);
        let results = join_all(targets.iter().map(|container| {
            let replica = &replica;
            async move { container.save(replica).await }
        }))
        .await;

        for (container, result) in targets.iter().zip(results) {
            match result {
                Ok(_) => debug!("Replicated {} to {}", key, container.name()),
                Err(e) => record_failure(container.as_ref(), "save", &key, &e),
            }
        }

        Ok(key)
    }

    /// Resolve a key to a local file, falling back through the secondaries.
    ///
    /// Never fails: backend errors are logged and the search goes on. `None`
    /// means no reachable container has the attachment.
    #[instrument(skip(self))]
    pub async fn fetch(&self, path: &str) -> Option<Attachment> {
        let primary = self.primary();
        self.fetch_from(&primary, &RelativePath::new(path)).await
    }

    async fn fetch_from(
        &self,
        primary: &Arc<dyn AttachmentContainer>,
        key: &RelativePath,
    ) -> Option<Attachment> {
        if let Some(handle) = lookup(primary.as_ref(), key).await {
            return Some(Attachment {
                path: handle,
                backend: primary.name().to_string(),
            });
        }

        let secondaries = self.secondaries();
        for container in mirrors_of(&secondaries, primary) {
            if let Some(handle) = lookup(container.as_ref(), key).await {
                debug!("Serving {} from secondary {}", key, container.name());
                metrics::counter!(
                    "attache_fetch_fallbacks_total",
                    "backend" => container.name().to_string()
                )
                .increment(1);
                return Some(Attachment {
                    path: handle,
                    backend: container.name().to_string(),
                });
            }
        }

        debug!("Attachment {} not found in any container", key);
        None
    }

    /// Delete from every secondary, then from the primary.
    ///
    /// Returns whether the primary deleted the attachment.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> bool {
        let key = RelativePath::new(path);
        let primary = self.primary();
        let secondaries = self.secondaries();
        let targets = mirrors_of(&secondaries, &primary);

        let results = join_all(targets.iter().map(|container| {
            let key = &key;
            async move { container.delete(key).await }
        }))
        .await;

        for (container, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                record_failure(container.as_ref(), "delete", &key, &e);
            }
        }

        match primary.delete(&key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(
                    container = primary.name(),
                    path = %key,
                    error = %e,
                    "Primary container failed to delete attachment"
                );
                false
            }
        }
    }

    /// Map a local file produced by the primary back to its key.
    pub fn resolve_path(&self, handle: &Path) -> Result<Option<RelativePath>> {
        Ok(self.primary().relative_path_of(handle)?)
    }

    /// Whether a request target addresses an attachment served by this manager:
    /// it must sit under the primary's target prefix and name a file.
    pub fn serves_target(&self, target: &str) -> bool {
        addresses_attachment(self.primary().as_ref(), target)
    }

    /// Fetch the attachment addressed by a request target.
    ///
    /// The prefix check and the fallback search use the same primary, even if
    /// it is replaced while the call runs.
    #[instrument(skip(self))]
    pub async fn fetch_target(&self, target: &str) -> TargetRoute {
        let primary = self.primary();
        if !addresses_attachment(primary.as_ref(), target) {
            return TargetRoute::NotServed;
        }
        match self.fetch_from(&primary, &RelativePath::new(target)).await {
            Some(found) => TargetRoute::Served(found),
            None => TargetRoute::Missing,
        }
    }
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secondaries = self.secondaries();
        let names: Vec<&str> = secondaries.iter().map(|c| c.name()).collect();
        f.debug_struct("AttachmentManager")
            .field("primary", &self.primary().name())
            .field("secondaries", &names)
            .finish()
    }
}

fn addresses_attachment(primary: &dyn AttachmentContainer, target: &str) -> bool {
    target.starts_with(primary.target_prefix()) && target.contains('.')
}

/// Distinct secondaries other than the primary, first registration wins.
fn mirrors_of<'a>(
    secondaries: &'a [Arc<dyn AttachmentContainer>],
    primary: &Arc<dyn AttachmentContainer>,
) -> Vec<&'a Arc<dyn AttachmentContainer>> {
    let mut mirrors: Vec<&'a Arc<dyn AttachmentContainer>> = Vec::with_capacity(secondaries.len());
    for container in secondaries {
        let seen = std::iter::once(primary)
            .chain(mirrors.iter().copied())
            .any(|other| std::ptr::addr_eq(Arc::as_ptr(container), Arc::as_ptr(other)));
        if !seen {
            mirrors.push(container);
        }
    }
    mirrors
}

/// Ask one container for a key; a handle is only a hit if the file exists.
async fn lookup(container: &dyn AttachmentContainer, key: &RelativePath) -> Option<PathBuf> {
    match container.fetch(key).await {
        Ok(Some(handle)) => match tokio::fs::try_exists(&handle).await {
            Ok(true) => Some(handle),
            Ok(false) => {
                debug!("{} returned missing handle {:?}", container.name(), handle);
                None
            }
            Err(e) => {
                record_failure(container, "fetch", key, &StorageError::Io(e));
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            record_failure(container, "fetch", key, &e);
            None
        }
    }
}

fn record_failure(
    container: &dyn AttachmentContainer,
    op: &'static str,
    key: &RelativePath,
    err: &StorageError,
) {
    if op == "fetch" {
        warn!(container = container.name(), path = %key, error = %err, "Container failed to fetch attachment");
        metrics::counter!(
            "attache_fetch_failures_total",
            "backend" => container.name().to_string()
        )
        .increment(1);
    } else {
        error!(container = container.name(), path = %key, error = %err, op, "Secondary container failed");
        metrics::counter!(
            "attache_replication_failures_total",
            "backend" => container.name().to_string(),
            "op" => op
        )
        .increment(1);
    }
}
