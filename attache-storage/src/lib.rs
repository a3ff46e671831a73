//! Storage containers for replicated attachments.
//!
//! This crate provides the `AttachmentContainer` trait that every attachment
//! storage medium implements, plus the containers shipped with attache. The
//! replication layer in the `attache` crate only sees the trait.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │            AttachmentManager              │
//! │       (primary + ordered secondaries)     │
//! └─────────────────────┬─────────────────────┘
//!                       ▼
//!             ┌────────────────────┐
//!             │ AttachmentContainer│  ← Uniform trait
//!             └─────────┬──────────┘
//!                ┌──────┴──────┐
//!                ▼             ▼
//!         ┌──────────┐   ┌──────────┐
//!         │  Local   │   │    S3    │
//!         └──────────┘   └──────────┘
//! ```
//!
//! # Keys
//!
//! Attachments are addressed by forward-slash [`RelativePath`]s that are the
//! same on every container:
//!
//! ```text
//! attachment/20261016/3f1c9e0a7b2d4c55a1e8f0b6d2c4e9a1.png
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use attache_storage::{ArtifactSource, AttachmentContainer, LocalContainer};
//!
//! # async fn example() -> attache_storage::Result<()> {
//! let container = LocalContainer::new("./webroot");
//!
//! // Store an uploaded file; the container assigns the key
//! let key = container.save(&ArtifactSource::upload("/tmp/upload.png")).await?;
//!
//! // Resolve it back to a local file
//! let file = container.fetch(&key).await?;
//! assert!(file.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `s3` - Enable S3/object storage container (requires `object_store`)

mod error;
mod local;
mod path;
mod traits;

#[cfg(feature = "s3")]
mod s3;

pub use error::{Result, StorageError};
pub use local::{LocalContainer, DEFAULT_TARGET_PREFIX};
pub use path::RelativePath;
pub use traits::{ArtifactSource, AttachmentContainer};

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Container};
