//! Replicated attachment storage.
//!
//! An [`AttachmentManager`] writes every upload to one primary container and
//! copies it to any number of secondary containers, reads with fallback
//! through the secondaries, and deletes everywhere.
//!
//! ```no_run
//! use attache::{AttachmentManager, Config, ContainerFactory};
//! use std::path::Path;
//!
//! # async fn example() -> attache::Result<()> {
//! let config = Config::load_or_default(Path::new("attache.toml"))?;
//! let manager = ContainerFactory::build_manager(&config)?;
//!
//! let key = manager.save(Path::new("/tmp/upload.png")).await?;
//! if let Some(found) = manager.fetch(key.as_str()).await {
//!     println!("{} served by {}", found.path.display(), found.backend);
//! }
//! manager.delete(key.as_str()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod manager;

pub use attache_storage::{ArtifactSource, AttachmentContainer, RelativePath, StorageError};
pub use config::Config;
pub use error::{Error, Result};
pub use factory::ContainerFactory;
pub use manager::{Attachment, AttachmentManager, TargetRoute};
