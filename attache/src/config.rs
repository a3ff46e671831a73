//! Configuration for a replicated attachment setup.
//!
//! Default config location: ./attache.toml
//!
//! ```toml
//! [primary]
//! type = "local"
//! root = "./webroot"
//! target_prefix = "/attachment"
//!
//! [[secondaries]]
//! type = "local"
//! root = "/mnt/mirror"
//!
//! [[secondaries]]
//! type = "s3"
//! bucket = "attachments"
//! region = "us-east-1"
//! cache_dir = "./cache/s3"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub primary: ContainerConfig,
    /// Mirrors, in the order they are replicated to and searched
    #[serde(default)]
    pub secondaries: Vec<ContainerConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContainerConfig {
    Local(LocalConfig),
    S3(S3Config),
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig::Local(LocalConfig::default())
    }
}

impl ContainerConfig {
    pub fn is_local(&self) -> bool {
        matches!(self, ContainerConfig::Local(_))
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, ContainerConfig::S3(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("./webroot")
}

fn default_target_prefix() -> String {
    attache_storage::DEFAULT_TARGET_PREFIX.to_string()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            target_prefix: default_target_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Where fetched objects are materialized locally
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache/s3")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,attache=debug".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load config from a TOML file, or fall back to defaults when it is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Every container config, primary first.
    pub fn containers(&self) -> impl Iterator<Item = &ContainerConfig> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    fn expand_paths(&mut self) -> Result<()> {
        let primary = std::iter::once(&mut self.primary);
        for container in primary.chain(self.secondaries.iter_mut()) {
            match container {
                ContainerConfig::Local(local) => local.root = expand_tilde(&local.root)?,
                ContainerConfig::S3(s3) => s3.cache_dir = expand_tilde(&s3.cache_dir)?,
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for container in self.containers() {
            if let ContainerConfig::S3(s3) = container {
                if s3.bucket.trim().is_empty() {
                    return Err(Error::Config("S3 container requires a bucket".to_string()));
                }
            }
        }
        Ok(())
    }
}
