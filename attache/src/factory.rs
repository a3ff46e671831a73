//! Factory for building containers and the manager from configuration.

use std::sync::Arc;

use attache_storage::{AttachmentContainer, LocalContainer};

use crate::config::{Config, ContainerConfig};
use crate::manager::AttachmentManager;
use crate::{Error, Result};

pub struct ContainerFactory;

impl ContainerFactory {
    /// Create one container from its configuration.
    pub fn create_container(config: &ContainerConfig) -> Result<Arc<dyn AttachmentContainer>> {
        match config {
            ContainerConfig::Local(local) => Ok(Arc::new(
                LocalContainer::new(&local.root).with_target_prefix(&local.target_prefix),
            )),
            #[cfg(feature = "s3")]
            ContainerConfig::S3(s3) => {
                use attache_storage::{S3Config as StorageS3Config, S3Container};

                let mut s3_config = match &s3.endpoint {
                    Some(endpoint) => StorageS3Config::minio(&s3.bucket, endpoint),
                    None => StorageS3Config::aws(&s3.bucket, &s3.region),
                };
                s3_config.region = s3.region.clone();
                s3_config.force_path_style = s3.force_path_style || s3_config.force_path_style;
                s3_config.allow_http = s3.allow_http || s3_config.allow_http;

                if let Some(prefix) = &s3.prefix {
                    s3_config = s3_config.with_prefix(prefix);
                }

                if let (Some(key_id), Some(secret)) = (&s3.access_key_id, &s3.secret_access_key) {
                    s3_config = s3_config.with_credentials(key_id, secret);
                }

                let container = S3Container::new(s3_config, &s3.cache_dir)?
                    .with_target_prefix(&s3.target_prefix);
                Ok(Arc::new(container))
            }
            #[cfg(not(feature = "s3"))]
            ContainerConfig::S3(_) => Err(Error::Config(
                "S3 container requires 's3' feature".into(),
            )),
        }
    }

    /// Build the manager: primary plus secondaries in configured order.
    pub fn build_manager(config: &Config) -> Result<AttachmentManager> {
        let primary = Self::create_container(&config.primary)?;
        let secondaries = config
            .secondaries
            .iter()
            .map(Self::create_container)
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            primary = primary.name(),
            secondaries = secondaries.len(),
            "Attachment containers ready"
        );
        Ok(AttachmentManager::with_secondaries(primary, secondaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use tempfile::TempDir;

    #[test]
    fn test_create_local_container() {
        let temp = TempDir::new().unwrap();
        let config = ContainerConfig::Local(LocalConfig {
            root: temp.path().to_path_buf(),
            target_prefix: "/files".to_string(),
        });

        let container = ContainerFactory::create_container(&config).unwrap();
        assert_eq!(container.target_prefix(), "/files");
        assert!(container.name().starts_with("local:"));
    }

    #[test]
    fn test_build_manager_keeps_order() {
        let temp = TempDir::new().unwrap();
        let local = |name: &str| {
            ContainerConfig::Local(LocalConfig {
                root: temp.path().join(name),
                ..Default::default()
            })
        };
        let config = Config {
            primary: local("primary"),
            secondaries: vec![local("first"), local("second")],
            ..Default::default()
        };

        let manager = ContainerFactory::build_manager(&config).unwrap();
        let secondaries = manager.secondaries();
        assert!(secondaries[0].name().ends_with("first"));
        assert!(secondaries[1].name().ends_with("second"));
    }

    #[cfg(not(feature = "s3"))]
    #[test]
    fn test_s3_requires_feature() {
        let config = Config::parse(
            r#"
            [primary]
            type = "s3"
            bucket = "attachments"
            region = "us-east-1"
            "#,
        )
        .unwrap();
        let result = ContainerFactory::create_container(&config.primary);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_built_manager_roundtrip() {
        let temp = TempDir::new().unwrap();
        let config = Config::parse(&format!(
            r#"
            [primary]
            type = "local"
            root = "{}"

            [[secondaries]]
            type = "local"
            root = "{}"
            "#,
            temp.path().join("primary").display(),
            temp.path().join("mirror").display(),
        ))
        .unwrap();
        let manager = ContainerFactory::build_manager(&config).unwrap();

        let source = temp.path().join("a.txt");
        tokio::fs::write(&source, b"hello").await.unwrap();
        let key = manager.save(&source).await.unwrap();

        let mirror = LocalContainer::new(temp.path().join("mirror"));
        assert!(mirror.fetch(&key).await.unwrap().is_some());
    }
}
