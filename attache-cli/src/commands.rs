use anyhow::{bail, Context, Result};
use attache::{AttachmentManager, TargetRoute};
use serde_json::{json, Value};
use std::path::Path;

/// Store a file and report the assigned attachment path.
pub async fn run_save(manager: &AttachmentManager, file: &Path) -> Result<Value> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    let key = manager
        .save(file)
        .await
        .with_context(|| format!("Failed to save {}", file.display()))?;
    tracing::info!("Saved {} as {}", file.display(), key);
    Ok(json!({ "path": key.as_str() }))
}

pub async fn run_fetch(manager: &AttachmentManager, path: &str) -> Result<Value> {
    match manager.fetch(path).await {
        Some(found) => Ok(json!({
            "file": found.path.display().to_string(),
            "backend": found.backend,
        })),
        None => bail!("Attachment {} not found in any container", path),
    }
}

pub async fn run_delete(manager: &AttachmentManager, path: &str) -> Value {
    let deleted = manager.delete(path).await;
    if !deleted {
        tracing::warn!("Primary container did not delete {}", path);
    }
    json!({ "deleted": deleted })
}

pub fn run_resolve(manager: &AttachmentManager, file: &Path) -> Result<Value> {
    match manager.resolve_path(file)? {
        Some(key) => Ok(json!({ "path": key.as_str() })),
        None => bail!(
            "{} is not stored by primary container {}",
            file.display(),
            manager.primary().name()
        ),
    }
}

pub async fn run_route(manager: &AttachmentManager, target: &str) -> Value {
    match manager.fetch_target(target).await {
        TargetRoute::NotServed => json!({ "served": false }),
        TargetRoute::Missing => json!({ "served": true, "file": Value::Null }),
        TargetRoute::Served(found) => json!({
            "served": true,
            "file": found.path.display().to_string(),
            "backend": found.backend,
        }),
    }
}

pub fn run_containers(manager: &AttachmentManager) -> Value {
    let primary = manager.primary();
    let secondaries: Vec<Value> = manager
        .secondaries()
        .iter()
        .map(|c| json!({ "name": c.name(), "target_prefix": c.target_prefix() }))
        .collect();
    json!({
        "primary": { "name": primary.name(), "target_prefix": primary.target_prefix() },
        "secondaries": secondaries,
    })
}

/// Plain-text rendering of a command result: scalar fields one per line.
pub fn render_text(output: &Value) -> String {
    match output {
        Value::Object(map) if map.len() == 1 => map
            .values()
            .next()
            .map(render_scalar)
            .unwrap_or_default(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, render_scalar(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_scalar(other),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .get("name")
            .map(render_scalar)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache::config::{ContainerConfig, LocalConfig};
    use attache::{Config, ContainerFactory};
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> AttachmentManager {
        let local = |name: &str| {
            ContainerConfig::Local(LocalConfig {
                root: temp.path().join(name),
                ..Default::default()
            })
        };
        let config = Config {
            primary: local("primary"),
            secondaries: vec![local("mirror")],
            ..Default::default()
        };
        ContainerFactory::build_manager(&config).unwrap()
    }

    #[tokio::test]
    async fn test_save_fetch_delete() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let file = temp.path().join("report.pdf");
        std::fs::write(&file, b"pdf").unwrap();

        let saved = run_save(&manager, &file).await.unwrap();
        let path = saved["path"].as_str().unwrap().to_string();
        assert!(path.ends_with(".pdf"));

        let fetched = run_fetch(&manager, &path).await.unwrap();
        assert!(fetched["backend"].as_str().unwrap().contains("primary"));

        let resolved = run_resolve(&manager, Path::new(fetched["file"].as_str().unwrap())).unwrap();
        assert_eq!(resolved["path"], saved["path"]);

        assert_eq!(run_delete(&manager, &path).await, json!({ "deleted": true }));
        assert!(run_fetch(&manager, &path).await.is_err());
    }

    #[tokio::test]
    async fn test_save_rejects_directory() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        assert!(run_save(&manager, temp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_route() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        assert_eq!(run_route(&manager, "/static/app.js").await, json!({ "served": false }));
        let missing = run_route(&manager, "/attachment/20261016/none.png").await;
        assert_eq!(missing["served"], json!(true));
        assert!(missing["file"].is_null());

        let file = temp.path().join("logo.png");
        std::fs::write(&file, b"png").unwrap();
        let saved = run_save(&manager, &file).await.unwrap();
        let target = format!("/{}", saved["path"].as_str().unwrap());
        let routed = run_route(&manager, &target).await;
        assert_eq!(routed["served"], json!(true));
        assert!(routed["backend"].as_str().unwrap().contains("primary"));
    }

    #[test]
    fn test_containers_and_render() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let output = run_containers(&manager);
        assert_eq!(output["secondaries"].as_array().unwrap().len(), 1);

        let text = render_text(&output);
        assert!(text.contains("primary: local:"));
        assert!(text.contains("secondaries: local:"));

        assert_eq!(render_text(&json!({ "deleted": false })), "false");
        assert_eq!(render_text(&json!({ "path": "a/b.txt" })), "a/b.txt");
    }
}
