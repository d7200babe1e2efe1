//! File-backed persistence: one JSON document per category.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use plugdeck_core::Persistence;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, category: &str) -> PathBuf {
        self.dir.join(format!("{category}.json"))
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    /// A missing file is `None`, not an error.
    async fn load(&self, category: &str) -> Result<Option<Value>> {
        let path = self.path_for(category);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    /// Written to a temp file and renamed into place.
    async fn save(&self, category: &str, value: Value) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(category);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&value).context("Failed to serialize category")?;
        fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        debug!(category, path = %path.display(), "Saved category");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("plugdeck-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_category_loads_as_none() {
        let store = FilePersistence::new(scratch_dir());
        assert!(store.load("plugins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = scratch_dir();
        let store = FilePersistence::new(&dir);
        let value = json!([{ "name": "Clock", "kind": "plugin", "source": "", "enabled": true }]);

        store.save("plugins", value.clone()).await.unwrap();
        assert_eq!(store.load("plugins").await.unwrap(), Some(value));
        assert!(!dir.join("plugins.json.tmp").exists());

        store.save("plugins", json!([])).await.unwrap();
        assert_eq!(store.load("plugins").await.unwrap(), Some(json!([])));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("libraries.json"), "{ not json").unwrap();

        let store = FilePersistence::new(&dir);
        let err = store.load("libraries").await.unwrap_err();
        assert!(err.to_string().contains("libraries.json"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
