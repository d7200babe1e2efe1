//! Config file location, loading, and atomic writes that keep a few backups.

use crate::schema::PlugDeckConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Number of rolling backups to keep.
const MAX_BACKUPS: usize = 5;

/// Resolve the plugdeck config directory.
/// Priority: `PLUGDECK_CONFIG_DIR` env > `~/.plugdeck/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLUGDECK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".plugdeck"),
        None => PathBuf::from(".plugdeck"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<PlugDeckConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(PlugDeckConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: PlugDeckConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write config to disk atomically: the YAML goes to a sibling temp file that
/// is then renamed over `path`. The file being replaced is kept as `.bak.1`.
pub async fn write_config(config: &PlugDeckConfig, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }
    if fs::try_exists(path).await.unwrap_or(false) {
        rotate_backups(path).await;
    }

    let staged = with_suffix(path, ".tmp");
    fs::write(&staged, yaml)
        .await
        .with_context(|| format!("Failed to stage config at: {}", staged.display()))?;
    fs::rename(&staged, path)
        .await
        .with_context(|| format!("Failed to move staged config to: {}", path.display()))?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

/// `<path>.bak.<generation>`; generation 1 is the most recent.
pub fn backup_path(path: &Path, generation: usize) -> PathBuf {
    with_suffix(path, &format!(".bak.{generation}"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Shift every backup one generation older, dropping the oldest, and copy the
/// current file into generation 1. Failures only cost a backup.
async fn rotate_backups(path: &Path) {
    let _ = fs::remove_file(backup_path(path, MAX_BACKUPS)).await;
    for generation in (1..MAX_BACKUPS).rev() {
        let from = backup_path(path, generation);
        if !fs::try_exists(&from).await.unwrap_or(false) {
            continue;
        }
        if let Err(e) = fs::rename(&from, backup_path(path, generation + 1)).await {
            warn!(backup = %from.display(), error = %e, "Could not shift config backup");
        }
    }
    if let Err(e) = fs::copy(path, backup_path(path, 1)).await {
        warn!(path = %path.display(), error = %e, "Could not back up config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UpdatesConfig;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("plugdeck-config-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let path = config_file_path(&scratch_dir());
        let cfg = load_config(&path).await.unwrap();
        assert_eq!(cfg, PlugDeckConfig::default());
    }

    #[tokio::test]
    async fn write_then_load_keeps_values_and_backs_up() {
        let dir = scratch_dir();
        let path = config_file_path(&dir);

        let mut cfg = PlugDeckConfig::default();
        cfg.updates = Some(UpdatesConfig {
            concurrency: Some(3),
        });
        write_config(&cfg, &path).await.unwrap();
        write_config(&cfg, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.updates.unwrap().concurrency, Some(3));
        assert!(backup_path(&path, 1).exists());
        assert!(!backup_path(&path, 2).exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn backups_are_capped() {
        let dir = scratch_dir();
        let path = config_file_path(&dir);

        for concurrency in 1..=MAX_BACKUPS + 3 {
            let mut cfg = PlugDeckConfig::default();
            cfg.updates = Some(UpdatesConfig {
                concurrency: Some(concurrency),
            });
            write_config(&cfg, &path).await.unwrap();
        }

        assert!(backup_path(&path, MAX_BACKUPS).exists());
        assert!(!backup_path(&path, MAX_BACKUPS + 1).exists());
        // Generation 1 holds the file that the last write replaced.
        let previous = load_config(&backup_path(&path, 1)).await.unwrap();
        assert_eq!(previous.updates.unwrap().concurrency, Some(MAX_BACKUPS + 2));
        assert!(!with_suffix(&path, ".tmp").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn malformed_yaml_reports_path() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = config_file_path(&dir);
        std::fs::write(&path, "updates: [not, a, map").unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("config.yaml"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
