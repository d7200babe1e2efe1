//! plugdeck runtime configuration schema.
//!
//! Typed for serde YAML/JSON deserialization. Every field is optional so a
//! partial file (or no file at all) is valid; `defaults` fills the gaps.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a plugdeck host instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlugDeckConfig {
    /// Dependency auto-download / auto-enable policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependenciesConfig>,

    /// Update checking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<UpdatesConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Where registry snapshots are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Which cascades must be confirmed by the user before they happen silently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependenciesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_library_download: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_plugin_download: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_plugin_enable: Option<bool>,
    /// Longest chain of remote dependencies followed by one download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_download_depth: Option<usize>,
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesConfig {
    /// Maximum in-flight update fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

// ---------------------------------------------------------------------------
// Logging / storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}
