//! Config defaults: applies sensible default values to parsed config.

use crate::schema::{DependenciesConfig, LoggingConfig, PlugDeckConfig, UpdatesConfig};

/// Default number of concurrent update fetches.
pub const DEFAULT_UPDATE_CONCURRENCY: usize = 5;

/// Default cap on nested remote dependency downloads.
pub const DEFAULT_MAX_DOWNLOAD_DEPTH: usize = 16;

/// Libraries are pulled in silently unless configured otherwise.
pub const DEFAULT_CONFIRM_LIBRARY_DOWNLOAD: bool = false;

pub const DEFAULT_CONFIRM_PLUGIN_DOWNLOAD: bool = true;

pub const DEFAULT_CONFIRM_PLUGIN_ENABLE: bool = true;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: PlugDeckConfig) -> PlugDeckConfig {
    let config = apply_dependency_defaults(config);
    let config = apply_update_defaults(config);
    apply_logging_defaults(config)
}

/// Ensure every confirmation flag and the download depth are set.
fn apply_dependency_defaults(mut config: PlugDeckConfig) -> PlugDeckConfig {
    let deps = config
        .dependencies
        .get_or_insert_with(DependenciesConfig::default);
    if deps.confirm_library_download.is_none() {
        deps.confirm_library_download = Some(DEFAULT_CONFIRM_LIBRARY_DOWNLOAD);
    }
    if deps.confirm_plugin_download.is_none() {
        deps.confirm_plugin_download = Some(DEFAULT_CONFIRM_PLUGIN_DOWNLOAD);
    }
    if deps.confirm_plugin_enable.is_none() {
        deps.confirm_plugin_enable = Some(DEFAULT_CONFIRM_PLUGIN_ENABLE);
    }
    if deps.max_download_depth.is_none() {
        deps.max_download_depth = Some(DEFAULT_MAX_DOWNLOAD_DEPTH);
    }
    config
}

fn apply_update_defaults(mut config: PlugDeckConfig) -> PlugDeckConfig {
    let updates = config.updates.get_or_insert_with(UpdatesConfig::default);
    if updates.concurrency.is_none() {
        updates.concurrency = Some(DEFAULT_UPDATE_CONCURRENCY);
    }
    config
}

fn apply_logging_defaults(mut config: PlugDeckConfig) -> PlugDeckConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    config
}
