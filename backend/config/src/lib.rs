//! `plugdeck-config`: host configuration management.
//!
//! Provides:
//! - Typed config schema (dependency policy, updates, logging, storage)
//! - YAML read/write with atomic backup rotation
//! - Default value application
//! - Schema validation

pub mod defaults;
pub mod io;
pub mod schema;
pub mod validation;

// Re-export most-used types at crate root.
pub use defaults::apply_all_defaults;
pub use io::{backup_path, config_dir, config_file_path, load_config, write_config};
pub use schema::{DependenciesConfig, LoggingConfig, PlugDeckConfig, StorageConfig, UpdatesConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Load, apply defaults to, and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Validation
/// findings are logged; errors turn into a failed load.
pub async fn load_and_prepare(path: &Path) -> Result<PlugDeckConfig> {
    prepare(load_config(path).await?)
}

/// Apply defaults to an already loaded config and validate it.
pub fn prepare(config: PlugDeckConfig) -> Result<PlugDeckConfig> {
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.into_iter().next() {
        return Err(first.into());
    }

    Ok(config)
}
