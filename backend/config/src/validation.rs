//! Config validation: deep schema checks with user-friendly error messages.

use crate::schema::PlugDeckConfig;
use thiserror::Error;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &PlugDeckConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_dependencies(config, &mut report);
    validate_updates(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_dependencies(config: &PlugDeckConfig, report: &mut ValidationReport) {
    let Some(deps) = &config.dependencies else { return };
    if deps.max_download_depth == Some(0) {
        report.error(
            "dependencies.maxDownloadDepth",
            "maxDownloadDepth must be >= 1; remote dependencies could never be fetched",
        );
    }
    if deps.confirm_library_download == Some(false) && deps.confirm_plugin_download == Some(false) {
        report.warn(
            "dependencies",
            "All remote dependencies will be downloaded without confirmation",
        );
    }
}

fn validate_updates(config: &PlugDeckConfig, report: &mut ValidationReport) {
    let Some(updates) = &config.updates else { return };
    if updates.concurrency == Some(0) {
        report.error("updates.concurrency", "concurrency must be >= 1");
    }
}

fn validate_logging(config: &PlugDeckConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if !KNOWN_LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.warn(
                "logging.level",
                format!("Unknown log level '{level}'; expected one of {KNOWN_LOG_LEVELS:?}"),
            );
        }
    }
}
