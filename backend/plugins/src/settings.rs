//! Resolved engine settings, derived from the on-disk config.
use plugdeck_config::defaults::{
    DEFAULT_CONFIRM_LIBRARY_DOWNLOAD, DEFAULT_CONFIRM_PLUGIN_DOWNLOAD, DEFAULT_CONFIRM_PLUGIN_ENABLE,
    DEFAULT_MAX_DOWNLOAD_DEPTH, DEFAULT_UPDATE_CONCURRENCY,
};
use plugdeck_config::PlugDeckConfig;
use plugdeck_core::ScriptKind;

/// Which implied side effects need the user's go-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyPolicy {
    pub confirm_library_download: bool,
    pub confirm_plugin_download: bool,
    pub confirm_plugin_enable: bool,
}

impl DependencyPolicy {
    /// Every cascade happens silently.
    pub fn silent() -> Self {
        Self {
            confirm_library_download: false,
            confirm_plugin_download: false,
            confirm_plugin_enable: false,
        }
    }

    pub fn download_needs_confirmation(&self, kind: ScriptKind) -> bool {
        match kind {
            ScriptKind::Library => self.confirm_library_download,
            ScriptKind::Plugin => self.confirm_plugin_download,
        }
    }
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            confirm_library_download: DEFAULT_CONFIRM_LIBRARY_DOWNLOAD,
            confirm_plugin_download: DEFAULT_CONFIRM_PLUGIN_DOWNLOAD,
            confirm_plugin_enable: DEFAULT_CONFIRM_PLUGIN_ENABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSettings {
    pub policy: DependencyPolicy,
    pub update_concurrency: usize,
    pub max_download_depth: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            policy: DependencyPolicy::default(),
            update_concurrency: DEFAULT_UPDATE_CONCURRENCY,
            max_download_depth: DEFAULT_MAX_DOWNLOAD_DEPTH,
        }
    }
}

impl From<&PlugDeckConfig> for HostSettings {
    fn from(config: &PlugDeckConfig) -> Self {
        let base = HostSettings::default();
        let deps = config.dependencies.clone().unwrap_or_default();
        let updates = config.updates.clone().unwrap_or_default();
        Self {
            policy: DependencyPolicy {
                confirm_library_download: deps
                    .confirm_library_download
                    .unwrap_or(base.policy.confirm_library_download),
                confirm_plugin_download: deps
                    .confirm_plugin_download
                    .unwrap_or(base.policy.confirm_plugin_download),
                confirm_plugin_enable: deps
                    .confirm_plugin_enable
                    .unwrap_or(base.policy.confirm_plugin_enable),
            },
            update_concurrency: updates.concurrency.unwrap_or(base.update_concurrency).max(1),
            max_download_depth: deps.max_download_depth.unwrap_or(base.max_download_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugdeck_config::{DependenciesConfig, UpdatesConfig};

    #[test]
    fn missing_sections_use_defaults() {
        let settings = HostSettings::from(&PlugDeckConfig::default());
        assert_eq!(settings, HostSettings::default());
        assert!(!settings.policy.download_needs_confirmation(ScriptKind::Library));
        assert!(settings.policy.download_needs_confirmation(ScriptKind::Plugin));
    }

    #[test]
    fn config_values_override() {
        let config = PlugDeckConfig {
            dependencies: Some(DependenciesConfig {
                confirm_plugin_enable: Some(false),
                max_download_depth: Some(4),
                ..Default::default()
            }),
            updates: Some(UpdatesConfig { concurrency: Some(0) }),
            ..Default::default()
        };
        let settings = HostSettings::from(&config);
        assert!(!settings.policy.confirm_plugin_enable);
        assert_eq!(settings.max_download_depth, 4);
        assert_eq!(settings.update_concurrency, 1);
    }
}
