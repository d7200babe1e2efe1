//! Script Lifecycle Event Logger
//!
//! Structured events (start, stop, failures, downloads, updates) written through
//! `tracing` under the `lifecycle_events` target, so the JSON file layer keeps
//! them as NDJSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_url;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started {
        script: String,
    },
    Stopped {
        script: String,
    },
    StartFailed {
        script: String,
        error: String,
    },
    StopHookFailed {
        script: String,
        hook: usize,
        error: String,
    },
    OptionalDependencyFailed {
        script: String,
        dependency: String,
        error: String,
    },
    Downloaded {
        script: String,
        url: String,
    },
    DownloadFailed {
        script: String,
        url: String,
    },
    UpdateAvailable {
        script: String,
        from: Option<String>,
        to: Option<String>,
    },
    UpdateApplied {
        script: String,
    },
}

impl LifecycleEvent {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::StartFailed { .. }
                | LifecycleEvent::StopHookFailed { .. }
                | LifecycleEvent::OptionalDependencyFailed { .. }
                | LifecycleEvent::DownloadFailed { .. }
        )
    }

    fn redacted(mut self) -> Self {
        match &mut self {
            LifecycleEvent::Downloaded { url, .. } | LifecycleEvent::DownloadFailed { url, .. } => {
                *url = redact_url(url);
            }
            _ => {}
        }
        self
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl EventLogEntry {
    pub fn new(event: LifecycleEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.redacted(),
        }
    }
}

pub struct EventLogger;

impl EventLogger {
    /// Emits a lifecycle event; failures go out at `warn`, the rest at `info`.
    pub fn log_event(event: LifecycleEvent) {
        let failure = event.is_failure();
        let entry = EventLogEntry::new(event);
        let payload = serde_json::to_string(&entry).unwrap_or_else(|_| format!("{entry:?}"));

        if failure {
            warn!(target: "lifecycle_events", event = %payload, "Script lifecycle event");
        } else {
            info!(target: "lifecycle_events", event = %payload, "Script lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_flattens_tagged_event() {
        let entry = EventLogEntry::new(LifecycleEvent::StartFailed {
            script: "Clock".into(),
            error: "boom".into(),
        });
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "start_failed");
        assert_eq!(value["script"], "Clock");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_download_urls_are_redacted() {
        let entry = EventLogEntry::new(LifecycleEvent::Downloaded {
            script: "Time".into(),
            url: "https://cdn.example.com/time.js?token=s3cr3t".into(),
        });
        let LifecycleEvent::Downloaded { url, .. } = entry.event else {
            panic!("event kind changed");
        };
        assert!(!url.contains("s3cr3t"));
    }

    #[test]
    fn test_failure_classification() {
        assert!(LifecycleEvent::DownloadFailed {
            script: "a".into(),
            url: "u".into()
        }
        .is_failure());
        assert!(!LifecycleEvent::Started { script: "a".into() }.is_failure());
    }
}
