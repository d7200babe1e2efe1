//! Telemetry and structured logging components for plugdeck.
//!
//! Handles subscriber setup, URL redaction, and structured script lifecycle events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger, LifecycleEvent};
pub use logger::init_logger;
pub use redact::redact_url;
