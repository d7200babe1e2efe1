//! `plugdeck-plugins`: the script engine.
//!
//! Resolves plugin and library dependencies, starts and stops scripts in
//! dependency order, reference-counts shared libraries, downloads missing
//! dependencies and checks for updates. [`ScriptHost`] is the entry point.

pub mod cascade;
pub mod context;
pub mod downloader;
pub mod editor;
pub mod header;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod persistence;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod updates;
pub mod usage;
pub mod version;
pub mod waits;

#[cfg(test)]
mod test_support;

pub use cascade::{BulkOutcome, DisablePlan, EnablePlan, PlanDecision, ToggleOutcome};
pub use header::MetaHeaderParser;
pub use host::{Collaborators, ScriptHost};
pub use http::HttpFetcher;
pub use persistence::FilePersistence;
pub use resolver::DependencyCheck;
pub use settings::{DependencyPolicy, HostSettings};
pub use updates::PendingUpdate;
