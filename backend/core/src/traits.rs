use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Exports, Headers, StopHook};

/// Turns raw script text into structured headers.
///
/// Must be total: malformed or missing fields fall back to defaults.
pub trait HeaderParser: Send + Sync {
    fn parse(&self, source: &str) -> Headers;
}

/// Result of running a script's code.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub exports: Option<Exports>,
    pub on_stop: Option<StopHook>,
}

/// Runs script code in whatever sandbox the host provides.
///
/// Each call is independent; nothing may leak between runs of the same script.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, name: &str, source: &str) -> Result<Execution>;
}

/// Fetches remote script sources.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Key/value storage for registry snapshots, one value per category.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load(&self, category: &str) -> Result<Option<serde_json::Value>>;
    async fn save(&self, category: &str, value: serde_json::Value) -> Result<()>;
}
