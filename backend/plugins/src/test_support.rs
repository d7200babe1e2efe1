//! Scripted collaborators and builders shared by the unit tests.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use plugdeck_core::{
    DependencyRef, Execution, Executor, Fetcher, Headers, Persistence, Script,
    ScriptKind, StopHook,
};
use serde_json::json;

use crate::header::MetaHeaderParser;
use crate::host::{Collaborators, ScriptHost};
use crate::settings::HostSettings;

/// Builder for scripts with hand-written headers.
#[derive(Debug, Clone)]
pub struct TestScript {
    headers: Headers,
    enabled: bool,
}

impl TestScript {
    pub fn plugin(name: &str) -> Self {
        Self::new(name, ScriptKind::Plugin)
    }

    pub fn library(name: &str) -> Self {
        Self::new(name, ScriptKind::Library)
    }

    fn new(name: &str, kind: ScriptKind) -> Self {
        Self {
            headers: Headers {
                name: name.to_string(),
                kind,
                ..Default::default()
            },
            enabled: false,
        }
    }

    pub fn requires_lib(mut self, name: &str) -> Self {
        self.headers.required_lib.push(DependencyRef::library(name, None));
        self
    }

    pub fn requires_lib_at(mut self, name: &str, url: &str) -> Self {
        self.headers
            .required_lib
            .push(DependencyRef::library(name, Some(url)));
        self
    }

    pub fn requires_plugin(mut self, name: &str) -> Self {
        self.headers
            .required_plugin
            .push(DependencyRef::plugin(name, None));
        self
    }

    pub fn requires_plugin_at(mut self, name: &str, url: &str) -> Self {
        self.headers
            .required_plugin
            .push(DependencyRef::plugin(name, Some(url)));
        self
    }

    pub fn optional_lib(mut self, name: &str) -> Self {
        self.headers.optional_lib.push(DependencyRef::library(name, None));
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.headers.version = Some(version.to_string());
        self
    }

    pub fn download_url(mut self, url: &str) -> Self {
        self.headers.download_url = Some(url.to_string());
        self
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Source text whose header block parses back to these headers.
    pub fn source(&self) -> String {
        let h = &self.headers;
        let mut out = String::from("// ==PlugDeck==\n");
        out.push_str(&format!("// @name {}\n// @kind {}\n", h.name, h.kind));
        if let Some(v) = &h.version {
            out.push_str(&format!("// @version {v}\n"));
        }
        let lists = [
            ("requires-lib", &h.required_lib),
            ("optional-lib", &h.optional_lib),
            ("requires-plugin", &h.required_plugin),
        ];
        for (key, deps) in lists {
            for dep in deps {
                match &dep.url {
                    Some(url) => out.push_str(&format!("// @{key} {} {url}\n", dep.name)),
                    None => out.push_str(&format!("// @{key} {}\n", dep.name)),
                }
            }
        }
        if let Some(url) = &h.download_url {
            out.push_str(&format!("// @download-url {url}\n"));
        }
        out.push_str("// ==/PlugDeck==\n");
        out.push_str(&format!("export const id = \"{}\";\n", h.name));
        out
    }

    pub fn build(self) -> Script {
        let source = self.source();
        let mut script = Script::from_headers(source, self.headers);
        script.set_enabled(self.enabled);
        script
    }
}

pub fn plugin(name: &str, libs: &[&str]) -> Script {
    libs.iter()
        .fold(TestScript::plugin(name), |b, lib| b.requires_lib(lib))
        .build()
}

pub fn library(name: &str, libs: &[&str]) -> Script {
    libs.iter()
        .fold(TestScript::library(name), |b, lib| b.requires_lib(lib))
        .build()
}

/// Executor double: counts runs, can fail named scripts, can stall, and
/// hands back a stop hook that counts its calls.
#[derive(Default)]
pub struct MockExecutor {
    runs: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    failing_hooks: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    pub hook_calls: Arc<AtomicUsize>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn recover(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn fail_stop_hook(&self, name: &str) {
        self.failing_hooks.lock().unwrap().insert(name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn runs(&self, name: &str) -> usize {
        self.runs.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_runs(&self) -> usize {
        self.runs.lock().unwrap().values().sum()
    }

    pub fn hook_calls(&self) -> usize {
        self.hook_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn run(&self, name: &str, _source: &str) -> Result<Execution> {
        *self.runs.lock().unwrap().entry(name.to_string()).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(name) {
            bail!("{name} threw during evaluation");
        }

        let calls = self.hook_calls.clone();
        let hook_fails = self.failing_hooks.lock().unwrap().contains(name);
        let hook_name = name.to_string();
        Ok(Execution {
            exports: Some(json!({ "name": name })),
            on_stop: Some(StopHook::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                if hook_fails {
                    bail!("{hook_name} cleanup failed");
                }
                Ok(())
            })),
        })
    }
}

/// Fetcher double serving sources from a map; unknown URLs fail. Tracks how
/// many fetches were in flight at once.
#[derive(Default)]
pub struct MockFetcher {
    sources: Mutex<HashMap<String, String>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, source: impl Into<String>) {
        self.sources
            .lock()
            .unwrap()
            .insert(url.to_string(), source.into());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let source = self.sources.lock().unwrap().get(url).cloned();
        match source {
            Some(source) => Ok(source),
            None => bail!("404 Not Found: {url}"),
        }
    }
}

/// In-memory persistence.
#[derive(Default)]
pub struct MemoryPersistence {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self, category: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.lock().unwrap().get(category).cloned())
    }

    async fn save(&self, category: &str, value: serde_json::Value) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(category.to_string(), value);
        Ok(())
    }
}

/// A host wired to the doubles, with the handles tests poke at.
pub struct Harness {
    pub host: ScriptHost,
    pub executor: Arc<MockExecutor>,
    pub fetcher: Arc<MockFetcher>,
    pub persistence: Arc<MemoryPersistence>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(HostSettings::default())
    }

    pub fn with_settings(settings: HostSettings) -> Self {
        let executor = MockExecutor::new();
        let fetcher = MockFetcher::new();
        let persistence = Arc::new(MemoryPersistence::default());
        let collaborators = Collaborators {
            executor: executor.clone(),
            fetcher: fetcher.clone(),
            parser: Arc::new(MetaHeaderParser),
            persistence: persistence.clone(),
        };
        Self {
            host: ScriptHost::new(collaborators, settings),
            executor,
            fetcher,
            persistence,
        }
    }

    /// Register prepared scripts directly, bypassing header parsing.
    pub async fn with_scripts(self, scripts: Vec<Script>) -> Self {
        for script in scripts {
            self.host.register(script).await.unwrap();
        }
        self
    }
}
