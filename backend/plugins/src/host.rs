//! `ScriptHost`: one registry plus the components that act on it.
//!
//! Every public operation of the engine is reachable from here as a typed
//! async call. Hosts share nothing with each other.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use plugdeck_config::defaults::DEFAULT_LOG_LEVEL;
use plugdeck_config::{config_dir, load_config, prepare, write_config, PlugDeckConfig, StorageConfig};
use plugdeck_logging::init_logger;
use plugdeck_core::{
    Executor, Exports, Fetcher, HeaderParser, Persistence, Script, ScriptError, ScriptKind,
    ScriptRecord, ScriptResult, ScriptState,
};
use tracing::{info, warn};

use crate::cascade::{
    BulkOutcome, CascadeCoordinator, DisablePlan, EnablePlan, PlanDecision, ToggleOutcome,
};
use crate::context::HostContext;
use crate::downloader::DependencyDownloader;
use crate::editor::ScriptEditor;
use crate::header::MetaHeaderParser;
use crate::http::HttpFetcher;
use crate::lifecycle::LifecycleController;
use crate::persistence::FilePersistence;
use crate::resolver::{self, DependencyCheck};
use crate::settings::HostSettings;
use crate::updates::{PendingUpdate, UpdateChecker};

pub const PLUGINS_CATEGORY: &str = "plugins";
pub const LIBRARIES_CATEGORY: &str = "libraries";

/// The external pieces a host is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn Executor>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn HeaderParser>,
    pub persistence: Arc<dyn Persistence>,
}

#[derive(Clone)]
pub struct ScriptHost {
    ctx: Arc<HostContext>,
    lifecycle: LifecycleController,
    downloader: DependencyDownloader,
    cascade: CascadeCoordinator,
    editor: ScriptEditor,
    updates: UpdateChecker,
}

impl ScriptHost {
    pub fn new(collaborators: Collaborators, settings: HostSettings) -> Self {
        let ctx = Arc::new(HostContext::new(
            collaborators.executor,
            collaborators.fetcher,
            collaborators.parser,
            collaborators.persistence,
            settings,
        ));
        let lifecycle = LifecycleController::new(ctx.clone());
        let downloader = DependencyDownloader::new(ctx.clone());
        let cascade = CascadeCoordinator::new(ctx.clone(), lifecycle.clone(), downloader.clone());
        let editor = ScriptEditor::new(ctx.clone(), lifecycle.clone());
        let updates = UpdateChecker::new(ctx.clone(), editor.clone());
        Self {
            ctx,
            lifecycle,
            downloader,
            cascade,
            editor,
            updates,
        }
    }

    /// A host using the reference collaborators: HTTP downloads, comment
    /// headers, and JSON files under `storage.dir` (default `<config dir>/scripts`).
    pub fn from_config(config: &PlugDeckConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        let storage = config
            .storage
            .as_ref()
            .and_then(|s| s.dir.clone())
            .unwrap_or_else(|| config_dir().join("scripts"));
        let fetcher = HttpFetcher::new().context("Failed to set up script downloads")?;
        let collaborators = Collaborators {
            executor,
            fetcher: Arc::new(fetcher),
            parser: Arc::new(MetaHeaderParser::new()),
            persistence: Arc::new(FilePersistence::new(storage)),
        };
        Ok(Self::new(collaborators, HostSettings::from(config)))
    }

    /// Start-up path: read the config file at `path`, set up logging, and
    /// build a host from it. Logs default to `<dir of path>/logs` and scripts
    /// to `<dir of path>/scripts`. A missing file is written out with the
    /// defaults filled in.
    pub async fn from_config_path(path: &Path, executor: Arc<dyn Executor>) -> Result<Self> {
        let first_run = !path.exists();
        let raw = load_config(path).await?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_else(config_dir);

        let logging = raw.logging.clone().unwrap_or_default();
        init_logger(
            logging.dir.unwrap_or_else(|| base.join("logs")),
            logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
        );

        let mut config = prepare(raw)?;
        if first_run {
            write_config(&config, path).await?;
            info!(path = %path.display(), "Wrote initial config");
        }
        if config.storage.as_ref().and_then(|s| s.dir.as_ref()).is_none() {
            config.storage = Some(StorageConfig {
                dir: Some(base.join("scripts")),
            });
        }
        Self::from_config(&config, executor)
    }

    pub fn settings(&self) -> &HostSettings {
        self.ctx.settings()
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn downloader(&self) -> &DependencyDownloader {
        &self.downloader
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &Arc<HostContext> {
        &self.ctx
    }

    // ---- registry ----

    /// Add an already-built script.
    pub async fn register(&self, script: Script) -> ScriptResult<()> {
        self.ctx.store.write().await.register(script, false)?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Script> {
        self.ctx.store.read().await.get(name).cloned()
    }

    pub async fn state(&self, name: &str) -> Option<ScriptState> {
        self.ctx.store.read().await.get(name).map(|s| s.state)
    }

    pub async fn exports(&self, name: &str) -> Option<Exports> {
        self.ctx
            .store
            .read()
            .await
            .get(name)
            .and_then(|s| s.exports.clone())
    }

    pub async fn list_by_kind(&self, kind: ScriptKind) -> Vec<Script> {
        self.ctx
            .store
            .read()
            .await
            .list_by_kind(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn usage_count(&self, name: &str) -> usize {
        self.ctx.usage.lock().await.count(name)
    }

    pub async fn consumers(&self, name: &str) -> Vec<String> {
        self.ctx.usage.lock().await.consumers(name)
    }

    // ---- editing ----

    pub async fn install(&self, source: &str, overwrite: bool) -> ScriptResult<String> {
        self.editor.install(source, overwrite).await
    }

    pub async fn edit(&self, name: &str, new_source: &str) -> ScriptResult<String> {
        self.editor.edit(name, new_source).await
    }

    pub async fn delete(&self, name: &str) -> ScriptResult<Script> {
        self.editor.delete(name).await
    }

    pub async fn clear(&self, kind: Option<ScriptKind>) -> BulkOutcome {
        self.editor.clear(kind).await
    }

    // ---- resolution ----

    pub async fn check_dependencies(&self, name: &str) -> DependencyCheck {
        resolver::check_dependencies(&*self.ctx.store.read().await, name)
    }

    pub async fn check_dependents(&self, name: &str) -> Vec<String> {
        resolver::check_dependents(&*self.ctx.store.read().await, name)
    }

    // ---- lifecycle ----

    pub async fn start(&self, name: &str) -> ScriptResult<()> {
        self.lifecycle.start(name).await
    }

    pub async fn stop(&self, name: &str) -> ScriptResult<()> {
        self.lifecycle.stop(name).await
    }

    // ---- cascades ----

    pub async fn plan_enable(&self, name: &str) -> PlanDecision<EnablePlan> {
        self.cascade.plan_enable(name).await
    }

    pub async fn commit_enable(&self, name: &str) -> ScriptResult<()> {
        self.cascade.commit_enable(name).await
    }

    pub async fn plan_enable_many(&self, names: &[String]) -> PlanDecision<EnablePlan> {
        self.cascade.plan_enable_many(names).await
    }

    pub async fn plan_enable_all(&self) -> PlanDecision<EnablePlan> {
        self.cascade.plan_enable_all().await
    }

    pub async fn commit_enable_many(&self, plan: &EnablePlan) -> BulkOutcome {
        self.cascade.commit_enable_many(plan).await
    }

    pub async fn plan_disable(&self, name: &str) -> PlanDecision<DisablePlan> {
        self.cascade.plan_disable(name).await
    }

    pub async fn commit_disable(&self, name: &str) -> ScriptResult<()> {
        self.cascade.commit_disable(name).await
    }

    pub async fn plan_disable_many(&self, names: &[String]) -> PlanDecision<DisablePlan> {
        self.cascade.plan_disable_many(names).await
    }

    pub async fn plan_disable_all(&self) -> PlanDecision<DisablePlan> {
        self.cascade.plan_disable_all().await
    }

    pub async fn commit_disable_many(&self, plan: &DisablePlan) -> BulkOutcome {
        self.cascade.commit_disable_many(plan).await
    }

    pub async fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
        confirmed: bool,
    ) -> ScriptResult<ToggleOutcome> {
        self.cascade.set_enabled(name, enabled, confirmed).await
    }

    // ---- downloads and updates ----

    pub async fn download(&self, name: &str, url: &str) -> Vec<String> {
        self.downloader.download(name, url, &[]).await
    }

    pub async fn check_updates(&self) -> Vec<PendingUpdate> {
        self.updates.check_updates().await
    }

    pub async fn pending_updates(&self) -> Vec<PendingUpdate> {
        self.updates.pending().await
    }

    pub async fn apply_update(&self, name: &str) -> ScriptResult<String> {
        self.updates.apply_update(name).await
    }

    pub async fn apply_updates(&self) -> BulkOutcome {
        self.updates.apply_all().await
    }

    // ---- persistence ----

    /// Save every script's record, one category per kind.
    pub async fn persist(&self) -> Result<()> {
        let (plugins, libraries) = {
            let store = self.ctx.store.read().await;
            (
                store.records(ScriptKind::Plugin),
                store.records(ScriptKind::Library),
            )
        };
        let persistence = &self.ctx.persistence;
        persistence
            .save(PLUGINS_CATEGORY, serde_json::to_value(&plugins)?)
            .await
            .context("Failed to save plugins")?;
        persistence
            .save(LIBRARIES_CATEGORY, serde_json::to_value(&libraries)?)
            .await
            .context("Failed to save libraries")?;
        info!(
            plugins = plugins.len(),
            libraries = libraries.len(),
            "Persisted scripts"
        );
        Ok(())
    }

    /// Load saved scripts and start every enabled plugin.
    ///
    /// Only storage failures are errors. Records that cannot be registered and
    /// plugins that fail to start are reported in the outcome.
    pub async fn restore(&self) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut to_start = Vec::new();

        for (category, kind) in [
            (LIBRARIES_CATEGORY, ScriptKind::Library),
            (PLUGINS_CATEGORY, ScriptKind::Plugin),
        ] {
            let records: Vec<ScriptRecord> = match self.ctx.persistence.load(category).await? {
                Some(value) => serde_json::from_value(value)
                    .with_context(|| format!("Malformed {category} records"))?,
                None => Vec::new(),
            };
            for record in records {
                let name = record.name.clone();
                match self.restore_record(record, kind).await {
                    Ok(true) => to_start.push(name),
                    Ok(false) => {}
                    Err(err) => {
                        warn!(script = %name, error = %err, "Failed to restore script");
                        outcome.failed.push((name, err));
                    }
                }
            }
        }

        for name in to_start {
            match self.lifecycle.start(&name).await {
                Ok(()) => outcome.succeeded.push(name),
                Err(err) => {
                    warn!(script = %name, error = %err, "Restored plugin failed to start");
                    outcome.failed.push((name, err));
                }
            }
        }
        info!(
            started = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Restored scripts"
        );
        Ok(outcome)
    }

    /// Register one saved record. Returns whether it should be started.
    async fn restore_record(&self, record: ScriptRecord, kind: ScriptKind) -> ScriptResult<bool> {
        let mut headers = self.ctx.parser.parse(&record.source);
        if headers.name.is_empty() {
            headers.name = record.name.clone();
        }
        if headers.name != record.name {
            return Err(ScriptError::InvalidHeaders(format!(
                "saved as '{}' but declares '{}'",
                record.name, headers.name
            )));
        }
        headers.kind = kind;

        let mut script = Script::from_headers(record.source, headers);
        let start = script.set_enabled(record.enabled) && record.enabled;
        self.ctx.store.write().await.register(script, false)?;
        Ok(start)
    }
}
