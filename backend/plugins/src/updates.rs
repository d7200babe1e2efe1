//! Update checks for scripts that declare a download URL.
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use plugdeck_core::{ScriptError, ScriptResult};
use plugdeck_logging::{redact_url, EventLogger, LifecycleEvent};
use serde::Serialize;
use tracing::{debug, info};

use crate::cascade::BulkOutcome;
use crate::context::HostContext;
use crate::editor::ScriptEditor;
use crate::version::is_newer;

/// A newer source waiting to be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub name: String,
    pub new_content: String,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
}

#[derive(Clone)]
pub struct UpdateChecker {
    ctx: Arc<HostContext>,
    editor: ScriptEditor,
}

impl UpdateChecker {
    pub fn new(ctx: Arc<HostContext>, editor: ScriptEditor) -> Self {
        Self { ctx, editor }
    }

    /// Fetch the latest source of every script with a download URL and record
    /// the ones that are newer. The pending set is replaced by this check's
    /// findings. A failed fetch means no update for that script.
    pub async fn check_updates(&self) -> Vec<PendingUpdate> {
        let candidates: Vec<(String, String, Option<String>)> = {
            let store = self.ctx.store.read().await;
            store
                .iter()
                .filter_map(|s| {
                    let url = s.headers.download_url.clone()?;
                    Some((s.name.clone(), url, s.headers.version.clone()))
                })
                .collect()
        };
        debug!(count = candidates.len(), "Checking for updates");

        let concurrency = self.ctx.settings.update_concurrency.max(1);
        let mut found: Vec<PendingUpdate> = stream::iter(candidates)
            .map(|(name, url, current)| {
                let fetcher = self.ctx.fetcher.clone();
                let parser = self.ctx.parser.clone();
                async move {
                    let content = match fetcher.fetch(&url).await {
                        Ok(content) => content,
                        Err(e) => {
                            debug!(script = %name, url = %redact_url(&url), error = %e, "Update fetch failed");
                            return None;
                        }
                    };
                    let latest = parser.parse(&content).version;
                    if !is_newer(current.as_deref(), latest.as_deref()) {
                        return None;
                    }
                    Some(PendingUpdate {
                        name,
                        new_content: content,
                        from_version: current,
                        to_version: latest,
                    })
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|update| async move { update })
            .collect()
            .await;
        found.sort_by(|a, b| a.name.cmp(&b.name));

        for update in &found {
            info!(
                script = %update.name,
                from = update.from_version.as_deref().unwrap_or("none"),
                to = update.to_version.as_deref().unwrap_or("none"),
                "Update available"
            );
            EventLogger::log_event(LifecycleEvent::UpdateAvailable {
                script: update.name.clone(),
                from: update.from_version.clone(),
                to: update.to_version.clone(),
            });
        }

        let mut pending = self.ctx.pending_updates.lock().await;
        pending.clear();
        pending.extend(found.iter().map(|u| (u.name.clone(), u.clone())));
        found
    }

    pub async fn pending(&self) -> Vec<PendingUpdate> {
        self.ctx.pending_updates.lock().await.values().cloned().collect()
    }

    /// Apply one pending update through the regular edit path. The update
    /// stays pending if the edit fails.
    pub async fn apply_update(&self, name: &str) -> ScriptResult<String> {
        let update = self
            .ctx
            .pending_updates
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;

        match self.editor.edit(name, &update.new_content).await {
            Ok(new_name) => {
                info!(script = %new_name, "Update applied");
                EventLogger::log_event(LifecycleEvent::UpdateApplied {
                    script: new_name.clone(),
                });
                Ok(new_name)
            }
            Err(err) => {
                self.ctx
                    .pending_updates
                    .lock()
                    .await
                    .insert(name.to_string(), update);
                Err(err)
            }
        }
    }

    pub async fn apply_all(&self) -> BulkOutcome {
        let names: Vec<String> = self.ctx.pending_updates.lock().await.keys().cloned().collect();
        let mut outcome = BulkOutcome::default();
        for name in names {
            match self.apply_update(&name).await {
                Ok(_) => outcome.succeeded.push(name),
                Err(err) => outcome.failed.push((name, err)),
            }
        }
        outcome
    }
}
