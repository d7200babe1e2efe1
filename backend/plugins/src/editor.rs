//! Installing, editing and removing scripts.
//!
//! Every source change goes through [`ScriptEditor::edit`], manual edits and
//! applied updates alike, so headers are re-parsed and dependencies
//! re-resolved the same way.
use std::sync::Arc;

use plugdeck_core::{Script, ScriptDeclaration, ScriptError, ScriptKind, ScriptResult, ScriptState};
use tracing::{info, warn};

use crate::cascade::BulkOutcome;
use crate::context::HostContext;
use crate::lifecycle::LifecycleController;

#[derive(Clone)]
pub struct ScriptEditor {
    ctx: Arc<HostContext>,
    lifecycle: LifecycleController,
}

impl ScriptEditor {
    pub fn new(ctx: Arc<HostContext>, lifecycle: LifecycleController) -> Self {
        Self { ctx, lifecycle }
    }

    fn parse(&self, source: &str) -> ScriptResult<Script> {
        let headers = self.ctx.parser.parse(source);
        if headers.name.trim().is_empty() {
            return Err(ScriptError::InvalidHeaders(
                "source does not declare a @name".to_string(),
            ));
        }
        Ok(Script::from_headers(source, headers))
    }

    /// Register a script from source. An existing script of the same name is
    /// replaced only when `overwrite` is set, and then through [`Self::edit`].
    pub async fn install(&self, source: &str, overwrite: bool) -> ScriptResult<String> {
        let script = self.parse(source)?;
        let name = script.name.clone();

        let exists = self.ctx.store.read().await.contains(&name);
        if exists {
            if !overwrite {
                return Err(ScriptError::DuplicateName(name));
            }
            return self.edit(&name, source).await;
        }

        self.ctx.store.write().await.register(script, false)?;
        info!(script = %name, "Installed script");
        Ok(name)
    }

    /// Replace a script's source, following a rename if the declared name
    /// changed. A running script is stopped and started again; a plugin's
    /// `enabled` flag is kept. Returns the script's (possibly new) name.
    pub async fn edit(&self, name: &str, new_source: &str) -> ScriptResult<String> {
        let mut replacement = self.parse(new_source)?;
        let new_name = replacement.name.clone();

        self.lifecycle.settle(name).await;
        let (was_running, was_active, enabled) = {
            let store = self.ctx.store.read().await;
            let script = store
                .get(name)
                .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
            if new_name != name && store.contains(&new_name) {
                return Err(ScriptError::DuplicateName(new_name));
            }
            (
                script.state == ScriptState::Running,
                script.is_active(),
                script.is_enabled(),
            )
        };

        if was_active {
            self.lifecycle.stop(name).await?;
        }

        {
            let mut store = self.ctx.store.write().await;
            if new_name != name {
                store.rename(name, &new_name)?;
            }
            replacement.set_enabled(enabled);
            store.register(replacement, true)?;
        }
        if new_name != name {
            self.ctx.usage.lock().await.rename(name, &new_name);
            info!(from = %name, to = %new_name, "Script renamed by edit");
        }
        info!(script = %new_name, "Script source updated");

        if was_running {
            self.lifecycle.start(&new_name).await?;
        }
        Ok(new_name)
    }

    /// Stop and remove a script. Consumers that still held it lose the record.
    pub async fn delete(&self, name: &str) -> ScriptResult<Script> {
        self.lifecycle.settle(name).await;
        self.lifecycle.stop(name).await?;

        let removed = self
            .ctx
            .store
            .write()
            .await
            .remove(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
        self.ctx.usage.lock().await.forget(name);
        info!(script = %name, kind = %removed.kind(), "Deleted script");
        Ok(removed)
    }

    /// Delete every script, or every script of one kind. Plugins go first so
    /// libraries are released by their consumers before they are removed.
    pub async fn clear(&self, kind: Option<ScriptKind>) -> BulkOutcome {
        let names: Vec<String> = {
            let store = self.ctx.store.read().await;
            let mut scripts: Vec<&Script> = store
                .iter()
                .filter(|s| kind.is_none_or(|k| s.kind() == k))
                .collect();
            scripts.sort_by_key(|s| s.is_library());
            scripts.into_iter().map(|s| s.name.clone()).collect()
        };

        let mut outcome = BulkOutcome::default();
        for name in names {
            match self.delete(&name).await {
                Ok(_) => outcome.succeeded.push(name),
                Err(ScriptError::NotFound(_)) => {}
                Err(err) => {
                    warn!(script = %name, error = %err, "Failed to remove script");
                    outcome.failed.push((name, err));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{library, Harness, TestScript};

    #[tokio::test]
    async fn install_registers_disabled_plugin() {
        let h = Harness::new();
        let source = TestScript::plugin("Clock").version("1.0").source();
        let name = h.host.install(&source, false).await.unwrap();
        assert_eq!(name, "Clock");

        let clock = h.host.get("Clock").await.unwrap();
        assert!(clock.is_plugin());
        assert!(!clock.is_enabled());
        assert_eq!(clock.state, ScriptState::Stopped);
    }

    #[tokio::test]
    async fn install_rejects_duplicates_and_nameless_sources() {
        let h = Harness::new();
        let source = TestScript::library("Time").source();
        h.host.install(&source, false).await.unwrap();
        assert_eq!(
            h.host.install(&source, false).await,
            Err(ScriptError::DuplicateName("Time".into()))
        );
        assert!(matches!(
            h.host.install("console.log(1);", false).await,
            Err(ScriptError::InvalidHeaders(_))
        ));
    }

    #[tokio::test]
    async fn edit_restarts_running_script_and_keeps_flag() {
        let h = Harness::new()
            .with_scripts(vec![TestScript::plugin("Clock").enabled().build()])
            .await;
        h.host.start("Clock").await.unwrap();

        let source = TestScript::plugin("Clock").version("2.0").source();
        h.host.edit("Clock", &source).await.unwrap();

        let clock = h.host.get("Clock").await.unwrap();
        assert!(clock.is_enabled());
        assert_eq!(clock.headers.version.as_deref(), Some("2.0"));
        assert_eq!(clock.state, ScriptState::Running);
        assert_eq!(h.executor.runs("Clock"), 2);
        assert_eq!(h.executor.hook_calls(), 1);
    }

    #[tokio::test]
    async fn edit_follows_rename_and_usage() {
        let h = Harness::new()
            .with_scripts(vec![
                TestScript::plugin("P").requires_lib("Old").build(),
                library("Old", &[]),
            ])
            .await;
        h.host.start("P").await.unwrap();

        let source = TestScript::plugin("P").requires_lib("Old").version("1.1").source();
        let renamed = TestScript::plugin("Q").requires_lib("Old").source();
        h.host.edit("P", &source).await.unwrap();
        assert_eq!(h.host.usage_count("Old").await, 1);

        let new_name = h.host.edit("P", &renamed).await.unwrap();
        assert_eq!(new_name, "Q");
        assert!(h.host.get("P").await.is_none());
        assert_eq!(h.host.state("Q").await, Some(ScriptState::Running));
        assert_eq!(h.host.usage_count("Old").await, 1);

        h.host.stop("Q").await.unwrap();
        assert_eq!(h.host.state("Old").await, Some(ScriptState::Stopped));
    }

    #[tokio::test]
    async fn edit_refuses_to_rename_onto_existing_name() {
        let h = Harness::new()
            .with_scripts(vec![library("A", &[]), library("B", &[])])
            .await;
        h.host.start("A").await.unwrap();
        let err = h
            .host
            .edit("A", &TestScript::library("B").source())
            .await
            .unwrap_err();
        assert_eq!(err, ScriptError::DuplicateName("B".into()));
        assert_eq!(h.host.state("A").await, Some(ScriptState::Running));
    }

    #[tokio::test]
    async fn delete_stops_and_removes() {
        let h = Harness::new()
            .with_scripts(vec![TestScript::plugin("P").enabled().build()])
            .await;
        h.host.start("P").await.unwrap();
        let removed = h.host.delete("P").await.unwrap();
        assert_eq!(removed.name, "P");
        assert!(h.host.get("P").await.is_none());
        assert_eq!(h.executor.hook_calls(), 1);
        assert_eq!(
            h.host.delete("P").await.unwrap_err(),
            ScriptError::NotFound("P".into())
        );
    }

    #[tokio::test]
    async fn clear_by_kind() {
        let h = Harness::new()
            .with_scripts(vec![
                TestScript::plugin("P").requires_lib("L").build(),
                library("L", &[]),
                library("Spare", &[]),
            ])
            .await;
        h.host.start("P").await.unwrap();

        let outcome = h.host.clear(Some(ScriptKind::Plugin)).await;
        assert_eq!(outcome.succeeded, vec!["P"]);
        assert_eq!(h.host.state("L").await, Some(ScriptState::Stopped));
        assert_eq!(h.host.list_by_kind(ScriptKind::Library).await.len(), 2);

        let outcome = h.host.clear(None).await;
        assert_eq!(outcome.succeeded.len(), 2);
        assert!(h.host.list_by_kind(ScriptKind::Library).await.is_empty());
    }
}
