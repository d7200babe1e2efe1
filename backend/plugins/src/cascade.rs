//! Enable/disable cascades, split into a pure plan and a committing pass.
//!
//! Planning only reads the store. Whatever it returns, nothing has changed
//! yet; the caller shows the confirmation (if any) and then commits.
use std::sync::Arc;

use async_recursion::async_recursion;
use plugdeck_core::{DependencyRef, ScriptError, ScriptKind, ScriptResult};
use tracing::{info, warn};

use crate::context::HostContext;
use crate::downloader::DependencyDownloader;
use crate::lifecycle::LifecycleController;
use crate::resolver;
use crate::store::ScriptStore;

/// Result of planning a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision<P> {
    /// Nothing needs the user's consent.
    Proceed(P),
    /// Some implied side effects need consent first.
    Confirm {
        message: String,
        affected: Vec<String>,
        plan: P,
    },
    Error(ScriptError),
}

impl<P> PlanDecision<P> {
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, PlanDecision::Confirm { .. })
    }

    pub fn plan(&self) -> Option<&P> {
        match self {
            PlanDecision::Proceed(plan) | PlanDecision::Confirm { plan, .. } => Some(plan),
            PlanDecision::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnablePlan {
    pub targets: Vec<String>,
    pub will_download: Vec<DependencyRef>,
    pub will_enable: Vec<String>,
    /// Targets whose dependencies cannot be resolved; commit leaves them alone.
    pub skipped: Vec<(String, ScriptError)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisablePlan {
    pub targets: Vec<String>,
    /// Enabled plugins that go down with the targets, in discovery order.
    pub dependents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ScriptError)>,
}

impl BulkOutcome {
    fn record(&mut self, name: &str, result: ScriptResult<()>) {
        match result {
            Ok(()) => self.succeeded.push(name.to_string()),
            Err(err) => self.failed.push((name.to_string(), err)),
        }
    }
}

/// Outcome of a one-shot toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Done,
    NeedsConfirmation { message: String, affected: Vec<String> },
}

/// Only plugins carry an enabled flag; a library runs exactly while something uses it.
fn toggleable(store: &ScriptStore, name: &str, operation: &str) -> ScriptResult<()> {
    let script = store
        .get(name)
        .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
    if script.is_library() {
        return Err(ScriptError::state_conflict(name, script.state, operation));
    }
    Ok(())
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[derive(Clone)]
pub struct CascadeCoordinator {
    ctx: Arc<HostContext>,
    lifecycle: LifecycleController,
    downloader: DependencyDownloader,
}

impl CascadeCoordinator {
    pub fn new(
        ctx: Arc<HostContext>,
        lifecycle: LifecycleController,
        downloader: DependencyDownloader,
    ) -> Self {
        Self {
            ctx,
            lifecycle,
            downloader,
        }
    }

    pub async fn plan_enable(&self, name: &str) -> PlanDecision<EnablePlan> {
        let check = {
            let store = self.ctx.store.read().await;
            if let Err(err) = toggleable(&store, name, "enable") {
                return PlanDecision::Error(err);
            }
            resolver::check_dependencies(&store, name)
        };
        if let Some(err) = check.error {
            return PlanDecision::Error(err);
        }
        self.decide_enable(EnablePlan {
            targets: vec![name.to_string()],
            will_download: check.will_download,
            will_enable: check.will_enable,
            skipped: Vec::new(),
        })
    }

    /// Union the per-script findings so the user is asked once.
    pub async fn plan_enable_many(&self, names: &[String]) -> PlanDecision<EnablePlan> {
        let mut plan = EnablePlan::default();
        {
            let store = self.ctx.store.read().await;
            for name in names {
                if let Err(err) = toggleable(&store, name, "enable") {
                    plan.skipped.push((name.clone(), err));
                    continue;
                }
                let check = resolver::check_dependencies(&store, name);
                if let Some(err) = check.error {
                    plan.skipped.push((name.clone(), err));
                    continue;
                }
                plan.targets.push(name.clone());
                for dep in check.will_download {
                    if !plan.will_download.iter().any(|d| d.name == dep.name) {
                        plan.will_download.push(dep);
                    }
                }
                for dep in check.will_enable {
                    if !plan.will_enable.contains(&dep) {
                        plan.will_enable.push(dep);
                    }
                }
            }
        }
        plan.will_enable.retain(|n| !plan.targets.contains(n));
        self.decide_enable(plan)
    }

    /// Every disabled plugin.
    pub async fn plan_enable_all(&self) -> PlanDecision<EnablePlan> {
        let names: Vec<String> = {
            let store = self.ctx.store.read().await;
            store
                .list_by_kind(ScriptKind::Plugin)
                .into_iter()
                .filter(|s| !s.is_enabled())
                .map(|s| s.name.clone())
                .collect()
        };
        self.plan_enable_many(&names).await
    }

    fn decide_enable(&self, plan: EnablePlan) -> PlanDecision<EnablePlan> {
        let policy = self.ctx.settings.policy;
        let downloads: Vec<String> = plan
            .will_download
            .iter()
            .filter(|d| policy.download_needs_confirmation(d.kind))
            .map(|d| d.name.clone())
            .collect();
        let enables: Vec<String> = if policy.confirm_plugin_enable {
            plan.will_enable.clone()
        } else {
            Vec::new()
        };
        if downloads.is_empty() && enables.is_empty() {
            return PlanDecision::Proceed(plan);
        }

        let mut effects = Vec::new();
        if !downloads.is_empty() {
            effects.push(format!("download {}", join_names(&downloads)));
        }
        if !enables.is_empty() {
            effects.push(format!("enable {}", join_names(&enables)));
        }
        let message = format!(
            "Enabling {} will also {}.",
            join_names(&plan.targets),
            effects.join(" and ")
        );
        let mut affected = downloads;
        affected.extend(enables);
        PlanDecision::Confirm {
            message,
            affected,
            plan,
        }
    }

    /// Download, enable and start everything `name` needs, then `name` itself.
    ///
    /// Resolution is repeated here; the store may have changed since planning.
    #[async_recursion]
    pub async fn commit_enable(&self, name: &str) -> ScriptResult<()> {
        toggleable(&*self.ctx.store.read().await, name, "enable")?;
        let mut check = self.check(name).await?;

        if !check.will_download.is_empty() {
            let visited = vec![name.to_string()];
            let mut failures = Vec::new();
            for dep in &check.will_download {
                if let Some(url) = &dep.url {
                    failures.extend(self.downloader.download(&dep.name, url, &visited).await);
                }
            }
            if !failures.is_empty() {
                return Err(ScriptError::DownloadFailure(failures));
            }

            check = self.check(name).await?;
            if !check.will_download.is_empty() {
                let unresolved = check
                    .will_download
                    .iter()
                    .map(|d| format!("{} was not provided by {}", d.name, d.url.as_deref().unwrap_or("")))
                    .collect();
                return Err(ScriptError::DownloadFailure(unresolved));
            }
        }

        for dep in &check.will_enable {
            self.commit_enable(dep).await?;
        }

        self.set_flag(name, true).await?;
        self.lifecycle.start(name).await?;
        info!(script = %name, "Enabled");
        Ok(())
    }

    pub async fn plan_disable(&self, name: &str) -> PlanDecision<DisablePlan> {
        let dependents = {
            let store = self.ctx.store.read().await;
            if let Err(err) = toggleable(&store, name, "disable") {
                return PlanDecision::Error(err);
            }
            resolver::check_dependents(&store, name)
        };
        Self::decide_disable(DisablePlan {
            targets: vec![name.to_string()],
            dependents,
        })
    }

    pub async fn plan_disable_many(&self, names: &[String]) -> PlanDecision<DisablePlan> {
        let mut plan = DisablePlan::default();
        {
            let store = self.ctx.store.read().await;
            for name in names {
                if let Err(err) = toggleable(&store, name, "disable") {
                    return PlanDecision::Error(err);
                }
                plan.targets.push(name.clone());
                for dependent in resolver::check_dependents(&store, name) {
                    if !plan.dependents.contains(&dependent) {
                        plan.dependents.push(dependent);
                    }
                }
            }
        }
        plan.dependents.retain(|n| !plan.targets.contains(n));
        Self::decide_disable(plan)
    }

    /// Every enabled plugin.
    pub async fn plan_disable_all(&self) -> PlanDecision<DisablePlan> {
        let names: Vec<String> = {
            let store = self.ctx.store.read().await;
            store
                .list_by_kind(ScriptKind::Plugin)
                .into_iter()
                .filter(|s| s.is_enabled())
                .map(|s| s.name.clone())
                .collect()
        };
        self.plan_disable_many(&names).await
    }

    fn decide_disable(plan: DisablePlan) -> PlanDecision<DisablePlan> {
        if plan.dependents.is_empty() {
            return PlanDecision::Proceed(plan);
        }
        let message = format!(
            "Disabling {} will also disable {}.",
            join_names(&plan.targets),
            join_names(&plan.dependents)
        );
        PlanDecision::Confirm {
            affected: plan.dependents.clone(),
            message,
            plan,
        }
    }

    /// Disable and stop `name`, then every enabled plugin that depends on it.
    pub async fn commit_disable(&self, name: &str) -> ScriptResult<()> {
        let dependents = {
            let store = self.ctx.store.read().await;
            toggleable(&store, name, "disable")?;
            resolver::check_dependents(&store, name)
        };

        self.disable_and_stop(name).await?;
        for dependent in &dependents {
            if let Err(e) = self.disable_and_stop(dependent).await {
                warn!(script = %dependent, error = %e, "Failed to stop dependent");
            }
        }
        info!(script = %name, dependents = dependents.len(), "Disabled");
        Ok(())
    }

    pub async fn commit_enable_many(&self, plan: &EnablePlan) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for name in &plan.targets {
            let result = self.commit_enable(name).await;
            outcome.record(name, result);
        }
        outcome
    }

    pub async fn commit_disable_many(&self, plan: &DisablePlan) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for name in &plan.targets {
            let result = self.commit_disable(name).await;
            outcome.record(name, result);
        }
        outcome
    }

    /// Plan and, when allowed, commit in one call.
    pub async fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
        confirmed: bool,
    ) -> ScriptResult<ToggleOutcome> {
        let (needs_confirmation, message, affected) = if enabled {
            match self.plan_enable(name).await {
                PlanDecision::Error(err) => return Err(err),
                PlanDecision::Proceed(_) => (false, String::new(), Vec::new()),
                PlanDecision::Confirm { message, affected, .. } => (true, message, affected),
            }
        } else {
            match self.plan_disable(name).await {
                PlanDecision::Error(err) => return Err(err),
                PlanDecision::Proceed(_) => (false, String::new(), Vec::new()),
                PlanDecision::Confirm { message, affected, .. } => (true, message, affected),
            }
        };
        if needs_confirmation && !confirmed {
            return Ok(ToggleOutcome::NeedsConfirmation { message, affected });
        }

        if enabled {
            self.commit_enable(name).await?;
        } else {
            self.commit_disable(name).await?;
        }
        Ok(ToggleOutcome::Done)
    }

    async fn check(&self, name: &str) -> ScriptResult<resolver::DependencyCheck> {
        let check = {
            let store = self.ctx.store.read().await;
            resolver::check_dependencies(&store, name)
        };
        match check.error {
            Some(err) => Err(err),
            None => Ok(check),
        }
    }

    async fn disable_and_stop(&self, name: &str) -> ScriptResult<()> {
        self.set_flag(name, false).await?;
        self.lifecycle.settle(name).await;
        self.lifecycle.stop(name).await
    }

    async fn set_flag(&self, name: &str, enabled: bool) -> ScriptResult<()> {
        let mut store = self.ctx.store.write().await;
        let script = store
            .get_mut(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
        script.set_enabled(enabled);
        Ok(())
    }
}
