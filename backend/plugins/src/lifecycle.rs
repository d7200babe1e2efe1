//! Script lifecycle: start/stop state machines with dependency ordering.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               \-> Errored -> (stop) -> Stopped
//! ```
//!
//! A script's own code never runs before every required dependency has
//! started. Optional dependencies are best effort. At most one start per name
//! is in flight; later callers await the same handle.

use std::sync::Arc;

use async_recursion::async_recursion;
use futures::future::{join_all, BoxFuture, FutureExt};
use plugdeck_core::{ScriptDeclaration, ScriptError, ScriptResult, ScriptState};
use plugdeck_logging::{EventLogger, LifecycleEvent};
use tracing::{debug, info, warn};

use crate::context::HostContext;
use crate::resolver;

#[derive(Clone)]
pub struct LifecycleController {
    ctx: Arc<HostContext>,
}

impl LifecycleController {
    pub fn new(ctx: Arc<HostContext>) -> Self {
        Self { ctx }
    }

    /// Start a script and, first, everything it requires.
    pub async fn start(&self, name: &str) -> ScriptResult<()> {
        self.start_with_path(name, Vec::new()).await
    }

    /// Start `name` on behalf of the chain of callers in `path`.
    ///
    /// A name already on `path` is a cycle. Otherwise an in-flight start for
    /// the same name is joined instead of running the script twice, unless
    /// that start is itself waiting on the caller.
    pub fn start_with_path(
        &self,
        name: &str,
        path: Vec<String>,
    ) -> BoxFuture<'static, ScriptResult<()>> {
        let this = self.clone();
        let name = name.to_string();
        async move {
            if path.contains(&name) {
                let mut cycle = path;
                cycle.push(name);
                return Err(ScriptError::CircularDependency(cycle));
            }
            let waiter = path.last().cloned();

            let (handle, _edge) = {
                let mut starts = this.ctx.starts.lock().await;
                let existing = starts.get(&name).cloned();

                let edge = match &waiter {
                    Some(waiter) => {
                        let mut waits = this.ctx.lock_waits();
                        if existing.is_some() {
                            if let Some(chain) = waits.chain(&name, waiter) {
                                let mut cycle = vec![waiter.clone()];
                                cycle.extend(chain);
                                warn!(script = %name, waiter = %waiter, "In-flight start already waits on its caller");
                                return Err(ScriptError::CircularDependency(cycle));
                            }
                        }
                        waits.add(waiter, &name);
                        Some(WaitEdge {
                            ctx: this.ctx.clone(),
                            waiter: waiter.clone(),
                            target: name.clone(),
                        })
                    }
                    None => None,
                };

                let handle = match existing {
                    Some(existing) => {
                        debug!(script = %name, "Joining in-flight start");
                        existing
                    }
                    None => {
                        let runner = this.clone();
                        let key = name.clone();
                        let handle = async move {
                            let result = runner.run_start(&key, path).await;
                            runner.ctx.starts.lock().await.remove(&key);
                            result
                        }
                        .boxed()
                        .shared();
                        starts.insert(name.clone(), handle.clone());
                        handle
                    }
                };
                (handle, edge)
            };
            handle.await
        }
        .boxed()
    }

    /// Wait for an in-flight start of `name`, if there is one. The outcome is ignored.
    pub async fn settle(&self, name: &str) {
        let handle = self.ctx.starts.lock().await.get(name).cloned();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run_start(&self, name: &str, path: Vec<String>) -> ScriptResult<()> {
        let (required, optional) = {
            let mut store = self.ctx.store.write().await;
            let script = store
                .get(name)
                .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
            match script.state {
                ScriptState::Running => return Ok(()),
                ScriptState::Starting | ScriptState::Stopping => {
                    return Err(ScriptError::state_conflict(name, script.state, "start"));
                }
                ScriptState::Stopped | ScriptState::Errored => {}
            }

            let required: Vec<String> = script
                .required_dependencies()
                .into_iter()
                .map(|d| d.name.clone())
                .collect();
            let optional: Vec<String> = script
                .optional_dependencies()
                .into_iter()
                .map(|d| d.name.clone())
                .filter(|d| {
                    let present = store.contains(d);
                    if !present {
                        debug!(script = %name, dependency = %d, "Optional dependency not installed");
                    }
                    present
                })
                .collect();

            let cycle = if path.is_empty() {
                resolver::find_cycle(&store, name)
            } else {
                None
            };
            let precheck = cycle.map(ScriptError::CircularDependency).or_else(|| {
                required
                    .iter()
                    .find(|d| !store.contains(d))
                    .map(|d| ScriptError::MissingDependency {
                        dependency: d.clone(),
                        required_by: name.to_string(),
                    })
            });

            if let Some(script) = store.get_mut(name) {
                script.state = ScriptState::Starting;
            }
            if let Some(err) = precheck {
                drop(store);
                return self.fail(name, err).await;
            }
            (required, optional)
        };

        let mut child_path = path;
        child_path.push(name.to_string());

        let results = join_all(
            required
                .iter()
                .map(|dep| self.start_with_path(dep, child_path.clone())),
        )
        .await;
        let mut first_error = None;
        let mut acquired = Vec::new();
        for (dep, result) in required.iter().zip(results) {
            match result {
                Ok(()) => acquired.push(dep.clone()),
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(_) => {}
            }
        }
        // Dependencies that did start stay held even if a sibling failed.
        self.acquire_all(&acquired, name).await;
        if let Some(err) = first_error {
            return self.fail(name, err).await;
        }

        let results = join_all(
            optional
                .iter()
                .map(|dep| self.start_with_path(dep, child_path.clone())),
        )
        .await;
        let mut acquired = Vec::new();
        for (dep, result) in optional.iter().zip(results) {
            match result {
                Ok(()) => acquired.push(dep.clone()),
                Err(err) => {
                    warn!(script = %name, dependency = %dep, error = %err, "Optional dependency failed to start");
                    EventLogger::log_event(LifecycleEvent::OptionalDependencyFailed {
                        script: name.to_string(),
                        dependency: dep.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        self.acquire_all(&acquired, name).await;

        let source = {
            let store = self.ctx.store.read().await;
            match store.get(name) {
                Some(script) if script.state == ScriptState::Starting => script.source.clone(),
                Some(script) => {
                    let err = ScriptError::state_conflict(name, script.state, "start");
                    drop(store);
                    self.release_holdings(name).await;
                    return Err(err);
                }
                None => {
                    drop(store);
                    self.release_holdings(name).await;
                    return Err(ScriptError::NotFound(name.to_string()));
                }
            }
        };

        let execution = match self.ctx.executor.run(name, &source).await {
            Ok(execution) => execution,
            Err(cause) => return self.fail(name, ScriptError::execution(name, &cause)).await,
        };

        let vanished = {
            let mut store = self.ctx.store.write().await;
            match store.get_mut(name) {
                Some(script) if script.state == ScriptState::Starting => {
                    script.exports = execution.exports;
                    script.stop_hooks = execution.on_stop.into_iter().collect();
                    script.state = ScriptState::Running;
                    None
                }
                Some(script) => Some((
                    ScriptError::state_conflict(name, script.state, "start"),
                    execution.on_stop,
                )),
                None => Some((ScriptError::NotFound(name.to_string()), execution.on_stop)),
            }
        };
        if let Some((err, on_stop)) = vanished {
            // The script went away while its code ran; undo what the run set up.
            if let Some(hook) = on_stop {
                if let Err(e) = hook.call() {
                    warn!(script = %name, error = %e, "Stop hook failed");
                }
            }
            self.release_holdings(name).await;
            return Err(err);
        }

        info!(script = %name, "Script started");
        EventLogger::log_event(LifecycleEvent::Started {
            script: name.to_string(),
        });
        Ok(())
    }

    async fn fail(&self, name: &str, err: ScriptError) -> ScriptResult<()> {
        if let Some(script) = self.ctx.store.write().await.get_mut(name) {
            if script.state == ScriptState::Starting {
                script.state = ScriptState::Errored;
            }
        }
        warn!(script = %name, error = %err, "Script failed to start");
        EventLogger::log_event(LifecycleEvent::StartFailed {
            script: name.to_string(),
            error: err.to_string(),
        });
        Err(err)
    }

    async fn acquire_all(&self, dependencies: &[String], consumer: &str) {
        if dependencies.is_empty() {
            return;
        }
        let mut usage = self.ctx.usage.lock().await;
        for dep in dependencies {
            usage.acquire(dep, consumer);
        }
    }

    /// Stop a running or errored script. Stopping a stopped script is a no-op.
    ///
    /// Every stop hook runs even if an earlier one fails. Releasing the
    /// script's dependencies may in turn stop libraries nobody uses anymore.
    #[async_recursion]
    pub async fn stop(&self, name: &str) -> ScriptResult<()> {
        let hooks = {
            let mut store = self.ctx.store.write().await;
            let script = store
                .get_mut(name)
                .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
            match script.state {
                ScriptState::Stopped => return Ok(()),
                ScriptState::Starting | ScriptState::Stopping => {
                    return Err(ScriptError::state_conflict(name, script.state, "stop"));
                }
                ScriptState::Running | ScriptState::Errored => {}
            }
            script.state = ScriptState::Stopping;
            std::mem::take(&mut script.stop_hooks)
        };

        for (i, hook) in hooks.iter().enumerate() {
            if let Err(e) = hook.call() {
                warn!(script = %name, hook = i, error = %e, "Stop hook failed");
                EventLogger::log_event(LifecycleEvent::StopHookFailed {
                    script: name.to_string(),
                    hook: i,
                    error: format!("{e:#}"),
                });
            }
        }

        self.release_holdings(name).await;

        if let Some(script) = self.ctx.store.write().await.get_mut(name) {
            script.exports = None;
            script.state = ScriptState::Stopped;
        }
        info!(script = %name, "Script stopped");
        EventLogger::log_event(LifecycleEvent::Stopped {
            script: name.to_string(),
        });
        Ok(())
    }

    /// Drop one consumer's hold on a dependency, stopping it if it is a
    /// library that nothing uses anymore.
    pub async fn release(&self, dependency: &str, consumer: &str) {
        let unused = self.ctx.usage.lock().await.release(dependency, consumer);
        if unused {
            self.stop_if_unused_library(dependency).await;
        }
    }

    async fn release_holdings(&self, consumer: &str) {
        let unused = self.ctx.usage.lock().await.release_all(consumer);
        for dependency in unused {
            self.stop_if_unused_library(&dependency).await;
        }
    }

    async fn stop_if_unused_library(&self, name: &str) {
        let is_active_library = {
            let store = self.ctx.store.read().await;
            store
                .get(name)
                .is_some_and(|s| s.is_library() && s.is_active())
        };
        if !is_active_library || self.ctx.usage.lock().await.is_used(name) {
            return;
        }
        debug!(library = %name, "Last consumer released library");
        if let Err(e) = self.stop(name).await {
            warn!(library = %name, error = %e, "Failed to stop unused library");
        }
    }
}

/// A recorded wait, removed again when the waiting future finishes or is dropped.
struct WaitEdge {
    ctx: Arc<HostContext>,
    waiter: String,
    target: String,
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        self.ctx.lock_waits().remove(&self.waiter, &self.target);
    }
}
