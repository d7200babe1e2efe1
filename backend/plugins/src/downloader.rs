//! Fetches missing dependencies and their own missing dependencies.
//!
//! Failures never raise; every branch reports plain messages and the caller
//! decides what to do with them. A fetched script is only registered, never
//! started.
use std::sync::Arc;

use async_recursion::async_recursion;
use plugdeck_core::{Script, ScriptDeclaration, ScriptError};
use plugdeck_logging::{redact_url, EventLogger, LifecycleEvent};
use tracing::{debug, info, warn};

use crate::context::HostContext;

#[derive(Clone)]
pub struct DependencyDownloader {
    ctx: Arc<HostContext>,
}

impl DependencyDownloader {
    pub fn new(ctx: Arc<HostContext>) -> Self {
        Self { ctx }
    }

    /// Download `name` from `url`, then whatever it requires that is missing.
    ///
    /// `visited` holds the names already being downloaded above this call. A
    /// fetched script whose declared name is on it, or a chain deeper than the
    /// configured maximum, ends the branch without an error.
    #[async_recursion]
    pub async fn download(&self, name: &str, url: &str, visited: &[String]) -> Vec<String> {
        let source = match self.ctx.fetcher.fetch(url).await {
            Ok(source) => source,
            Err(e) => {
                warn!(script = %name, url = %redact_url(url), error = %e, "Download failed");
                EventLogger::log_event(LifecycleEvent::DownloadFailed {
                    script: name.to_string(),
                    url: url.to_string(),
                });
                return vec![format!("Could not download {name} from {url}")];
            }
        };

        let mut headers = self.ctx.parser.parse(&source);
        if headers.name.is_empty() {
            headers.name = name.to_string();
        }
        let declared = headers.name.clone();

        if visited.contains(&declared) {
            debug!(script = %declared, "Remote dependency cycle, not descending");
            return Vec::new();
        }
        if visited.len() > self.ctx.settings.max_download_depth {
            debug!(
                script = %declared,
                depth = visited.len(),
                "Remote dependency chain too deep, not descending"
            );
            return Vec::new();
        }

        let script = Script::from_headers(source, headers);
        let missing: Vec<_> = {
            let store = self.ctx.store.read().await;
            script
                .required_dependencies()
                .into_iter()
                .filter(|dep| !store.contains(&dep.name))
                .cloned()
                .collect()
        };

        let mut below = visited.to_vec();
        below.push(declared.clone());
        let mut failures = Vec::new();
        for dep in missing {
            match &dep.url {
                Some(dep_url) => {
                    if self.ctx.store.read().await.contains(&dep.name) {
                        continue;
                    }
                    failures.extend(self.download(&dep.name, dep_url, &below).await);
                }
                None => failures.push(
                    ScriptError::MissingDependency {
                        dependency: dep.name.clone(),
                        required_by: declared.clone(),
                    }
                    .to_string(),
                ),
            }
        }

        let mut store = self.ctx.store.write().await;
        if store.contains(&declared) {
            debug!(script = %declared, "Already installed, keeping existing copy");
        } else if let Err(e) = store.register(script, false) {
            failures.push(e.to_string());
        } else {
            info!(script = %declared, url = %redact_url(url), "Downloaded script");
            EventLogger::log_event(LifecycleEvent::Downloaded {
                script: declared,
                url: url.to_string(),
            });
        }
        failures
    }
}
