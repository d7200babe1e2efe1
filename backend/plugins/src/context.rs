//! The owned context every engine component works against.
//!
//! One `HostContext` is one registry: there is no process-wide state, so any
//! number of isolated hosts can live side by side.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use plugdeck_core::{Executor, Fetcher, HeaderParser, Persistence, ScriptResult};
use tokio::sync::{Mutex, RwLock};

use crate::settings::HostSettings;
use crate::store::ScriptStore;
use crate::updates::PendingUpdate;
use crate::usage::UsageTracker;
use crate::waits::WaitGraph;

/// Handle to an in-flight start, shared by every caller that asks for the same name.
pub type StartHandle = Shared<BoxFuture<'static, ScriptResult<()>>>;

pub struct HostContext {
    pub(crate) store: RwLock<ScriptStore>,
    pub(crate) usage: Mutex<UsageTracker>,
    pub(crate) starts: Mutex<HashMap<String, StartHandle>>,
    /// Only locked for short synchronous sections, after `starts` if both are held.
    pub(crate) waits: std::sync::Mutex<WaitGraph>,
    pub(crate) pending_updates: Mutex<BTreeMap<String, PendingUpdate>>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) parser: Arc<dyn HeaderParser>,
    pub(crate) persistence: Arc<dyn Persistence>,
    pub(crate) settings: HostSettings,
}

impl HostContext {
    pub fn new(
        executor: Arc<dyn Executor>,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn HeaderParser>,
        persistence: Arc<dyn Persistence>,
        settings: HostSettings,
    ) -> Self {
        Self {
            store: RwLock::new(ScriptStore::new()),
            usage: Mutex::new(UsageTracker::new()),
            starts: Mutex::new(HashMap::new()),
            waits: std::sync::Mutex::new(WaitGraph::new()),
            pending_updates: Mutex::new(BTreeMap::new()),
            executor,
            fetcher,
            parser,
            persistence,
            settings,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub(crate) fn lock_waits(&self) -> MutexGuard<'_, WaitGraph> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
