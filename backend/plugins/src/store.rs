//! Script store: the single source of truth for installed scripts.
//!
//! Names are unique across both kinds. Iteration order is by name so bulk
//! operations and reverse-dependency walks are deterministic.
use std::collections::BTreeMap;

use plugdeck_core::{Script, ScriptDeclaration, ScriptError, ScriptKind, ScriptRecord, ScriptResult};
use tracing::debug;

#[derive(Debug, Default)]
pub struct ScriptStore {
    scripts: BTreeMap<String, Script>,
}

impl ScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a script. Fails with `DuplicateName` if the name is taken and
    /// `overwrite` is false; an overwritten entry is returned.
    pub fn register(&mut self, script: Script, overwrite: bool) -> ScriptResult<Option<Script>> {
        if !overwrite && self.scripts.contains_key(&script.name) {
            return Err(ScriptError::DuplicateName(script.name));
        }
        debug!(script = %script.name, kind = %script.kind(), "Registered script");
        Ok(self.scripts.insert(script.name.clone(), script))
    }

    /// Move a script to a new key. Either the rename happens completely or not at all.
    pub fn rename(&mut self, old: &str, new: &str) -> ScriptResult<()> {
        if old == new {
            return if self.scripts.contains_key(old) {
                Ok(())
            } else {
                Err(ScriptError::NotFound(old.to_string()))
            };
        }
        if self.scripts.contains_key(new) {
            return Err(ScriptError::DuplicateName(new.to_string()));
        }
        let mut script = self
            .scripts
            .remove(old)
            .ok_or_else(|| ScriptError::NotFound(old.to_string()))?;
        script.name = new.to_string();
        script.headers.name = new.to_string();
        self.scripts.insert(new.to_string(), script);
        debug!(from = %old, to = %new, "Renamed script");
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Script> {
        self.scripts.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Script> {
        self.scripts.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn list_by_kind(&self, kind: ScriptKind) -> Vec<&Script> {
        self.scripts.values().filter(|s| s.kind() == kind).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.scripts.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Persistable records for one kind.
    pub fn records(&self, kind: ScriptKind) -> Vec<ScriptRecord> {
        self.list_by_kind(kind).into_iter().map(Script::record).collect()
    }
}
