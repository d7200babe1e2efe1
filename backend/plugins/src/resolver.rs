//! Dependency resolver: read-only graph queries over the script store.
//!
//! Edges are never stored; they are derived on demand from each script's
//! headers. Walks are iterative with an explicit path stack so deep graphs do
//! not grow the call stack.
use std::collections::{HashSet, VecDeque};

use plugdeck_core::{DependencyRef, Script, ScriptDeclaration, ScriptError, ScriptResult};

use crate::store::ScriptStore;

/// Outcome of a required-dependency walk from one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyCheck {
    pub error: Option<ScriptError>,
    /// Absent dependencies that declare a URL, deduplicated by name.
    pub will_download: Vec<DependencyRef>,
    /// Present but disabled plugins, deduplicated.
    pub will_enable: Vec<String>,
}

impl DependencyCheck {
    fn failed(error: ScriptError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// True when nothing has to be downloaded or enabled first.
    pub fn is_satisfied(&self) -> bool {
        self.is_ok() && self.will_download.is_empty() && self.will_enable.is_empty()
    }
}

/// What a walk should do with the dependency it just reached.
enum Step {
    Descend,
    Skip,
    Abort(ScriptError),
}

struct Frame {
    name: String,
    deps: Vec<DependencyRef>,
    next: usize,
}

impl Frame {
    fn new(script: &Script) -> Self {
        Self {
            name: script.name.clone(),
            deps: script.required_dependencies().into_iter().cloned().collect(),
            next: 0,
        }
    }
}

/// Traversal state for a depth-first walk: the current path and every node
/// already fully explored.
struct RequiredWalk {
    frames: Vec<Frame>,
    explored: HashSet<String>,
}

impl RequiredWalk {
    fn new(root: &Script) -> Self {
        Self {
            frames: vec![Frame::new(root)],
            explored: HashSet::new(),
        }
    }

    fn on_path(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.name == name)
    }

    fn path_to(&self, name: &str) -> Vec<String> {
        let mut path: Vec<String> = self.frames.iter().map(|f| f.name.clone()).collect();
        path.push(name.to_string());
        path
    }

    /// Drive the walk over required edges. A dependency already on the current
    /// path aborts with `CircularDependency`.
    fn run<F>(mut self, store: &ScriptStore, mut visit: F) -> ScriptResult<()>
    where
        F: FnMut(&str, &DependencyRef, Option<&Script>) -> Step,
    {
        while let Some(frame) = self.frames.last_mut() {
            let next = frame.deps.get(frame.next).cloned();
            let required_by = frame.name.clone();
            frame.next += 1;

            let Some(dep) = next else {
                self.frames.pop();
                self.explored.insert(required_by);
                continue;
            };

            if self.on_path(&dep.name) {
                return Err(ScriptError::CircularDependency(self.path_to(&dep.name)));
            }

            let target = store.get(&dep.name);
            match visit(&required_by, &dep, target) {
                Step::Abort(err) => return Err(err),
                Step::Skip => {}
                Step::Descend => {
                    if let Some(script) = target {
                        if !self.explored.contains(&script.name) {
                            self.frames.push(Frame::new(script));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Walk required edges from `name`, collecting what must be downloaded or
/// enabled first. Fails fast: the first cycle or unfetchable dependency is
/// returned alone, with both lists empty.
pub fn check_dependencies(store: &ScriptStore, name: &str) -> DependencyCheck {
    let Some(root) = store.get(name) else {
        return DependencyCheck::failed(ScriptError::NotFound(name.to_string()));
    };

    let mut check = DependencyCheck::default();
    let result = RequiredWalk::new(root).run(store, |required_by, dep, target| match target {
        Some(script) => {
            if script.is_plugin() && !script.is_enabled() && !check.will_enable.contains(&dep.name) {
                check.will_enable.push(dep.name.clone());
            }
            Step::Descend
        }
        None if dep.url.is_some() => {
            if !check.will_download.iter().any(|d| d.name == dep.name) {
                check.will_download.push(dep.clone());
            }
            Step::Skip
        }
        None => Step::Abort(ScriptError::MissingDependency {
            dependency: dep.name.clone(),
            required_by: required_by.to_string(),
        }),
    });

    match result {
        Ok(()) => check,
        Err(err) => DependencyCheck::failed(err),
    }
}

/// Cycle detection over the required edges that currently resolve. Missing
/// dependencies are ignored here; the caller reports them separately.
pub fn find_cycle(store: &ScriptStore, name: &str) -> Option<Vec<String>> {
    let root = store.get(name)?;
    let result = RequiredWalk::new(root).run(store, |_, _, target| match target {
        Some(_) => Step::Descend,
        None => Step::Skip,
    });
    match result {
        Err(ScriptError::CircularDependency(path)) => Some(path),
        _ => None,
    }
}

/// Enabled plugins that transitively require `name`, in discovery order.
///
/// Libraries are walked through but never reported; disabled plugins end the
/// walk on their branch.
pub fn check_dependents(store: &ScriptStore, name: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut visited: HashSet<String> = HashSet::from([name.to_string()]);
    let mut queue = VecDeque::from([name.to_string()]);

    while let Some(current) = queue.pop_front() {
        for script in store.iter() {
            if visited.contains(&script.name) || !script.requires(&current) {
                continue;
            }
            if script.is_plugin() && !script.is_enabled() {
                continue;
            }
            visited.insert(script.name.clone());
            if script.is_plugin() {
                found.push(script.name.clone());
            }
            queue.push_back(script.name.clone());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{library, plugin, TestScript};

    fn store_of(scripts: Vec<Script>) -> ScriptStore {
        let mut store = ScriptStore::new();
        for script in scripts {
            store.register(script, false).unwrap();
        }
        store
    }

    #[test]
    fn mutual_cycle_reports_full_path() {
        let store = store_of(vec![library("A", &["B"]), library("B", &["A"])]);
        let check = check_dependencies(&store, "A");
        assert_eq!(
            check.error,
            Some(ScriptError::CircularDependency(vec![
                "A".into(),
                "B".into(),
                "A".into()
            ]))
        );
        assert!(check.will_download.is_empty());
        assert!(check.will_enable.is_empty());
    }

    #[test]
    fn self_cycle_is_detected() {
        let store = store_of(vec![library("A", &["A"])]);
        let check = check_dependencies(&store, "A");
        assert_eq!(check.error.unwrap().cycle_path().unwrap(), ["A", "A"]);
    }

    #[test]
    fn cycle_discards_other_findings() {
        let store = store_of(vec![
            TestScript::plugin("Root")
                .requires_lib_at("Remote", "https://cdn/remote.js")
                .requires_lib("A")
                .build(),
            library("A", &["B"]),
            library("B", &["A"]),
        ]);
        let check = check_dependencies(&store, "Root");
        assert!(check.error.unwrap().cycle_path().is_some());
        assert!(check.will_download.is_empty());
    }

    #[test]
    fn missing_dependency_without_url() {
        let store = store_of(vec![plugin("P", &["Gone"])]);
        let check = check_dependencies(&store, "P");
        assert_eq!(
            check.error,
            Some(ScriptError::MissingDependency {
                dependency: "Gone".into(),
                required_by: "P".into()
            })
        );
        assert!(check.will_download.is_empty());
    }

    #[test]
    fn missing_dependency_with_url_is_downloaded() {
        let store = store_of(vec![TestScript::plugin("P")
            .requires_lib_at("Time", "https://cdn/time.js")
            .requires_lib_at("Time", "https://cdn/time.js")
            .build()]);
        let check = check_dependencies(&store, "P");
        assert!(check.error.is_none());
        assert_eq!(
            check.will_download,
            vec![DependencyRef::library("Time", Some("https://cdn/time.js"))]
        );
        assert!(!check.is_satisfied());
    }

    #[test]
    fn disabled_required_plugin_will_be_enabled() {
        let store = store_of(vec![
            TestScript::plugin("P").requires_plugin("Theme").build(),
            TestScript::plugin("Theme").requires_plugin("Base").build(),
            TestScript::plugin("Base").enabled().build(),
        ]);
        let check = check_dependencies(&store, "P");
        assert!(check.is_ok());
        assert_eq!(check.will_enable, vec!["Theme"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let store = store_of(vec![
            plugin("A", &["B", "C"]),
            library("B", &["D"]),
            library("C", &["D"]),
            library("D", &[]),
        ]);
        assert!(check_dependencies(&store, "A").is_satisfied());
        assert!(find_cycle(&store, "A").is_none());
    }

    #[test]
    fn optional_edges_are_not_walked() {
        let store = store_of(vec![TestScript::plugin("P").optional_lib("Nowhere").build()]);
        assert!(check_dependencies(&store, "P").is_satisfied());
    }

    #[test]
    fn unknown_root_is_not_found() {
        let check = check_dependencies(&ScriptStore::new(), "ghost");
        assert_eq!(check.error, Some(ScriptError::NotFound("ghost".into())));
    }

    #[test]
    fn find_cycle_ignores_missing() {
        let store = store_of(vec![library("A", &["Gone", "B"]), library("B", &["A"])]);
        assert_eq!(find_cycle(&store, "A").unwrap(), vec!["A", "B", "A"]);
    }

    #[test]
    fn dependents_are_deduplicated_in_discovery_order() {
        let store = store_of(vec![
            library("Lib", &[]),
            TestScript::plugin("P1").requires_lib("Lib").enabled().build(),
            TestScript::plugin("P2")
                .requires_lib("Lib")
                .requires_plugin("P1")
                .enabled()
                .build(),
        ]);
        assert_eq!(check_dependents(&store, "Lib"), vec!["P1", "P2"]);
    }

    #[test]
    fn dependents_skip_disabled_and_walk_through_libraries() {
        let store = store_of(vec![
            library("Base", &[]),
            library("Mid", &["Base"]),
            TestScript::plugin("On").requires_lib("Mid").enabled().build(),
            TestScript::plugin("Off").requires_lib("Base").build(),
        ]);
        assert_eq!(check_dependents(&store, "Base"), vec!["On"]);
    }

    #[test]
    fn dependents_come_out_by_level_then_name() {
        let store = store_of(vec![
            TestScript::plugin("Zed").requires_lib("Lib").enabled().build(),
            TestScript::plugin("Outer").requires_plugin("Alpha").enabled().build(),
            TestScript::plugin("Alpha").requires_lib("Lib").enabled().build(),
            library("Lib", &[]),
        ]);
        assert_eq!(check_dependents(&store, "Lib"), vec!["Alpha", "Zed", "Outer"]);
    }

    #[test]
    fn dependents_tolerate_reverse_cycles() {
        let store = store_of(vec![
            TestScript::plugin("X").requires_plugin("Y").enabled().build(),
            TestScript::plugin("Y").requires_plugin("X").enabled().build(),
        ]);
        assert_eq!(check_dependents(&store, "X"), vec!["Y"]);
    }
}
