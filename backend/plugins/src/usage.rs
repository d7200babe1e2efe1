//! Usage tracker: reference counts which started scripts hold which dependencies.
//!
//! The tracker only does the bookkeeping. Tearing down a library whose count
//! reaches zero is driven by the lifecycle controller, which owns the stop path.
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct UsageTracker {
    /// dependency name -> consumers currently holding it
    consumers: HashMap<String, BTreeSet<String>>,
    /// consumer name -> dependencies it acquired, in acquisition order
    holdings: HashMap<String, Vec<String>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `consumer` holds `dependency`. Acquiring twice is a no-op.
    pub fn acquire(&mut self, dependency: &str, consumer: &str) {
        let inserted = self
            .consumers
            .entry(dependency.to_string())
            .or_default()
            .insert(consumer.to_string());
        if inserted {
            self.holdings
                .entry(consumer.to_string())
                .or_default()
                .push(dependency.to_string());
        }
    }

    /// Drop `consumer` from `dependency`'s set. Returns `true` when the set
    /// became empty through this call.
    pub fn release(&mut self, dependency: &str, consumer: &str) -> bool {
        if let Some(held) = self.holdings.get_mut(consumer) {
            held.retain(|d| d != dependency);
            if held.is_empty() {
                self.holdings.remove(consumer);
            }
        }
        let Some(set) = self.consumers.get_mut(dependency) else {
            return false;
        };
        if !set.remove(consumer) {
            return false;
        }
        if set.is_empty() {
            self.consumers.remove(dependency);
            return true;
        }
        false
    }

    /// Release everything `consumer` acquired. Returns the dependencies left unused.
    pub fn release_all(&mut self, consumer: &str) -> Vec<String> {
        let held = self.holdings.remove(consumer).unwrap_or_default();
        held.into_iter()
            .filter(|dep| self.release(dep, consumer))
            .collect()
    }

    pub fn count(&self, dependency: &str) -> usize {
        self.consumers.get(dependency).map_or(0, BTreeSet::len)
    }

    pub fn is_used(&self, dependency: &str) -> bool {
        self.count(dependency) > 0
    }

    pub fn consumers(&self, dependency: &str) -> Vec<String> {
        self.consumers
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn holdings(&self, consumer: &str) -> Vec<String> {
        self.holdings.get(consumer).cloned().unwrap_or_default()
    }

    /// Re-key both sides after a script rename.
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(set) = self.consumers.remove(old) {
            self.consumers.insert(new.to_string(), set);
        }
        if let Some(held) = self.holdings.remove(old) {
            for dep in &held {
                if let Some(set) = self.consumers.get_mut(dep) {
                    set.remove(old);
                    set.insert(new.to_string());
                }
            }
            self.holdings.insert(new.to_string(), held);
        }
        for held in self.holdings.values_mut() {
            for dep in held.iter_mut().filter(|d| d.as_str() == old) {
                *dep = new.to_string();
            }
        }
    }

    /// Forget a dependency's record entirely (used when it is deleted).
    pub fn forget(&mut self, dependency: &str) {
        if let Some(set) = self.consumers.remove(dependency) {
            for consumer in set {
                if let Some(held) = self.holdings.get_mut(&consumer) {
                    held.retain(|d| d != dependency);
                    if held.is_empty() {
                        self.holdings.remove(&consumer);
                    }
                }
            }
        }
    }
}
