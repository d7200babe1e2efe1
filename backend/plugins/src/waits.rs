//! Which in-flight start is waiting on which.
//!
//! An edge `a -> b` exists while the start of `a` awaits the start of `b`.
//! Joining an in-flight start that can already reach the joiner would never
//! finish, so the lifecycle checks for a chain before it waits.
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct WaitGraph {
    edges: HashMap<String, Vec<String>>,
}

impl WaitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, waiter: &str, target: &str) {
        self.edges
            .entry(waiter.to_string())
            .or_default()
            .push(target.to_string());
    }

    /// Drop one `waiter -> target` edge.
    pub fn remove(&mut self, waiter: &str, target: &str) {
        let Some(targets) = self.edges.get_mut(waiter) else {
            return;
        };
        if let Some(i) = targets.iter().position(|t| t == target) {
            targets.swap_remove(i);
        }
        if targets.is_empty() {
            self.edges.remove(waiter);
        }
    }

    /// Shortest chain of waits from `from` to `to`, both ends included.
    pub fn chain<'a>(&'a self, from: &'a str, to: &'a str) -> Option<Vec<String>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut chain = vec![to.to_string()];
                let mut at = to;
                while let Some(&parent) = parents.get(at) {
                    chain.push(parent.to_string());
                    at = parent;
                }
                chain.reverse();
                return Some(chain);
            }
            for next in self.edges.get(current).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    parents.insert(next.as_str(), current);
                    queue.push_back(next.as_str());
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_follows_edges() {
        let mut waits = WaitGraph::new();
        waits.add("R", "A");
        waits.add("A", "X");
        waits.add("B", "A");
        assert_eq!(waits.chain("B", "X").unwrap(), ["B", "A", "X"]);
        assert!(waits.chain("A", "B").is_none());
    }

    #[test]
    fn removing_one_of_two_identical_edges_keeps_the_other() {
        let mut waits = WaitGraph::new();
        waits.add("P", "L");
        waits.add("P", "L");
        waits.remove("P", "L");
        assert!(waits.chain("P", "L").is_some());
        waits.remove("P", "L");
        assert!(waits.is_empty());
    }

    #[test]
    fn chain_survives_loops_between_other_starts() {
        let mut waits = WaitGraph::new();
        waits.add("A", "B");
        waits.add("B", "A");
        assert!(waits.chain("A", "C").is_none());
        assert_eq!(waits.chain("B", "B").unwrap(), ["B"]);
    }
}
