//! Project graph: the parent/child include relation across the workspace,
//! used to pick which file the LSP re-assembles on a change.

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    parents: HashMap<String, HashSet<String>>,
    children: HashMap<String, HashSet<String>>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.parents.clear();
        self.children.clear();
    }

    /// Register that `parent` includes `child`. Safe to call repeatedly; cycles
    /// are permitted here (unlike in the source reader) since this structure
    /// never itself walks an include file, only reasons about the relation.
    pub fn register(&mut self, parent: &str, child: &str) {
        self.children.entry(parent.to_string()).or_default().insert(child.to_string());
        self.parents.entry(child.to_string()).or_default().insert(parent.to_string());
        self.parents.entry(parent.to_string()).or_default();
        self.children.entry(child.to_string()).or_default();
    }

    pub fn parents_of(&self, uri: &str) -> Vec<String> {
        self.parents.get(uri).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// BFS over parents starting at `u`, returning each reachable ancestor's distance.
    pub fn ancestor_distances(&self, u: &str) -> HashMap<String, usize> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(u.to_string(), 0);
        queue.push_back(u.to_string());
        while let Some(node) = queue.pop_front() {
            let d = dist[&node];
            for parent in self.parents_of(&node) {
                if !dist.contains_key(&parent) {
                    dist.insert(parent.clone(), d + 1);
                    queue.push_back(parent);
                }
            }
        }
        dist
    }

    /// If any ancestor of `u` (including `u` itself) is in `preferred`, return the
    /// nearest one (ties broken lexicographically). Else return the nearest
    /// ancestor with no parents of its own. Else `u`.
    pub fn select_root(&self, u: &str, preferred: &HashSet<String>) -> String {
        let distances = self.ancestor_distances(u);

        let mut preferred_hits: Vec<(usize, String)> =
            distances.iter().filter(|(uri, _)| preferred.contains(*uri)).map(|(uri, d)| (*d, uri.clone())).collect();
        if !preferred_hits.is_empty() {
            preferred_hits.sort();
            return preferred_hits[0].1.clone();
        }

        let mut rootless: Vec<(usize, String)> = distances
            .iter()
            .filter(|(uri, _)| self.parents_of(uri).is_empty())
            .map(|(uri, d)| (*d, uri.clone()))
            .collect();
        if !rootless.is_empty() {
            rootless.sort();
            return rootless[0].1.clone();
        }

        u.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_root_prefers_preferred_ancestor() {
        let mut g = ProjectGraph::new();
        g.register("main.asm", "lib.asm");
        g.register("lib.asm", "util.asm");
        let mut preferred = HashSet::new();
        preferred.insert("main.asm".to_string());
        assert_eq!(g.select_root("util.asm", &preferred), "main.asm");
    }

    #[test]
    fn select_root_falls_back_to_parentless_ancestor() {
        let mut g = ProjectGraph::new();
        g.register("main.asm", "lib.asm");
        g.register("lib.asm", "util.asm");
        let preferred = HashSet::new();
        assert_eq!(g.select_root("util.asm", &preferred), "main.asm");
    }

    #[test]
    fn select_root_of_orphan_is_itself() {
        let g = ProjectGraph::new();
        let preferred = HashSet::new();
        assert_eq!(g.select_root("standalone.asm", &preferred), "standalone.asm");
    }

    #[test]
    fn cycles_do_not_hang_ancestor_search() {
        let mut g = ProjectGraph::new();
        g.register("a.asm", "b.asm");
        g.register("b.asm", "a.asm");
        let distances = g.ancestor_distances("a.asm");
        assert_eq!(distances.get("a.asm"), Some(&0));
        assert_eq!(distances.get("b.asm"), Some(&1));
    }
}
