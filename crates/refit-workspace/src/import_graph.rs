//! Package import graph
use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Directed graph: an edge `a -> b` means package `a` imports package `b`
#[derive(Debug, Clone, Default)]
pub struct ImportGraph {
    pub graph: DiGraph<String, ()>,
    pub nodes: HashMap<String, NodeIndex>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&mut self, key: &str) -> NodeIndex {
        if let Some(&node) = self.nodes.get(key) {
            return node;
        }
        let node = self.graph.add_node(key.to_string());
        self.nodes.insert(key.to_string(), node);
        node
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.add_package(from);
        let to = self.add_package(to);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) {
        let (Some(&from), Some(&to)) = (self.nodes.get(from), self.nodes.get(to)) else {
            return;
        };
        if let Some(edge) = self.graph.find_edge(from, to) {
            self.graph.remove_edge(edge);
        }
    }

    pub fn imports(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(&from), Some(&to)) => self.graph.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Whether `from` imports `to`, directly or transitively
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    /// Adding `from -> to` would close a cycle
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        from == to || self.reaches(to, from)
    }

    /// Packages of every import cycle, each sorted, cycles in sorted order
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || scc
                        .first()
                        .map(|&n| self.graph.find_edge(n, n).is_some())
                        .unwrap_or(false)
            })
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.into_iter().map(|n| self.graph[n].clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cycle_detection() {
        let mut graph = ImportGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        assert!(graph.reaches("a", "c"));
        assert!(!graph.reaches("c", "a"));
        assert!(graph.would_create_cycle("c", "a"));
        assert!(!graph.would_create_cycle("a", "c"));
        assert!(graph.cycles().is_empty());

        graph.add_edge("c", "a");
        assert_eq!(graph.cycles(), vec![vec!["a", "b", "c"]]);

        graph.remove_edge("c", "a");
        assert!(graph.cycles().is_empty());
    }
}
