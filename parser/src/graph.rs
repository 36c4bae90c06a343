use indexmap::IndexMap;
use log::warn;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A program point of a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathNode {
    pub name: String,
    /// Statement text.
    pub label: String,
    /// Marked `color=blue` by the extractor.
    pub relevant: bool,
}

/// One path of a component, as a directed graph whose edges may carry the
/// `true`/`false` outcome of the branch they leave.
#[derive(Debug, Clone)]
pub struct PathGraph {
    pub name: String,
    graph: DiGraph<PathNode, Option<bool>>,
    index: IndexMap<String, NodeIndex>,
}

impl PathGraph {
    pub fn new(name: &str) -> PathGraph {
        PathGraph {
            name: name.to_string(),
            graph: DiGraph::new(),
            index: IndexMap::new(),
        }
    }

    /// Adds a node, or updates the attributes of an existing one.
    pub fn add_node(&mut self, name: &str, label: Option<&str>, relevant: Option<bool>) -> NodeIndex {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(PathNode {
                    name: name.to_string(),
                    ..PathNode::default()
                });
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        if let Some(label) = label {
            self.graph[idx].label = label.to_string();
        }
        if let Some(relevant) = relevant {
            self.graph[idx].relevant = relevant;
        }
        idx
    }

    /// Adds an edge; unknown endpoints are created with an empty label.
    pub fn add_edge(&mut self, from: &str, to: &str, label: Option<bool>) {
        let a = self.add_node(from, None, None);
        let b = self.add_node(to, None, None);
        self.graph.add_edge(a, b, label);
    }

    pub fn node(&self, idx: NodeIndex) -> &PathNode {
        &self.graph[idx]
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &PathNode)> {
        self.index.values().map(move |idx| (*idx, &self.graph[*idx]))
    }

    /// Outgoing edges of `idx` in the order they were declared.
    pub fn successors(&self, idx: NodeIndex) -> Vec<(NodeIndex, Option<bool>)> {
        let mut out: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), *e.weight()))
            .collect();
        out.sort_by_key(|(id, _, _)| *id);
        out.into_iter().map(|(_, target, label)| (target, label)).collect()
    }

    pub fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    /// A topological order; among nodes ready at the same time the one
    /// declared first comes first, so a linear path comes out in path order.
    pub fn node_order(&self) -> Vec<NodeIndex> {
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.in_degree(idx))
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| pending[idx.index()] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let t = edge.target().index();
                pending[t] -= 1;
                if pending[t] == 0 {
                    ready.push(Reverse(edge.target()));
                }
            }
        }
        if order.len() < self.len() {
            warn!("path {} contains a cycle; remaining nodes follow in declaration order", self.name);
            for idx in self.graph.node_indices() {
                if !order.contains(&idx) {
                    order.push(idx);
                }
            }
        }
        order
    }

    /// Every simple path from a root (no incoming edge) to a leaf (no
    /// outgoing edge), depth first, at most `limit` of them.
    pub fn enumerate_paths(&self, limit: usize) -> Vec<PathGraph> {
        let mut found = Vec::new();
        for (root, _) in self.nodes() {
            if self.in_degree(root) != 0 {
                continue;
            }
            let mut trail = vec![(root, None)];
            self.walk(&mut trail, &mut found, limit);
            if found.len() >= limit {
                warn!("{}: stopped after {} paths", self.name, limit);
                break;
            }
        }
        found
    }

    fn walk(&self, trail: &mut Vec<(NodeIndex, Option<bool>)>, found: &mut Vec<PathGraph>, limit: usize) {
        if found.len() >= limit {
            return;
        }
        let Some(&(current, _)) = trail.last() else {
            return;
        };
        let next: Vec<_> = self
            .successors(current)
            .into_iter()
            .filter(|(t, _)| !trail.iter().any(|(seen, _)| seen == t))
            .collect();
        if next.is_empty() {
            found.push(self.slice(trail, found.len() + 1));
            return;
        }
        for (target, label) in next {
            trail.push((target, label));
            self.walk(trail, found, limit);
            trail.pop();
        }
    }

    /// The path graph made of the nodes of `trail`, linked in order. Every
    /// node of the trail lies on the path, so every node is relevant.
    fn slice(&self, trail: &[(NodeIndex, Option<bool>)], number: usize) -> PathGraph {
        let mut path = PathGraph::new(&format!("path_{}", number));
        let mut previous: Option<&str> = None;
        for (idx, label) in trail {
            let node = &self.graph[*idx];
            path.add_node(&node.name, Some(&node.label), Some(true));
            if let Some(prev) = previous {
                path.add_edge(prev, &node.name, *label);
            }
            previous = Some(&node.name);
        }
        path
    }
}
