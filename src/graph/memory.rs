/// In-memory graph backend
///
/// Directed graph with one node per name and at most one edge per ordered pair,
/// loaded once from node-link JSON and never mutated afterwards. Neighbour
/// lists keep file order so traversal results are deterministic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{Direction, EdgeKind, GraphNode, GraphReader, NodeKind};
use crate::errors::NestragError;

/// On-disk form written by the graph build job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    nodes: Vec<GraphNode>,
    by_name: HashMap<String, usize>,
    outgoing: Vec<Vec<(usize, EdgeKind)>>,
    incoming: Vec<Vec<(usize, EdgeKind)>>,
    edge_count: usize,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed graph file. Edges naming unknown nodes are rejected.
    pub fn from_file(file: GraphFile) -> Result<Self, NestragError> {
        let mut graph = InMemoryGraph::new();
        for node in file.nodes {
            graph.add_node(node);
        }
        for edge in file.edges {
            graph.add_edge(&edge.from, &edge.to, edge.kind)?;
        }
        Ok(graph)
    }

    pub fn load(path: &Path) -> Result<Self, NestragError> {
        let raw = std::fs::read_to_string(path).map_err(|e| NestragError::load(path, "graph", e))?;
        let file: GraphFile = serde_json::from_str(&raw).map_err(|e| NestragError::load(path, "graph", e))?;
        Self::from_file(file).map_err(|e| NestragError::load(path, "graph", e))
    }

    /// Insert a node. A repeated name keeps the first definition.
    pub fn add_node(&mut self, node: GraphNode) {
        if self.by_name.contains_key(&node.name) {
            tracing::warn!(name = %node.name, kind = ?node.kind, "Duplicate graph node name ignored");
            return;
        }
        self.by_name.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
    }

    /// Insert a directed edge. A second edge between the same ordered pair is ignored.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) -> Result<(), NestragError> {
        let src = self.index_of(from)?;
        let dst = self.index_of(to)?;

        let out = self
            .outgoing
            .get_mut(src)
            .ok_or_else(|| NestragError::Graph(format!("node slot missing for {}", from)))?;
        if out.iter().any(|(n, _)| *n == dst) {
            return Ok(());
        }
        out.push((dst, kind));
        self.incoming
            .get_mut(dst)
            .ok_or_else(|| NestragError::Graph(format!("node slot missing for {}", to)))?
            .push((src, kind));
        self.edge_count += 1;
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.by_name.get(name).and_then(|&i| self.nodes.get(i))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn index_of(&self, name: &str) -> Result<usize, NestragError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| NestragError::Config(format!("Graph edge references unknown node '{}'", name)))
    }

    fn neighbors(&self, name: &str, direction: Direction) -> impl Iterator<Item = &GraphNode> + '_ {
        let adjacency = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        self.by_name
            .get(name)
            .and_then(|&i| adjacency.get(i))
            .into_iter()
            .flatten()
            .filter_map(|(n, _)| self.nodes.get(*n))
    }
}

#[async_trait]
impl GraphReader for InMemoryGraph {
    async fn successors(&self, name: &str) -> Result<Vec<GraphNode>, NestragError> {
        Ok(self.neighbors(name, Direction::Outgoing).cloned().collect())
    }

    async fn predecessors(&self, name: &str) -> Result<Vec<GraphNode>, NestragError> {
        Ok(self.neighbors(name, Direction::Incoming).cloned().collect())
    }

    async fn node_exists(&self, name: &str) -> Result<bool, NestragError> {
        Ok(self.by_name.contains_key(name))
    }

    async fn neighbors_with_type(
        &self,
        name: &str,
        kind: NodeKind,
        direction: Direction,
    ) -> Result<Vec<GraphNode>, NestragError> {
        Ok(self
            .neighbors(name, direction)
            .filter(|n| n.kind == kind)
            .cloned()
            .collect())
    }

    async fn search_nodes(&self, kind: NodeKind, needle: &str, limit: usize) -> Result<Vec<GraphNode>, NestragError> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.kind == kind)
            .filter(|n| {
                n.name.to_lowercase().contains(&needle)
                    || n.brand.as_deref().is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
