//! Dependency graph of assumptions and the computations built on them.
//!
//! Nodes live in a petgraph arena and are addressed by string id through an
//! index map. Edges point downstream (from an input to what consumes it) and
//! may carry a sensitivity. Cycles are allowed in the graph; the impact walk
//! detects and flags them instead of refusing the edge.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::sensitivity::Sensitivity;
use super::{ImpactError, ImpactResult};

/// What a node produces. Decides the materiality rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An input assumption.
    Assumption,
    /// Numeric price target; deltas are relative.
    PriceTarget,
    /// Categorical rating such as buy/hold/sell.
    QualitativeRating,
    /// Score in [0, 1]; deltas are absolute.
    ConfidenceScore,
    /// Score in [0, 1]; deltas are absolute.
    RiskScore,
    /// Any other computation; deltas are relative.
    Computation,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assumption => write!(f, "assumption"),
            Self::PriceTarget => write!(f, "price_target"),
            Self::QualitativeRating => write!(f, "qualitative_rating"),
            Self::ConfidenceScore => write!(f, "confidence_score"),
            Self::RiskScore => write!(f, "risk_score"),
            Self::Computation => write!(f, "computation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub sensitivity: Option<Sensitivity>,
}

/// Serializable description of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, Option<Sensitivity>>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spec(spec: &GraphSpec) -> ImpactResult<Self> {
        let mut graph = Self::new();
        for node in &spec.nodes {
            graph.add_node(&node.id, node.kind)?;
        }
        for edge in &spec.edges {
            graph.add_dependency(&edge.from, &edge.to, edge.sensitivity)?;
        }
        Ok(graph)
    }

    pub fn to_spec(&self) -> GraphSpec {
        let nodes = self.graph.node_weights().cloned().collect();
        let edges = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some(EdgeSpec {
                    from: self.graph[a].id.clone(),
                    to: self.graph[b].id.clone(),
                    sensitivity: self.graph[e],
                })
            })
            .collect();
        GraphSpec { nodes, edges }
    }

    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> ImpactResult<()> {
        if self.index.contains_key(id) {
            return Err(ImpactError::DuplicateNode(id.to_string()));
        }
        let idx = self.graph.add_node(GraphNode {
            id: id.to_string(),
            kind,
        });
        self.index.insert(id.to_string(), idx);
        Ok(())
    }

    /// Record that `to` is computed from `from`.
    pub fn add_dependency(
        &mut self,
        from: &str,
        to: &str,
        sensitivity: Option<Sensitivity>,
    ) -> ImpactResult<()> {
        let a = self.require(from)?;
        let b = self.require(to)?;
        self.graph.update_edge(a, b, sensitivity);
        Ok(())
    }

    fn require(&self, id: &str) -> ImpactResult<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ImpactError::UnknownNode(id.to_string()))
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Downstream neighbours with the sensitivity on each edge.
    pub(crate) fn dependents(
        &self,
        idx: NodeIndex,
    ) -> impl Iterator<Item = (NodeIndex, Option<Sensitivity>)> + '_ {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
    }

    /// Upstream neighbours with the sensitivity on each edge.
    pub(crate) fn inputs(
        &self,
        idx: NodeIndex,
    ) -> impl Iterator<Item = (NodeIndex, Option<Sensitivity>)> + '_ {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.index_of(id).map(|idx| self.graph[idx].kind)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
