//! Downstream impact of a changed assumption.
//!
//! When a human overrides a resolution, the assumption behind it changes and
//! every computation built on it may be wrong. The calculator walks the
//! dependency graph from the changed assumption, estimates how much each
//! reachable output moves, and flags the ones whose move is material.
//!
//! ```text
//! AssumptionChange ──► BFS (visited set) ──► Kahn order over reachable nodes
//!                                              │
//!                      deltas via edge sensitivities, summed over inputs
//!                                              │
//!          materiality per output kind ──► ImpactReport ──► RecomputeTicket
//! ```
//!
//! Anything the walk cannot quantify (missing sensitivity, categorical
//! change, cycle) is flagged for recompute.

pub mod calculator;
pub mod graph;
pub mod sensitivity;

pub use calculator::{
    AffectedOutput, ImpactCalculator, ImpactConfig, ImpactReport, RecomputeReason,
    RecomputeTicket, SharedImpactCalculator,
};
pub use graph::{DependencyGraph, EdgeSpec, GraphNode, GraphSpec, NodeKind};
pub use sensitivity::{
    AssumptionChange, AssumptionValue, Sensitivity, SensitivityRegistry, SensitivityRule,
};

use thiserror::Error;

/// Errors building or loading a dependency graph.
#[derive(Debug, Error)]
pub enum ImpactError {
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid graph description: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ImpactResult<T> = Result<T, ImpactError>;
