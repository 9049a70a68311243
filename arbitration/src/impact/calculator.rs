use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::graph::{DependencyGraph, GraphSpec, NodeKind};
use super::sensitivity::{AssumptionChange, Sensitivity, SensitivityRegistry, SensitivityRule};
use super::ImpactResult;
use crate::debate::DebateId;
use crate::events::{ArbitrationEvent, SharedEventBus};

pub type SharedImpactCalculator = Arc<ImpactCalculator>;

/// Materiality thresholds and configured sensitivities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Relative move of a price target that requires recompute.
    pub price_target_threshold: f64,
    /// Absolute move of a confidence or risk score that requires recompute.
    pub score_threshold: f64,
    /// Relative move of any other computation that requires recompute.
    pub computation_threshold: f64,
    pub sensitivities: Vec<SensitivityRule>,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            price_target_threshold: 0.10,
            score_threshold: 0.15,
            computation_threshold: 0.10,
            sensitivities: Vec::new(),
        }
    }
}

impl ImpactConfig {
    /// Whether an estimated move of `delta` matters for an output of `kind`.
    pub fn is_material(&self, kind: NodeKind, delta: f64) -> bool {
        let delta = delta.abs();
        match kind {
            NodeKind::PriceTarget => delta > self.price_target_threshold,
            NodeKind::QualitativeRating => delta > f64::EPSILON,
            NodeKind::ConfidenceScore | NodeKind::RiskScore => delta > self.score_threshold,
            NodeKind::Assumption | NodeKind::Computation => delta > self.computation_threshold,
        }
    }
}

/// Why an output was or was not flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeReason {
    Material,
    BelowThreshold,
    /// An edge on the way had no usable sensitivity.
    MissingSensitivity,
    /// The change has no numeric magnitude (categorical, or zero base).
    UnquantifiedChange,
    /// The output sits on or behind a dependency cycle.
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedOutput {
    pub id: String,
    pub kind: NodeKind,
    /// Hops from the changed assumption along the shortest path.
    pub depth: usize,
    pub estimated_delta: Option<f64>,
    pub requires_recompute: bool,
    pub reason: RecomputeReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub change: AssumptionChange,
    /// False when the assumption is not in the graph.
    pub known_assumption: bool,
    pub affected: Vec<AffectedOutput>,
    pub computed_at: DateTime<Utc>,
}

impl ImpactReport {
    pub fn get(&self, id: &str) -> Option<&AffectedOutput> {
        self.affected.iter().find(|a| a.id == id)
    }

    pub fn recompute_targets(&self) -> Vec<String> {
        self.affected
            .iter()
            .filter(|a| a.requires_recompute)
            .map(|a| a.id.clone())
            .collect()
    }

    /// Ticket for the recompute scheduler. An unknown assumption asks for a
    /// full recompute.
    pub fn ticket(&self, debate_id: Option<&str>) -> RecomputeTicket {
        RecomputeTicket {
            id: Uuid::new_v4().to_string(),
            debate_id: debate_id.map(str::to_string),
            assumption: self.change.assumption.clone(),
            outputs: self.recompute_targets(),
            full_recompute: !self.known_assumption,
            issued_at: self.computed_at,
        }
    }
}

/// Work order handed to the recompute scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeTicket {
    pub id: String,
    pub debate_id: Option<DebateId>,
    pub assumption: String,
    /// Outputs to recompute.
    pub outputs: Vec<String>,
    pub full_recompute: bool,
    pub issued_at: DateTime<Utc>,
}

impl RecomputeTicket {
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && !self.full_recompute
    }
}

#[derive(Debug, Clone, Copy)]
enum Estimate {
    Delta(f64),
    Unknown(RecomputeReason),
}

pub struct ImpactCalculator {
    config: ImpactConfig,
    graph: RwLock<DependencyGraph>,
    sensitivities: RwLock<SensitivityRegistry>,
    events: Option<SharedEventBus>,
}

impl ImpactCalculator {
    pub fn new(config: ImpactConfig, graph: DependencyGraph) -> Self {
        let sensitivities = SensitivityRegistry::from_rules(&config.sensitivities);
        Self {
            config,
            graph: RwLock::new(graph),
            sensitivities: RwLock::new(sensitivities),
            events: None,
        }
    }

    /// Build from a JSON graph description.
    pub fn from_json(config: ImpactConfig, json: &str) -> ImpactResult<Self> {
        let spec: GraphSpec = serde_json::from_str(json)?;
        Ok(Self::new(config, DependencyGraph::from_spec(&spec)?))
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn shared(self) -> SharedImpactCalculator {
        Arc::new(self)
    }

    pub fn config(&self) -> &ImpactConfig {
        &self.config
    }

    /// Edit the graph. The edit is applied to a copy and only kept when it
    /// succeeds.
    pub fn update_graph<F>(&self, edit: F) -> ImpactResult<()>
    where
        F: FnOnce(&mut DependencyGraph) -> ImpactResult<()>,
    {
        let mut graph = self.graph.write().unwrap_or_else(|e| e.into_inner());
        let mut draft = graph.clone();
        edit(&mut draft)?;
        *graph = draft;
        Ok(())
    }

    pub fn graph_spec(&self) -> GraphSpec {
        self.graph
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .to_spec()
    }

    pub fn set_sensitivity(&self, from: &str, to: &str, sensitivity: Sensitivity) {
        self.sensitivities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set(from, to, sensitivity);
    }

    /// Estimate the effect of `change` on everything downstream of it.
    pub fn analyze(&self, change: &AssumptionChange) -> ImpactReport {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        let sensitivities = self.sensitivities.read().unwrap_or_else(|e| e.into_inner());
        let computed_at = Utc::now();

        let Some(source) = graph.index_of(&change.assumption) else {
            warn!(
                assumption = %change.assumption,
                "Assumption not in dependency graph, requesting full recompute"
            );
            return ImpactReport {
                change: change.clone(),
                known_assumption: false,
                affected: Vec::new(),
                computed_at,
            };
        };

        // Reachability with shortest-path depth.
        let mut depth: HashMap<NodeIndex, usize> = HashMap::from([(source, 0)]);
        let mut queue = VecDeque::from([source]);
        while let Some(node) = queue.pop_front() {
            let next_depth = depth.get(&node).copied().unwrap_or(0) + 1;
            for (dependent, _) in graph.dependents(node) {
                if !depth.contains_key(&dependent) {
                    depth.insert(dependent, next_depth);
                    queue.push_back(dependent);
                }
            }
        }

        // Kahn's algorithm restricted to reachable nodes. Whatever is left
        // unvisited sits on or behind a cycle.
        let mut indegree: HashMap<NodeIndex, usize> = depth
            .keys()
            .map(|&node| {
                let count = graph
                    .inputs(node)
                    .filter(|(input, _)| depth.contains_key(input))
                    .count();
                (node, count)
            })
            .collect();

        let source_estimate = if !change.is_change() {
            Estimate::Delta(0.0)
        } else {
            change
                .relative_change()
                .map_or(Estimate::Unknown(RecomputeReason::UnquantifiedChange), Estimate::Delta)
        };

        let mut estimates: HashMap<NodeIndex, Estimate> = HashMap::new();
        let mut ready: VecDeque<NodeIndex> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();

        while let Some(node) = ready.pop_front() {
            let estimate = if node == source {
                source_estimate
            } else {
                self.combine_inputs(&graph, &sensitivities, node, &depth, &estimates)
            };
            estimates.insert(node, estimate);

            for (dependent, _) in graph.dependents(node) {
                if let Some(count) = indegree.get_mut(&dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        let mut affected: Vec<AffectedOutput> = depth
            .iter()
            .filter(|(node, _)| **node != source)
            .map(|(&node, &hops)| {
                let info = graph.node(node);
                let estimate = estimates
                    .get(&node)
                    .copied()
                    .unwrap_or(Estimate::Unknown(RecomputeReason::Cycle));
                let (estimated_delta, requires_recompute, reason) = match estimate {
                    Estimate::Delta(delta) if self.config.is_material(info.kind, delta) => {
                        (Some(delta), true, RecomputeReason::Material)
                    }
                    Estimate::Delta(delta) => (Some(delta), false, RecomputeReason::BelowThreshold),
                    Estimate::Unknown(reason) => (None, true, reason),
                };
                AffectedOutput {
                    id: info.id.clone(),
                    kind: info.kind,
                    depth: hops,
                    estimated_delta,
                    requires_recompute,
                    reason,
                }
            })
            .collect();
        affected.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.id.cmp(&b.id)));

        let cyclic = affected
            .iter()
            .filter(|a| a.reason == RecomputeReason::Cycle)
            .count();
        if cyclic > 0 {
            warn!(
                assumption = %change.assumption,
                nodes = cyclic,
                "Dependency cycle reached, flagging for recompute"
            );
        }
        debug!(
            assumption = %change.assumption,
            affected = affected.len(),
            "Impact analyzed"
        );

        ImpactReport {
            change: change.clone(),
            known_assumption: true,
            affected,
            computed_at,
        }
    }

    /// Sum the contributions of a node's reachable inputs.
    fn combine_inputs(
        &self,
        graph: &DependencyGraph,
        sensitivities: &SensitivityRegistry,
        node: NodeIndex,
        reachable: &HashMap<NodeIndex, usize>,
        estimates: &HashMap<NodeIndex, Estimate>,
    ) -> Estimate {
        let target = &graph.node(node).id;
        let mut total = 0.0;
        for (input, edge_sensitivity) in graph.inputs(node) {
            if !reachable.contains_key(&input) {
                continue;
            }
            let upstream = match estimates.get(&input) {
                Some(Estimate::Delta(delta)) => *delta,
                Some(Estimate::Unknown(reason)) => return Estimate::Unknown(*reason),
                None => return Estimate::Unknown(RecomputeReason::Cycle),
            };
            let sensitivity = sensitivities
                .get(&graph.node(input).id, target)
                .or(edge_sensitivity)
                .filter(Sensitivity::is_usable);
            match sensitivity {
                Some(s) => total += s.apply(upstream),
                None => return Estimate::Unknown(RecomputeReason::MissingSensitivity),
            }
        }
        Estimate::Delta(total)
    }

    /// Analyze a change and issue the recompute ticket for it.
    pub fn issue_ticket(
        &self,
        change: &AssumptionChange,
        debate_id: Option<&str>,
    ) -> (ImpactReport, RecomputeTicket) {
        let report = self.analyze(change);
        let ticket = report.ticket(debate_id);
        info!(
            assumption = %change.assumption,
            debate_id = debate_id.unwrap_or("-"),
            affected = report.affected.len(),
            recompute = ticket.outputs.len(),
            full_recompute = ticket.full_recompute,
            "Recompute ticket issued"
        );
        if let Some(events) = &self.events {
            events.publish(ArbitrationEvent::ImpactReported {
                debate_id: debate_id.map(str::to_string),
                assumption: change.assumption.clone(),
                affected: report.affected.len(),
                recompute: ticket.outputs.len(),
                timestamp: report.computed_at,
            });
        }
        (report, ticket)
    }
}

impl Default for ImpactCalculator {
    fn default() -> Self {
        Self::new(ImpactConfig::default(), DependencyGraph::new())
    }
}
