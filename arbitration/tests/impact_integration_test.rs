//! Downstream impact integration tests.
//!
//! Tests verify:
//! - Material and immaterial outputs of the same change are told apart
//! - Tickets are published on the shared bus
//! - Overriding a debate resolution attaches a ticket for its assumption
//! - Reported events count reachable outputs apart from recompute targets

use arbitration::impact::{EdgeSpec, GraphNode, GraphSpec};
use arbitration::{
    Arbitration, ArbitrationConfig, ArbitrationEvent, AssumptionChange, ContextVector,
    DebatePhase, DebateRequest, DependencyGraph, HumanDecision, ImpactCalculator, ImpactConfig,
    NodeKind, Position, PriorityInputs, ResolutionSource, Sensitivity,
};

fn valuation_graph() -> DependencyGraph {
    let spec = GraphSpec {
        nodes: vec![
            GraphNode {
                id: "revenue_growth".to_string(),
                kind: NodeKind::Assumption,
            },
            GraphNode {
                id: "price_target".to_string(),
                kind: NodeKind::PriceTarget,
            },
            GraphNode {
                id: "thesis_confidence".to_string(),
                kind: NodeKind::ConfidenceScore,
            },
        ],
        edges: vec![
            EdgeSpec {
                from: "revenue_growth".to_string(),
                to: "price_target".to_string(),
                sensitivity: Some(Sensitivity::linear(0.6)),
            },
            EdgeSpec {
                from: "revenue_growth".to_string(),
                to: "thesis_confidence".to_string(),
                sensitivity: Some(Sensitivity::linear(0.25)),
            },
        ],
    };
    DependencyGraph::from_spec(&spec).unwrap()
}

// ── Scenario: one change, two verdicts ─────────────────────────────

#[test]
fn test_price_target_recomputes_but_confidence_does_not() {
    let calculator = ImpactCalculator::new(ImpactConfig::default(), valuation_graph());
    let report = calculator.analyze(&AssumptionChange::numeric("revenue_growth", 0.10, 0.12));

    let target = report.get("price_target").unwrap();
    assert!((target.estimated_delta.unwrap() - 0.12).abs() < 1e-9);
    assert!(target.requires_recompute);

    let confidence = report.get("thesis_confidence").unwrap();
    assert!((confidence.estimated_delta.unwrap() - 0.05).abs() < 1e-9);
    assert!(!confidence.requires_recompute);

    assert_eq!(report.recompute_targets(), vec!["price_target".to_string()]);
}

#[test]
fn test_graph_loads_from_json() {
    let json = r#"{
        "nodes": [
            {"id": "wacc", "kind": "assumption"},
            {"id": "dcf", "kind": "computation"},
            {"id": "target", "kind": "price_target"}
        ],
        "edges": [
            {"from": "wacc", "to": "dcf",
             "sensitivity": {"type": "linear", "coefficient": -1.5}},
            {"from": "dcf", "to": "target",
             "sensitivity": {"type": "saturating", "coefficient": 1.0, "cap": 0.2}}
        ]
    }"#;
    let calculator = ImpactCalculator::from_json(ImpactConfig::default(), json).unwrap();
    let report = calculator.analyze(&AssumptionChange::numeric("wacc", 0.08, 0.10));

    let dcf = report.get("dcf").unwrap();
    assert!((dcf.estimated_delta.unwrap() + 0.375).abs() < 1e-9);
    assert_eq!(dcf.depth, 1);

    let target = report.get("target").unwrap();
    assert!((target.estimated_delta.unwrap() + 0.2).abs() < 1e-9);
    assert_eq!(target.depth, 2);
    assert!(target.requires_recompute);
}

#[test]
fn test_tickets_are_published() {
    let system = Arbitration::with_graph(ArbitrationConfig::default(), valuation_graph());
    let (_, ticket) = system.impact.issue_ticket(
        &AssumptionChange::numeric("revenue_growth", 0.10, 0.12),
        Some("d-42"),
    );
    assert_eq!(ticket.outputs, vec!["price_target".to_string()]);
    assert!(!ticket.full_recompute);

    let events = system.events.history_for("d-42");
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ArbitrationEvent::ImpactReported { recompute: 1, .. }
    ));
}

// ── Overrides feed the recompute scheduler ─────────────────────────

#[tokio::test]
async fn test_overriding_default_attaches_targeted_ticket() {
    let system = Arbitration::with_graph(ArbitrationConfig::default(), valuation_graph());
    let request = DebateRequest {
        topic: "revenue_growth".to_string(),
        context: ContextVector::new(
            "software",
            "revenue_growth",
            "12m",
            "large_cap",
            "hyper_growth",
            "financial",
        ),
        positions: vec![
            Position::new("bull", "30% growth")
                .with_value(0.30)
                .with_downside_risk(0.8),
            Position::new("bear", "20% growth")
                .with_value(0.20)
                .with_downside_risk(0.2),
        ],
        priority: PriorityInputs::default(),
        priority_hint: None,
        high_stakes: true,
    };

    let id = system.engine.open(request).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    let provisional = system.engine.declare_impasse(&id).await.unwrap();
    assert_eq!(provisional.phase, DebatePhase::Provisional);
    assert_eq!(provisional.resolution.unwrap().position, Some(1));

    // Reviewer sides with the bull: growth goes from 20% to 30%.
    let record = system
        .engine
        .submit_human_decision(&id, HumanDecision::new("lead", 0, "backlog supports it"))
        .unwrap();

    assert_eq!(record.phase, DebatePhase::Finalized);
    assert_eq!(
        record.resolution.as_ref().map(|r| r.source),
        Some(ResolutionSource::Human)
    );
    assert_eq!(
        record.superseded.as_ref().map(|r| r.source),
        Some(ResolutionSource::Default)
    );
    let ticket = record.recompute.unwrap();
    assert_eq!(ticket.debate_id.as_deref(), Some(id.as_str()));
    assert!(!ticket.full_recompute);
    // +50% growth: the target moves 30%, confidence only 0.125.
    assert_eq!(ticket.outputs, vec!["price_target".to_string()]);

    // Both outputs are reachable, only one needs recomputing.
    let reported: Vec<(usize, usize)> = system
        .events
        .history_for(&id)
        .iter()
        .filter_map(|e| match e {
            ArbitrationEvent::ImpactReported {
                affected,
                recompute,
                ..
            } => Some((*affected, *recompute)),
            _ => None,
        })
        .collect();
    assert_eq!(reported, vec![(2, 1)]);
}
