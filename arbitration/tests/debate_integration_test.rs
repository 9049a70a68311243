//! Debate integration tests: full flows through the wired system.
//!
//! Tests verify:
//! - A decisive credibility gap with enough precedents auto-resolves
//! - A close call with a saturated reviewer pool settles on a provisional
//!   conservative default
//! - Every debate settles within its tier's time bound
//! - Concurrent agreements resolve exactly once
//! - Provisional reviews finalize once their checkpoint passes
//! - Alert subscribers see provisional reviews

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use arbitration::debate::Precedent;
use arbitration::{
    Arbitration, ArbitrationConfig, ContextVector, DebateError, DebatePhase, DebateRequest,
    OutcomeRecord, OverrideReason, OverrideRecord, Position, PriorityInputs,
    RecommendationRecord, RegimeLabel, ResolutionSource, Reviewer, WorkingHours,
};
use chrono::{Duration, Utc};

fn ctx() -> ContextVector {
    ContextVector::new(
        "semiconductors",
        "revenue_growth",
        "12m",
        "large_cap",
        "mature",
        "financial",
    )
}

fn seed_outcomes(system: &Arbitration, agent: &str, n: usize, accuracy: f64, spacing_days: i64) {
    let now = Utc::now();
    for i in 0..n {
        system.store.append_outcome(OutcomeRecord::with_accuracy(
            agent,
            ctx(),
            accuracy,
            now - Duration::days(i as i64 * spacing_days),
            RegimeLabel::Normal,
        ));
    }
}

fn seed_override_history(
    system: &Arbitration,
    agent: &str,
    recommendations: usize,
    overrides: usize,
) {
    let now = Utc::now();
    for i in 0..recommendations {
        system.store.append_recommendation(RecommendationRecord {
            agent: agent.to_string(),
            context: ctx(),
            recommendation_id: format!("{}-rec-{}", agent, i),
            recorded_at: now - Duration::days(10),
        });
    }
    for _ in 0..overrides {
        system.store.append_override(OverrideRecord {
            agent: agent.to_string(),
            context: ctx(),
            agent_recommendation: "buy".to_string(),
            human_decision: "hold".to_string(),
            reason: OverrideReason::Judgement,
            recorded_at: now - Duration::days(10),
        });
    }
}

fn seed_precedents(system: &Arbitration, n: usize) {
    let now = Utc::now();
    system
        .engine
        .precedents()
        .seed((0..n).map(|i| Precedent {
            debate_id: format!("past-{}", i),
            context: ctx(),
            source: ResolutionSource::Human,
            recorded_at: now - Duration::days(30 * i as i64),
        }));
}

fn request(high_stakes: bool) -> DebateRequest {
    DebateRequest {
        topic: "revenue_growth".to_string(),
        context: ctx(),
        positions: vec![
            Position::new("x", "18% growth")
                .with_value(0.18)
                .with_downside_risk(0.7),
            Position::new("y", "12% growth")
                .with_value(0.12)
                .with_downside_risk(0.3),
        ],
        priority: PriorityInputs::default(),
        priority_hint: None,
        high_stakes,
    }
}

fn generalist(id: &str) -> Reviewer {
    Reviewer::new(id, &[]).with_hours(WorkingHours::always())
}

// ── Scenario: decisive credibility gap auto-resolves ───────────────

#[tokio::test]
async fn test_decisive_gap_auto_resolves_to_stronger_agent() {
    let system = Arbitration::new(ArbitrationConfig::default());
    system.router.add_reviewer(generalist("ana"));

    // 50 records at 90% averaging a year old, against 20 at 60% with a
    // 10% override rate.
    seed_outcomes(&system, "x", 50, 0.9, 15);
    seed_outcomes(&system, "y", 20, 0.6, 15);
    seed_override_history(&system, "y", 20, 2);
    seed_precedents(&system, 5);

    let id = system.engine.open(request(false)).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    let record = system.engine.declare_impasse(&id).await.unwrap();

    assert_eq!(record.phase, DebatePhase::Finalized);
    let resolution = record.resolution.as_ref().unwrap();
    assert_eq!(resolution.source, ResolutionSource::Auto);
    assert_eq!(resolution.position, Some(0));

    let scores = &record.position_scores;
    let differential = (scores[0].value - scores[1].value).abs();
    let threshold = 0.25_f64.max(scores[0].half_width + scores[1].half_width);
    assert!(differential > threshold);

    // Auto-resolution never occupies a reviewer.
    assert_eq!(system.router.load("ana"), 0);
    assert_eq!(system.engine.precedents().len(), 6);
}

#[tokio::test]
async fn test_decisive_gap_without_precedents_goes_to_human() {
    let system = Arbitration::new(ArbitrationConfig::default());
    system.router.add_reviewer(generalist("ana"));
    seed_outcomes(&system, "x", 50, 0.9, 15);
    seed_outcomes(&system, "y", 20, 0.6, 15);
    seed_precedents(&system, 4);

    let id = system.engine.open(request(false)).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    let record = system.engine.declare_impasse(&id).await.unwrap();

    assert_eq!(record.phase, DebatePhase::HumanArbitration);
    assert_eq!(record.reviewer.as_deref(), Some("ana"));
    assert!(record.deadline.is_some());
}

// ── Scenario: saturated pool falls back to provisional default ─────

#[tokio::test]
async fn test_saturated_pool_settles_on_lower_downside_default() {
    let system = Arbitration::new(ArbitrationConfig::default());
    system
        .router
        .add_reviewer(generalist("ana").with_capacity(1));
    // The only reviewer is busy with another debate for the next six hours.
    let busy = system
        .router
        .assign("elsewhere", &ctx(), Utc::now())
        .unwrap();
    assert_eq!(busy.reviewer, "ana");

    seed_outcomes(&system, "x", 20, 0.7, 15);
    seed_outcomes(&system, "y", 20, 0.6, 15);
    seed_precedents(&system, 2);
    let mut alerts = system.alerts();

    let id = system.engine.open(request(true)).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    let record = system.engine.declare_impasse(&id).await.unwrap();

    assert_eq!(record.phase, DebatePhase::Provisional);
    let resolution = record.resolution.as_ref().unwrap();
    assert_eq!(resolution.source, ResolutionSource::Default);
    assert!(resolution.provisional);
    // Lower downside wins even though x is more credible.
    assert_eq!(resolution.position, Some(1));
    assert!(system.engine.review_queue().contains(&id));

    // Nobody was free to escalate to, so the only alert is the review.
    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.event_type(), "provisional_review_queued");
    assert_eq!(alert.debate_id(), Some(id.as_str()));

    let phases: Vec<DebatePhase> = record.transitions.iter().map(|t| t.to).collect();
    assert!(phases.contains(&DebatePhase::HumanArbitration));
    assert!(phases.contains(&DebatePhase::ConservativeDefault));
}

#[tokio::test]
async fn test_provisional_review_finalizes_at_checkpoint() {
    let system = Arbitration::new(ArbitrationConfig::default());
    let id = system.engine.open(request(true)).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    system.engine.declare_impasse(&id).await.unwrap();
    assert_eq!(system.engine.phase(&id).unwrap(), DebatePhase::Provisional);

    assert!(system.engine.finalize_due_reviews(Utc::now()).is_empty());

    let later = Utc::now() + Duration::hours(25);
    assert_eq!(system.engine.finalize_due_reviews(later), vec![id.clone()]);
    assert!(system.engine.finalize_due_reviews(later).is_empty());

    let record = system.engine.get(&id).unwrap();
    assert_eq!(record.phase, DebatePhase::Finalized);
    let resolution = record.resolution.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Default);
    assert!(!resolution.provisional);
}

// ── Liveness: every debate settles within its bound ────────────────

#[tokio::test(start_paused = true)]
async fn test_unattended_debate_settles_within_bound() {
    let system = Arbitration::new(ArbitrationConfig::default());
    system.router.add_reviewer(generalist("silent"));

    let record = system.engine.open(request(false)).unwrap();
    let bound = system.engine.config().settle_bound(record.priority);

    tokio::time::sleep(bound + StdDuration::from_secs(60)).await;
    for _ in 0..50 {
        if system.engine.phase(&record.id).unwrap().is_settled() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    let settled = system.engine.get(&record.id).unwrap();
    assert_eq!(settled.phase, DebatePhase::Provisional);
    assert_eq!(
        settled.resolution.as_ref().map(|r| r.source),
        Some(ResolutionSource::Default)
    );
    // The timed-out reviewer got their slot back.
    assert_eq!(system.router.load("silent"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_early_agreement_cancels_timers() {
    let system = Arbitration::new(ArbitrationConfig::default());
    let record = system.engine.open(request(false)).unwrap();
    system
        .engine
        .report_agreement(&record.id, 1, "x conceded")
        .unwrap();

    let bound = system.engine.config().settle_bound(record.priority);
    tokio::time::sleep(bound * 2).await;

    let settled = system.engine.get(&record.id).unwrap();
    assert_eq!(settled.phase, DebatePhase::Finalized);
    assert_eq!(
        settled.resolution.map(|r| r.source),
        Some(ResolutionSource::Negotiation)
    );
}

// ── Races: concurrent transitions resolve exactly once ─────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_agreements_resolve_once() {
    let system = Arbitration::new(ArbitrationConfig::default());
    let id = system.engine.open(request(false)).unwrap().id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = system.engine.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            engine
                .report_agreement(&id, i % 2, "agreed")
                .map(|record| record.resolution.and_then(|r| r.position))
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(position) => winners.push(position),
            Err(DebateError::InvalidPhase { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let record = system.engine.get(&id).unwrap();
    assert_eq!(record.resolution.unwrap().position, winners[0]);
    let finalizations = record
        .transitions
        .iter()
        .filter(|t| t.to == DebatePhase::Finalized)
        .count();
    assert_eq!(finalizations, 1);
}

#[tokio::test]
async fn test_versions_strictly_increase() {
    let system = Arbitration::new(ArbitrationConfig::default());
    system.router.add_reviewer(generalist("ana"));
    let id = system.engine.open(request(false)).unwrap().id;
    system.engine.declare_impasse(&id).await.unwrap();
    system.engine.declare_impasse(&id).await.unwrap();
    system
        .engine
        .submit_human_decision(&id, arbitration::HumanDecision::new("ana", 0, "growth holds"))
        .unwrap();

    let record = system.engine.get(&id).unwrap();
    let versions: Vec<u64> = record.transitions.iter().map(|t| t.version).collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(record.version, *versions.last().unwrap());

    let phase_events: HashSet<u64> = system
        .events
        .history_for(&id)
        .iter()
        .filter_map(|e| match e {
            arbitration::ArbitrationEvent::PhaseChanged { version, .. } => Some(*version),
            _ => None,
        })
        .collect();
    assert_eq!(phase_events.len(), versions.len());
}
