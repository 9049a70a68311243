//! The debate engine: owns every open debate and drives it through the
//! escalation ladder.
//!
//! Each debate lives in its own cell. Writers read the record version, do
//! their work (possibly awaiting credibility scores) and commit with a
//! compare-and-swap against that version. A commit that lost the race is
//! rejected, logged, published as `TransitionRejected` and retried against
//! the current state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::fallback::{ConservativeDefault, DefaultDecision};
use super::precedent::{Precedent, PrecedentLog};
use super::priority::{ArbitrationTimeouts, PriorityScorer, PriorityTier, PriorityWeights};
use super::review_queue::{ProvisionalReview, ProvisionalReviewQueue};
use super::state::{
    DebateId, DebatePhase, DebateRecord, DebateRequest, PositionScore, Resolution,
    ResolutionSource,
};
use super::timers::{EscalationTimers, TimerCallback};
use super::{DebateError, DebateResult};
use crate::credibility::{
    OverrideReason, OverrideRecord, RecommendationRecord, SharedCredibilityService,
};
use crate::events::{ArbitrationEvent, SharedEventBus};
use crate::impact::{AssumptionChange, AssumptionValue, RecomputeTicket, SharedImpactCalculator};
use crate::router::SharedWorkloadRouter;

/// Timeouts and thresholds of the escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub negotiation_minutes: u64,
    pub mediation_minutes: u64,
    pub arbitration: ArbitrationTimeouts,
    /// Floor of the credibility differential needed to auto-resolve.
    pub min_differential: f64,
    /// Similar finalized debates needed before auto-resolving.
    pub min_precedents: usize,
    /// Credibility gap above which the default trusts the top agent.
    pub min_credibility_spread: f64,
    /// Delay before a provisional resolution is due for review.
    pub review_checkpoint_hours: i64,
    pub max_transition_retries: u32,
    pub priority: PriorityWeights,
    /// Archived debates kept readable after leaving the live map.
    pub archive_retention: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            negotiation_minutes: 15,
            mediation_minutes: 30,
            arbitration: ArbitrationTimeouts::default(),
            min_differential: 0.25,
            min_precedents: 5,
            min_credibility_spread: 0.05,
            review_checkpoint_hours: 24,
            max_transition_retries: 3,
            priority: PriorityWeights::default(),
            archive_retention: 1024,
        }
    }
}

impl DebateConfig {
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_minutes * 60)
    }

    pub fn mediation_timeout(&self) -> Duration {
        Duration::from_secs(self.mediation_minutes * 60)
    }

    /// Longest time a debate of `tier` can take to settle.
    pub fn settle_bound(&self, tier: PriorityTier) -> Duration {
        self.negotiation_timeout() + self.mediation_timeout() + self.arbitration.for_tier(tier)
    }
}

/// A human's ruling on a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanDecision {
    pub reviewer: String,
    /// Index of the chosen position.
    pub position: usize,
    pub rationale: String,
    /// Recorded against agents whose position lost. Defaults to
    /// debate arbitration.
    #[serde(default)]
    pub reason: Option<OverrideReason>,
    /// Assumption that changed because of this ruling, for impact analysis.
    #[serde(default)]
    pub change: Option<AssumptionChange>,
}

impl HumanDecision {
    pub fn new(reviewer: impl Into<String>, position: usize, rationale: impl Into<String>) -> Self {
        Self {
            reviewer: reviewer.into(),
            position,
            rationale: rationale.into(),
            reason: None,
            change: None,
        }
    }

    pub fn with_reason(mut self, reason: OverrideReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_change(mut self, change: AssumptionChange) -> Self {
        self.change = Some(change);
        self
    }
}

/// Outcome of reviewing a provisional resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Confirm { reviewer: String },
    Override(HumanDecision),
}

/// One debate's record behind its own lock.
struct DebateCell {
    record: Mutex<DebateRecord>,
}

impl DebateCell {
    fn new(record: DebateRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    fn snapshot(&self) -> DebateRecord {
        self.record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn version(&self) -> u64 {
        self.record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .version
    }

    /// Apply `apply` to a draft if the record is still at `expected`. The
    /// record is only replaced when `apply` succeeds.
    fn compare_and_apply<T, F>(&self, expected: u64, apply: F) -> DebateResult<(T, DebateRecord)>
    where
        F: FnOnce(&mut DebateRecord) -> DebateResult<T>,
    {
        let mut record = self.record.lock().unwrap_or_else(|e| e.into_inner());
        if record.version != expected {
            return Err(DebateError::StaleTransition {
                expected,
                actual: record.version,
            });
        }
        let mut draft = record.clone();
        let value = apply(&mut draft)?;
        *record = draft.clone();
        Ok((value, draft))
    }
}

struct EngineShared {
    config: DebateConfig,
    credibility: SharedCredibilityService,
    router: SharedWorkloadRouter,
    impact: SharedImpactCalculator,
    events: SharedEventBus,
    precedents: PrecedentLog,
    reviews: ProvisionalReviewQueue,
    timers: EscalationTimers,
    scorer: PriorityScorer,
    fallback: ConservativeDefault,
    debates: RwLock<HashMap<DebateId, Arc<DebateCell>>>,
    /// Oldest first; bounded by `archive_retention`.
    archived: Mutex<VecDeque<DebateRecord>>,
}

/// Runs debates to a resolution. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DebateEngine {
    shared: Arc<EngineShared>,
}

/// What leaving mediation decided to do.
enum Escalation {
    Auto {
        winner: usize,
        differential: f64,
        threshold: f64,
    },
    Human,
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Settle a record on a default decision: `ConservativeDefault → Provisional`.
fn settle_on_default(
    record: &mut DebateRecord,
    decision: &DefaultDecision,
    reason: &str,
    at: DateTime<Utc>,
) -> DebateResult<()> {
    record.transition(DebatePhase::ConservativeDefault, reason, at)?;
    record.resolution = Some(Resolution {
        position: decision.position,
        recommendation: decision.recommendation.clone(),
        value: decision.value,
        source: ResolutionSource::Default,
        confidence: decision.confidence,
        provisional: true,
        rationale: format!("{} ({})", decision.rationale, decision.strategy),
        decided_at: at,
    });
    record.reviewer = None;
    record.deadline = None;
    record.transition(DebatePhase::Provisional, "awaiting review", at)
}

/// Assumption implied by replacing one resolution with another, used when a
/// reviewer does not name the changed assumption explicitly.
fn implied_change(topic: &str, old: &Resolution, new: &Resolution) -> AssumptionChange {
    let value = |r: &Resolution| match r.value {
        Some(v) => AssumptionValue::Numeric(v),
        None => AssumptionValue::Categorical(r.recommendation.clone()),
    };
    AssumptionChange {
        assumption: topic.to_string(),
        old: value(old),
        new: value(new),
    }
}

impl DebateEngine {
    pub fn new(
        config: DebateConfig,
        credibility: SharedCredibilityService,
        router: SharedWorkloadRouter,
        impact: SharedImpactCalculator,
        events: SharedEventBus,
    ) -> Self {
        let scorer = PriorityScorer::new(config.priority.clone());
        let fallback = ConservativeDefault::new(config.min_credibility_spread);
        Self {
            shared: Arc::new(EngineShared {
                config,
                credibility,
                router,
                impact,
                events,
                precedents: PrecedentLog::default(),
                reviews: ProvisionalReviewQueue::new(),
                timers: EscalationTimers::new(),
                scorer,
                fallback,
                debates: RwLock::new(HashMap::new()),
                archived: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.shared.config
    }

    pub fn precedents(&self) -> &PrecedentLog {
        &self.shared.precedents
    }

    pub fn review_queue(&self) -> &ProvisionalReviewQueue {
        &self.shared.reviews
    }

    pub fn timers(&self) -> &EscalationTimers {
        &self.shared.timers
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.shared.events
    }

    pub fn router(&self) -> &SharedWorkloadRouter {
        &self.shared.router
    }

    fn live_cell(&self, id: &str) -> Option<Arc<DebateCell>> {
        self.shared
            .debates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn cell(&self, id: &str) -> DebateResult<Arc<DebateCell>> {
        match self.live_cell(id) {
            Some(cell) => Ok(cell),
            None if self.archived(id).is_some() => Err(DebateError::Archived(id.to_string())),
            None => Err(DebateError::NotFound(id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> DebateResult<DebateRecord> {
        match self.live_cell(id) {
            Some(cell) => Ok(cell.snapshot()),
            None => self
                .archived(id)
                .ok_or_else(|| DebateError::NotFound(id.to_string())),
        }
    }

    /// A retained archived record.
    pub fn archived(&self, id: &str) -> Option<DebateRecord> {
        self.shared
            .archived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    /// Debates still held in the live map.
    pub fn live_count(&self) -> usize {
        self.shared
            .debates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn phase(&self, id: &str) -> DebateResult<DebatePhase> {
        Ok(self.get(id)?.phase)
    }

    /// Ids of all live debates.
    pub fn debate_ids(&self) -> Vec<DebateId> {
        let mut ids: Vec<DebateId> = self
            .shared
            .debates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Debates not yet settled.
    pub fn open_debates(&self) -> Vec<DebateRecord> {
        let cells: Vec<Arc<DebateCell>> = self
            .shared
            .debates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        cells
            .iter()
            .map(|cell| cell.snapshot())
            .filter(|record| !record.phase.is_settled())
            .collect()
    }

    /// Open a debate and start negotiation. The negotiation timer is
    /// spawned on the current tokio runtime; without one nothing is opened.
    pub fn open(&self, request: DebateRequest) -> DebateResult<DebateRecord> {
        if request.positions.len() < 2 {
            return Err(DebateError::TooFewPositions(request.positions.len()));
        }
        Self::require_runtime()?;
        let now = Utc::now();
        let (tier, score) = self.shared.scorer.assess(
            &request.priority,
            &request.positions,
            request.priority_hint,
        );
        let id = Uuid::new_v4().to_string();
        let mut record = DebateRecord::new(id.clone(), request, tier, score, now);
        record.transition(DebatePhase::Negotiating, "debate opened", now)?;

        self.shared
            .debates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::new(DebateCell::new(record.clone())));

        info!(
            debate_id = %id,
            topic = %record.topic,
            positions = record.positions.len(),
            priority = %tier,
            priority_score = score,
            "Debate opened"
        );
        self.shared.events.publish(ArbitrationEvent::DebateOpened {
            debate_id: id.clone(),
            topic: record.topic.clone(),
            positions: record.positions.len(),
            priority: tier,
            timestamp: now,
        });
        self.after_commit(0, &record);
        self.schedule(
            &id,
            DebatePhase::Negotiating,
            self.shared.config.negotiation_timeout(),
        )?;
        Ok(record)
    }

    /// Agents (while negotiating) or the mediator (while mediating) agreed on
    /// a position.
    pub fn report_agreement(
        &self,
        id: &str,
        position: usize,
        rationale: &str,
    ) -> DebateResult<DebateRecord> {
        let (_, record) = self.update(id, |record| {
            if !record.phase.accepts_agreement() {
                return Err(DebateError::InvalidPhase {
                    phase: record.phase,
                    operation: "report agreement",
                });
            }
            let source = if record.phase == DebatePhase::Negotiating {
                ResolutionSource::Negotiation
            } else {
                ResolutionSource::Mediation
            };
            let now = Utc::now();
            let resolution = record.resolution_for(position, source, 1.0, rationale, now)?;
            record.transition(DebatePhase::Resolved, "agreement reached", now)?;
            record.resolution = Some(resolution);
            record.transition(DebatePhase::Finalized, "agreement finalized", now)
        })?;
        Ok(record)
    }

    /// Give up on the current level without waiting for its timeout.
    pub async fn declare_impasse(&self, id: &str) -> DebateResult<DebateRecord> {
        Self::require_runtime()?;
        let record = self.get(id)?;
        match record.phase {
            DebatePhase::Negotiating => self.enter_mediation(id, "impasse declared"),
            DebatePhase::Mediating => self.leave_mediation(id, "impasse declared").await,
            phase => Err(DebateError::InvalidPhase {
                phase,
                operation: "declare impasse",
            }),
        }
    }

    fn timer_callback(&self, id: &str, phase: DebatePhase) -> TimerCallback {
        let engine = self.clone();
        let id = id.to_string();
        Box::pin(async move {
            engine.on_timer(&id, phase).await;
        })
    }

    fn require_runtime() -> DebateResult<()> {
        tokio::runtime::Handle::try_current()
            .map(|_| ())
            .map_err(|_| DebateError::NoRuntime)
    }

    fn schedule(&self, id: &str, phase: DebatePhase, after: Duration) -> DebateResult<()> {
        let callback = self.timer_callback(id, phase);
        self.shared.timers.schedule(id, phase, after, callback)
    }

    async fn on_timer(&self, id: &str, phase: DebatePhase) {
        let current = match self.phase(id) {
            Ok(current) => current,
            Err(e) => {
                warn!(debate_id = id, error = %e, "Timer fired for unknown debate");
                return;
            }
        };
        if current != phase {
            debug!(
                debate_id = id,
                timer_phase = %phase,
                phase = %current,
                "Timer outlived its phase, ignoring"
            );
            return;
        }
        let result = match phase {
            DebatePhase::Negotiating => self.enter_mediation(id, "negotiation timed out"),
            DebatePhase::Mediating => self.leave_mediation(id, "mediation timed out").await,
            DebatePhase::HumanArbitration => {
                self.apply_default(id, "human arbitration timed out").await
            }
            _ => return,
        };
        if let Err(e) = result {
            warn!(debate_id = id, phase = %phase, error = %e, "Timeout handling failed");
        }
    }

    fn enter_mediation(&self, id: &str, reason: &str) -> DebateResult<DebateRecord> {
        let (_, record) = self.update(id, |record| {
            if record.phase != DebatePhase::Negotiating {
                return Err(DebateError::InvalidPhase {
                    phase: record.phase,
                    operation: "enter mediation",
                });
            }
            record.transition(DebatePhase::Mediating, reason, Utc::now())
        })?;
        self.schedule(
            id,
            DebatePhase::Mediating,
            self.shared.config.mediation_timeout(),
        )?;
        Ok(record)
    }

    /// Score each position's agent in the debate context.
    async fn score_positions(&self, record: &DebateRecord) -> Vec<PositionScore> {
        let regime = self.shared.credibility.regimes().current();
        let mut scores = Vec::with_capacity(record.positions.len());
        for (index, position) in record.positions.iter().enumerate() {
            let score = self
                .shared
                .credibility
                .score_in_regime(&position.agent, &record.context, Some(regime.clone()))
                .await;
            scores.push(PositionScore {
                position: index,
                agent: position.agent.clone(),
                value: score.value,
                half_width: score.half_width(),
                sample_size: score.sample_size(),
            });
        }
        scores
    }

    /// Auto-resolve only when the top agent leads by more than both
    /// intervals combined (and the configured floor) and enough similar
    /// debates have been settled before.
    fn check_auto_resolution(&self, scores: &[PositionScore], precedents: usize) -> Escalation {
        let mut ranked: Vec<&PositionScore> = scores.iter().collect();
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.position.cmp(&b.position)));
        let (Some(top), Some(second)) = (ranked.first(), ranked.get(1)) else {
            return Escalation::Human;
        };
        if top.sample_size == 0 || second.sample_size == 0 {
            return Escalation::Human;
        }
        let differential = (top.value - second.value).abs();
        let threshold = self
            .shared
            .config
            .min_differential
            .max(top.half_width + second.half_width);
        if differential > threshold && precedents >= self.shared.config.min_precedents {
            Escalation::Auto {
                winner: top.position,
                differential,
                threshold,
            }
        } else {
            debug!(
                differential,
                threshold,
                precedents,
                "Credibility gap not decisive"
            );
            Escalation::Human
        }
    }

    async fn leave_mediation(&self, id: &str, reason: &str) -> DebateResult<DebateRecord> {
        let cell = self.cell(id)?;
        let attempts = self.shared.config.max_transition_retries + 1;
        for _ in 0..attempts {
            let record = cell.snapshot();
            if record.phase != DebatePhase::Mediating {
                debug!(debate_id = id, phase = %record.phase, "Already left mediation");
                return Ok(record);
            }
            let scores = self.score_positions(&record).await;
            let precedents = self.shared.precedents.count_similar(&record.context);
            let now = Utc::now();

            let committed = match self.check_auto_resolution(&scores, precedents) {
                Escalation::Auto {
                    winner,
                    differential,
                    threshold,
                } => {
                    let confidence = scores.get(winner).map_or(0.0, |s| s.value);
                    let rationale = format!(
                        "credibility differential {:.3} > {:.3} with {} precedents",
                        differential, threshold, precedents
                    );
                    self.commit(&cell, record.version, |r| {
                        r.position_scores = scores.clone();
                        let resolution = r.resolution_for(
                            winner,
                            ResolutionSource::Auto,
                            confidence,
                            &rationale,
                            now,
                        )?;
                        r.transition(DebatePhase::AutoResolved, reason, now)?;
                        r.resolution = Some(resolution);
                        r.transition(DebatePhase::Finalized, "auto-resolution finalized", now)
                    })
                }
                Escalation::Human => self.escalate(&cell, &record, scores, reason, now),
            };

            match committed {
                Ok(((), record)) => return Ok(record),
                Err(DebateError::StaleTransition { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DebateError::RetriesExhausted {
            id: id.to_string(),
            attempts,
        })
    }

    /// Hand the debate to a reviewer, or straight to the conservative
    /// default when nobody is available.
    fn escalate(
        &self,
        cell: &DebateCell,
        record: &DebateRecord,
        scores: Vec<PositionScore>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DebateResult<((), DebateRecord)> {
        let id = record.id.as_str();
        match self.shared.router.assign(id, &record.context, now) {
            Some(assignment) => {
                let timeout = self.shared.config.arbitration.for_tier(record.priority);
                let deadline = now + chrono_duration(timeout);
                let committed = self.commit(cell, record.version, |r| {
                    r.position_scores = scores;
                    r.transition(DebatePhase::HumanArbitration, reason, now)?;
                    r.reviewer = Some(assignment.reviewer.clone());
                    r.deadline = Some(deadline);
                    Ok(())
                });
                match committed {
                    Ok(done) => {
                        self.schedule(id, DebatePhase::HumanArbitration, timeout)?;
                        info!(
                            debate_id = id,
                            reviewer = %assignment.reviewer,
                            priority = %record.priority,
                            deadline = %deadline,
                            "Escalated to human arbitration"
                        );
                        self.shared.events.publish(ArbitrationEvent::EscalatedToHuman {
                            debate_id: id.to_string(),
                            reviewer: assignment.reviewer.clone(),
                            priority: record.priority,
                            deadline,
                            estimated_response: assignment.estimated_response,
                            timestamp: now,
                        });
                        Ok(done)
                    }
                    Err(e) => {
                        self.shared.router.release(id);
                        Err(e)
                    }
                }
            }
            None => {
                let credibility: Vec<f64> = scores.iter().map(|s| s.value).collect();
                let decision = self
                    .shared
                    .fallback
                    .decide(
                        &record.positions,
                        &credibility,
                        record.high_stakes,
                        record.priority,
                    )
                    .ok_or(DebateError::TooFewPositions(record.positions.len()))?;
                warn!(
                    debate_id = id,
                    strategy = %decision.strategy,
                    "No reviewer available, applying conservative default"
                );
                let done = self.commit(cell, record.version, |r| {
                    r.position_scores = scores;
                    r.transition(DebatePhase::HumanArbitration, reason, now)?;
                    settle_on_default(r, &decision, "no reviewer available", now)
                })?;
                self.queue_review(id, now);
                Ok(done)
            }
        }
    }

    /// Human arbitration timed out: settle on the conservative default.
    async fn apply_default(&self, id: &str, reason: &str) -> DebateResult<DebateRecord> {
        let cell = self.cell(id)?;
        let attempts = self.shared.config.max_transition_retries + 1;
        for _ in 0..attempts {
            let record = cell.snapshot();
            if record.phase != DebatePhase::HumanArbitration {
                return Ok(record);
            }
            let scores = if record.position_scores.len() == record.positions.len() {
                record.position_scores.clone()
            } else {
                self.score_positions(&record).await
            };
            let mut credibility = vec![0.0; record.positions.len()];
            for score in &scores {
                if let Some(slot) = credibility.get_mut(score.position) {
                    *slot = score.value;
                }
            }
            let decision = self
                .shared
                .fallback
                .decide(
                    &record.positions,
                    &credibility,
                    record.high_stakes,
                    record.priority,
                )
                .ok_or(DebateError::TooFewPositions(record.positions.len()))?;
            let now = Utc::now();
            match self.commit(&cell, record.version, |r| {
                r.position_scores = scores.clone();
                settle_on_default(r, &decision, reason, now)
            }) {
                Ok(((), settled)) => {
                    info!(
                        debate_id = id,
                        strategy = %decision.strategy,
                        recommendation = %decision.recommendation,
                        "Conservative default applied"
                    );
                    self.queue_review(id, now);
                    return Ok(settled);
                }
                Err(DebateError::StaleTransition { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DebateError::RetriesExhausted {
            id: id.to_string(),
            attempts,
        })
    }

    fn queue_review(&self, id: &str, now: DateTime<Utc>) {
        let review_at = now + chrono::Duration::hours(self.shared.config.review_checkpoint_hours);
        self.shared.reviews.enqueue(ProvisionalReview {
            debate_id: id.to_string(),
            source: ResolutionSource::Default,
            queued_at: now,
            review_at,
        });
        self.shared
            .events
            .publish(ArbitrationEvent::ProvisionalReviewQueued {
                debate_id: id.to_string(),
                source: ResolutionSource::Default,
                review_at,
                timestamp: now,
            });
    }

    /// A reviewer ruled. While the debate is in human arbitration this
    /// resolves it; once it has gone provisional the ruling is treated as
    /// the review of the default.
    pub fn submit_human_decision(
        &self,
        id: &str,
        decision: HumanDecision,
    ) -> DebateResult<DebateRecord> {
        let record = self.get(id)?;
        match record.phase {
            DebatePhase::HumanArbitration => {}
            DebatePhase::Provisional => {
                let confirms = record
                    .resolution
                    .as_ref()
                    .and_then(|r| r.position)
                    .is_some_and(|p| p == decision.position);
                let review = if confirms {
                    ReviewDecision::Confirm {
                        reviewer: decision.reviewer,
                    }
                } else {
                    ReviewDecision::Override(decision)
                };
                return self.review_provisional(id, review);
            }
            phase => {
                return Err(DebateError::InvalidPhase {
                    phase,
                    operation: "submit a human decision",
                })
            }
        }

        let (_, record) = self.update(id, |r| {
            if r.phase != DebatePhase::HumanArbitration {
                return Err(DebateError::InvalidPhase {
                    phase: r.phase,
                    operation: "submit a human decision",
                });
            }
            let now = Utc::now();
            let resolution = r.resolution_for(
                decision.position,
                ResolutionSource::Human,
                1.0,
                &decision.rationale,
                now,
            )?;
            r.transition(
                DebatePhase::Resolved,
                &format!("decided by {}", decision.reviewer),
                now,
            )?;
            r.resolution = Some(resolution);
            r.reviewer = Some(decision.reviewer.clone());
            r.transition(DebatePhase::Finalized, "human decision finalized", now)
        })?;
        self.record_human_judgement(&record, decision.reason);
        Ok(record)
    }

    /// Confirm or override a provisional resolution.
    pub fn review_provisional(
        &self,
        id: &str,
        decision: ReviewDecision,
    ) -> DebateResult<DebateRecord> {
        let record = match &decision {
            ReviewDecision::Confirm { reviewer } => {
                let (_, record) = self.update(id, |r| {
                    Self::require_provisional(r)?;
                    let now = Utc::now();
                    if let Some(resolution) = r.resolution.as_mut() {
                        resolution.source = ResolutionSource::Human;
                        resolution.provisional = false;
                        resolution.rationale =
                            format!("{}; confirmed by {}", resolution.rationale, reviewer);
                    }
                    r.reviewer = Some(reviewer.clone());
                    r.transition(DebatePhase::Finalized, "provisional resolution confirmed", now)
                })?;
                self.record_human_judgement(&record, None);
                record
            }
            ReviewDecision::Override(human) => {
                let ((ticket, affected), record) = self.update(id, |r| {
                    Self::require_provisional(r)?;
                    let now = Utc::now();
                    let issued = self.replace_resolution(r, human, now)?;
                    r.transition(DebatePhase::Finalized, "provisional resolution overridden", now)?;
                    Ok(issued)
                })?;
                self.publish_ticket(&ticket, affected);
                self.record_human_judgement(&record, human.reason.clone());
                record
            }
        };
        self.shared.reviews.remove(id);
        Ok(record)
    }

    fn require_provisional(record: &DebateRecord) -> DebateResult<()> {
        if record.phase == DebatePhase::Provisional {
            Ok(())
        } else {
            Err(DebateError::InvalidPhase {
                phase: record.phase,
                operation: "review a provisional resolution",
            })
        }
    }

    /// Swap in a human resolution, keeping the old one as superseded, and
    /// attach the recompute ticket for the changed assumption.
    fn replace_resolution(
        &self,
        record: &mut DebateRecord,
        decision: &HumanDecision,
        now: DateTime<Utc>,
    ) -> DebateResult<(RecomputeTicket, usize)> {
        let resolution = record.resolution_for(
            decision.position,
            ResolutionSource::Human,
            1.0,
            &decision.rationale,
            now,
        )?;
        let change = match (&decision.change, &record.resolution) {
            (Some(change), _) => change.clone(),
            (None, Some(old)) => implied_change(&record.topic, old, &resolution),
            (None, None) => AssumptionChange::categorical(
                record.topic.clone(),
                "",
                resolution.recommendation.clone(),
            ),
        };
        let report = self.shared.impact.analyze(&change);
        let ticket = report.ticket(Some(record.id.as_str()));
        record.superseded = record.resolution.take();
        record.resolution = Some(resolution);
        record.reviewer = Some(decision.reviewer.clone());
        record.recompute = Some(ticket.clone());
        Ok((ticket, report.affected.len()))
    }

    /// `affected` counts every reachable node, `recompute` only the ones
    /// flagged by the report.
    fn publish_ticket(&self, ticket: &RecomputeTicket, affected: usize) {
        info!(
            debate_id = ticket.debate_id.as_deref().unwrap_or("-"),
            assumption = %ticket.assumption,
            affected,
            outputs = ticket.outputs.len(),
            full_recompute = ticket.full_recompute,
            "Recompute ticket attached"
        );
        self.shared.events.publish(ArbitrationEvent::ImpactReported {
            debate_id: ticket.debate_id.clone(),
            assumption: ticket.assumption.clone(),
            affected,
            recompute: ticket.outputs.len(),
            timestamp: ticket.issued_at,
        });
    }

    /// Override a finalized auto or default resolution. Allowed once, and
    /// never after archival.
    pub fn override_resolution(
        &self,
        id: &str,
        decision: HumanDecision,
    ) -> DebateResult<DebateRecord> {
        let ((ticket, affected), record) = self.update(id, |r| {
            match r.phase {
                DebatePhase::Finalized => {}
                DebatePhase::Archived => return Err(DebateError::Archived(r.id.clone())),
                phase => {
                    return Err(DebateError::InvalidPhase {
                        phase,
                        operation: "override a resolution",
                    })
                }
            }
            if r.superseded.is_some() {
                return Err(DebateError::AlreadyOverridden(r.id.clone()));
            }
            if let Some(source) = r.resolution.as_ref().map(|res| res.source) {
                if !source.is_overridable() {
                    return Err(DebateError::NotOverridable(source));
                }
            }
            let issued = self.replace_resolution(r, &decision, Utc::now())?;
            r.touch();
            Ok(issued)
        })?;
        info!(debate_id = id, reviewer = %decision.reviewer, "Finalized resolution overridden");
        self.publish_ticket(&ticket, affected);
        self.record_human_judgement(&record, decision.reason.clone());
        Ok(record)
    }

    /// Finalize provisional resolutions whose review checkpoint passed
    /// without a reviewer acting. They keep their default source.
    pub fn finalize_due_reviews(&self, at: DateTime<Utc>) -> Vec<DebateId> {
        let mut finalized = Vec::new();
        for review in self.shared.reviews.due(at) {
            let id = review.debate_id.as_str();
            let result = self.update(id, |r| {
                Self::require_provisional(r)?;
                if let Some(resolution) = r.resolution.as_mut() {
                    resolution.provisional = false;
                }
                r.transition(DebatePhase::Finalized, "review checkpoint passed", at)
            });
            match result {
                Ok(_) => finalized.push(review.debate_id.clone()),
                Err(e) => debug!(debate_id = id, error = %e, "Skipping due review"),
            }
            self.shared.reviews.remove(id);
        }
        finalized
    }

    /// Close a finalized debate to further overrides and move it out of
    /// the live map. The record stays readable through `get` until
    /// `archive_retention` newer archives push it out.
    pub fn archive(&self, id: &str) -> DebateResult<DebateRecord> {
        let (_, record) = self.update(id, |r| {
            if r.phase == DebatePhase::Archived {
                return Err(DebateError::Archived(r.id.clone()));
            }
            r.transition(DebatePhase::Archived, "archived", Utc::now())
        })?;
        self.shared.router.release(id);
        self.shared.reviews.remove(id);
        self.shared.timers.cancel(id);

        {
            let mut archived = self
                .shared
                .archived
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            archived.push_back(record.clone());
            while archived.len() > self.shared.config.archive_retention {
                archived.pop_front();
            }
        }
        self.shared
            .debates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        debug!(debate_id = id, "Debate archived");
        Ok(record)
    }

    /// Commit `apply` at the current version, retrying on lost races.
    fn update<T, F>(&self, id: &str, mut apply: F) -> DebateResult<(T, DebateRecord)>
    where
        F: FnMut(&mut DebateRecord) -> DebateResult<T>,
    {
        let cell = self.cell(id)?;
        let attempts = self.shared.config.max_transition_retries + 1;
        for _ in 0..attempts {
            let version = cell.version();
            match self.commit(&cell, version, &mut apply) {
                Err(DebateError::StaleTransition { .. }) => continue,
                other => return other,
            }
        }
        Err(DebateError::RetriesExhausted {
            id: id.to_string(),
            attempts,
        })
    }

    /// Compare-and-swap one change, then run post-commit effects. A stale
    /// commit is logged and published before the error is returned.
    fn commit<T, F>(
        &self,
        cell: &DebateCell,
        expected: u64,
        apply: F,
    ) -> DebateResult<(T, DebateRecord)>
    where
        F: FnOnce(&mut DebateRecord) -> DebateResult<T>,
    {
        match cell.compare_and_apply(expected, apply) {
            Ok((value, record)) => {
                self.after_commit(expected, &record);
                Ok((value, record))
            }
            Err(DebateError::StaleTransition { expected, actual }) => {
                let current = cell.snapshot();
                warn!(
                    debate_id = %current.id,
                    expected,
                    actual,
                    phase = %current.phase,
                    "Stale transition rejected, retrying against current state"
                );
                self.shared
                    .events
                    .publish(ArbitrationEvent::TransitionRejected {
                        debate_id: current.id.clone(),
                        expected_version: expected,
                        actual_version: actual,
                        phase: current.phase,
                        timestamp: Utc::now(),
                    });
                Err(DebateError::StaleTransition { expected, actual })
            }
            Err(e) => Err(e),
        }
    }

    /// Publish transitions made since `previous` and keep timers, reviewer
    /// loads and precedents in step with the new phase.
    fn after_commit(&self, previous: u64, record: &DebateRecord) {
        let id = record.id.as_str();
        for transition in record.transitions_since(previous) {
            info!(
                debate_id = id,
                from = %transition.from,
                to = %transition.to,
                version = transition.version,
                reason = %transition.reason,
                "Debate phase changed"
            );
            self.shared.events.publish(ArbitrationEvent::PhaseChanged {
                debate_id: id.to_string(),
                from: transition.from,
                to: transition.to,
                version: transition.version,
                timestamp: transition.timestamp,
            });
            if transition.from == DebatePhase::HumanArbitration {
                self.shared.router.release(id);
            }
            if transition.to == DebatePhase::Finalized {
                if let Some(resolution) = &record.resolution {
                    self.shared.precedents.record(Precedent {
                        debate_id: record.id.clone(),
                        context: record.context.clone(),
                        source: resolution.source,
                        recorded_at: transition.timestamp,
                    });
                }
            }
        }
        if record.phase.is_settled() {
            self.shared.timers.cancel(id);
        }
    }

    /// Feed a human ruling back into the credibility ledger: every position
    /// was a recommendation the human saw, and every losing one is an
    /// override of its agent.
    fn record_human_judgement(&self, record: &DebateRecord, reason: Option<OverrideReason>) {
        let Some(resolution) = &record.resolution else {
            return;
        };
        let store = self.shared.credibility.store();
        let now = Utc::now();
        let chosen = resolution
            .position
            .and_then(|index| record.positions.get(index));
        for (index, position) in record.positions.iter().enumerate() {
            store.append_recommendation(RecommendationRecord {
                agent: position.agent.clone(),
                context: record.context.clone(),
                recommendation_id: format!("{}#{}", record.id, index),
                recorded_at: now,
            });
            let overridden = chosen
                .is_some_and(|chosen| chosen.recommendation != position.recommendation);
            if overridden {
                store.append_override(OverrideRecord {
                    agent: position.agent.clone(),
                    context: record.context.clone(),
                    agent_recommendation: position.recommendation.clone(),
                    human_decision: resolution.recommendation.clone(),
                    reason: reason.clone().unwrap_or(OverrideReason::DebateArbitration),
                    recorded_at: now,
                });
            }
        }
        debug!(
            debate_id = %record.id,
            positions = record.positions.len(),
            "Human judgement recorded in credibility ledger"
        );
    }
}
