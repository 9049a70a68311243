//! Debate state machine: phases, positions, resolutions and the versioned
//! debate record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::priority::{PriorityInputs, PriorityTier};
use super::DebateError;
use crate::credibility::{AgentId, ContextVector};
use crate::impact::RecomputeTicket;

/// Debate identifier.
pub type DebateId = String;

/// Phase of a debate.
///
/// Phases only move forward. `Finalized` can still be overridden once (when
/// the resolution came from auto or default logic) until it is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Created, not yet negotiating.
    Opened,
    /// Agents may agree among themselves.
    Negotiating,
    /// A mediator may broker agreement.
    Mediating,
    /// Credibility differential was decisive.
    AutoResolved,
    /// Waiting on a human reviewer.
    HumanArbitration,
    /// Agreement or human decision recorded.
    Resolved,
    /// Heuristic fallback chose a position.
    ConservativeDefault,
    /// Default resolution in force, awaiting review.
    Provisional,
    /// Resolution is final.
    Finalized,
    /// Closed for overrides.
    Archived,
}

impl DebatePhase {
    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Opened => &[Self::Negotiating],
            Self::Negotiating => &[Self::Mediating, Self::Resolved],
            Self::Mediating => &[Self::AutoResolved, Self::HumanArbitration, Self::Resolved],
            Self::AutoResolved => &[Self::Finalized],
            Self::HumanArbitration => &[Self::Resolved, Self::ConservativeDefault],
            Self::Resolved => &[Self::Finalized],
            Self::ConservativeDefault => &[Self::Provisional],
            Self::Provisional => &[Self::Finalized],
            Self::Finalized => &[Self::Archived],
            Self::Archived => &[],
        }
    }

    pub fn can_transition_to(self, to: DebatePhase) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// A resolution is in force (possibly provisional).
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Provisional | Self::Finalized | Self::Archived)
    }

    /// No further transitions possible.
    pub fn is_terminal(self) -> bool {
        self == Self::Archived
    }

    /// Phases during which agents or a mediator may still agree.
    pub fn accepts_agreement(self) -> bool {
        matches!(self, Self::Negotiating | Self::Mediating)
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Mediating => write!(f, "mediating"),
            Self::AutoResolved => write!(f, "auto_resolved"),
            Self::HumanArbitration => write!(f, "human_arbitration"),
            Self::Resolved => write!(f, "resolved"),
            Self::ConservativeDefault => write!(f, "conservative_default"),
            Self::Provisional => write!(f, "provisional"),
            Self::Finalized => write!(f, "finalized"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Who or what produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Negotiation,
    Mediation,
    Auto,
    Human,
    Default,
}

impl ResolutionSource {
    /// Resolutions a human may override after finalization.
    pub fn is_overridable(self) -> bool {
        matches!(self, Self::Auto | Self::Default)
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negotiation => write!(f, "negotiation"),
            Self::Mediation => write!(f, "mediation"),
            Self::Auto => write!(f, "auto"),
            Self::Human => write!(f, "human"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// One agent's side of a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub agent: AgentId,
    /// Recommendation text (e.g. "buy", "target 142").
    pub recommendation: String,
    /// Numeric form of the recommendation, when there is one.
    #[serde(default)]
    pub value: Option<f64>,
    /// Confidence the agent stated, in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Assessed downside risk of acting on this position, in [0, 1].
    pub downside_risk: f64,
}

impl Position {
    pub fn new(agent: impl Into<AgentId>, recommendation: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            recommendation: recommendation.into(),
            value: None,
            confidence: 0.5,
            evidence: Vec::new(),
            downside_risk: 0.5,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_downside_risk(mut self, downside_risk: f64) -> Self {
        self.downside_risk = downside_risk;
        self
    }

    pub fn with_evidence(mut self, evidence: &[&str]) -> Self {
        self.evidence = evidence.iter().map(|e| e.to_string()).collect();
        self
    }
}

/// Request to open a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRequest {
    pub topic: String,
    pub context: ContextVector,
    pub positions: Vec<Position>,
    #[serde(default)]
    pub priority: PriorityInputs,
    /// Caller's urgency hint; can only raise the computed tier.
    #[serde(default)]
    pub priority_hint: Option<PriorityTier>,
    /// Forces the lowest-downside default on timeout.
    #[serde(default)]
    pub high_stakes: bool,
}

/// Credibility of a position's agent at auto-resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionScore {
    pub position: usize,
    pub agent: AgentId,
    pub value: f64,
    pub half_width: f64,
    pub sample_size: usize,
}

/// The decision a debate ended with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Index of the chosen position; `None` for a blended value.
    pub position: Option<usize>,
    pub recommendation: String,
    pub value: Option<f64>,
    pub source: ResolutionSource,
    pub confidence: f64,
    pub provisional: bool,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
}

/// A recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    /// Record version after the transition.
    pub version: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Full state of one debate. Every mutation bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRecord {
    pub id: DebateId,
    pub topic: String,
    pub context: ContextVector,
    pub positions: Vec<Position>,
    pub priority: PriorityTier,
    pub priority_score: f64,
    pub high_stakes: bool,
    pub phase: DebatePhase,
    pub version: u64,
    pub resolution: Option<Resolution>,
    /// Resolution replaced by a post-finalization override.
    pub superseded: Option<Resolution>,
    pub position_scores: Vec<PositionScore>,
    pub reviewer: Option<String>,
    /// Human arbitration deadline.
    pub deadline: Option<DateTime<Utc>>,
    pub recompute: Option<RecomputeTicket>,
    pub transitions: Vec<DebateTransition>,
    pub opened_at: DateTime<Utc>,
}

impl DebateRecord {
    pub fn new(
        id: DebateId,
        request: DebateRequest,
        priority: PriorityTier,
        priority_score: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            topic: request.topic,
            context: request.context,
            positions: request.positions,
            priority,
            priority_score,
            high_stakes: request.high_stakes,
            phase: DebatePhase::Opened,
            version: 0,
            resolution: None,
            superseded: None,
            position_scores: Vec::new(),
            reviewer: None,
            deadline: None,
            recompute: None,
            transitions: Vec::new(),
            opened_at: at,
        }
    }

    /// Move to `to`, recording the transition and bumping the version.
    pub fn transition(
        &mut self,
        to: DebatePhase,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DebateError> {
        if !self.phase.can_transition_to(to) {
            return Err(DebateError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.version += 1;
        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            version: self.version,
            reason: reason.to_string(),
            timestamp: at,
        });
        self.phase = to;
        Ok(())
    }

    /// Bump the version for a change that keeps the phase.
    pub fn touch(&mut self) {
        self.version += 1;
    }

    pub fn position(&self, index: usize) -> Result<&Position, DebateError> {
        self.positions
            .get(index)
            .ok_or(DebateError::InvalidPosition {
                index,
                count: self.positions.len(),
            })
    }

    /// Transitions recorded after `version`.
    pub fn transitions_since(&self, version: u64) -> impl Iterator<Item = &DebateTransition> {
        self.transitions.iter().filter(move |t| t.version > version)
    }

    /// Resolution built from one of the positions.
    pub fn resolution_for(
        &self,
        index: usize,
        source: ResolutionSource,
        confidence: f64,
        rationale: &str,
        at: DateTime<Utc>,
    ) -> Result<Resolution, DebateError> {
        let position = self.position(index)?;
        Ok(Resolution {
            position: Some(index),
            recommendation: position.recommendation.clone(),
            value: position.value,
            source,
            confidence,
            provisional: false,
            rationale: rationale.to_string(),
            decided_at: at,
        })
    }
}
