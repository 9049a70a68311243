//! Event types published by the arbitration engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::{DebateId, DebatePhase, PriorityTier, ResolutionSource};
use crate::regime::RegimeLabel;

/// Everything observers can learn from the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArbitrationEvent {
    /// A debate was opened.
    DebateOpened {
        debate_id: DebateId,
        topic: String,
        positions: usize,
        priority: PriorityTier,
        timestamp: DateTime<Utc>,
    },

    /// A debate moved to a new phase.
    PhaseChanged {
        debate_id: DebateId,
        from: DebatePhase,
        to: DebatePhase,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// A debate was handed to a human reviewer.
    EscalatedToHuman {
        debate_id: DebateId,
        reviewer: String,
        priority: PriorityTier,
        deadline: DateTime<Utc>,
        estimated_response: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A provisional resolution is waiting for human review.
    ProvisionalReviewQueued {
        debate_id: DebateId,
        source: ResolutionSource,
        review_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A transition lost a version race and was rejected.
    TransitionRejected {
        debate_id: DebateId,
        expected_version: u64,
        actual_version: u64,
        phase: DebatePhase,
        timestamp: DateTime<Utc>,
    },

    /// The impact of a changed assumption was computed.
    ImpactReported {
        debate_id: Option<DebateId>,
        assumption: String,
        affected: usize,
        recompute: usize,
        timestamp: DateTime<Utc>,
    },

    /// A new regime snapshot was published.
    RegimeChanged {
        version: u64,
        label: RegimeLabel,
        classified: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ArbitrationEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DebateOpened { timestamp, .. }
            | Self::PhaseChanged { timestamp, .. }
            | Self::EscalatedToHuman { timestamp, .. }
            | Self::ProvisionalReviewQueued { timestamp, .. }
            | Self::TransitionRejected { timestamp, .. }
            | Self::ImpactReported { timestamp, .. }
            | Self::RegimeChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Snake-case event name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DebateOpened { .. } => "debate_opened",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::EscalatedToHuman { .. } => "escalated_to_human",
            Self::ProvisionalReviewQueued { .. } => "provisional_review_queued",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::ImpactReported { .. } => "impact_reported",
            Self::RegimeChanged { .. } => "regime_changed",
        }
    }

    /// Debate the event belongs to, if any.
    pub fn debate_id(&self) -> Option<&str> {
        match self {
            Self::DebateOpened { debate_id, .. }
            | Self::PhaseChanged { debate_id, .. }
            | Self::EscalatedToHuman { debate_id, .. }
            | Self::ProvisionalReviewQueued { debate_id, .. }
            | Self::TransitionRejected { debate_id, .. } => Some(debate_id),
            Self::ImpactReported { debate_id, .. } => debate_id.as_deref(),
            Self::RegimeChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ArbitrationEvent::PhaseChanged {
            debate_id: "d-1".to_string(),
            from: DebatePhase::Negotiating,
            to: DebatePhase::Mediating,
            version: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"phase_changed\""));
        let back: ArbitrationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "phase_changed");
    }

    #[test]
    fn test_event_accessors() {
        let event = ArbitrationEvent::ImpactReported {
            debate_id: None,
            assumption: "wacc".to_string(),
            affected: 3,
            recompute: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(event.debate_id(), None);

        let event = ArbitrationEvent::TransitionRejected {
            debate_id: "d-9".to_string(),
            expected_version: 3,
            actual_version: 4,
            phase: DebatePhase::HumanArbitration,
            timestamp: Utc::now(),
        };
        assert_eq!(event.debate_id(), Some("d-9"));
        assert_eq!(event.event_type(), "transition_rejected");
    }
}
