//! Append-only ledger records consumed by credibility scoring.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ContextVector;
use crate::regime::RegimeLabel;

/// Agent identifier.
pub type AgentId = String;

/// An agent is plain data: an identity plus the domains it specializes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub specializations: BTreeSet<String>,
}

impl AgentProfile {
    pub fn new(id: impl Into<AgentId>, specializations: &[&str]) -> Self {
        Self {
            id: id.into(),
            specializations: specializations.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn specializes_in(&self, domain: &str) -> bool {
        self.specializations
            .iter()
            .any(|s| s.eq_ignore_ascii_case(domain))
    }
}

/// Outcome review checkpoint at which an outcome was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Day30,
    Day90,
    Day180,
    Day365,
}

impl Checkpoint {
    pub fn days(self) -> u32 {
        match self {
            Self::Day30 => 30,
            Self::Day90 => 90,
            Self::Day180 => 180,
            Self::Day365 => 365,
        }
    }
}

/// Measured accuracy of one agent prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub agent: AgentId,
    pub context: ContextVector,
    pub predicted: f64,
    pub actual: f64,
    /// Accuracy in [0, 1].
    pub accuracy: f64,
    pub recorded_at: DateTime<Utc>,
    /// Regime in force when the prediction was made.
    pub regime: RegimeLabel,
    #[serde(default = "default_checkpoint")]
    pub checkpoint: Checkpoint,
}

fn default_checkpoint() -> Checkpoint {
    Checkpoint::Day90
}

impl OutcomeRecord {
    /// Build a record, deriving accuracy from the prediction error.
    pub fn measured(
        agent: impl Into<AgentId>,
        context: ContextVector,
        predicted: f64,
        actual: f64,
        recorded_at: DateTime<Utc>,
        regime: RegimeLabel,
        checkpoint: Checkpoint,
    ) -> Self {
        Self {
            agent: agent.into(),
            context,
            predicted,
            actual,
            accuracy: accuracy_from_error(predicted, actual),
            recorded_at,
            regime,
            checkpoint,
        }
    }

    /// Build a record with an externally scored accuracy.
    pub fn with_accuracy(
        agent: impl Into<AgentId>,
        context: ContextVector,
        accuracy: f64,
        recorded_at: DateTime<Utc>,
        regime: RegimeLabel,
    ) -> Self {
        Self {
            agent: agent.into(),
            context,
            predicted: 0.0,
            actual: 0.0,
            accuracy: sanitize_accuracy(accuracy),
            recorded_at,
            regime,
            checkpoint: default_checkpoint(),
        }
    }
}

/// `1 - relative error`, clamped to [0, 1].
pub fn accuracy_from_error(predicted: f64, actual: f64) -> f64 {
    let error = (predicted - actual).abs();
    let scale = actual.abs().max(f64::EPSILON);
    sanitize_accuracy(1.0 - error / scale)
}

pub(crate) fn sanitize_accuracy(accuracy: f64) -> f64 {
    if accuracy.is_finite() {
        accuracy.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Why a human overrode an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideReason {
    /// Human judged the risk differently.
    RiskAppetite,
    /// Inputs the agent used were wrong or stale.
    DataQuality,
    /// Qualitative judgement the agent cannot see.
    Judgement,
    /// Policy or compliance constraint.
    Compliance,
    /// Debate arbitration picked another position.
    DebateArbitration,
    Other(String),
}

impl std::fmt::Display for OverrideReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskAppetite => write!(f, "risk_appetite"),
            Self::DataQuality => write!(f, "data_quality"),
            Self::Judgement => write!(f, "judgement"),
            Self::Compliance => write!(f, "compliance"),
            Self::DebateArbitration => write!(f, "debate_arbitration"),
            Self::Other(reason) => write!(f, "other:{}", reason),
        }
    }
}

/// A human decision that differed from an agent's recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub agent: AgentId,
    pub context: ContextVector,
    pub agent_recommendation: String,
    pub human_decision: String,
    pub reason: OverrideReason,
    pub recorded_at: DateTime<Utc>,
}

/// A recommendation seen by the human gate (override-rate denominator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub agent: AgentId,
    pub context: ContextVector,
    pub recommendation_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_from_error() {
        assert!((accuracy_from_error(110.0, 100.0) - 0.9).abs() < 1e-12);
        assert_eq!(accuracy_from_error(100.0, 100.0), 1.0);
        assert_eq!(accuracy_from_error(500.0, 100.0), 0.0);
    }

    #[test]
    fn test_accuracy_zero_actual_is_finite() {
        let acc = accuracy_from_error(0.5, 0.0);
        assert!(acc.is_finite());
        assert_eq!(acc, 0.0);
    }

    #[test]
    fn test_sanitize_accuracy() {
        assert_eq!(sanitize_accuracy(1.7), 1.0);
        assert_eq!(sanitize_accuracy(-0.2), 0.0);
        assert_eq!(sanitize_accuracy(f64::NAN), 0.0);
    }

    #[test]
    fn test_agent_profile_specialization() {
        let agent = AgentProfile::new("valuation-agent", &["valuation", "Financial"]);
        assert!(agent.specializes_in("financial"));
        assert!(!agent.specializes_in("business"));
    }

    #[test]
    fn test_checkpoint_days() {
        assert_eq!(Checkpoint::Day30.days(), 30);
        assert_eq!(Checkpoint::Day365.days(), 365);
    }
}
