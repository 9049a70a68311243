//! Debate priority scoring and arbitration timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::state::Position;

/// Urgency tier. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityTier {
    /// Tiers that count as high stakes for the conservative default.
    pub fn is_high_stakes(self) -> bool {
        self >= Self::High
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Raw priority signals, each normalized to [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityInputs {
    /// Downstream work is blocked on the outcome.
    pub blocking: bool,
    pub financial_impact: f64,
    pub time_sensitivity: f64,
    /// Derived from the positions when absent.
    pub disagreement: Option<f64>,
    /// Derived from stated confidences when absent.
    pub uncertainty: Option<f64>,
}

/// Weights of each signal in the priority score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub blocking: f64,
    pub financial_impact: f64,
    pub time_sensitivity: f64,
    pub disagreement: f64,
    pub uncertainty: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            blocking: 0.30,
            financial_impact: 0.25,
            time_sensitivity: 0.20,
            disagreement: 0.15,
            uncertainty: 0.10,
        }
    }
}

/// Human arbitration timeout per tier, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationTimeouts {
    pub critical_minutes: u64,
    pub high_minutes: u64,
    pub medium_minutes: u64,
    pub low_minutes: u64,
}

impl Default for ArbitrationTimeouts {
    fn default() -> Self {
        Self {
            critical_minutes: 120,
            high_minutes: 360,
            medium_minutes: 720,
            low_minutes: 1440,
        }
    }
}

impl ArbitrationTimeouts {
    pub fn for_tier(&self, tier: PriorityTier) -> Duration {
        let minutes = match tier {
            PriorityTier::Critical => self.critical_minutes,
            PriorityTier::High => self.high_minutes,
            PriorityTier::Medium => self.medium_minutes,
            PriorityTier::Low => self.low_minutes,
        };
        Duration::from_secs(minutes * 60)
    }
}

/// Spread of the positions' numeric values relative to their mean. Without
/// numbers, any differing recommendation counts as full disagreement.
pub fn disagreement_of(positions: &[Position]) -> f64 {
    let values: Vec<f64> = positions.iter().filter_map(|p| p.value).collect();
    if values.len() >= 2 {
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if mean.abs() > f64::EPSILON {
            return ((max - min) / mean.abs()).clamp(0.0, 1.0);
        }
        return if max > min { 1.0 } else { 0.0 };
    }
    let first = positions.first().map(|p| p.recommendation.as_str());
    if positions.iter().any(|p| Some(p.recommendation.as_str()) != first) {
        1.0
    } else {
        0.0
    }
}

/// `1 - mean stated confidence`.
pub fn uncertainty_of(positions: &[Position]) -> f64 {
    if positions.is_empty() {
        return 1.0;
    }
    let mean = positions
        .iter()
        .map(|p| p.confidence.clamp(0.0, 1.0))
        .sum::<f64>()
        / positions.len() as f64;
    1.0 - mean
}

/// Computes priority scores and tiers.
#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    weights: PriorityWeights,
}

impl PriorityScorer {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    /// Weighted score in [0, 1].
    pub fn score(&self, inputs: &PriorityInputs, positions: &[Position]) -> f64 {
        let w = &self.weights;
        let disagreement = inputs
            .disagreement
            .unwrap_or_else(|| disagreement_of(positions));
        let uncertainty = inputs
            .uncertainty
            .unwrap_or_else(|| uncertainty_of(positions));
        let total =
            w.blocking + w.financial_impact + w.time_sensitivity + w.disagreement + w.uncertainty;
        if total <= 0.0 {
            return 0.0;
        }
        let raw = w.blocking * if inputs.blocking { 1.0 } else { 0.0 }
            + w.financial_impact * inputs.financial_impact.clamp(0.0, 1.0)
            + w.time_sensitivity * inputs.time_sensitivity.clamp(0.0, 1.0)
            + w.disagreement * disagreement.clamp(0.0, 1.0)
            + w.uncertainty * uncertainty.clamp(0.0, 1.0);
        (raw / total).clamp(0.0, 1.0)
    }

    /// Bucket a score into a tier.
    pub fn tier_for(score: f64) -> PriorityTier {
        if score >= 0.75 {
            PriorityTier::Critical
        } else if score >= 0.5 {
            PriorityTier::High
        } else if score >= 0.25 {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    /// Score and tier; a hint can raise the tier but never lower it.
    pub fn assess(
        &self,
        inputs: &PriorityInputs,
        positions: &[Position],
        hint: Option<PriorityTier>,
    ) -> (PriorityTier, f64) {
        let score = self.score(inputs, positions);
        let computed = Self::tier_for(score);
        let tier = hint.map_or(computed, |h| h.max(computed));
        (tier, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions() -> Vec<Position> {
        vec![
            Position::new("a", "buy").with_value(100.0).with_confidence(0.8),
            Position::new("b", "sell").with_value(80.0).with_confidence(0.6),
        ]
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(PriorityScorer::tier_for(0.75), PriorityTier::Critical);
        assert_eq!(PriorityScorer::tier_for(0.74), PriorityTier::High);
        assert_eq!(PriorityScorer::tier_for(0.5), PriorityTier::High);
        assert_eq!(PriorityScorer::tier_for(0.25), PriorityTier::Medium);
        assert_eq!(PriorityScorer::tier_for(0.1), PriorityTier::Low);
    }

    #[test]
    fn test_everything_maxed_is_critical() {
        let inputs = PriorityInputs {
            blocking: true,
            financial_impact: 1.0,
            time_sensitivity: 1.0,
            disagreement: Some(1.0),
            uncertainty: Some(1.0),
        };
        let (tier, score) = PriorityScorer::default().assess(&inputs, &positions(), None);
        assert!((score - 1.0).abs() < 1e-12);
        assert_eq!(tier, PriorityTier::Critical);
    }

    #[test]
    fn test_hint_only_raises() {
        let scorer = PriorityScorer::default();
        let quiet = PriorityInputs {
            disagreement: Some(0.0),
            uncertainty: Some(0.0),
            ..PriorityInputs::default()
        };
        let (tier, _) = scorer.assess(&quiet, &positions(), Some(PriorityTier::High));
        assert_eq!(tier, PriorityTier::High);

        let loud = PriorityInputs {
            blocking: true,
            financial_impact: 1.0,
            time_sensitivity: 1.0,
            disagreement: Some(1.0),
            uncertainty: Some(1.0),
        };
        let (tier, _) = scorer.assess(&loud, &positions(), Some(PriorityTier::Low));
        assert_eq!(tier, PriorityTier::Critical);
    }

    #[test]
    fn test_derived_signals() {
        let p = positions();
        // (100 - 80) / 90
        assert!((disagreement_of(&p) - 20.0 / 90.0).abs() < 1e-12);
        assert!((uncertainty_of(&p) - 0.3).abs() < 1e-12);
        let same = vec![Position::new("a", "hold"), Position::new("b", "hold")];
        assert_eq!(disagreement_of(&same), 0.0);
    }

    #[test]
    fn test_timeouts_by_tier() {
        let timeouts = ArbitrationTimeouts::default();
        assert_eq!(
            timeouts.for_tier(PriorityTier::Critical),
            Duration::from_secs(2 * 3600)
        );
        assert_eq!(
            timeouts.for_tier(PriorityTier::Low),
            Duration::from_secs(24 * 3600)
        );
    }
}
