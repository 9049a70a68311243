//! Conservative default applied when human arbitration times out or no
//! reviewer is available.

use serde::{Deserialize, Serialize};

use super::priority::PriorityTier;
use super::state::Position;

/// How the default position was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultStrategy {
    /// High stakes: least downside wins.
    LowestDownside,
    /// Credibility spread is meaningful: most credible agent wins.
    HighestCredibility,
    /// Credibility-weighted mean of the numeric positions.
    BlendedMiddle,
}

impl std::fmt::Display for DefaultStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowestDownside => write!(f, "lowest_downside"),
            Self::HighestCredibility => write!(f, "highest_credibility"),
            Self::BlendedMiddle => write!(f, "blended_middle"),
        }
    }
}

/// Outcome of the default heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultDecision {
    pub strategy: DefaultStrategy,
    /// Chosen position; `None` for a blend.
    pub position: Option<usize>,
    pub recommendation: String,
    pub value: Option<f64>,
    pub confidence: f64,
    pub rationale: String,
}

/// Picks a non-blocking default among positions.
#[derive(Debug, Clone)]
pub struct ConservativeDefault {
    /// Minimum credibility gap between the top two agents before the most
    /// credible one is trusted outright.
    min_credibility_spread: f64,
}

impl Default for ConservativeDefault {
    fn default() -> Self {
        Self::new(0.05)
    }
}

fn lowest_downside(positions: &[Position]) -> Option<usize> {
    positions
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| {
            a.downside_risk
                .total_cmp(&b.downside_risk)
                .then(ia.cmp(ib))
        })
        .map(|(i, _)| i)
}

impl ConservativeDefault {
    pub fn new(min_credibility_spread: f64) -> Self {
        Self {
            min_credibility_spread,
        }
    }

    /// Choose a default. `credibility[i]` is the score of position `i`'s
    /// agent; missing entries count as zero.
    pub fn decide(
        &self,
        positions: &[Position],
        credibility: &[f64],
        high_stakes: bool,
        priority: PriorityTier,
    ) -> Option<DefaultDecision> {
        let cred = |i: usize| credibility.get(i).copied().unwrap_or(0.0);

        if high_stakes || priority.is_high_stakes() {
            let index = lowest_downside(positions)?;
            return Some(self.pick(
                positions,
                index,
                cred(index),
                DefaultStrategy::LowestDownside,
                format!(
                    "high stakes ({} priority): lowest downside risk {:.2}",
                    priority, positions[index].downside_risk
                ),
            ));
        }

        let mut ranked: Vec<usize> = (0..positions.len()).collect();
        ranked.sort_by(|a, b| cred(*b).total_cmp(&cred(*a)).then(a.cmp(b)));
        let top = *ranked.first()?;
        let spread = ranked.get(1).map_or(1.0, |second| cred(top) - cred(*second));

        if spread >= self.min_credibility_spread {
            return Some(self.pick(
                positions,
                top,
                cred(top),
                DefaultStrategy::HighestCredibility,
                format!("credibility lead of {:.3}", spread),
            ));
        }

        let numeric: Vec<(f64, f64)> = positions
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.value.map(|v| (v, cred(i).max(0.0))))
            .collect();
        if numeric.len() >= 2 {
            let total: f64 = numeric.iter().map(|(_, w)| w).sum();
            let (value, confidence) = if total > f64::EPSILON {
                (
                    numeric.iter().map(|(v, w)| v * w).sum::<f64>() / total,
                    total / numeric.len() as f64,
                )
            } else {
                (
                    numeric.iter().map(|(v, _)| v).sum::<f64>() / numeric.len() as f64,
                    0.0,
                )
            };
            return Some(DefaultDecision {
                strategy: DefaultStrategy::BlendedMiddle,
                position: None,
                recommendation: format!("blended {:.4}", value),
                value: Some(value),
                confidence,
                rationale: format!(
                    "credibility spread {:.3} too small, blended {} numeric positions",
                    spread,
                    numeric.len()
                ),
            });
        }

        // Nothing numeric to blend: take the safest position.
        let index = lowest_downside(positions)?;
        Some(self.pick(
            positions,
            index,
            cred(index),
            DefaultStrategy::LowestDownside,
            format!(
                "credibility spread {:.3} too small and no numeric positions",
                spread
            ),
        ))
    }

    fn pick(
        &self,
        positions: &[Position],
        index: usize,
        confidence: f64,
        strategy: DefaultStrategy,
        rationale: String,
    ) -> DefaultDecision {
        let position = &positions[index];
        DefaultDecision {
            strategy,
            position: Some(index),
            recommendation: position.recommendation.clone(),
            value: position.value,
            confidence,
            rationale,
        }
    }
}
