//! Override-rate tracking and penalty selection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ContextVector, MatchTier};
use super::records::{OverrideRecord, RecommendationRecord};

/// Override tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideConfig {
    /// Trailing window for the override rate.
    pub lookback_days: i64,
    /// Same-context samples needed before the context rate is used.
    pub min_context_samples: usize,
    /// Rates at or below this carry no penalty.
    pub mild_threshold: f64,
    /// Rates above `mild_threshold` and at or below this get `mild_penalty`.
    pub severe_threshold: f64,
    pub mild_penalty: f64,
    pub severe_penalty: f64,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            min_context_samples: 10,
            mild_threshold: 0.20,
            severe_threshold: 0.40,
            mild_penalty: 0.85,
            severe_penalty: 0.70,
        }
    }
}

/// Which population the override rate was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideScope {
    /// Same-context recommendations (strong match or better).
    Context,
    /// Every recommendation by the agent in the window.
    Overall,
    /// Too few recommendations anywhere; rate is indicative only.
    Sparse,
}

/// Result of the override stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideOutcome {
    pub rate: f64,
    pub factor: f64,
    pub overrides: usize,
    pub recommendations: usize,
    pub scope: OverrideScope,
}

impl OverrideOutcome {
    /// Whether this stage ran on enough data to count toward the interval.
    pub fn contributed(&self) -> bool {
        self.scope != OverrideScope::Sparse
    }
}

/// Computes trailing override rates.
#[derive(Debug, Clone, Default)]
pub struct OverrideTracker {
    config: OverrideConfig,
}

impl OverrideTracker {
    pub fn new(config: OverrideConfig) -> Self {
        Self { config }
    }

    /// Penalty multiplier for an override rate.
    pub fn penalty_for_rate(&self, rate: f64) -> f64 {
        let c = &self.config;
        if rate <= c.mild_threshold {
            1.0
        } else if rate <= c.severe_threshold {
            c.mild_penalty
        } else {
            c.severe_penalty
        }
    }

    /// Override outcome for an agent in `context` as of `as_of`.
    pub fn evaluate(
        &self,
        overrides: &[&OverrideRecord],
        recommendations: &[&RecommendationRecord],
        context: &ContextVector,
        as_of: DateTime<Utc>,
    ) -> OverrideOutcome {
        let since = as_of - Duration::days(self.config.lookback_days);
        let in_window = |at: DateTime<Utc>| at >= since && at <= as_of;
        let same_context = |other: &ContextVector| context.match_tier(other) >= MatchTier::Strong;

        let recent_overrides: Vec<&&OverrideRecord> = overrides
            .iter()
            .filter(|o| in_window(o.recorded_at))
            .collect();
        let recent_recommendations: Vec<&&RecommendationRecord> = recommendations
            .iter()
            .filter(|r| in_window(r.recorded_at))
            .collect();

        let context_recs = recent_recommendations
            .iter()
            .filter(|r| same_context(&r.context))
            .count();
        let context_overrides = recent_overrides
            .iter()
            .filter(|o| same_context(&o.context))
            .count();

        let total_recs = recent_recommendations.len();
        let total_overrides = recent_overrides.len();

        let (overrides, recommendations, scope) = if context_recs >= self.config.min_context_samples
        {
            (context_overrides, context_recs, OverrideScope::Context)
        } else if total_recs >= self.config.min_context_samples {
            (total_overrides, total_recs, OverrideScope::Overall)
        } else {
            (total_overrides, total_recs, OverrideScope::Sparse)
        };

        let rate = if recommendations == 0 {
            0.0
        } else {
            // Overrides can outnumber recorded recommendations when the
            // human gate skipped logging; cap the rate at 1.
            (overrides as f64 / recommendations as f64).min(1.0)
        };

        OverrideOutcome {
            rate,
            factor: self.penalty_for_rate(rate),
            overrides,
            recommendations,
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credibility::records::OverrideReason;

    fn ctx() -> ContextVector {
        ContextVector::new("retail", "margin", "12m", "mid_cap", "mature", "business")
    }

    fn other_ctx() -> ContextVector {
        ContextVector::new("biotech", "pipeline", "36m", "small_cap", "early", "valuation")
    }

    fn recs(n: usize, context: ContextVector, at: DateTime<Utc>) -> Vec<RecommendationRecord> {
        (0..n)
            .map(|i| RecommendationRecord {
                agent: "agent".to_string(),
                context: context.clone(),
                recommendation_id: format!("r-{}", i),
                recorded_at: at,
            })
            .collect()
    }

    fn overrides(n: usize, context: ContextVector, at: DateTime<Utc>) -> Vec<OverrideRecord> {
        (0..n)
            .map(|_| OverrideRecord {
                agent: "agent".to_string(),
                context: context.clone(),
                agent_recommendation: "buy".to_string(),
                human_decision: "hold".to_string(),
                reason: OverrideReason::Judgement,
                recorded_at: at,
            })
            .collect()
    }

    #[test]
    fn test_penalty_bands() {
        let tracker = OverrideTracker::default();
        assert_eq!(tracker.penalty_for_rate(0.0), 1.0);
        assert_eq!(tracker.penalty_for_rate(0.20), 1.0);
        assert_eq!(tracker.penalty_for_rate(0.21), 0.85);
        assert_eq!(tracker.penalty_for_rate(0.40), 0.85);
        assert_eq!(tracker.penalty_for_rate(0.45), 0.70);
        assert_eq!(tracker.penalty_for_rate(0.90), 0.70);
    }

    #[test]
    fn test_forty_five_percent_rate_is_severe() {
        let tracker = OverrideTracker::default();
        let now = Utc::now();
        let r = recs(20, ctx(), now - Duration::days(10));
        let o = overrides(9, ctx(), now - Duration::days(5));
        let r_refs: Vec<&RecommendationRecord> = r.iter().collect();
        let o_refs: Vec<&OverrideRecord> = o.iter().collect();

        let outcome = tracker.evaluate(&o_refs, &r_refs, &ctx(), now);
        assert_eq!(outcome.scope, OverrideScope::Context);
        assert!((outcome.rate - 0.45).abs() < 1e-12);
        assert_eq!(outcome.factor, 0.70);
    }

    #[test]
    fn test_falls_back_to_overall_rate() {
        let tracker = OverrideTracker::default();
        let now = Utc::now();
        let mut r = recs(4, ctx(), now);
        r.extend(recs(16, other_ctx(), now));
        let mut o = overrides(1, ctx(), now);
        o.extend(overrides(5, other_ctx(), now));
        let r_refs: Vec<&RecommendationRecord> = r.iter().collect();
        let o_refs: Vec<&OverrideRecord> = o.iter().collect();

        let outcome = tracker.evaluate(&o_refs, &r_refs, &ctx(), now);
        assert_eq!(outcome.scope, OverrideScope::Overall);
        assert_eq!(outcome.recommendations, 20);
        assert!((outcome.rate - 0.30).abs() < 1e-12);
        assert_eq!(outcome.factor, 0.85);
    }

    #[test]
    fn test_old_records_outside_window() {
        let tracker = OverrideTracker::default();
        let now = Utc::now();
        let r = recs(20, ctx(), now - Duration::days(30));
        let o = overrides(15, ctx(), now - Duration::days(400));
        let r_refs: Vec<&RecommendationRecord> = r.iter().collect();
        let o_refs: Vec<&OverrideRecord> = o.iter().collect();

        let outcome = tracker.evaluate(&o_refs, &r_refs, &ctx(), now);
        assert_eq!(outcome.overrides, 0);
        assert_eq!(outcome.factor, 1.0);
    }

    #[test]
    fn test_sparse_data_does_not_contribute() {
        let tracker = OverrideTracker::default();
        let now = Utc::now();
        let r = recs(3, ctx(), now);
        let r_refs: Vec<&RecommendationRecord> = r.iter().collect();
        let outcome = tracker.evaluate(&[], &r_refs, &ctx(), now);
        assert_eq!(outcome.scope, OverrideScope::Sparse);
        assert!(!outcome.contributed());
        assert_eq!(outcome.factor, 1.0);
    }
}
