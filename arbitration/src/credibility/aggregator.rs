//! Credibility aggregation.
//!
//! Combines the sub-calculators into one score per (agent, context, regime):
//!
//! ```text
//! base accuracy (context-blended, decayed)
//!     × regime factor
//!     × trend factor
//!     × override penalty
//!     = score, clamped to [0, 1]
//! ```
//!
//! The confidence interval is a Wilson interval at the smallest sample size
//! among the stages that ran on real data. Sparse data never errors: stages
//! fall back, and when every stage fell back the interval is widened and the
//! score is flagged `low_confidence`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::{ContextVector, MatchTier, TierWeights};
use super::decay::DecayCalculator;
use super::interval::ConfidenceInterval;
use super::overrides::{OverrideConfig, OverrideOutcome, OverrideTracker};
use super::records::{AgentId, OutcomeRecord, OverrideRecord, RecommendationRecord};
use super::store::{CredibilityStore, LedgerSnapshot};
use super::trend::{TrendAnalyzer, TrendConfig, TrendOutcome};
use crate::regime::{RegimeLabel, RegimeSnapshot};

/// Credibility scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    /// Decay half-life used when a domain has no override.
    pub default_half_life_years: f64,
    /// Per-analysis-domain half-lives.
    pub domain_half_lives: HashMap<String, f64>,
    pub tier_weights: TierWeights,
    /// Context-matching records needed before the base stops falling back
    /// to the domain-wide average.
    pub min_context_records: usize,
    /// Records in the current regime needed for the strong regime blend.
    pub min_regime_records: usize,
    /// Regime weight with enough regime records.
    pub regime_weight: f64,
    /// Regime weight with too few regime records.
    pub sparse_regime_weight: f64,
    /// Scale on the regime weight when the regime is unclassified or expired.
    pub unclassified_regime_scale: f64,
    /// Interval widening when every stage fell back.
    pub fallback_widening: f64,
    /// Base accuracy for an agent with no outcomes at all.
    pub neutral_prior: f64,
    /// Latency budget for a score request before a stale value is served.
    pub score_budget_ms: u64,
    pub trend: TrendConfig,
    pub overrides: OverrideConfig,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            default_half_life_years: 2.0,
            domain_half_lives: HashMap::new(),
            tier_weights: TierWeights::default(),
            min_context_records: 10,
            min_regime_records: 50,
            regime_weight: 0.7,
            sparse_regime_weight: 0.3,
            unclassified_regime_scale: 0.5,
            fallback_widening: 1.5,
            neutral_prior: 0.5,
            score_budget_ms: 200,
            trend: TrendConfig::default(),
            overrides: OverrideConfig::default(),
        }
    }
}

/// One score request. The regime snapshot and scoring time are explicit so
/// the same query always yields the same score.
#[derive(Debug, Clone)]
pub struct CredibilityQuery {
    pub agent: AgentId,
    pub context: ContextVector,
    pub regime: Arc<RegimeSnapshot>,
    pub as_of: DateTime<Utc>,
}

impl CredibilityQuery {
    pub fn new(
        agent: impl Into<AgentId>,
        context: ContextVector,
        regime: Arc<RegimeSnapshot>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            agent: agent.into(),
            context,
            regime,
            as_of,
        }
    }
}

/// Base-accuracy stage result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseOutcome {
    pub value: f64,
    /// Decay-weighted mean over all of the agent's outcomes.
    pub domain_average: Option<f64>,
    /// Records at weak match or better.
    pub matched_records: usize,
    pub exact_records: usize,
    pub total_records: usize,
    /// True when the value is the domain average (or the prior).
    pub fell_back: bool,
}

/// Regime stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeOutcome {
    pub label: RegimeLabel,
    pub version: u64,
    pub classified: bool,
    pub regime_records: usize,
    pub regime_accuracy: Option<f64>,
    pub overall_accuracy: f64,
    /// Effective weight of the regime-specific accuracy.
    pub weight: f64,
    pub factor: f64,
}

impl RegimeOutcome {
    fn contributed(&self, min_records: usize) -> bool {
        self.regime_records >= min_records
    }
}

/// Per-stage breakdown of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: BaseOutcome,
    pub regime: RegimeOutcome,
    pub trend: TrendOutcome,
    pub overrides: OverrideOutcome,
}

/// A credibility score with its interval and breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityScore {
    pub agent: AgentId,
    pub context: ContextVector,
    /// Score in [0, 1].
    pub value: f64,
    pub interval: ConfidenceInterval,
    pub breakdown: ScoreBreakdown,
    /// Every stage fell back; the interval was widened.
    pub low_confidence: bool,
    /// Served from cache after the latency budget ran out.
    #[serde(default)]
    pub stale: bool,
    pub regime_version: u64,
    /// Ledger generation the score was computed from.
    pub generation: u64,
    pub computed_at: DateTime<Utc>,
}

impl CredibilityScore {
    /// Interval half-width, used by debate thresholds.
    pub fn half_width(&self) -> f64 {
        self.interval.half_width()
    }

    pub fn sample_size(&self) -> usize {
        self.interval.sample_size
    }
}

/// Stateless scorer over ledger snapshots.
#[derive(Debug, Clone)]
pub struct CredibilityAggregator {
    config: CredibilityConfig,
    decay: DecayCalculator,
    trend: TrendAnalyzer,
    overrides: OverrideTracker,
}

impl Default for CredibilityAggregator {
    fn default() -> Self {
        Self::new(CredibilityConfig::default())
    }
}

fn weighted_mean(items: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, total) = items.fold((0.0, 0.0), |(sum, total), (value, weight)| {
        (sum + value * weight, total + weight)
    });
    (total > 0.0).then(|| sum / total)
}

impl CredibilityAggregator {
    pub fn new(config: CredibilityConfig) -> Self {
        let decay = DecayCalculator::new(
            config.default_half_life_years,
            config.domain_half_lives.clone(),
        );
        let trend = TrendAnalyzer::new(config.trend.clone());
        let overrides = OverrideTracker::new(config.overrides.clone());
        Self {
            config,
            decay,
            trend,
            overrides,
        }
    }

    pub fn config(&self) -> &CredibilityConfig {
        &self.config
    }

    /// Score straight from a store.
    pub fn score_from_store(
        &self,
        store: &CredibilityStore,
        query: &CredibilityQuery,
    ) -> CredibilityScore {
        self.score(&store.snapshot(&query.agent), query)
    }

    /// Score an agent from a snapshot of its ledger.
    pub fn score(&self, ledger: &LedgerSnapshot, query: &CredibilityQuery) -> CredibilityScore {
        let as_of = query.as_of;
        let outcomes: Vec<&OutcomeRecord> = ledger.outcomes.iter().map(Arc::as_ref).collect();
        let decay_weight =
            |r: &OutcomeRecord| self.decay.weight_at(r.recorded_at, as_of, &r.context.domain);

        let base = self.base_accuracy(&outcomes, &query.context, &decay_weight);
        let regime = self.regime_adjustment(&outcomes, &query.regime, &base, as_of, &decay_weight);

        let trend_records: Vec<&OutcomeRecord> = if base.fell_back {
            outcomes.clone()
        } else {
            outcomes
                .iter()
                .copied()
                .filter(|r| query.context.match_tier(&r.context).is_match())
                .collect()
        };
        let trend = self.trend.analyze_records(&trend_records, as_of);

        let override_refs: Vec<&OverrideRecord> =
            ledger.overrides.iter().map(Arc::as_ref).collect();
        let recommendation_refs: Vec<&RecommendationRecord> =
            ledger.recommendations.iter().map(Arc::as_ref).collect();
        let overrides = self.overrides.evaluate(
            &override_refs,
            &recommendation_refs,
            &query.context,
            as_of,
        );

        let raw = base.value * regime.factor * trend.factor * overrides.factor;
        let value = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let samples = [
            (!base.fell_back).then_some(base.matched_records),
            regime
                .contributed(self.config.min_regime_records)
                .then_some(regime.regime_records),
            trend.applied.then_some(trend.sample_size),
            overrides.contributed().then_some(overrides.recommendations),
        ];
        let (interval, low_confidence) = match samples.iter().flatten().min() {
            Some(&n) => (ConfidenceInterval::wilson_95(value, n), false),
            None => (
                ConfidenceInterval::wilson_95(value, outcomes.len())
                    .widened(self.config.fallback_widening),
                true,
            ),
        };

        debug!(
            agent = %query.agent,
            context = %query.context.short_label(),
            value,
            base = base.value,
            regime_factor = regime.factor,
            trend_factor = trend.factor,
            override_factor = overrides.factor,
            n = interval.sample_size,
            low_confidence,
            "Credibility scored"
        );

        CredibilityScore {
            agent: query.agent.clone(),
            context: query.context.clone(),
            value,
            interval,
            breakdown: ScoreBreakdown {
                base,
                regime,
                trend,
                overrides,
            },
            low_confidence,
            stale: false,
            regime_version: query.regime.version,
            generation: ledger.generation,
            computed_at: as_of,
        }
    }

    fn base_accuracy(
        &self,
        outcomes: &[&OutcomeRecord],
        context: &ContextVector,
        decay_weight: &impl Fn(&OutcomeRecord) -> f64,
    ) -> BaseOutcome {
        let domain_average = weighted_mean(
            outcomes
                .iter()
                .copied()
                .map(|r| (r.accuracy, decay_weight(r))),
        );
        let matched: Vec<(&OutcomeRecord, MatchTier)> = outcomes
            .iter()
            .map(|r| (*r, context.match_tier(&r.context)))
            .filter(|(_, tier)| tier.is_match())
            .collect();
        let exact_records = matched
            .iter()
            .filter(|(_, tier)| *tier == MatchTier::Exact)
            .count();

        let fallback = domain_average.unwrap_or(self.config.neutral_prior);
        let blended = if matched.len() >= self.config.min_context_records {
            weighted_mean(matched.iter().map(|&(r, tier)| {
                let w = tier.blend_weight(&self.config.tier_weights);
                (w * r.accuracy + (1.0 - w) * fallback, decay_weight(r))
            }))
        } else {
            None
        };

        BaseOutcome {
            value: blended.unwrap_or(fallback),
            domain_average,
            matched_records: matched.len(),
            exact_records,
            total_records: outcomes.len(),
            fell_back: blended.is_none(),
        }
    }

    fn regime_adjustment(
        &self,
        outcomes: &[&OutcomeRecord],
        regime: &RegimeSnapshot,
        base: &BaseOutcome,
        as_of: DateTime<Utc>,
        decay_weight: &impl Fn(&OutcomeRecord) -> f64,
    ) -> RegimeOutcome {
        let overall = base.domain_average.unwrap_or(self.config.neutral_prior);
        let in_regime: Vec<&OutcomeRecord> = outcomes
            .iter()
            .copied()
            .filter(|r| r.regime == regime.label)
            .collect();
        let regime_accuracy = weighted_mean(
            in_regime
                .iter()
                .copied()
                .map(|r| (r.accuracy, decay_weight(r))),
        );

        let weight = if in_regime.len() >= self.config.min_regime_records {
            self.config.regime_weight
        } else {
            self.config.sparse_regime_weight
        } * regime.weight_scale(as_of, self.config.unclassified_regime_scale);

        let factor = match regime_accuracy {
            Some(accuracy) if overall > f64::EPSILON => {
                (weight * accuracy + (1.0 - weight) * overall) / overall
            }
            _ => 1.0,
        };

        RegimeOutcome {
            label: regime.label,
            version: regime.version,
            classified: regime.classified,
            regime_records: in_regime.len(),
            regime_accuracy,
            overall_accuracy: overall,
            weight,
            factor,
        }
    }
}
