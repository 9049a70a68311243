//! Context vectors and match tiers.
//!
//! Every outcome, override and debate carries a six-dimension context. Two
//! contexts are compared dimension by dimension; the number of matching
//! dimensions selects a [`MatchTier`], which in turn selects how strongly a
//! record's own accuracy is trusted over the agent's domain-wide average.

use serde::{Deserialize, Serialize};

/// Number of dimensions in a [`ContextVector`].
pub const CONTEXT_DIMENSIONS: usize = 6;

/// The situation an agent's judgement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextVector {
    /// Industry sector (e.g. "semiconductors").
    pub sector: String,
    /// Metric being predicted (e.g. "revenue_growth", "price_target").
    pub metric_type: String,
    /// Prediction horizon (e.g. "12m").
    pub horizon: String,
    /// Company size bucket (e.g. "large_cap").
    pub company_size: String,
    /// Growth stage (e.g. "mature", "hyper_growth").
    pub growth_stage: String,
    /// Analysis domain of the agent (e.g. "valuation", "financial").
    pub domain: String,
}

impl ContextVector {
    pub fn new(
        sector: impl Into<String>,
        metric_type: impl Into<String>,
        horizon: impl Into<String>,
        company_size: impl Into<String>,
        growth_stage: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            sector: sector.into(),
            metric_type: metric_type.into(),
            horizon: horizon.into(),
            company_size: company_size.into(),
            growth_stage: growth_stage.into(),
            domain: domain.into(),
        }
    }

    fn dimensions(&self) -> [&str; CONTEXT_DIMENSIONS] {
        [
            &self.sector,
            &self.metric_type,
            &self.horizon,
            &self.company_size,
            &self.growth_stage,
            &self.domain,
        ]
    }

    /// Count of dimensions equal between the two contexts.
    pub fn matching_dimensions(&self, other: &ContextVector) -> usize {
        self.dimensions()
            .iter()
            .zip(other.dimensions().iter())
            .filter(|(a, b)| a.eq_ignore_ascii_case(b))
            .count()
    }

    /// Match tier of `other` relative to this context.
    pub fn match_tier(&self, other: &ContextVector) -> MatchTier {
        MatchTier::from_matches(self.matching_dimensions(other))
    }

    /// Compact `sector/metric/horizon` label for logs.
    pub fn short_label(&self) -> String {
        format!("{}/{}/{}", self.sector, self.metric_type, self.horizon)
    }
}

impl std::fmt::Display for ContextVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.sector,
            self.metric_type,
            self.horizon,
            self.company_size,
            self.growth_stage,
            self.domain
        )
    }
}

/// How closely a record's context matches the query context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// 0–1 dimensions match.
    None,
    /// 2–3 dimensions match.
    Weak,
    /// 4–5 dimensions match.
    Strong,
    /// All six dimensions match.
    Exact,
}

impl MatchTier {
    /// Tier for a count of matching dimensions.
    pub fn from_matches(matches: usize) -> Self {
        match matches {
            m if m >= CONTEXT_DIMENSIONS => Self::Exact,
            4 | 5 => Self::Strong,
            2 | 3 => Self::Weak,
            _ => Self::None,
        }
    }

    /// Blend weight of this tier under the given weights.
    pub fn blend_weight(self, weights: &TierWeights) -> f64 {
        match self {
            Self::Exact => weights.exact,
            Self::Strong => weights.strong,
            Self::Weak => weights.weak,
            Self::None => weights.none,
        }
    }

    /// Whether records of this tier count as context-matching.
    pub fn is_match(self) -> bool {
        self >= Self::Weak
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Weak => write!(f, "weak"),
            Self::Strong => write!(f, "strong"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

/// Blend weights per match tier, applied against the domain-wide average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub exact: f64,
    pub strong: f64,
    pub weak: f64,
    pub none: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            exact: 1.0,
            strong: 0.7,
            weak: 0.3,
            none: 0.0,
        }
    }
}
