//! Log of finalized debates, consulted by the auto-resolution check.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DebateId, ResolutionSource};
use crate::credibility::{ContextVector, MatchTier};

/// A finalized debate remembered for similarity lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precedent {
    pub debate_id: DebateId,
    pub context: ContextVector,
    pub source: ResolutionSource,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only precedent history.
#[derive(Debug)]
pub struct PrecedentLog {
    entries: RwLock<Vec<Precedent>>,
    min_tier: MatchTier,
}

impl Default for PrecedentLog {
    fn default() -> Self {
        Self::new(MatchTier::Strong)
    }
}

impl PrecedentLog {
    /// Precedents count as similar at `min_tier` context match or better.
    pub fn new(min_tier: MatchTier) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            min_tier,
        }
    }

    pub fn record(&self, precedent: Precedent) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(precedent);
    }

    /// Load historical precedents.
    pub fn seed(&self, precedents: impl IntoIterator<Item = Precedent>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(precedents);
    }

    /// Number of precedents whose context is similar to `context`.
    pub fn count_similar(&self, context: &ContextVector) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| context.match_tier(&p.context) >= self.min_tier)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
