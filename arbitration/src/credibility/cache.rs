//! Score cache keyed by (agent, context, regime).
//!
//! An entry remembers the ledger generation it was computed from. It is
//! fresh while the agent's generation is unchanged; a stale entry is kept
//! around so it can be served when a recomputation overruns its budget.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::aggregator::CredibilityScore;
use super::context::ContextVector;
use super::records::AgentId;
use crate::regime::{RegimeLabel, RegimeSnapshot};

/// Cache key for a score.
///
/// The regime part covers everything the aggregator reads from a snapshot,
/// so two snapshots sharing a version but not a label never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    pub agent: AgentId,
    pub context: ContextVector,
    pub regime_version: u64,
    pub regime_label: RegimeLabel,
    /// False when the regime weight is scaled down (unclassified or expired).
    pub full_weight: bool,
}

impl ScoreKey {
    pub fn new(
        agent: &str,
        context: &ContextVector,
        regime: &RegimeSnapshot,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent: agent.to_string(),
            context: context.clone(),
            regime_version: regime.version,
            regime_label: regime.label,
            full_weight: regime.classified && !regime.is_expired(at),
        }
    }
}

/// Cache lookup result.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Computed at the agent's current generation.
    Fresh(CredibilityScore),
    /// Computed at an older generation.
    Stale(CredibilityScore),
    Miss,
}

/// In-memory score cache.
#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: RwLock<HashMap<ScoreKey, CredibilityScore>>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, comparing against the agent's current generation.
    pub fn lookup(&self, key: &ScoreKey, generation: u64) -> CacheLookup {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(score) if score.generation == generation => CacheLookup::Fresh(score.clone()),
            Some(score) => CacheLookup::Stale(score.clone()),
            None => CacheLookup::Miss,
        }
    }

    /// Store a score. An entry from a newer generation is never replaced by
    /// an older one, so a slow background computation cannot clobber a
    /// fresher result.
    pub fn insert(&self, key: ScoreKey, score: CredibilityScore) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(existing) if existing.generation > score.generation => {}
            _ => {
                entries.insert(key, score);
            }
        }
    }

    /// Drop every entry for an agent.
    pub fn invalidate_agent(&self, agent: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| key.agent != agent);
        before - entries.len()
    }

    /// Drop entries computed under an older regime.
    pub fn retain_regime(&self, regime_version: u64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|key, _| key.regime_version >= regime_version);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
