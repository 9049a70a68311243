//! Append-only credibility ledger.
//!
//! Records are wrapped in `Arc` on insertion and never touched again. Each
//! agent has its own ledger with a generation counter that increases on
//! every append; the score cache compares generations to decide whether a
//! cached score is still valid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::records::{
    sanitize_accuracy, AgentId, OutcomeRecord, OverrideRecord, RecommendationRecord,
};

/// Shared reference to CredibilityStore
pub type SharedCredibilityStore = Arc<CredibilityStore>;

#[derive(Default)]
struct AgentLedger {
    outcomes: RwLock<Vec<Arc<OutcomeRecord>>>,
    overrides: RwLock<Vec<Arc<OverrideRecord>>>,
    recommendations: RwLock<Vec<Arc<RecommendationRecord>>>,
    generation: AtomicU64,
}

impl AgentLedger {
    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Point-in-time view of one agent's ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub outcomes: Vec<Arc<OutcomeRecord>>,
    pub overrides: Vec<Arc<OverrideRecord>>,
    pub recommendations: Vec<Arc<RecommendationRecord>>,
    pub generation: u64,
}

/// Bulk import format for seeding a store from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerImport {
    pub outcomes: Vec<OutcomeRecord>,
    pub overrides: Vec<OverrideRecord>,
    pub recommendations: Vec<RecommendationRecord>,
}

/// Append-only store of outcome, override and recommendation records.
#[derive(Default)]
pub struct CredibilityStore {
    ledgers: RwLock<HashMap<AgentId, Arc<AgentLedger>>>,
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    // Ledgers are append-only, so a poisoned lock still guards valid data.
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl CredibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedCredibilityStore {
        Arc::new(self)
    }

    fn ledger(&self, agent: &str) -> Arc<AgentLedger> {
        if let Some(ledger) = read(&self.ledgers).get(agent) {
            return ledger.clone();
        }
        write(&self.ledgers)
            .entry(agent.to_string())
            .or_default()
            .clone()
    }

    /// Append an outcome record. Returns the agent's new generation.
    pub fn append_outcome(&self, mut record: OutcomeRecord) -> u64 {
        record.accuracy = sanitize_accuracy(record.accuracy);
        let ledger = self.ledger(&record.agent);
        debug!(agent = %record.agent, accuracy = record.accuracy, "Outcome appended");
        write(&ledger.outcomes).push(Arc::new(record));
        ledger.bump()
    }

    /// Append an override record. Returns the agent's new generation.
    pub fn append_override(&self, record: OverrideRecord) -> u64 {
        let ledger = self.ledger(&record.agent);
        debug!(agent = %record.agent, reason = %record.reason, "Override appended");
        write(&ledger.overrides).push(Arc::new(record));
        ledger.bump()
    }

    /// Append a recommendation record. Returns the agent's new generation.
    pub fn append_recommendation(&self, record: RecommendationRecord) -> u64 {
        let ledger = self.ledger(&record.agent);
        write(&ledger.recommendations).push(Arc::new(record));
        ledger.bump()
    }

    /// Append every record of a bulk import.
    pub fn import(&self, import: LedgerImport) -> usize {
        let count = import.outcomes.len() + import.overrides.len() + import.recommendations.len();
        for outcome in import.outcomes {
            self.append_outcome(outcome);
        }
        for record in import.overrides {
            self.append_override(record);
        }
        for record in import.recommendations {
            self.append_recommendation(record);
        }
        count
    }

    /// Current generation of an agent's ledger (0 if it has none).
    pub fn generation(&self, agent: &str) -> u64 {
        read(&self.ledgers)
            .get(agent)
            .map(|l| l.generation.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Snapshot one agent's ledger.
    pub fn snapshot(&self, agent: &str) -> LedgerSnapshot {
        let Some(ledger) = read(&self.ledgers).get(agent).cloned() else {
            return LedgerSnapshot::default();
        };
        // Read the generation first: a concurrent append may land in the
        // vectors, which only makes the snapshot newer than its generation.
        let generation = ledger.generation.load(Ordering::Acquire);
        let snapshot = LedgerSnapshot {
            outcomes: read(&ledger.outcomes).clone(),
            overrides: read(&ledger.overrides).clone(),
            recommendations: read(&ledger.recommendations).clone(),
            generation,
        };
        snapshot
    }

    /// Agents that have at least one record.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = read(&self.ledgers).keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn outcome_count(&self, agent: &str) -> usize {
        read(&self.ledgers)
            .get(agent)
            .map(|l| read(&l.outcomes).len())
            .unwrap_or(0)
    }
}
