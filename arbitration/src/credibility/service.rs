//! Async credibility query API with caching and a latency budget.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::aggregator::{
    CredibilityAggregator, CredibilityConfig, CredibilityQuery, CredibilityScore,
};
use super::cache::{CacheLookup, ScoreCache, ScoreKey};
use super::context::ContextVector;
use super::store::SharedCredibilityStore;
use crate::regime::{RegimeSnapshot, SharedRegimeRegistry};

/// Shared reference to CredibilityService
pub type SharedCredibilityService = Arc<CredibilityService>;

/// Scores agents on demand.
///
/// A fresh cached score is returned directly. Otherwise the score is
/// recomputed on the blocking pool; if that overruns the budget and a stale
/// entry exists, the stale entry is returned (flagged `stale`) and the
/// computation finishes in the background to refresh the cache.
pub struct CredibilityService {
    store: SharedCredibilityStore,
    regimes: SharedRegimeRegistry,
    aggregator: Arc<CredibilityAggregator>,
    cache: Arc<ScoreCache>,
    budget: Duration,
}

impl CredibilityService {
    pub fn new(
        store: SharedCredibilityStore,
        regimes: SharedRegimeRegistry,
        config: CredibilityConfig,
    ) -> Self {
        let budget = Duration::from_millis(config.score_budget_ms);
        Self {
            store,
            regimes,
            aggregator: Arc::new(CredibilityAggregator::new(config)),
            cache: Arc::new(ScoreCache::new()),
            budget,
        }
    }

    pub fn shared(self) -> SharedCredibilityService {
        Arc::new(self)
    }

    pub fn store(&self) -> &SharedCredibilityStore {
        &self.store
    }

    pub fn regimes(&self) -> &SharedRegimeRegistry {
        &self.regimes
    }

    pub fn aggregator(&self) -> &CredibilityAggregator {
        &self.aggregator
    }

    /// Score under the current regime.
    pub async fn score(&self, agent: &str, context: &ContextVector) -> CredibilityScore {
        self.score_in_regime(agent, context, None).await
    }

    /// Score under an explicit regime, or the current one when `None`.
    pub async fn score_in_regime(
        &self,
        agent: &str,
        context: &ContextVector,
        regime: Option<Arc<RegimeSnapshot>>,
    ) -> CredibilityScore {
        let regime = regime.unwrap_or_else(|| self.regimes.current());
        let now = Utc::now();
        let key = ScoreKey::new(agent, context, &regime, now);
        let generation = self.store.generation(agent);

        let stale = match self.cache.lookup(&key, generation) {
            CacheLookup::Fresh(score) => return score,
            CacheLookup::Stale(score) => Some(score),
            CacheLookup::Miss => None,
        };

        let query = CredibilityQuery::new(agent, context.clone(), regime, now);
        let store = self.store.clone();
        let aggregator = self.aggregator.clone();
        let cache = self.cache.clone();
        let background_query = query.clone();
        let task = tokio::task::spawn_blocking(move || {
            let score = aggregator.score_from_store(&store, &background_query);
            cache.insert(key, score.clone());
            score
        });

        let result = match stale {
            Some(mut stale) => match tokio::time::timeout(self.budget, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        agent,
                        budget_ms = self.budget.as_millis() as u64,
                        "Score budget exceeded, serving stale score"
                    );
                    stale.stale = true;
                    return stale;
                }
            },
            None => task.await,
        };

        match result {
            Ok(score) => {
                debug!(agent, value = score.value, "Score recomputed");
                score
            }
            Err(e) => {
                warn!(agent, error = %e, "Background scoring failed, scoring inline");
                self.aggregator.score_from_store(&self.store, &query)
            }
        }
    }

    /// Score a fully specified query without touching the cache.
    pub fn score_at(&self, query: &CredibilityQuery) -> CredibilityScore {
        self.aggregator.score_from_store(&self.store, query)
    }

    /// Drop every cached score for an agent.
    pub fn invalidate_agent(&self, agent: &str) -> usize {
        self.cache.invalidate_agent(agent)
    }

    /// Drop cached scores from regimes older than the current one.
    pub fn prune_regimes(&self) {
        self.cache.retain_regime(self.regimes.current().version);
    }

    pub fn cached_scores(&self) -> usize {
        self.cache.len()
    }
}
