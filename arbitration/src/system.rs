//! Wires the components together from one [`ArbitrationConfig`].

use crate::config::ArbitrationConfig;
use crate::credibility::{
    CredibilityService, CredibilityStore, SharedCredibilityService, SharedCredibilityStore,
};
use crate::debate::DebateEngine;
use crate::events::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
use crate::impact::{DependencyGraph, ImpactCalculator, SharedImpactCalculator};
use crate::regime::{RegimeClassifier, RegimeRegistry, SharedRegimeRegistry};
use crate::router::{SharedWorkloadRouter, WorkloadRouter};

/// Every shared component, built over one event bus.
#[derive(Clone)]
pub struct Arbitration {
    pub events: SharedEventBus,
    pub store: SharedCredibilityStore,
    pub regimes: SharedRegimeRegistry,
    pub credibility: SharedCredibilityService,
    pub router: SharedWorkloadRouter,
    pub impact: SharedImpactCalculator,
    pub engine: DebateEngine,
}

impl Arbitration {
    /// Build with an empty dependency graph.
    pub fn new(config: ArbitrationConfig) -> Self {
        Self::with_graph(config, DependencyGraph::new())
    }

    pub fn with_graph(config: ArbitrationConfig, graph: DependencyGraph) -> Self {
        let ArbitrationConfig {
            credibility,
            debate,
            router,
            impact,
            regime,
        } = config;

        let events = EventBus::new().shared();
        let store = CredibilityStore::new().shared();
        let regimes = RegimeRegistry::new(RegimeClassifier::new(regime))
            .with_events(events.clone())
            .shared();
        let credibility =
            CredibilityService::new(store.clone(), regimes.clone(), credibility).shared();
        let router = WorkloadRouter::new(router).shared();
        let impact = ImpactCalculator::new(impact, graph)
            .with_events(events.clone())
            .shared();
        let engine = DebateEngine::new(
            debate,
            credibility.clone(),
            router.clone(),
            impact.clone(),
            events.clone(),
        );

        Self {
            events,
            store,
            regimes,
            credibility,
            router,
            impact,
            engine,
        }
    }

    /// Escalation and provisional-review alerts for whoever staffs the
    /// reviewer pool.
    pub fn alerts(&self) -> FilteredReceiver {
        self.events.subscribe_filtered(EventFilter::alerts())
    }
}
