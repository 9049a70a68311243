//! Agent credibility scoring.
//!
//! Answers "how much should this agent's opinion be trusted right now, in
//! this context?" from the append-only outcome and override ledger.
//!
//! # Pipeline
//!
//! ```text
//! CredibilityStore ──snapshot──► CredibilityAggregator
//!                                   ├─ context match tiers (context.rs)
//!                                   ├─ temporal decay     (decay.rs)
//!                                   ├─ regime blend       (regime snapshot)
//!                                   ├─ trend fit          (trend.rs)
//!                                   ├─ override penalty   (overrides.rs)
//!                                   └─ Wilson interval    (interval.rs)
//!                                          │
//!                    CredibilityService ◄──┘  (cache + latency budget)
//! ```

pub mod aggregator;
pub mod cache;
pub mod context;
pub mod decay;
pub mod interval;
pub mod overrides;
pub mod records;
pub mod service;
pub mod store;
pub mod trend;

pub use aggregator::{
    BaseOutcome, CredibilityAggregator, CredibilityConfig, CredibilityQuery, CredibilityScore,
    RegimeOutcome, ScoreBreakdown,
};
pub use cache::{CacheLookup, ScoreCache, ScoreKey};
pub use context::{ContextVector, MatchTier, TierWeights, CONTEXT_DIMENSIONS};
pub use decay::DecayCalculator;
pub use interval::{ConfidenceInterval, Z_95};
pub use overrides::{OverrideConfig, OverrideOutcome, OverrideScope, OverrideTracker};
pub use records::{
    accuracy_from_error, AgentId, AgentProfile, Checkpoint, OutcomeRecord, OverrideReason,
    OverrideRecord, RecommendationRecord,
};
pub use service::{CredibilityService, SharedCredibilityService};
pub use store::{CredibilityStore, LedgerImport, LedgerSnapshot, SharedCredibilityStore};
pub use trend::{LinearFit, TrendAnalyzer, TrendConfig, TrendOutcome};
