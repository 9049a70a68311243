//! Arbitration Library
//!
//! Decides whose opinion to trust when analysis agents disagree, and makes
//! sure every disagreement ends in bounded time.
//!
//! # Components
//!
//! ## Credibility
//! - `CredibilityStore`: append-only outcome, override and recommendation ledger
//! - `CredibilityAggregator`: context-matched, decayed, regime- and
//!   trend-adjusted score with a Wilson confidence interval
//! - `CredibilityService`: cached async facade with a latency budget
//!
//! ## Debate
//! - `DebateEngine`: negotiation → mediation → auto-resolution → human
//!   arbitration → conservative default, with escalation timers
//! - `WorkloadRouter`: least-loaded reviewer assignment with response ETAs
//!
//! ## Impact
//! - `ImpactCalculator`: propagates a changed assumption through the
//!   dependency graph and issues recompute tickets
//!
//! ## Regime
//! - `RegimeRegistry`: versioned market-regime snapshots
//!
//! # Usage
//!
//! ```bash
//! # Score an agent from a JSON ledger
//! arbiter score --ledger ledger.json --agent valuation-1 --context context.json
//!
//! # Classify regime indicators
//! arbiter classify --indicators indicators.json
//!
//! # Impact of a changed assumption
//! arbiter impact --graph graph.json --change change.json
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod credibility;
pub mod debate;
pub mod events;
pub mod impact;
pub mod regime;
pub mod router;
pub mod system;
pub mod telemetry;

pub use config::{ArbitrationConfig, ConfigError, ConfigResult};
pub use system::Arbitration;

// Re-export key credibility types
pub use credibility::{
    AgentId, ConfidenceInterval, ContextVector, CredibilityAggregator, CredibilityConfig,
    CredibilityQuery, CredibilityScore, CredibilityService, CredibilityStore, LedgerImport,
    MatchTier, OutcomeRecord, OverrideReason, OverrideRecord, RecommendationRecord,
    SharedCredibilityService, SharedCredibilityStore,
};

// Re-export key debate types
pub use debate::{
    DebateConfig, DebateEngine, DebateError, DebateId, DebatePhase, DebateRecord, DebateRequest,
    DebateResult, HumanDecision, Position, PriorityInputs, PriorityTier, Resolution,
    ResolutionSource, ReviewDecision,
};

// Re-export key event types
pub use events::{ArbitrationEvent, EventBus, SharedEventBus};

// Re-export impact types
pub use impact::{
    AssumptionChange, DependencyGraph, ImpactCalculator, ImpactConfig, ImpactError, ImpactReport,
    NodeKind, RecomputeTicket, Sensitivity, SharedImpactCalculator,
};

// Re-export regime types
pub use regime::{
    RegimeClassifier, RegimeConfig, RegimeIndicators, RegimeLabel, RegimeRegistry, RegimeSnapshot,
    SharedRegimeRegistry,
};

// Re-export router types
pub use router::{
    Assignment, Reviewer, RouterConfig, SharedWorkloadRouter, WorkingHours, WorkloadRouter,
};
