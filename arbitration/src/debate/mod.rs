//! Debate resolution.
//!
//! A debate starts when agents disagree and always ends with a resolution in
//! bounded time. Each level hands over to the next on timeout or impasse:
//!
//! ```text
//! Opened ─► Negotiating ─(15m)─► Mediating ─(30m)─► auto-resolution check
//!               │                    │                 │            │
//!               └──── agreement ─────┴─► Resolved      │ decisive   │ not decisive
//!                                           │          ▼            ▼
//!                                           │    AutoResolved   HumanArbitration
//!                                           │          │        │          │
//!                                           │          │   decision   timeout / no reviewer
//!                                           ▼          ▼        ▼          ▼
//!                                        Finalized ◄──────── Resolved  ConservativeDefault
//!                                           ▲                              │
//!                                           └── review / checkpoint ◄─ Provisional
//! ```
//!
//! Debates are independent single-writer cells; every transition is a
//! compare-and-swap on the record version.

pub mod engine;
pub mod fallback;
pub mod precedent;
pub mod priority;
pub mod review_queue;
pub mod state;
pub mod timers;

pub use engine::{DebateConfig, DebateEngine, HumanDecision, ReviewDecision};
pub use fallback::{ConservativeDefault, DefaultDecision, DefaultStrategy};
pub use precedent::{Precedent, PrecedentLog};
pub use priority::{
    ArbitrationTimeouts, PriorityInputs, PriorityScorer, PriorityTier, PriorityWeights,
};
pub use review_queue::{ProvisionalReview, ProvisionalReviewQueue};
pub use state::{
    DebateId, DebatePhase, DebateRecord, DebateRequest, DebateTransition, Position,
    PositionScore, Resolution, ResolutionSource,
};
pub use timers::{EscalationTimers, TimerCallback};

use thiserror::Error;

/// Errors from debate operations.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("Debate not found: {0}")]
    NotFound(DebateId),

    #[error("A debate needs at least two positions, got {0}")]
    TooFewPositions(usize),

    #[error("Position {index} out of range ({count} positions)")]
    InvalidPosition { index: usize, count: usize },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: DebatePhase, to: DebatePhase },

    #[error("Cannot {operation} while {phase}")]
    InvalidPhase {
        phase: DebatePhase,
        operation: &'static str,
    },

    #[error("Stale transition: expected version {expected}, found {actual}")]
    StaleTransition { expected: u64, actual: u64 },

    #[error("Debate {0} is archived")]
    Archived(DebateId),

    #[error("Debate {0} was already overridden")]
    AlreadyOverridden(DebateId),

    #[error("Resolutions from {0} cannot be overridden")]
    NotOverridable(ResolutionSource),

    #[error("Gave up on debate {id} after {attempts} attempts")]
    RetriesExhausted { id: DebateId, attempts: u32 },

    #[error("No tokio runtime to run escalation timers on")]
    NoRuntime,
}

pub type DebateResult<T> = Result<T, DebateError>;
