//! Arbitration events.
//!
//! Debate transitions, escalations, provisional reviews, rejected
//! transitions, impact reports and regime changes are broadcast on a tokio
//! channel so alerting and audit consumers can follow along without being in
//! the engine's call path.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ DebateEngine │────▶│  Event Bus   │────▶│  Subscribers │
//! │ RegimeReg.   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      bounded history
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus,
};
pub use types::ArbitrationEvent;
