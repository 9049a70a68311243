//! Event bus for arbitration observers
//!
//! Tokio broadcast pub/sub plus a bounded in-memory history for audit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ArbitrationEvent;
use crate::debate::DebateId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Default number of events kept for audit queries
const DEFAULT_HISTORY: usize = 1024;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<broadcast::error::RecvError> for EventBusError {
    fn from(e: broadcast::error::RecvError) -> Self {
        match e {
            broadcast::error::RecvError::Lagged(n) => Self::Lagged(n),
            broadcast::error::RecvError::Closed => Self::ChannelClosed,
        }
    }
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus with a bounded audit history
pub struct EventBus {
    sender: broadcast::Sender<ArbitrationEvent>,
    history: Mutex<VecDeque<ArbitrationEvent>>,
    history_limit: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Create an event bus keeping the last `limit` events
    pub fn with_history(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(limit.min(DEFAULT_HISTORY))),
            history_limit: limit,
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns the receiver count;
    /// having no receivers is fine.
    pub fn publish(&self, event: ArbitrationEvent) -> usize {
        let event_type = event.event_type();

        if self.history_limit > 0 {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ArbitrationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ArbitrationEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Subscribe to the events `filter` accepts
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Retained events accepted by `filter`, oldest first
    pub fn history_matching(&self, filter: &EventFilter) -> Vec<ArbitrationEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().filter(|e| filter.matches(e)).cloned().collect()
    }

    /// Every retained event for one debate, oldest first
    pub fn history_for(&self, debate_id: &str) -> Vec<ArbitrationEvent> {
        self.history_matching(&EventFilter::new().debate(debate_id))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects events by debate and by event type.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub debate_id: Option<DebateId>,
    /// Names as returned by [`ArbitrationEvent::event_type`].
    pub event_types: Option<Vec<&'static str>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events that need a person: escalations and provisional reviews.
    pub fn alerts() -> Self {
        Self::new().types(&["escalated_to_human", "provisional_review_queued"])
    }

    pub fn debate(mut self, debate_id: &str) -> Self {
        self.debate_id = Some(debate_id.to_string());
        self
    }

    pub fn types(mut self, event_types: &[&'static str]) -> Self {
        self.event_types = Some(event_types.to_vec());
        self
    }

    pub fn matches(&self, event: &ArbitrationEvent) -> bool {
        let debate_ok = self
            .debate_id
            .as_deref()
            .map_or(true, |id| event.debate_id() == Some(id));
        let type_ok = self
            .event_types
            .as_ref()
            .map_or(true, |types| types.contains(&event.event_type()));
        debate_ok && type_ok
    }
}

/// Receiver that skips events its filter rejects.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<ArbitrationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Next matching event. A lagged receiver reports the lag instead of
    /// silently skipping ahead.
    pub async fn recv(&mut self) -> EventBusResult<ArbitrationEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
