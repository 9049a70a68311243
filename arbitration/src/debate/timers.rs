//! Cancellable escalation timers, one per debate.
//!
//! Each timer is an independent tokio task racing a sleep against its
//! cancellation token. Scheduling a new timer for a debate cancels the old
//! one. A timer that has already fired is not interrupted by cancellation,
//! so a firing callback may safely schedule the debate's next timer.
//!
//! Timers are spawned on the runtime current at scheduling time; outside a
//! runtime scheduling fails with [`DebateError::NoRuntime`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::state::{DebateId, DebatePhase};
use super::{DebateError, DebateResult};

/// Boxed callback run when a timer fires.
pub type TimerCallback = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct TimerEntry {
    phase: DebatePhase,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct EscalationTimers {
    timers: Mutex<HashMap<DebateId, TimerEntry>>,
}

impl EscalationTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `after` unless cancelled first. Replaces any
    /// timer already scheduled for the debate.
    pub fn schedule(
        &self,
        debate_id: &str,
        phase: DebatePhase,
        after: Duration,
        on_fire: TimerCallback,
    ) -> DebateResult<()> {
        let runtime = Handle::try_current().map_err(|_| DebateError::NoRuntime)?;
        let token = CancellationToken::new();
        let child = token.clone();
        let id = debate_id.to_string();
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {
                    debug!(debate_id = %id, phase = %phase, "Timer cancelled");
                }
                _ = tokio::time::sleep(after) => {
                    debug!(debate_id = %id, phase = %phase, "Timer fired");
                    on_fire.await;
                }
            }
        });

        let previous = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                debate_id.to_string(),
                TimerEntry {
                    phase,
                    token,
                    handle,
                },
            );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        Ok(())
    }

    /// Cancel the debate's timer. Returns whether one was pending.
    pub fn cancel(&self, debate_id: &str) -> bool {
        let entry = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(debate_id);
        match entry {
            Some(entry) => {
                entry.token.cancel();
                !entry.handle.is_finished()
            }
            None => false,
        }
    }

    /// Phase of the pending timer for a debate, if any.
    pub fn pending_phase(&self, debate_id: &str) -> Option<DebatePhase> {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(debate_id)
            .filter(|entry| !entry.handle.is_finished() && !entry.token.is_cancelled())
            .map(|entry| entry.phase)
    }

    /// Number of timers still waiting.
    pub fn active(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| !entry.handle.is_finished() && !entry.token.is_cancelled())
            .count()
    }

    /// Forget timers whose tasks have finished.
    pub fn prune(&self) {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, entry| !entry.handle.is_finished());
    }
}

impl Drop for EscalationTimers {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(|e| e.into_inner());
        for entry in timers.values() {
            entry.token.cancel();
        }
    }
}
