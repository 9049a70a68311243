//! Queue of provisional resolutions awaiting human review.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DebateId, ResolutionSource};

/// A provisional resolution waiting for its review checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalReview {
    pub debate_id: DebateId,
    pub source: ResolutionSource,
    pub queued_at: DateTime<Utc>,
    /// Checkpoint at which the review is due.
    pub review_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ProvisionalReviewQueue {
    entries: Mutex<HashMap<DebateId, ProvisionalReview>>,
}

impl ProvisionalReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a review. Re-queuing the same debate replaces the entry.
    pub fn enqueue(&self, review: ProvisionalReview) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(review.debate_id.clone(), review);
    }

    pub fn remove(&self, debate_id: &str) -> Option<ProvisionalReview> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(debate_id)
    }

    fn collect(&self, filter: impl Fn(&ProvisionalReview) -> bool) -> Vec<ProvisionalReview> {
        let mut reviews: Vec<ProvisionalReview> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| {
            a.review_at
                .cmp(&b.review_at)
                .then(a.debate_id.cmp(&b.debate_id))
        });
        reviews
    }

    /// Reviews due at or before `at`, earliest first.
    pub fn due(&self, at: DateTime<Utc>) -> Vec<ProvisionalReview> {
        self.collect(|r| r.review_at <= at)
    }

    /// Every pending review, earliest first.
    pub fn pending(&self) -> Vec<ProvisionalReview> {
        self.collect(|_| true)
    }

    pub fn contains(&self, debate_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(debate_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
