//! Workload-aware routing of debates to human reviewers.
//!
//! Reviewers are data: an id, the domains or sectors they cover, working
//! hours and a concurrent-debate capacity. The router hands each escalated
//! debate to the least-loaded qualified reviewer with spare capacity and
//! estimates when they will respond:
//!
//! ```text
//! ETA = base latency + queue depth × per-item time + off-hours penalty
//! ```
//!
//! The off-hours penalty is the time until the reviewer's next shift starts.
//! Loads go up on `assign` and down on `release`; both are idempotent per
//! debate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::credibility::ContextVector;
use crate::debate::DebateId;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Shared reference to a [`WorkloadRouter`].
pub type SharedWorkloadRouter = Arc<WorkloadRouter>;

/// Daily shift in the reviewer's local time. `start_hour == end_hour` means
/// always on duty; a start after the end wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Offset of the reviewer's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: 0,
        }
    }
}

impl WorkingHours {
    pub fn always() -> Self {
        Self {
            start_hour: 0,
            end_hour: 0,
            utc_offset_minutes: 0,
        }
    }

    fn local_minute_of_day(&self, at: DateTime<Utc>) -> i64 {
        (at.timestamp().div_euclid(60) + i64::from(self.utc_offset_minutes))
            .rem_euclid(MINUTES_PER_DAY)
    }

    fn start_minute(&self) -> i64 {
        i64::from(self.start_hour % 24) * 60
    }

    fn end_minute(&self) -> i64 {
        i64::from(self.end_hour % 24) * 60
    }

    pub fn is_on_duty(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = (self.start_minute(), self.end_minute());
        let minute = self.local_minute_of_day(at);
        match start.cmp(&end) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => minute >= start && minute < end,
            std::cmp::Ordering::Greater => minute >= start || minute < end,
        }
    }

    /// Time until the next shift starts; zero while on duty.
    pub fn until_on_duty(&self, at: DateTime<Utc>) -> Duration {
        if self.is_on_duty(at) {
            return Duration::zero();
        }
        let minute = self.local_minute_of_day(at);
        Duration::minutes((self.start_minute() - minute).rem_euclid(MINUTES_PER_DAY))
    }
}

/// A human who can arbitrate debates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    /// Domains or sectors covered. Empty means generalist.
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub hours: WorkingHours,
    /// Overrides the router's default capacity.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Reviewer {
    pub fn new(id: impl Into<String>, expertise: &[&str]) -> Self {
        Self {
            id: id.into(),
            expertise: expertise.iter().map(|e| e.to_string()).collect(),
            hours: WorkingHours::default(),
            capacity: None,
        }
    }

    pub fn with_hours(mut self, hours: WorkingHours) -> Self {
        self.hours = hours;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Whether this reviewer may take a debate in `context`.
    pub fn is_qualified(&self, context: &ContextVector) -> bool {
        self.expertise.is_empty()
            || self
                .expertise
                .iter()
                .any(|e| *e == context.domain || *e == context.sector)
    }
}

/// Router tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Concurrent debates per reviewer unless the reviewer says otherwise.
    pub default_capacity: usize,
    pub base_latency_minutes: i64,
    pub per_item_minutes: i64,
    /// Reviewers loaded at startup.
    pub reviewers: Vec<Reviewer>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_capacity: 3,
            base_latency_minutes: 30,
            per_item_minutes: 60,
            reviewers: Vec::new(),
        }
    }
}

/// Result of a successful routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub debate_id: DebateId,
    pub reviewer: String,
    pub assigned_at: DateTime<Utc>,
    pub estimated_response: DateTime<Utc>,
    /// Reviewer's open debates before this one.
    pub queue_depth: usize,
}

#[derive(Debug, Default)]
struct Workload {
    loads: HashMap<String, usize>,
    assignments: HashMap<DebateId, Assignment>,
}

/// Assigns debates to reviewers under per-reviewer capacity limits.
#[derive(Debug)]
pub struct WorkloadRouter {
    config: RouterConfig,
    reviewers: RwLock<Vec<Reviewer>>,
    workload: Mutex<Workload>,
}

impl Default for WorkloadRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl WorkloadRouter {
    pub fn new(config: RouterConfig) -> Self {
        let reviewers = config.reviewers.clone();
        Self {
            config,
            reviewers: RwLock::new(reviewers),
            workload: Mutex::new(Workload::default()),
        }
    }

    pub fn shared(self) -> SharedWorkloadRouter {
        Arc::new(self)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Add a reviewer, replacing any with the same id.
    pub fn add_reviewer(&self, reviewer: Reviewer) {
        let mut reviewers = self.reviewers.write().unwrap_or_else(|e| e.into_inner());
        reviewers.retain(|r| r.id != reviewer.id);
        info!(reviewer = %reviewer.id, "Reviewer registered");
        reviewers.push(reviewer);
    }

    /// Stop routing to a reviewer. Debates already assigned stay assigned.
    pub fn remove_reviewer(&self, id: &str) -> bool {
        let mut reviewers = self.reviewers.write().unwrap_or_else(|e| e.into_inner());
        let before = reviewers.len();
        reviewers.retain(|r| r.id != id);
        reviewers.len() != before
    }

    pub fn reviewers(&self) -> Vec<Reviewer> {
        self.reviewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn qualified_for(&self, context: &ContextVector) -> Vec<Reviewer> {
        self.reviewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.is_qualified(context))
            .cloned()
            .collect()
    }

    fn capacity_of(&self, reviewer: &Reviewer) -> usize {
        reviewer.capacity.unwrap_or(self.config.default_capacity)
    }

    /// Estimated response time for a reviewer with `depth` open debates.
    pub fn estimate_response(
        &self,
        reviewer: &Reviewer,
        depth: usize,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let queue = self.config.per_item_minutes.saturating_mul(depth as i64);
        let eta = Duration::minutes(self.config.base_latency_minutes.saturating_add(queue))
            + reviewer.hours.until_on_duty(now);
        now + eta
    }

    /// Assign a debate to the least-loaded qualified reviewer with spare
    /// capacity. Returns `None` when nobody can take it. Assigning an
    /// already-assigned debate returns the existing assignment.
    pub fn assign(
        &self,
        debate_id: &str,
        context: &ContextVector,
        now: DateTime<Utc>,
    ) -> Option<Assignment> {
        let candidates = self.qualified_for(context);
        let mut workload = self.workload.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = workload.assignments.get(debate_id) {
            return Some(existing.clone());
        }

        let chosen = candidates
            .iter()
            .filter_map(|reviewer| {
                let depth = workload.loads.get(&reviewer.id).copied().unwrap_or(0);
                (depth < self.capacity_of(reviewer)).then(|| {
                    let eta = self.estimate_response(reviewer, depth, now);
                    (reviewer, depth, eta)
                })
            })
            .min_by(|a, b| {
                a.1.cmp(&b.1)
                    .then(a.2.cmp(&b.2))
                    .then(a.0.id.cmp(&b.0.id))
            });

        let Some((reviewer, depth, estimated_response)) = chosen else {
            warn!(
                debate_id,
                qualified = candidates.len(),
                "No reviewer with spare capacity"
            );
            return None;
        };

        let assignment = Assignment {
            debate_id: debate_id.to_string(),
            reviewer: reviewer.id.clone(),
            assigned_at: now,
            estimated_response,
            queue_depth: depth,
        };
        *workload.loads.entry(reviewer.id.clone()).or_insert(0) += 1;
        workload
            .assignments
            .insert(debate_id.to_string(), assignment.clone());
        info!(
            debate_id,
            reviewer = %assignment.reviewer,
            queue_depth = depth,
            eta = %assignment.estimated_response,
            "Debate assigned"
        );
        Some(assignment)
    }

    /// Free the reviewer slot held by a debate. Safe to call repeatedly.
    pub fn release(&self, debate_id: &str) -> Option<Assignment> {
        let mut workload = self.workload.lock().unwrap_or_else(|e| e.into_inner());
        let assignment = workload.assignments.remove(debate_id)?;
        if let Some(load) = workload.loads.get_mut(&assignment.reviewer) {
            *load = load.saturating_sub(1);
        }
        debug!(debate_id, reviewer = %assignment.reviewer, "Reviewer slot released");
        Some(assignment)
    }

    pub fn assignment_for(&self, debate_id: &str) -> Option<Assignment> {
        self.workload
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .assignments
            .get(debate_id)
            .cloned()
    }

    /// Open debates held by a reviewer.
    pub fn load(&self, reviewer: &str) -> usize {
        self.workload
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .loads
            .get(reviewer)
            .copied()
            .unwrap_or(0)
    }

    pub fn loads(&self) -> HashMap<String, usize> {
        self.workload
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .loads
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> ContextVector {
        ContextVector::new("retail", "eps", "12m", "mid_cap", "mature", "financial")
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap()
    }

    fn router() -> WorkloadRouter {
        let router = WorkloadRouter::default();
        router.add_reviewer(Reviewer::new("ana", &["financial"]));
        router.add_reviewer(Reviewer::new("ben", &["financial"]));
        router.add_reviewer(Reviewer::new("cat", &["valuation"]));
        router
    }

    #[test]
    fn test_least_loaded_qualified_reviewer() {
        let router = router();
        let first = router.assign("d1", &context(), noon()).unwrap();
        let second = router.assign("d2", &context(), noon()).unwrap();
        assert_eq!(first.reviewer, "ana");
        assert_eq!(second.reviewer, "ben");
        assert_eq!(router.load("cat"), 0);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let router = WorkloadRouter::default();
        router.add_reviewer(Reviewer::new("solo", &[]));
        for i in 0..3 {
            assert!(router.assign(&format!("d{}", i), &context(), noon()).is_some());
        }
        assert!(router.assign("d3", &context(), noon()).is_none());

        router.release("d0");
        let assignment = router.assign("d3", &context(), noon()).unwrap();
        assert_eq!(assignment.queue_depth, 2);
    }

    #[test]
    fn test_assign_and_release_are_idempotent() {
        let router = router();
        let a = router.assign("d1", &context(), noon()).unwrap();
        let b = router.assign("d1", &context(), noon()).unwrap();
        assert_eq!(a, b);
        assert_eq!(router.load("ana"), 1);

        assert!(router.release("d1").is_some());
        assert!(router.release("d1").is_none());
        assert_eq!(router.load("ana"), 0);
    }

    #[test]
    fn test_eta_includes_queue_and_off_hours() {
        let router = WorkloadRouter::default();
        let night_owl = Reviewer::new("owl", &[]).with_hours(WorkingHours {
            start_hour: 20,
            end_hour: 4,
            utc_offset_minutes: 0,
        });
        router.add_reviewer(night_owl);

        let assignment = router.assign("d1", &context(), noon()).unwrap();
        // 30 base + 0 queue + 8h until 20:00
        assert_eq!(
            assignment.estimated_response - noon(),
            Duration::minutes(30 + 8 * 60)
        );

        let next = router.assign("d2", &context(), noon()).unwrap();
        assert_eq!(
            next.estimated_response - noon(),
            Duration::minutes(30 + 60 + 8 * 60)
        );
    }

    #[test]
    fn test_working_hours_with_offset() {
        // 09:00-17:00 at UTC+9 is 00:00-08:00 UTC
        let tokyo = WorkingHours {
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: 9 * 60,
        };
        assert!(!tokyo.is_on_duty(noon()));
        assert_eq!(tokyo.until_on_duty(noon()), Duration::hours(12));
        assert!(WorkingHours::always().is_on_duty(noon()));
    }

    #[test]
    fn test_unqualified_context_gets_nobody() {
        let router = WorkloadRouter::default();
        router.add_reviewer(Reviewer::new("val", &["valuation"]));
        assert!(router.qualified_for(&context()).is_empty());
        assert!(router.assign("d1", &context(), noon()).is_none());
    }
}
