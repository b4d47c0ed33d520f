//! Per-rule throttling.
//!
//! A rolling-window counter: each rule may create at most `max_jobs` jobs in
//! any `period`. Expansions over the cap are dropped, not delayed.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::trace;

/// Rolling-window job counters keyed by rule id.
#[derive(Debug, Default)]
pub struct RuleThrottle {
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RuleThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one job for `rule_id` if the window has room.
    ///
    /// Returns `true` if the job may be created, `false` if throttled.
    pub fn try_acquire(
        &self,
        rule_id: &str,
        max_jobs: u32,
        period: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(rule_id.to_string()).or_default();
        evict(window, period, now);

        if window.len() < max_jobs as usize {
            window.push_back(now);
            true
        } else {
            trace!(rule_id, max_jobs, "Rule throttle window full");
            false
        }
    }

    /// Give back a slot taken at `at` whose job was never created.
    pub fn release(&self, rule_id: &str, at: DateTime<Utc>) {
        let mut windows = self.windows.lock();
        if let Some(window) = windows.get_mut(rule_id)
            && let Some(pos) = window.iter().rposition(|t| *t == at)
        {
            window.remove(pos);
        }
    }

    /// Forget a rule's history (after the rule is deleted or its throttle changed).
    pub fn reset(&self, rule_id: &str) {
        self.windows.lock().remove(rule_id);
    }
}

fn evict(window: &mut VecDeque<DateTime<Utc>>, period: Duration, now: DateTime<Utc>) {
    let cutoff = now - period;
    while window.front().is_some_and(|t| *t <= cutoff) {
        window.pop_front();
    }
}
