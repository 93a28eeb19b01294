//! Two-channel debounced persistence scheduler.
//!
//! ```text
//!   structural / position / overlay change
//!             │
//!             ▼
//!   ┌──────────────────┐   fast deadline (~100 ms)   ┌────────────────────┐
//!   │ PersistenceSched │ ──────────────────────────► │ LocalCache write   │
//!   │  (suspend flag)  │                             └────────────────────┘
//!   │                  │   slow deadline (~5 s)      ┌────────────────────┐
//!   │                  │ ──────────────────────────► │ remote layout PUT  │
//!   └──────────────────┘   position changes only     └────────────────────┘
//! ```
//!
//! The scheduler is a pure deadline machine: it never sleeps and never does
//! I/O. The owner feeds it changes and calls [`PersistenceScheduler::poll`]
//! with the current instant; every returned [`Flush`] is one write to
//! perform. Each new change pushes its channel's deadline out again
//! (trailing-edge debounce).

use ontograph_model::ModelChange;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Snapshot graph, layout and overlay positions to the local cache.
    Fast,
    /// Commit the layout to the remote store.
    Slow,
}

#[derive(Debug, Clone)]
pub struct PersistenceScheduler {
    fast_delay: Duration,
    slow_delay: Duration,
    fast_deadline: Option<Instant>,
    slow_deadline: Option<Instant>,
    suspended: bool,
    /// Layout changes arrived while suspended.
    dropped_layout: bool,
}

impl PersistenceScheduler {
    pub fn new(fast_delay: Duration, slow_delay: Duration) -> Self {
        Self {
            fast_delay,
            slow_delay,
            fast_deadline: None,
            slow_deadline: None,
            suspended: false,
            dropped_layout: false,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Arm (or push out) the fast channel. Returns `false` while suspended.
    pub fn schedule_fast(&mut self, now: Instant) -> bool {
        if self.suspended {
            return false;
        }
        self.fast_deadline = Some(now + self.fast_delay);
        true
    }

    /// Arm (or push out) the slow channel. Returns `false` while suspended.
    pub fn schedule_slow(&mut self, now: Instant) -> bool {
        if self.suspended {
            self.dropped_layout = true;
            return false;
        }
        self.slow_deadline = Some(now + self.slow_delay);
        true
    }

    /// Route a model change to the channels it concerns.
    pub fn note(&mut self, change: &ModelChange, now: Instant) {
        if change.is_layout() {
            self.schedule_slow(now);
        }
        self.schedule_fast(now);
    }

    pub fn suspend(&mut self) {
        if !self.suspended {
            tracing::debug!("persistence suspended");
        }
        self.suspended = true;
    }

    /// Clear the suspend flag.
    ///
    /// Always yields one immediate fast flush. The slow channel is re-armed
    /// when layout changes were dropped during suspension or a slow deadline
    /// was already pending.
    pub fn resume(&mut self, now: Instant) -> Vec<Flush> {
        if !self.suspended {
            return Vec::new();
        }
        self.suspended = false;
        self.fast_deadline = None;
        if self.dropped_layout || self.slow_deadline.is_some() {
            self.slow_deadline = Some(now + self.slow_delay);
        }
        self.dropped_layout = false;
        tracing::debug!(slow_armed = self.slow_deadline.is_some(), "persistence resumed");
        vec![Flush::Fast]
    }

    /// Flushes whose deadline has passed. Nothing fires while suspended.
    pub fn poll(&mut self, now: Instant) -> Vec<Flush> {
        if self.suspended {
            return Vec::new();
        }
        let mut due = Vec::new();
        if self.fast_deadline.is_some_and(|d| d <= now) {
            self.fast_deadline = None;
            due.push(Flush::Fast);
        }
        if self.slow_deadline.is_some_and(|d| d <= now) {
            self.slow_deadline = None;
            due.push(Flush::Slow);
        }
        due
    }

    /// Re-arm the slow channel after a failed or stale remote write.
    /// The retry waits a full debounce period.
    pub fn retry_slow(&mut self, now: Instant) {
        self.schedule_slow(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.fast_deadline, self.slow_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.fast_deadline.is_some() || self.slow_deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(100);
    const SLOW: Duration = Duration::from_millis(5000);

    fn scheduler() -> PersistenceScheduler {
        PersistenceScheduler::new(FAST, SLOW)
    }

    fn moved() -> ModelChange {
        ModelChange::Position {
            ids: vec!["a".into()],
        }
    }

    #[test]
    fn structural_changes_only_arm_fast() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.note(&ModelChange::Structural { ids: vec![] }, t0);
        assert!(s.poll(t0 + FAST / 2).is_empty());
        assert_eq!(s.poll(t0 + FAST), vec![Flush::Fast]);
        assert!(s.poll(t0 + SLOW * 2).is_empty());
    }

    #[test]
    fn position_changes_arm_both_channels() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.note(&moved(), t0);
        assert_eq!(s.poll(t0 + FAST), vec![Flush::Fast]);
        assert_eq!(s.poll(t0 + SLOW), vec![Flush::Slow]);
    }

    #[test]
    fn bursts_are_debounced_to_one_flush() {
        let mut s = scheduler();
        let t0 = Instant::now();
        for i in 0..10 {
            s.note(&moved(), t0 + Duration::from_millis(i * 50));
        }
        let end = t0 + Duration::from_millis(450);
        assert!(s.poll(end + FAST / 2).is_empty());
        assert_eq!(s.poll(end + FAST), vec![Flush::Fast]);
    }

    #[test]
    fn nothing_fires_while_suspended() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.note(&moved(), t0);
        s.suspend();
        s.note(&moved(), t0);
        assert!(s.poll(t0 + SLOW * 3).is_empty());
    }

    #[test]
    fn resume_flushes_fast_and_rearms_slow_for_dropped_positions() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.suspend();
        s.note(&moved(), t0);
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(s.resume(t1), vec![Flush::Fast]);
        assert!(s.poll(t1 + FAST).is_empty());
        assert_eq!(s.poll(t1 + SLOW), vec![Flush::Slow]);
        assert!(s.resume(t1).is_empty());
    }

    #[test]
    fn retry_waits_a_full_period() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.retry_slow(t0);
        assert!(s.poll(t0).is_empty());
        assert_eq!(s.next_deadline(), Some(t0 + SLOW));
        assert_eq!(s.poll(t0 + SLOW), vec![Flush::Slow]);
    }
}
