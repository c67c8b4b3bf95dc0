//! Cancellable timer slots
//!
//! The engine has one pending slot per [`TimerKind`]. Arming a slot cancels
//! whatever was pending in it and issues a token with a fresh generation, so
//! only the latest schedule can ever be accepted when it fires.

use std::collections::BTreeMap;
use std::time::Duration;

use olsb_core::{Scheduler, TimerKind, TimerToken};
use tracing::trace;

/// Pending timer tokens, one per kind
#[derive(Debug, Default)]
pub struct Timers {
    pending: BTreeMap<TimerKind, TimerToken>,
    generation: u64,
}

impl Timers {
    /// Create an empty set of timer slots
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer, replacing any pending firing of the same kind
    pub fn arm<S: Scheduler + ?Sized>(
        &mut self,
        kind: TimerKind,
        delay: Duration,
        scheduler: &S,
    ) -> TimerToken {
        self.cancel(kind, scheduler);

        self.generation += 1;
        let token = TimerToken {
            kind,
            generation: self.generation,
        };
        scheduler.schedule(delay, token);
        self.pending.insert(kind, token);
        trace!(timer = %token, ?delay, "Timer armed");
        token
    }

    /// Cancel the pending firing of a timer, if any
    pub fn cancel<S: Scheduler + ?Sized>(&mut self, kind: TimerKind, scheduler: &S) -> bool {
        match self.pending.remove(&kind) {
            Some(token) => {
                scheduler.cancel(token);
                trace!(timer = %token, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer
    pub fn cancel_all<S: Scheduler + ?Sized>(&mut self, scheduler: &S) {
        for (_, token) in std::mem::take(&mut self.pending) {
            scheduler.cancel(token);
        }
    }

    /// Consume a fired token
    ///
    /// Returns true if it is the pending token of its kind; the slot is then
    /// cleared. Stale or unknown tokens return false and change nothing.
    pub fn accept(&mut self, token: TimerToken) -> bool {
        if self.pending.get(&token.kind) == Some(&token) {
            self.pending.remove(&token.kind);
            true
        } else {
            trace!(timer = %token, "Ignoring stale timer");
            false
        }
    }

    /// Check if a timer has a pending firing
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Instant;

    use super::*;

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: RefCell<Vec<(Duration, TimerToken)>>,
        cancelled: RefCell<Vec<TimerToken>>,
    }

    impl Scheduler for RecordingScheduler {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn schedule(&self, delay: Duration, timer: TimerToken) {
            self.scheduled.borrow_mut().push((delay, timer));
        }

        fn cancel(&self, timer: TimerToken) {
            self.cancelled.borrow_mut().push(timer);
        }
    }

    #[test]
    fn test_rearm_cancels_previous() {
        let scheduler = RecordingScheduler::default();
        let mut timers = Timers::new();

        let first = timers.arm(TimerKind::Triggered, Duration::from_secs(5), &scheduler);
        let second = timers.arm(TimerKind::Triggered, Duration::from_secs(2), &scheduler);

        assert_ne!(first, second);
        assert_eq!(*scheduler.cancelled.borrow(), vec![first]);
        assert!(!timers.accept(first));
        assert!(timers.accept(second));
        assert!(!timers.is_pending(TimerKind::Triggered));

        // A token fires once
        assert!(!timers.accept(second));
    }

    #[test]
    fn test_slots_are_independent() {
        let scheduler = RecordingScheduler::default();
        let mut timers = Timers::new();

        let periodic = timers.arm(TimerKind::Periodic, Duration::from_secs(15), &scheduler);
        timers.arm(TimerKind::Aggregation, Duration::from_secs(1), &scheduler);

        assert!(timers.cancel(TimerKind::Aggregation, &scheduler));
        assert!(!timers.cancel(TimerKind::Aggregation, &scheduler));
        assert!(timers.is_pending(TimerKind::Periodic));
        assert!(timers.accept(periodic));
    }

    #[test]
    fn test_cancel_all() {
        let scheduler = RecordingScheduler::default();
        let mut timers = Timers::new();

        timers.arm(TimerKind::Periodic, Duration::from_secs(15), &scheduler);
        timers.arm(TimerKind::Triggered, Duration::from_secs(5), &scheduler);
        timers.cancel_all(&scheduler);

        assert_eq!(scheduler.cancelled.borrow().len(), 2);
        assert!(!timers.is_pending(TimerKind::Periodic));
        assert!(!timers.is_pending(TimerKind::Triggered));
        assert_eq!(scheduler.scheduled.borrow().len(), 2);
    }
}
