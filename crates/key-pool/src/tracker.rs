//! Per-credential exhaustion state with lazy reinstatement
//!
//! A credential becomes exhausted only through `mark_exhausted` and becomes
//! usable again only when a lookup observes that the reset window has fully
//! elapsed since it was marked. There is no background timer: expiry is
//! applied by `is_exhausted` as a side effect.
//!
//! All methods take `now` explicitly; the pool passes `tokio::time::Instant::now()`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Provider quotas reset daily.
pub const QUOTA_RESET_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// State of a single credential. `exhausted_at` is `Some` exactly while the
/// credential is exhausted.
#[derive(Debug, Clone, Default)]
pub struct CredentialState {
    exhausted_at: Option<Instant>,
    usage: u64,
}

impl CredentialState {
    pub fn is_marked(&self) -> bool {
        self.exhausted_at.is_some()
    }

    pub fn exhausted_at(&self) -> Option<Instant> {
        self.exhausted_at
    }

    /// Successful generations since start or since the last reinstatement.
    pub fn usage(&self) -> u64 {
        self.usage
    }
}

#[derive(Debug)]
pub struct ExhaustionTracker {
    states: Vec<CredentialState>,
    reset_window: Duration,
}

impl ExhaustionTracker {
    pub fn new(credentials: usize, reset_window: Duration) -> Self {
        Self {
            states: vec![CredentialState::default(); credentials],
            reset_window,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    pub fn state(&self, index: usize) -> Option<&CredentialState> {
        self.states.get(index)
    }

    /// Whether `index` is unusable at `now`.
    ///
    /// Clears the record when the reset window has elapsed. Indices outside
    /// the configured range are always exhausted.
    pub fn is_exhausted(&mut self, index: usize, now: Instant) -> bool {
        let reset_window = self.reset_window;
        let Some(state) = self.states.get_mut(index) else {
            return true;
        };
        let Some(exhausted_at) = state.exhausted_at else {
            return false;
        };

        let elapsed = now.saturating_duration_since(exhausted_at);
        if elapsed >= reset_window {
            state.exhausted_at = None;
            state.usage = 0;
            info!(
                credential = index,
                elapsed_secs = elapsed.as_secs(),
                "credential reinstated after quota reset window"
            );
            metrics::counter!("key_pool_credentials_reinstated_total").increment(1);
            return false;
        }
        true
    }

    /// Mark `index` exhausted as of `now`.
    ///
    /// Marking an already-exhausted credential restarts its window.
    pub fn mark_exhausted(&mut self, index: usize, now: Instant) {
        let reset_window = self.reset_window;
        let Some(state) = self.states.get_mut(index) else {
            warn!(credential = index, "ignoring exhaustion report for unknown credential");
            return;
        };
        if state.exhausted_at.replace(now).is_some() {
            debug!(credential = index, "exhaustion re-confirmed, window restarted");
        } else {
            warn!(
                credential = index,
                reset_secs = reset_window.as_secs(),
                "credential marked exhausted until quota resets"
            );
            metrics::counter!("key_pool_credentials_exhausted_total").increment(1);
        }
    }

    /// Count one successful generation against `index`.
    pub fn record_success(&mut self, index: usize) {
        if let Some(state) = self.states.get_mut(index) {
            state.usage += 1;
        }
    }

    /// Time left before `index` is reinstated, without mutating state.
    pub fn remaining(&self, index: usize, now: Instant) -> Option<Duration> {
        let exhausted_at = self.states.get(index)?.exhausted_at?;
        let elapsed = now.saturating_duration_since(exhausted_at);
        Some(self.reset_window.saturating_sub(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn never_marked_is_not_exhausted() {
        let mut tracker = ExhaustionTracker::new(3, QUOTA_RESET_WINDOW);
        let now = Instant::now();
        assert!((0..3).all(|i| !tracker.is_exhausted(i, now)));
    }

    #[test]
    fn out_of_range_is_exhausted() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        assert!(tracker.is_exhausted(1, Instant::now()));
    }

    #[test]
    fn exhausted_until_window_elapses() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        let t0 = Instant::now();
        tracker.mark_exhausted(0, t0);

        assert!(tracker.is_exhausted(0, t0));
        assert!(tracker.is_exhausted(0, t0 + 23 * 60 * MINUTE + 59 * MINUTE));
        assert!(tracker.is_exhausted(0, t0 + QUOTA_RESET_WINDOW - Duration::from_millis(1)));
        assert!(tracker.state(0).unwrap().is_marked());
    }

    #[test]
    fn reinstated_at_exact_window_boundary() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        let t0 = Instant::now();
        tracker.mark_exhausted(0, t0);
        assert!(!tracker.is_exhausted(0, t0 + QUOTA_RESET_WINDOW));
    }

    #[test]
    fn reinstatement_clears_the_record() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        let t0 = Instant::now();
        tracker.mark_exhausted(0, t0);

        let later = t0 + QUOTA_RESET_WINDOW + MINUTE;
        assert!(!tracker.is_exhausted(0, later));

        let state = tracker.state(0).unwrap();
        assert!(!state.is_marked());
        assert!(state.exhausted_at().is_none());
        // Record is gone, so even a query at t0 is no longer exhausted.
        assert!(!tracker.is_exhausted(0, t0));
    }

    #[test]
    fn remarking_restarts_the_window() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        let t0 = Instant::now();
        tracker.mark_exhausted(0, t0);
        let t1 = t0 + 12 * 60 * MINUTE;
        tracker.mark_exhausted(0, t1);

        assert_eq!(tracker.state(0).unwrap().exhausted_at(), Some(t1));
        assert!(tracker.is_exhausted(0, t0 + QUOTA_RESET_WINDOW + MINUTE));
        assert!(!tracker.is_exhausted(0, t1 + QUOTA_RESET_WINDOW));
    }

    #[test]
    fn marking_one_leaves_others_healthy() {
        let mut tracker = ExhaustionTracker::new(3, QUOTA_RESET_WINDOW);
        let now = Instant::now();
        tracker.mark_exhausted(1, now);
        assert!(!tracker.is_exhausted(0, now));
        assert!(tracker.is_exhausted(1, now));
        assert!(!tracker.is_exhausted(2, now));
    }

    #[test]
    fn usage_resets_on_reinstatement() {
        let mut tracker = ExhaustionTracker::new(1, QUOTA_RESET_WINDOW);
        let t0 = Instant::now();
        tracker.record_success(0);
        tracker.record_success(0);
        assert_eq!(tracker.state(0).unwrap().usage(), 2);

        tracker.mark_exhausted(0, t0);
        assert_eq!(tracker.state(0).unwrap().usage(), 2);
        tracker.is_exhausted(0, t0 + QUOTA_RESET_WINDOW);
        assert_eq!(tracker.state(0).unwrap().usage(), 0);
    }

    #[test]
    fn remaining_counts_down_without_side_effects() {
        let mut tracker = ExhaustionTracker::new(2, Duration::from_secs(600));
        let t0 = Instant::now();
        assert_eq!(tracker.remaining(0, t0), None);

        tracker.mark_exhausted(0, t0);
        assert_eq!(
            tracker.remaining(0, t0 + Duration::from_secs(100)),
            Some(Duration::from_secs(500))
        );
        assert_eq!(
            tracker.remaining(0, t0 + Duration::from_secs(900)),
            Some(Duration::ZERO)
        );
        assert!(tracker.state(0).unwrap().is_marked());
    }

    #[test]
    fn custom_window_is_honoured() {
        let mut tracker = ExhaustionTracker::new(1, Duration::from_secs(30));
        let t0 = Instant::now();
        tracker.mark_exhausted(0, t0);
        assert!(tracker.is_exhausted(0, t0 + Duration::from_secs(29)));
        assert!(!tracker.is_exhausted(0, t0 + Duration::from_secs(30)));
    }
}
