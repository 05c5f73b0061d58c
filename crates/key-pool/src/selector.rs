//! Credential selection policy
//!
//! `pick_next` spreads consecutive calls across every healthy credential using
//! the call counter: it is deliberately not sticky, so two consecutive calls
//! land on different credentials whenever more than one is healthy.
//! `pick_fallback` is only used for the single in-call retry after a quota
//! failure.

use tokio::time::Instant;

use crate::tracker::ExhaustionTracker;

/// Healthy credential indices in ascending order.
///
/// Queries every credential, so expired exhaustion records are cleared here.
pub fn healthy_set(tracker: &mut ExhaustionTracker, now: Instant) -> Vec<usize> {
    (0..tracker.len())
        .filter(|&index| !tracker.is_exhausted(index, now))
        .collect()
}

/// Credential for the call numbered `counter`, or `None` when every
/// credential is exhausted.
pub fn pick_next(tracker: &mut ExhaustionTracker, counter: u64, now: Instant) -> Option<usize> {
    let healthy = healthy_set(tracker, now);
    if healthy.is_empty() {
        return None;
    }
    let slot = (counter % healthy.len() as u64) as usize;
    Some(healthy[slot])
}

/// First healthy credential after `exclude`, wrapping around. Never returns
/// `exclude` itself.
pub fn pick_fallback(tracker: &mut ExhaustionTracker, exclude: usize, now: Instant) -> Option<usize> {
    let n = tracker.len();
    (1..n)
        .map(|offset| (exclude + offset) % n)
        .find(|&index| index != exclude && !tracker.is_exhausted(index, now))
}
