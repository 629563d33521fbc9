//! Tempo debouncing.
//!
//! Knob drags produce bursts of tempo values. Each request overwrites a
//! single pending slot and pushes its deadline out by the quiet window; only
//! the value still held when the window expires is committed. The debouncer
//! belongs to the player, not to a session, so it keeps tracking input while
//! stopped.

use log::trace;

#[derive(Copy, Clone, Debug, PartialEq)]
struct PendingCommit {
    bpm: f32,
    deadline: f64,
}

/// Single-slot debounce state machine for tempo input.
#[derive(Clone, Debug)]
pub struct TempoDebouncer {
    window_s: f64,
    committed: f32,
    pending: Option<PendingCommit>,
}

impl TempoDebouncer {
    /// `initial` is the baseline tempo; it is never reported as a change.
    pub fn new(initial: f32, window_s: f64) -> Self {
        Self { window_s: window_s.max(0.0), committed: initial, pending: None }
    }

    /// Tempo currently in effect.
    #[inline] pub fn committed(&self) -> f32 { self.committed }

    /// Value waiting for the window to expire.
    #[inline] pub fn pending(&self) -> Option<f32> { self.pending.map(|p| p.bpm) }

    #[inline] pub fn deadline(&self) -> Option<f64> { self.pending.map(|p| p.deadline) }

    /// Record a new tempo request at `now`, replacing any pending one.
    pub fn request(&mut self, bpm: f32, now: f64) {
        if let Some(prev) = self.pending {
            trace!("tempo {} superseded by {bpm}", prev.bpm);
        }
        self.pending = Some(PendingCommit { bpm, deadline: now + self.window_s });
    }

    /// Commit the pending value if its window has expired at `now`.
    ///
    /// Returns the new tempo only when it differs from the one in effect.
    pub fn poll(&mut self, now: f64) -> Option<f32> {
        let p = self.pending?;
        if p.deadline > now {
            return None;
        }
        self.pending = None;
        if p.bpm == self.committed {
            return None;
        }
        self.committed = p.bpm;
        Some(p.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_commits_only_the_last_value() {
        let mut d = TempoDebouncer::new(100.0, 0.150);
        d.request(60.0, 0.00);
        d.request(90.0, 0.05);
        d.request(120.0, 0.10);
        assert_eq!(d.poll(0.20), None, "window restarted by the last request");
        assert_eq!(d.poll(0.26), Some(120.0));
        assert_eq!(d.poll(10.0), None);
        assert_eq!(d.committed(), 120.0);
    }

    #[test]
    fn value_equal_to_committed_is_not_a_change() {
        let mut d = TempoDebouncer::new(120.0, 0.150);
        d.request(120.0, 0.0);
        assert_eq!(d.poll(1.0), None);
        assert_eq!(d.pending(), None);
    }

    #[test]
    fn returning_to_the_baseline_within_the_window_is_silent() {
        let mut d = TempoDebouncer::new(120.0, 0.150);
        d.request(150.0, 0.0);
        d.request(120.0, 0.1);
        assert_eq!(d.poll(0.3), None);
        assert_eq!(d.committed(), 120.0);
    }
}
