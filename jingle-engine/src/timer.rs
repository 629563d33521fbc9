//! Software timers: clocks and a cancellable queue of deadline-tagged actions.
//!
//! Nothing here sleeps or spawns. A driver (the [`runtime`](crate::runtime)
//! thread, an offline render loop, or a test) reads a [`Clock`], asks for the
//! earliest deadline and pops due entries in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self { Self { origin: Instant::now() } }
}

impl Default for SystemClock {
    fn default() -> Self { Self::new() }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 { self.origin.elapsed().as_secs_f64() }
}

/// Externally driven clock. Clones share the same time.
///
/// Tests and offline rendering move it forward explicitly.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 { f64::from_bits(self.bits.load(Ordering::Acquire)) }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 { (**self).now() }
}

/// Opaque handle to an armed timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<A> {
    id: TimerId,
    due: f64,
    action: A,
}

/// Pending actions keyed by deadline. Entries with equal deadlines fire in
/// arming order.
#[derive(Debug)]
pub struct TimerQueue<A> {
    next_id: u64,
    entries: Vec<Entry<A>>,
}

impl<A> Default for TimerQueue<A> {
    fn default() -> Self { Self { next_id: 0, entries: Vec::new() } }
}

impl<A> TimerQueue<A> {
    pub fn new() -> Self { Self::default() }

    /// Arm `action` to fire at absolute time `due`.
    pub fn arm(&mut self, due: f64, action: A) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, due, action });
        id
    }

    /// Disarm one timer. Returns whether it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    /// Disarm every timer whose action matches `pred`; returns how many.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&A) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.action));
        before - self.entries.len()
    }

    pub fn clear(&mut self) { self.entries.clear(); }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn count_where(&self, mut pred: impl FnMut(&A) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.action)).count()
    }

    fn earliest(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(i, _)| i)
    }

    /// Deadline of the next timer to fire.
    pub fn next_deadline(&self) -> Option<f64> {
        self.earliest().map(|i| self.entries[i].due)
    }

    /// Remove and return the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerId, A)> {
        let i = self.earliest()?;
        if self.entries[i].due > now {
            return None;
        }
        let e = self.entries.swap_remove(i);
        Some((e.id, e.action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_then_arming_order() {
        let mut q = TimerQueue::new();
        q.arm(2.0, "late");
        q.arm(1.0, "first");
        q.arm(1.0, "second");
        assert_eq!(q.next_deadline(), Some(1.0));
        assert_eq!(q.pop_due(0.5), None);
        assert_eq!(q.pop_due(5.0).map(|(_, a)| a), Some("first"));
        assert_eq!(q.pop_due(5.0).map(|(_, a)| a), Some("second"));
        assert_eq!(q.pop_due(5.0).map(|(_, a)| a), Some("late"));
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut q = TimerQueue::new();
        let a = q.arm(1.0, 1);
        q.arm(1.0, 2);
        q.arm(1.0, 3);
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert_eq!(q.cancel_where(|v| *v == 3), 1);
        assert_eq!(q.pop_due(10.0).map(|(_, v)| v), Some(2));
        assert_eq!(q.pop_due(10.0), None);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let c = ManualClock::new();
        let d = c.clone();
        c.set(1.5);
        d.advance(0.25);
        assert_eq!(c.now(), 1.75);
    }
}
