//! Automated parameters: a value that follows a timeline of scheduled events.
//!
//! Three event kinds are supported:
//! - `SetValue`   : jump to a value at a time
//! - `LinearRamp` : arrive at a value at a time, interpolating linearly from the
//!   last settled point (the previous event's time and value)
//! - `SetTarget`  : from a start time, approach a target exponentially with a
//!   time constant (one-pole glide), until the next event takes over
//!
//! Times are absolute seconds on the owning renderer's clock. The param is
//! advanced with `next(t)` for monotonically increasing `t`; events are kept in
//! time order (insertion is stable for equal times).

use std::collections::VecDeque;

use crate::dsp::{kill_denormals, lerp, one_pole_coeff_s};

/// Events a param holds without reallocating; a note uses four, live glides
/// add one each.
pub const EVENT_CAPACITY: usize = 16;

/// One scheduled change on an automated parameter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AutomationEvent {
    SetValue { value: f32, time: f64 },
    LinearRamp { value: f32, time: f64 },
    SetTarget { target: f32, time: f64, time_constant: f32 },
}

impl AutomationEvent {
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            Self::SetValue { time, .. } | Self::LinearRamp { time, .. } | Self::SetTarget { time, .. } => time,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Glide {
    target: f32,
    coeff: f32,
}

/// A parameter value driven by an event timeline.
#[derive(Clone, Debug)]
pub struct AutomatedParam {
    value: f32,
    sr: f32,
    events: VecDeque<AutomationEvent>,
    // last settled point, start of any linear ramp
    anchor_t: f64,
    anchor_v: f32,
    glide: Option<Glide>,
}

impl AutomatedParam {
    pub fn new(value: f32, sr: f32) -> Self {
        Self {
            value,
            sr: sr.max(1.0),
            events: VecDeque::with_capacity(EVENT_CAPACITY),
            anchor_t: 0.0,
            anchor_v: value,
            glide: None,
        }
    }

    /// Insert an event, keeping the timeline sorted by time.
    pub fn schedule(&mut self, event: AutomationEvent) {
        let t = event.time();
        let at = self.events.iter().position(|e| e.time() > t).unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    /// Number of events not yet reached.
    #[inline] pub fn pending(&self) -> usize { self.events.len() }

    #[inline] pub fn value(&self) -> f32 { self.value }

    /// Advance to time `t` and return the parameter value there.
    pub fn next(&mut self, t: f64) -> f32 {
        while let Some(ev) = self.events.front().copied() {
            if ev.time() > t {
                break;
            }
            self.events.pop_front();
            match ev {
                AutomationEvent::SetValue { value, time } | AutomationEvent::LinearRamp { value, time } => {
                    self.value = value;
                    self.anchor_t = time;
                    self.anchor_v = value;
                    self.glide = None;
                }
                AutomationEvent::SetTarget { target, time, time_constant } => {
                    self.anchor_t = time;
                    self.anchor_v = self.value;
                    self.glide = Some(Glide { target, coeff: one_pole_coeff_s(time_constant, self.sr) });
                }
            }
        }

        match (self.events.front(), self.glide) {
            (_, Some(g)) => {
                self.value = kill_denormals(self.value + (g.target - self.value) * (1.0 - g.coeff));
            }
            (Some(&AutomationEvent::LinearRamp { value, time }), None) => {
                let span = time - self.anchor_t;
                if span > 0.0 {
                    let frac = ((t - self.anchor_t) / span).clamp(0.0, 1.0);
                    #[allow(clippy::cast_possible_truncation)]
                    let frac = frac as f32;
                    self.value = lerp(self.anchor_v, value, frac);
                }
            }
            _ => {}
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 1000.0;

    fn run_until(p: &mut AutomatedParam, from: f64, to: f64) -> f32 {
        let mut t = from;
        let dt = 1.0 / f64::from(SR);
        let mut v = p.value();
        while t <= to {
            v = p.next(t);
            t += dt;
        }
        v
    }

    #[test]
    fn set_value_applies_at_its_time() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(AutomationEvent::SetValue { value: 0.7, time: 0.5 });
        assert_eq!(p.next(0.4), 0.0);
        assert_eq!(p.next(0.5), 0.7);
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(AutomationEvent::SetValue { value: 0.0, time: 1.0 });
        p.schedule(AutomationEvent::LinearRamp { value: 1.0, time: 2.0 });
        p.next(1.0);
        let mid = p.next(1.5);
        assert!((mid - 0.5).abs() < 1e-4, "mid={mid}");
        assert_eq!(p.next(2.0), 1.0);
    }

    #[test]
    fn events_inserted_out_of_order_are_sorted() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(AutomationEvent::SetValue { value: 2.0, time: 2.0 });
        p.schedule(AutomationEvent::SetValue { value: 1.0, time: 1.0 });
        assert_eq!(p.next(1.0), 1.0);
        assert_eq!(p.next(2.0), 2.0);
    }

    #[test]
    fn set_target_glides_towards_target() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(AutomationEvent::SetTarget { target: 1.0, time: 0.0, time_constant: 0.01 });
        let after_tau = run_until(&mut p, 0.0, 0.0095);
        assert!((after_tau - 0.632).abs() < 0.05, "after_tau={after_tau}");
        let settled = run_until(&mut p, 0.01, 0.2);
        assert!((settled - 1.0).abs() < 1e-3, "settled={settled}");
    }

    #[test]
    fn later_set_value_cancels_glide() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(AutomationEvent::SetTarget { target: 1.0, time: 0.0, time_constant: 0.5 });
        p.schedule(AutomationEvent::SetValue { value: 0.25, time: 0.1 });
        run_until(&mut p, 0.0, 0.3);
        assert_eq!(p.value(), 0.25);
    }
}
