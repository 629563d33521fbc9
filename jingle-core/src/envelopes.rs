//! Per-note gain envelope.
//!
//! Every note gets an attack / hold / release shape expressed as automation
//! events on its gain param:
//!
//! ```text
//!   1 |   ________________
//!     |  /                \
//!   0 |_/                  \_
//!      ^ ^                ^  ^
//!      t a                r  t+d
//! ```
//!
//! The segments stay in order and inside the note when the note is shorter
//! than `attack + release`: the hold collapses first, then the attack and
//! release are clipped to the note's end.

use crate::automation::AutomationEvent;

/// Attack / release shape for one note. Times are in seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteEnvelope {
    pub attack_s: f64,
    pub release_s: f64,
}

impl Default for NoteEnvelope {
    fn default() -> Self {
        Self { attack_s: 0.010, release_s: 0.050 }
    }
}

impl NoteEnvelope {
    #[inline]
    pub fn new(attack_s: f64, release_s: f64) -> Self {
        Self { attack_s: attack_s.max(0.0), release_s: release_s.max(0.0) }
    }

    /// Gain automation for a note starting at `start` lasting `duration` seconds.
    ///
    /// Returns, in order: silence at `start`, full level at the end of the
    /// attack, full level at the start of the release, silence at `start + duration`.
    pub fn events(&self, start: f64, duration: f64) -> [AutomationEvent; 4] {
        let duration = duration.max(0.0);
        let attack_end = self.attack_s.min(duration);
        let release_start = (duration - self.release_s).clamp(attack_end, duration);
        [
            AutomationEvent::SetValue { value: 0.0, time: start },
            AutomationEvent::LinearRamp { value: 1.0, time: start + attack_end },
            AutomationEvent::LinearRamp { value: 1.0, time: start + release_start },
            AutomationEvent::LinearRamp { value: 0.0, time: start + duration },
        ]
    }
}
