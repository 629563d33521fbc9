//! The melody table: a cyclic sequence of pitch / relative-duration pairs.

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, PlayerResult};

/// Pitch that maps to a multiplier of exactly 1.0.
pub const BASE_FREQUENCY_HZ: f32 = 440.0;

/// Tempo at which `relative_duration` is read as seconds.
pub const REFERENCE_TEMPO_BPM: f32 = 120.0;

/// One note of the melody.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MelodyEvent {
    pub pitch_hz: f32,
    /// Seconds at the reference tempo.
    pub relative_duration: f32,
}

impl MelodyEvent {
    #[inline]
    pub const fn new(pitch_hz: f32, relative_duration: f32) -> Self {
        Self { pitch_hz, relative_duration }
    }
}

const E4: f32 = 329.63;
const G4: f32 = 392.0;
const C4: f32 = 261.63;
const D4: f32 = 293.66;

/// Opening phrase of "Jingle Bells".
const JINGLE_BELLS: [MelodyEvent; 11] = [
    MelodyEvent::new(E4, 0.25),
    MelodyEvent::new(E4, 0.25),
    MelodyEvent::new(E4, 0.5),
    MelodyEvent::new(E4, 0.25),
    MelodyEvent::new(E4, 0.25),
    MelodyEvent::new(E4, 0.5),
    MelodyEvent::new(E4, 0.25),
    MelodyEvent::new(G4, 0.25),
    MelodyEvent::new(C4, 0.25),
    MelodyEvent::new(D4, 0.25),
    MelodyEvent::new(E4, 1.0),
];

/// A non-empty, cyclic melody.
#[derive(Clone, Debug, PartialEq)]
pub struct Melody {
    events: Vec<MelodyEvent>,
}

impl Melody {
    /// Validate and wrap a note table.
    pub fn new(events: Vec<MelodyEvent>) -> PlayerResult<Self> {
        if events.is_empty() {
            return Err(PlayerError::Config("melody must contain at least one note".into()));
        }
        for (i, ev) in events.iter().enumerate() {
            if !(ev.pitch_hz.is_finite() && ev.pitch_hz > 0.0) {
                return Err(PlayerError::Config(format!("note {i}: pitch must be a positive frequency, got {}", ev.pitch_hz)));
            }
            if !(ev.relative_duration.is_finite() && ev.relative_duration > 0.0) {
                return Err(PlayerError::Config(format!(
                    "note {i}: duration must be positive, got {}",
                    ev.relative_duration
                )));
            }
        }
        Ok(Self { events })
    }

    pub fn jingle_bells() -> Self {
        Self { events: JINGLE_BELLS.to_vec() }
    }

    #[inline] pub fn len(&self) -> usize { self.events.len() }

    /// Whether the table is empty (never, once validated).
    #[inline] pub fn is_empty(&self) -> bool { self.events.is_empty() }

    /// Event at `index`, wrapping around the end of the table.
    #[inline]
    pub fn event(&self, index: usize) -> MelodyEvent {
        self.events[index % self.events.len()]
    }

    /// Index following `index`, cyclically.
    #[inline]
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.events.len()
    }

    pub fn events(&self) -> &[MelodyEvent] { &self.events }
}

impl Default for Melody {
    fn default() -> Self { Self::jingle_bells() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_wrap() {
        let m = Melody::new(vec![MelodyEvent::new(440.0, 0.25), MelodyEvent::new(330.0, 0.5)]).unwrap();
        assert_eq!(m.next_index(0), 1);
        assert_eq!(m.next_index(1), 0);
        assert_eq!(m.event(3).pitch_hz, 330.0);
    }

    #[test]
    fn empty_or_degenerate_tables_are_rejected() {
        assert!(Melody::new(vec![]).is_err());
        assert!(Melody::new(vec![MelodyEvent::new(0.0, 0.25)]).is_err());
        assert!(Melody::new(vec![MelodyEvent::new(440.0, f32::NAN)]).is_err());
    }

    #[test]
    fn default_table_is_the_jingle_phrase() {
        let m = Melody::default();
        assert_eq!(m.len(), 11);
        assert!(!m.is_empty());
        assert_eq!(m.event(7).pitch_hz, 392.0);
        let total: f32 = m.events().iter().map(|e| e.relative_duration).sum();
        assert!((total - 4.0).abs() < 1e-6);
    }
}
