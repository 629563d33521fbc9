//! Per-sample building blocks used by the software renderer.
//!
//! Zero-allocation, `Copy` components; frequency is **Hz** and the caller
//! passes the sample rate when stepping.

use jingle_core::dsp::{fast_sin, TAU};
use serde::{Deserialize, Serialize};

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    #[default]
    Sine,
    Tri,
    Saw,
}

#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine => fast_sin(TAU * phase01),
        Wave::Tri => 4.0 * (phase01 - 0.5).abs() - 1.0,
        Wave::Saw => 2.0 * phase01 - 1.0,
    }
}

/// Free-running phase accumulator oscillator. The frequency is supplied per
/// sample so it can follow an automated param.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32, // [0,1)
    wave: Wave,
}

impl Osc {
    #[inline] pub fn new(wave: Wave) -> Self { Self { phase: 0.0, wave } }

    #[inline] pub fn wave(&self) -> Wave { self.wave }

    /// Return the sample at the current phase, then advance by `freq / sr`.
    #[inline]
    pub fn next(&mut self, freq_hz: f32, sr: f32) -> f32 {
        let s = osc_sample(self.phase, self.wave);
        self.phase = (self.phase + freq_hz.max(0.0) / sr) % 1.0;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_completes_one_cycle_per_period() {
        let sr = 48_000.0;
        let mut o = Osc::new(Wave::Sine);
        let first = o.next(480.0, sr);
        for _ in 0..99 { o.next(480.0, sr); }
        let again = o.next(480.0, sr);
        assert!(first.abs() < 1e-3);
        assert!((again - first).abs() < 1e-2, "again={again}");
    }

    #[test]
    fn outputs_stay_in_unit_range() {
        for wave in [Wave::Sine, Wave::Tri, Wave::Saw] {
            let mut o = Osc::new(wave);
            for _ in 0..1000 {
                let s = o.next(1234.5, 44_100.0);
                assert!((-1.0 - 1e-3..=1.0 + 1e-3).contains(&s), "{wave:?} {s}");
            }
        }
    }
}
