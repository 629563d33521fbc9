//! Live modulation of a running session.
//!
//! Volume, pitch and reverb changes glide to their new value with a short
//! exponential approach starting at the backend's current time, so a knob
//! move never produces a click. Tempo is not handled here: a committed tempo
//! restarts the scheduler loop instead.

use crate::backend::{AudioBackend, BackendResult, ParamKind};
use crate::config::TimingConfig;
use crate::graph::mix_levels;
use crate::scheduler::PlaybackSession;

use jingle_core::automation::AutomationEvent;

/// Glide time constants in seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Modulator {
    pub volume_glide_s: f32,
    pub pitch_glide_s: f32,
    pub reverb_glide_s: f32,
}

impl Default for Modulator {
    fn default() -> Self { Self::from_timing(&TimingConfig::default()) }
}

impl Modulator {
    pub fn from_timing(t: &TimingConfig) -> Self {
        Self {
            volume_glide_s: t.volume_glide_ms / 1000.0,
            pitch_glide_s: t.pitch_glide_ms / 1000.0,
            reverb_glide_s: t.reverb_glide_ms / 1000.0,
        }
    }

    /// Glide the master gain to `volume` (0..=1).
    pub fn apply_volume<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        session: &PlaybackSession,
        volume: f32,
    ) -> BackendResult {
        let time = backend.current_time();
        backend.automate(
            session.graph().master,
            ParamKind::Gain,
            AutomationEvent::SetTarget { target: volume, time, time_constant: self.volume_glide_s },
        )
    }

    /// Retune every in-flight note to `base * multiplier`.
    ///
    /// Notes produced later pick up the multiplier on their own.
    pub fn apply_pitch<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        session: &PlaybackSession,
        multiplier: f32,
    ) -> BackendResult {
        let time = backend.current_time();
        for h in session.active_sounds() {
            backend.automate(
                h.oscillator,
                ParamKind::Frequency,
                AutomationEvent::SetTarget {
                    target: h.base_frequency_hz * multiplier,
                    time,
                    time_constant: self.pitch_glide_s,
                },
            )?;
        }
        Ok(())
    }

    /// Glide the dry and wet gains to the levels for `mix` (0..=1).
    pub fn apply_reverb<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        session: &PlaybackSession,
        mix: f32,
    ) -> BackendResult {
        let (dry, wet) = mix_levels(mix);
        let time = backend.current_time();
        let tc = self.reverb_glide_s;
        let g = session.graph();
        backend.automate(g.dry, ParamKind::Gain, AutomationEvent::SetTarget { target: dry, time, time_constant: tc })?;
        backend.automate(g.wet, ParamKind::Gain, AutomationEvent::SetTarget { target: wet, time, time_constant: tc })
    }
}
