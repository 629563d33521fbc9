//! Jingle Core — DSP primitives for the Jingle toy synthesizer.
//!
//! Features
//! - `fast-math`: enable approximations for exp/sin on the per-sample path
//!
//! Modules
//! - [`dsp`]        : math helpers (clamp/lerp, one-pole coefficients, decay curve, fast sine)
//! - [`automation`] : parameters driven by set / linear-ramp / set-target events
//! - [`envelopes`]  : per-note attack / hold / release shape
//! - [`convolver`]  : uniformly partitioned FFT convolution for the reverb
//!
//! Design
//! - Allocation happens at construction; per-sample calls are allocation-free
//! - Times on automation events are absolute seconds of the renderer clock

pub mod automation;
pub mod convolver;
pub mod dsp;
pub mod envelopes;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::automation::{AutomatedParam, AutomationEvent};
    pub use crate::convolver::{Convolver, DEFAULT_BLOCK};
    pub use crate::dsp::{clamp, decay_curve, fast_sin, kill_denormals, lerp, one_pole_coeff_s, TAU};
    pub use crate::envelopes::NoteEnvelope;
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let mut p = AutomatedParam::new(0.0, 48000.0);
        for ev in NoteEnvelope::default().events(0.0, 0.25) {
            p.schedule(ev);
        }
        let _ = p.next(0.1);
        let mut c = Convolver::new(&[1.0, 0.5], 16);
        let _ = c.process(0.1);
    }
}
