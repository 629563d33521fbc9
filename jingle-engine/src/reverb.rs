//! Reverb impulse responses.
//!
//! The reverb is a convolution with a synthetic room: two channels of white
//! noise under a polynomial decay envelope. Sample `i` of a buffer of `len`
//! frames is `uniform(-1, 1) * ((len - i) / len)^decay`, drawn independently
//! per channel. The shape is fixed, the noise is not seeded.

use jingle_core::dsp::decay_curve;
use rand::Rng;

pub const DEFAULT_IMPULSE_SECONDS: f32 = 2.0;
pub const DEFAULT_IMPULSE_DECAY: f32 = 2.0;

/// Stereo impulse response.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpulseBuffer {
    sample_rate: f32,
    channels: [Vec<f32>; 2],
}

impl ImpulseBuffer {
    #[inline] pub fn sample_rate(&self) -> f32 { self.sample_rate }
    #[inline] pub fn len(&self) -> usize { self.channels[0].len() }
    #[inline] pub fn is_empty(&self) -> bool { self.channels[0].is_empty() }
    #[inline] pub fn channel_count(&self) -> usize { self.channels.len() }
    #[inline] pub fn channel(&self, ch: usize) -> &[f32] { &self.channels[ch] }

    /// Largest absolute sample over both channels.
    pub fn peak(&self) -> f32 {
        self.channels.iter().flatten().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

/// Impulse with the thread-local RNG.
pub fn generate_impulse(duration_s: f32, decay: f32, sample_rate: f32) -> ImpulseBuffer {
    generate_impulse_with(&mut rand::thread_rng(), duration_s, decay, sample_rate)
}

/// Impulse from a caller-supplied RNG.
pub fn generate_impulse_with<R: Rng>(rng: &mut R, duration_s: f32, decay: f32, sample_rate: f32) -> ImpulseBuffer {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (duration_s.max(0.0) * sample_rate.max(0.0)) as usize;
    #[allow(clippy::cast_precision_loss)]
    let lenf = len as f32;
    let mut fill = || -> Vec<f32> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let remaining = (len - i) as f32 / lenf;
                rng.gen_range(-1.0f32..=1.0) * decay_curve(remaining, decay)
            })
            .collect()
    };
    let left = fill();
    let right = fill();
    ImpulseBuffer { sample_rate, channels: [left, right] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn length_and_channels_follow_duration_and_rate() {
        let ir = generate_impulse(2.0, 2.0, 8000.0);
        assert_eq!(ir.channel_count(), 2);
        assert_eq!(ir.len(), 16_000);
        assert_eq!(ir.channel(1).len(), 16_000);
    }

    #[test]
    fn samples_stay_under_decay_envelope() {
        let ir = generate_impulse(0.5, 2.0, 4000.0);
        let len = ir.len() as f32;
        for ch in 0..2 {
            for (i, s) in ir.channel(ch).iter().enumerate() {
                let bound = ((len - i as f32) / len).powf(2.0);
                assert!(s.abs() <= bound + 1e-6, "ch={ch} i={i} s={s} bound={bound}");
            }
        }
    }

    #[test]
    fn energy_decays_towards_the_tail() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = generate_impulse_with(&mut rng, 1.0, 2.0, 8000.0);
        let q = ir.len() / 4;
        let energy = |s: &[f32]| s.iter().map(|v| v * v).sum::<f32>();
        let head = energy(&ir.channel(0)[..q]);
        let tail = energy(&ir.channel(0)[3 * q..]);
        assert!(head > 10.0 * tail, "head={head} tail={tail}");
    }

    #[test]
    fn channels_are_independent_noise() {
        let ir = generate_impulse(0.1, 2.0, 8000.0);
        assert_ne!(ir.channel(0), ir.channel(1));
        assert!(ir.peak() <= 1.0);
    }

    #[test]
    fn zero_duration_gives_empty_buffer() {
        assert!(generate_impulse(0.0, 2.0, 48_000.0).is_empty());
    }
}
