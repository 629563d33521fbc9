//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - Math backend selection in one place (`fast-math` swaps in approximations)
//! - Clean, side-effect free helpers that are easy to test
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    if #[cfg(feature = "fast-math")] {
        #[inline] fn m_exp(x: f32) -> f32 {
            // exp(x) = 2^(x / ln 2), split into integer and fractional parts.
            let y = x * core::f32::consts::LOG2_E;
            let i = y.floor();
            let f = y - i;
            let p = 1.0 + f * (0.693_147_18 + f * (0.240_226_5 + f * 0.055_504_11));
            p * (i as i32 as f32).exp2()
        }
    } else {
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

/// Decay envelope used by the reverb impulse: `remaining^exponent`.
///
/// `remaining` is the fraction of the buffer still ahead of the sample, in
/// `(0, 1]`. The result is monotonic in `remaining` for positive exponents.
#[inline]
pub fn decay_curve(remaining: f32, exponent: f32) -> f32 {
    clamp(remaining, 0.0, 1.0).powf(exponent)
}

// --------------------------------- Fast trig -------------------------------------

/// Sine of `x` radians.
///
/// With `fast-math` this uses range reduction into [-π, π] and a 5th-order
/// odd polynomial (max abs error ~1e-3); otherwise the std implementation.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            x.sin()
        }
    }
}

// --------------------------------- Exponentials / smoothing ----------------------

/// One-pole smoothing coefficient for a time constant `t_s` (seconds).
///
/// The discrete one-pole form: `y[n] += (1 - a) * (x[n] - y[n])`
/// where `a = exp(-1/(tau * sr))`.
///
/// After `t_s` seconds the output has covered ~63% (1 - 1/e) of the distance
/// to the target. A zero or negative time constant jumps immediately (`a = 0`).
#[inline]
pub fn one_pole_coeff_s(t_s: f32, sr: f32) -> f32 {
    if t_s <= 0.0 { return 0.0; }
    m_exp(-1.0 / (t_s * sr.max(1.0)))
}

// --------------------------------- Tests ------------------------------------------
