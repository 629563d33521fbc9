//! Uniformly partitioned FFT convolution (overlap-save).
//!
//! The impulse response is cut into `P` blocks of `B` samples; each block is
//! transformed once at construction (`N = 2B` point FFT). Input is gathered in
//! blocks of `B`; each full block is transformed, pushed into a frequency-domain
//! delay line, multiplied against the impulse partitions and summed, and the
//! last `B` samples of the inverse transform are the output block.
//!
//! Latency is one block (`B` samples). Per-sample `process` hides the blocking.
//! Allocation only happens in `new`.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::dsp::kill_denormals;

/// Default partition size; ~10.7 ms latency at 48 kHz.
pub const DEFAULT_BLOCK: usize = 512;

/// Single-channel partitioned convolver.
pub struct Convolver {
    block: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    // impulse partitions, frequency domain
    parts: Vec<Vec<Complex<f32>>>,
    // frequency-domain delay line, ring indexed by `fdl_head`
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_head: usize,
    // previous block + current block of time-domain input
    window: Vec<f32>,
    fill: usize,
    out: Vec<f32>,
    out_pos: usize,
    acc: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl core::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Convolver")
            .field("block", &self.block)
            .field("partitions", &self.parts.len())
            .finish()
    }
}

impl Convolver {
    /// Build a convolver for `impulse` with partition size `block` (rounded up
    /// to a power of two, at least 16).
    pub fn new(impulse: &[f32], block: usize) -> Self {
        let block = block.max(16).next_power_of_two();
        let n = block * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex::default(); scratch_len];

        let count = impulse.len().div_ceil(block).max(1);
        let mut parts = Vec::with_capacity(count);
        for p in 0..count {
            let mut buf = vec![Complex::default(); n];
            let lo = (p * block).min(impulse.len());
            let hi = ((p + 1) * block).min(impulse.len());
            for (dst, &s) in buf.iter_mut().zip(&impulse[lo..hi]) {
                *dst = Complex::new(s, 0.0);
            }
            fft.process_with_scratch(&mut buf, &mut scratch);
            parts.push(buf);
        }

        Self {
            block,
            fft,
            ifft,
            fdl: vec![vec![Complex::default(); n]; count],
            parts,
            fdl_head: 0,
            window: vec![0.0; n],
            fill: 0,
            out: vec![0.0; block],
            out_pos: 0,
            acc: vec![Complex::default(); n],
            scratch,
        }
    }

    #[inline] pub fn block_size(&self) -> usize { self.block }
    #[inline] pub fn partitions(&self) -> usize { self.parts.len() }

    /// Push one input sample, get one output sample (delayed by one block).
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.out[self.out_pos];
        self.window[self.block + self.fill] = x;
        self.fill += 1;
        self.out_pos += 1;
        if self.fill == self.block {
            self.run_block();
            self.fill = 0;
            self.out_pos = 0;
        }
        y
    }

    /// Clear all internal state (the impulse is kept).
    pub fn reset(&mut self) {
        for slot in &mut self.fdl {
            slot.fill(Complex::default());
        }
        self.window.fill(0.0);
        self.out.fill(0.0);
        self.fill = 0;
        self.out_pos = 0;
    }

    fn run_block(&mut self) {
        let n = self.block * 2;
        let count = self.parts.len();

        // newest spectrum goes one slot "behind" the previous head
        self.fdl_head = (self.fdl_head + count - 1) % count;
        {
            let slot = &mut self.fdl[self.fdl_head];
            for (dst, &s) in slot.iter_mut().zip(&self.window) {
                *dst = Complex::new(s, 0.0);
            }
            self.fft.process_with_scratch(slot, &mut self.scratch);
        }

        self.acc.fill(Complex::default());
        for (p, part) in self.parts.iter().enumerate() {
            let x = &self.fdl[(self.fdl_head + p) % count];
            for ((a, xs), hs) in self.acc.iter_mut().zip(x).zip(part) {
                *a += xs * hs;
            }
        }
        self.ifft.process_with_scratch(&mut self.acc, &mut self.scratch);

        #[allow(clippy::cast_precision_loss)]
        let norm = 1.0 / n as f32;
        for (o, c) in self.out.iter_mut().zip(&self.acc[self.block..]) {
            *o = kill_denormals(c.re * norm);
        }

        // slide: current block becomes the previous block
        self.window.copy_within(self.block.., 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len()];
        for n in 0..x.len() {
            for (k, &hk) in h.iter().enumerate() {
                if k <= n {
                    y[n] += hk * x[n - k];
                }
            }
        }
        y
    }

    #[test]
    fn impulse_in_yields_impulse_response_after_one_block() {
        let h: Vec<f32> = (0..100).map(|i| 1.0 - i as f32 / 100.0).collect();
        let mut c = Convolver::new(&h, 32);
        let mut out = Vec::new();
        for i in 0..256 {
            out.push(c.process(if i == 0 { 1.0 } else { 0.0 }));
        }
        let b = c.block_size();
        for (i, &hv) in h.iter().enumerate() {
            assert!((out[b + i] - hv).abs() < 1e-4, "i={i} got={} want={hv}", out[b + i]);
        }
        assert!(out[..b].iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn matches_direct_convolution_across_partitions() {
        let h: Vec<f32> = (0..70).map(|i| ((i * 7919) % 13) as f32 / 13.0 - 0.5).collect();
        let x: Vec<f32> = (0..300).map(|i| ((i * 104_729) % 17) as f32 / 17.0 - 0.5).collect();
        let mut c = Convolver::new(&h, 16);
        let b = c.block_size();
        let got: Vec<f32> = x.iter().map(|&s| c.process(s)).collect();
        let want = direct(&x, &h);
        for n in 0..(x.len() - b) {
            assert!((got[n + b] - want[n]).abs() < 1e-3, "n={n} got={} want={}", got[n + b], want[n]);
        }
    }

    #[test]
    fn reset_silences_tail() {
        let mut c = Convolver::new(&[1.0; 64], 16);
        for _ in 0..40 { c.process(1.0); }
        c.reset();
        for _ in 0..200 {
            assert_eq!(c.process(0.0), 0.0);
        }
    }
}
