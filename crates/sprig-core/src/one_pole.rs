//! One-pole filter for loop damping and control smoothing.
//!
//! ```text
//! y[n] = gain * b0 * x[n] + pole * y[n-1]
//! ```
//!
//! with `b0 = 1 - |pole|` so that DC gain is `gain` for any pole. A positive
//! pole is a lowpass; a negative pole is a highpass tilt. Waveguide strings
//! use it at the bridge and nut, where `set_pole` maps "damping" directly.
//!
//! # Usage
//!
//! ```rust
//! use sprig_core::OnePole;
//!
//! let mut lp = OnePole::new(48000.0, 4000.0);
//! let filtered = lp.tick(1.0);
//! assert!(filtered < 1.0);
//! ```
//!
//! # Reference
//!
//! Julius O. Smith III, "Introduction to Digital Filters with Audio Applications",
//! Section: One-Pole Filter.

use crate::flush_denormal;
use crate::module::Module;
use crate::pool::Pool;
use libm::expf;

/// Largest pole magnitude accepted; keeps the filter strictly stable.
const MAX_POLE: f32 = 0.99999;

/// One-pole IIR filter.
///
/// # Invariants
///
/// - `|pole| <= 0.99999`
/// - `state` is flushed to zero when below 1e-20
#[derive(Debug, Clone)]
pub struct OnePole {
    state: f32,
    pole: f32,
    b0: f32,
    gain: f32,
    sample_rate: f32,
}

impl OnePole {
    /// Create a lowpass with the given -3 dB frequency.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let mut filter = Self::with_pole(0.0);
        filter.sample_rate = sample_rate;
        filter.set_frequency(freq_hz);
        filter
    }

    /// Create a filter with an explicit pole (sample-rate independent).
    pub fn with_pole(pole: f32) -> Self {
        let mut filter = Self {
            state: 0.0,
            pole: 0.0,
            b0: 1.0,
            gain: 1.0,
            sample_rate: 48000.0,
        };
        filter.set_pole(pole);
        filter
    }

    /// Place the pole directly. Clamped to ±0.99999.
    pub fn set_pole(&mut self, pole: f32) {
        self.pole = pole.clamp(-MAX_POLE, MAX_POLE);
        self.b0 = 1.0 - self.pole.abs();
    }

    /// Set the lowpass cutoff. Range: 0 to `sample_rate / 2` Hz.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        let freq = freq_hz.clamp(0.0, self.sample_rate * 0.5);
        self.set_pole(expf(-core::f32::consts::TAU * freq / self.sample_rate));
    }

    /// Output gain.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Current pole.
    pub fn pole(&self) -> f32 {
        self.pole
    }

    /// Last output.
    pub fn last_out(&self) -> f32 {
        self.state
    }

    /// Process one sample.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        self.state = flush_denormal(self.gain * self.b0 * input + self.pole * self.state);
        self.state
    }

    /// Reset filter state to zero.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    /// Update sample rate. The pole is kept; call `set_frequency` again to
    /// re-derive it.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }
}

impl Module for OnePole {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick(input)
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        OnePole::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_dc() {
        let mut lp = OnePole::new(48000.0, 1000.0);
        let mut out = 0.0;
        for _ in 0..48000 {
            out = lp.tick(1.0);
        }
        assert!((out - 1.0).abs() < 1e-4, "DC should pass through, got {out}");
    }

    #[test]
    fn attenuates_high_freq() {
        let mut lp = OnePole::new(48000.0, 100.0);
        let mut sum = 0.0f32;
        for i in 0..4800 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            sum += lp.tick(input).abs();
        }
        let avg = sum / 4800.0;
        assert!(avg < 0.05, "Nyquist signal should be heavily attenuated, avg = {avg}");
    }

    #[test]
    fn pole_is_clamped() {
        let mut f = OnePole::with_pole(2.0);
        assert_eq!(f.pole(), MAX_POLE);
        f.set_pole(-3.0);
        assert_eq!(f.pole(), -MAX_POLE);
    }

    #[test]
    fn gain_scales_output() {
        let mut f = OnePole::with_pole(0.0);
        f.set_gain(0.5);
        assert_eq!(f.tick(1.0), 0.5);
    }
}
