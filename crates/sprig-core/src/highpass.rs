//! First-order highpass (DC blocker).
//!
//! ```text
//! H(z) = (1 - z^-1) / (1 - R * z^-1),   R = 1 - 2π * f_c / f_s
//! ```
//!
//! Waveguide loops put one of these in the feedback path so that offsets
//! injected by nonlinear leveling never accumulate.
//!
//! Reference: Julius O. Smith, "Introduction to Digital Filters", DC Blocker.

use core::f32::consts::TAU;

use crate::flush_denormal;
use crate::module::Module;
use crate::pool::Pool;

/// DC blocking highpass.
///
/// ## Example
///
/// ```rust
/// use sprig_core::Highpass;
///
/// let mut hp = Highpass::new(48000.0, 13.0);
/// let mut out = 0.0;
/// for _ in 0..48000 {
///     out = hp.tick(0.5);
/// }
/// assert!(out.abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct Highpass {
    r: f32,
    freq: f32,
    sample_rate: f32,
    x_prev: f32,
    y_prev: f32,
}

impl Highpass {
    /// Create a highpass with the given cutoff.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let mut hp = Self {
            r: 0.995,
            freq: freq_hz,
            sample_rate,
            x_prev: 0.0,
            y_prev: 0.0,
        };
        hp.recalculate_coeff();
        hp
    }

    /// Set the cutoff frequency in Hz.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.freq = freq_hz;
        self.recalculate_coeff();
    }

    /// Cutoff frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Update sample rate and recalculate R.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    fn recalculate_coeff(&mut self) {
        self.r = (1.0 - TAU * self.freq.max(0.0) / self.sample_rate).clamp(0.0, 0.9999);
    }

    /// Process one sample.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let out = flush_denormal(input - self.x_prev + self.r * self.y_prev);
        self.x_prev = input;
        self.y_prev = out;
        out
    }

    /// Clear filter history.
    pub fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }
}

impl Module for Highpass {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick(input)
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        Highpass::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_dc() {
        let mut hp = Highpass::new(48000.0, 20.0);
        let mut out = 1.0;
        for _ in 0..48000 {
            out = hp.tick(1.0);
        }
        assert!(out.abs() < 1e-4, "DC remained: {out}");
    }

    #[test]
    fn passes_audio_band() {
        let mut hp = Highpass::new(48000.0, 13.0);
        let mut peak = 0.0f32;
        for i in 0..48000 {
            let x = libm::sinf(core::f32::consts::TAU * 1000.0 * i as f32 / 48000.0);
            let y = hp.tick(x);
            if i > 4800 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.98, "1 kHz attenuated to {peak}");
    }
}
