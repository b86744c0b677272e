//! Power tracking and feedback leveling.
//!
//! [`FeedbackLeveler`] keeps a self-oscillating loop at a target power
//! without a hard clipper: it measures smoothed power with a
//! [`PowerFollower`] and scales the signal by `1 - strength * (power - target)`.
//!
//! ```text
//! p[n]   = f * x[n]^2 + (1 - f) * p[n-1]
//! y[n]   = x[n] * (1 - strength * (p[n] - target))
//! ```
//!
//! In [`LevelerMode::Compress`] only excess power is pulled down; in
//! [`LevelerMode::Normalize`] quiet signals are pushed up as well.

use crate::flush_denormal;

/// Smoothed signal power.
#[derive(Debug, Clone)]
pub struct PowerFollower {
    factor: f32,
    one_minus_factor: f32,
    current: f32,
}

impl PowerFollower {
    /// Create a follower with per-sample smoothing `factor` (clamped to `[0, 1]`).
    pub fn new(factor: f32) -> Self {
        let mut p = Self {
            factor: 0.0,
            one_minus_factor: 1.0,
            current: 0.0,
        };
        p.set_factor(factor);
        p
    }

    /// Smoothing factor per sample.
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor.clamp(0.0, 1.0);
        self.one_minus_factor = 1.0 - self.factor;
    }

    /// Feed one sample and return the smoothed power.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        self.current =
            flush_denormal(self.factor * input * input + self.one_minus_factor * self.current);
        self.current
    }

    /// Smoothed power without advancing.
    #[inline]
    pub fn sample(&self) -> f32 {
        self.current
    }

    /// Clear the accumulated power.
    pub fn reset(&mut self) {
        self.current = 0.0;
    }
}

/// How a [`FeedbackLeveler`] reacts to power below target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelerMode {
    /// Attenuate only when above target.
    #[default]
    Compress,
    /// Attenuate above target, boost below it.
    Normalize,
}

/// Soft gain control for feedback loops.
#[derive(Debug, Clone)]
pub struct FeedbackLeveler {
    follower: PowerFollower,
    target: f32,
    strength: f32,
    mode: LevelerMode,
    last_out: f32,
}

impl FeedbackLeveler {
    /// Create a leveler.
    ///
    /// * `target` - power the loop settles at
    /// * `factor` - power follower smoothing per sample
    /// * `strength` - how hard deviations are corrected
    pub fn new(target: f32, factor: f32, strength: f32, mode: LevelerMode) -> Self {
        Self {
            follower: PowerFollower::new(factor),
            target: target.max(0.0),
            strength: strength.max(0.0),
            mode,
            last_out: 0.0,
        }
    }

    /// Target power.
    pub fn set_target_level(&mut self, target: f32) {
        self.target = target.max(0.0);
    }

    /// Correction strength.
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.max(0.0);
    }

    /// Power follower smoothing factor.
    pub fn set_factor(&mut self, factor: f32) {
        self.follower.set_factor(factor);
    }

    /// Compression or normalization.
    pub fn set_mode(&mut self, mode: LevelerMode) {
        self.mode = mode;
    }

    /// Process one sample.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let mut diff = self.follower.tick(input) - self.target;
        if self.mode == LevelerMode::Compress && diff < 0.0 {
            diff = 0.0;
        }
        self.last_out = input * (1.0 - self.strength * diff);
        self.last_out
    }

    /// Last output.
    pub fn sample(&self) -> f32 {
        self.last_out
    }

    /// Clear the power estimate.
    pub fn reset(&mut self) {
        self.follower.reset();
        self.last_out = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_tracks_square_wave_power() {
        let mut p = PowerFollower::new(0.01);
        for i in 0..5000 {
            p.tick(if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        assert!((p.sample() - 0.25).abs() < 1e-4);
    }

    #[test]
    fn compress_mode_ignores_quiet_input() {
        let mut lev = FeedbackLeveler::new(0.5, 0.01, 1.0, LevelerMode::Compress);
        for _ in 0..1000 {
            assert_eq!(lev.tick(0.1), 0.1);
        }
    }

    #[test]
    fn normalize_mode_boosts_quiet_input() {
        let mut lev = FeedbackLeveler::new(0.5, 0.01, 1.0, LevelerMode::Normalize);
        let mut out = 0.0;
        for _ in 0..1000 {
            out = lev.tick(0.1);
        }
        assert!(out > 0.1);
    }

    #[test]
    fn loud_input_is_pulled_down() {
        let mut lev = FeedbackLeveler::new(0.1, 0.05, 0.5, LevelerMode::Compress);
        let mut out = 0.0;
        for _ in 0..1000 {
            out = lev.tick(1.0);
        }
        assert!(out < 1.0 && out > 0.0, "out = {}", out);
    }
}
