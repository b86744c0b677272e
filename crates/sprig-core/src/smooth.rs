//! Smoothing primitives for zipper-free control changes.
//!
//! | Type | Shape | Time base | Typical use |
//! |---|---|---|---|
//! | [`Ramp`] | linear, exact arrival | milliseconds | knobs, retrigger fades |
//! | [`RampUpDown`] | linear, separate rise/fall | milliseconds | gates, envelopes of envelopes |
//! | [`ExpSmooth`] | one-pole | per-tick factor | waveguide lengths, pitch glide |
//! | [`Slide`] | asymmetric one-pole | samples | followers, portamento |
//!
//! All four are pointer-free: they embed their state inline and need no pool.
//!
//! ## Usage
//!
//! ```rust
//! use sprig_core::Ramp;
//!
//! let mut knob = Ramp::new(48000.0, 7.0, 1);
//! knob.set_dest(1.0);
//! let mut last = 0.0;
//! for _ in 0..336 {
//!     last = knob.tick();
//! }
//! assert_eq!(last, 1.0);
//! ```

use crate::context::Context;
use crate::math::{flush_denormal, ms_to_samples};

/// Number of ticks a ramp of `time_ms` takes at `sample_rate`.
fn ramp_steps(time_ms: f32, sample_rate: f32, samples_per_tick: usize) -> u32 {
    let ticks = ms_to_samples(time_ms, sample_rate) / samples_per_tick as f32;
    if ticks.is_finite() && ticks > 0.0 {
        libm::ceilf(ticks) as u32
    } else {
        0
    }
}

/// Linear ramp toward a destination.
///
/// A new destination starts a fresh ramp from the current value that lands
/// exactly on the destination after `ceil(time * sr / 1000 / samples_per_tick)`
/// ticks. The value never passes the destination.
#[derive(Debug, Clone)]
pub struct Ramp {
    current: f32,
    dest: f32,
    inc: f32,
    remaining: u32,
    time_ms: f32,
    samples_per_tick: usize,
    sample_rate: f32,
}

impl Ramp {
    /// Create a ramp resting at 0.
    ///
    /// `samples_per_tick` is how many samples elapse between calls to
    /// [`tick`](Self::tick): 1 at audio rate, the block size at control rate.
    pub fn new(sample_rate: f32, time_ms: f32, samples_per_tick: usize) -> Self {
        Self {
            current: 0.0,
            dest: 0.0,
            inc: 0.0,
            remaining: 0,
            time_ms: time_ms.max(0.0),
            samples_per_tick: samples_per_tick.max(1),
            sample_rate,
        }
    }

    /// Create a ramp using the context's sample rate.
    pub fn init(ctx: &Context<'_>, time_ms: f32, samples_per_tick: usize) -> Self {
        Self::new(ctx.sample_rate(), time_ms, samples_per_tick)
    }

    /// Start ramping toward `dest`.
    pub fn set_dest(&mut self, dest: f32) {
        self.dest = dest;
        self.remaining = ramp_steps(self.time_ms, self.sample_rate, self.samples_per_tick);
        if self.remaining == 0 {
            self.current = dest;
            self.inc = 0.0;
        } else {
            self.inc = (dest - self.current) / self.remaining as f32;
        }
    }

    /// Jump to `value` and stop.
    pub fn set_val(&mut self, value: f32) {
        self.current = value;
        self.dest = value;
        self.inc = 0.0;
        self.remaining = 0;
    }

    /// Ramp time in milliseconds. Takes effect on the next `set_dest`.
    pub fn set_time(&mut self, time_ms: f32) {
        self.time_ms = time_ms.max(0.0);
    }

    /// Update sample rate. Takes effect on the next `set_dest`.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Advance one tick.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.dest;
            } else {
                self.current += self.inc;
                self.current = if self.inc > 0.0 {
                    self.current.min(self.dest)
                } else {
                    self.current.max(self.dest)
                };
            }
        }
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn sample(&self) -> f32 {
        self.current
    }

    /// Destination.
    pub fn dest(&self) -> f32 {
        self.dest
    }

    /// True once the destination has been reached.
    pub fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

/// Linear ramp with independent rise and fall times.
#[derive(Debug, Clone)]
pub struct RampUpDown {
    ramp: Ramp,
    up_ms: f32,
    down_ms: f32,
}

impl RampUpDown {
    /// Create a ramp resting at 0.
    pub fn new(sample_rate: f32, up_ms: f32, down_ms: f32, samples_per_tick: usize) -> Self {
        Self {
            ramp: Ramp::new(sample_rate, up_ms, samples_per_tick),
            up_ms: up_ms.max(0.0),
            down_ms: down_ms.max(0.0),
        }
    }

    /// Create a ramp using the context's sample rate.
    pub fn init(ctx: &Context<'_>, up_ms: f32, down_ms: f32, samples_per_tick: usize) -> Self {
        Self::new(ctx.sample_rate(), up_ms, down_ms, samples_per_tick)
    }

    /// Start ramping toward `dest` using the rise or fall time as appropriate.
    pub fn set_dest(&mut self, dest: f32) {
        let time = if dest >= self.ramp.sample() {
            self.up_ms
        } else {
            self.down_ms
        };
        self.ramp.set_time(time);
        self.ramp.set_dest(dest);
    }

    /// Jump to `value` and stop.
    pub fn set_val(&mut self, value: f32) {
        self.ramp.set_val(value);
    }

    /// Rise time in milliseconds.
    pub fn set_up_time(&mut self, up_ms: f32) {
        self.up_ms = up_ms.max(0.0);
    }

    /// Fall time in milliseconds.
    pub fn set_down_time(&mut self, down_ms: f32) {
        self.down_ms = down_ms.max(0.0);
    }

    /// Update sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.ramp.set_sample_rate(sample_rate);
    }

    /// Advance one tick.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.ramp.tick()
    }

    /// Current value without advancing.
    #[inline]
    pub fn sample(&self) -> f32 {
        self.ramp.sample()
    }
}

/// One-pole exponential smoother.
///
/// `current = factor * dest + (1 - factor) * current` every tick. The factor
/// is per tick, so the smoothing time scales with the tick rate.
#[derive(Debug, Clone)]
pub struct ExpSmooth {
    current: f32,
    dest: f32,
    factor: f32,
    one_minus_factor: f32,
}

impl ExpSmooth {
    /// Create a smoother resting at `value`. `factor` is clamped to `[0, 1]`.
    pub fn new(value: f32, factor: f32) -> Self {
        let mut s = Self {
            current: value,
            dest: value,
            factor: 0.0,
            one_minus_factor: 1.0,
        };
        s.set_factor(factor);
        s
    }

    /// Per-tick smoothing factor. 1.0 jumps immediately, 0.0 freezes.
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor.clamp(0.0, 1.0);
        self.one_minus_factor = 1.0 - self.factor;
    }

    /// New destination.
    pub fn set_dest(&mut self, dest: f32) {
        self.dest = dest;
    }

    /// Jump the current value without moving the destination.
    pub fn set_val(&mut self, value: f32) {
        self.current = value;
    }

    /// Jump both value and destination.
    pub fn set_val_and_dest(&mut self, value: f32) {
        self.current = value;
        self.dest = value;
    }

    /// Advance one tick.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.current = self.factor * self.dest + self.one_minus_factor * self.current;
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn sample(&self) -> f32 {
        self.current
    }

    /// Destination.
    pub fn dest(&self) -> f32 {
        self.dest
    }
}

/// Asymmetric slide (Max `slide~`).
///
/// `y += (x - y) / slide` where `slide` is the up or down time in samples
/// depending on the direction of travel. A slide of 1 follows the input.
#[derive(Debug, Clone)]
pub struct Slide {
    current: f32,
    dest: f32,
    inv_up: f32,
    inv_down: f32,
}

impl Slide {
    /// Create a slide. Times are in samples and floored at 1.
    pub fn new(up_slide: f32, down_slide: f32) -> Self {
        let mut s = Self {
            current: 0.0,
            dest: 0.0,
            inv_up: 1.0,
            inv_down: 1.0,
        };
        s.set_up_slide(up_slide);
        s.set_down_slide(down_slide);
        s
    }

    /// Rise time in samples.
    pub fn set_up_slide(&mut self, up_slide: f32) {
        self.inv_up = 1.0 / up_slide.max(1.0);
    }

    /// Fall time in samples.
    pub fn set_down_slide(&mut self, down_slide: f32) {
        self.inv_down = 1.0 / down_slide.max(1.0);
    }

    /// Destination used by [`tick_no_input`](Self::tick_no_input).
    pub fn set_dest(&mut self, dest: f32) {
        self.dest = dest;
    }

    /// Slide toward `input`.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let inv = if input >= self.current {
            self.inv_up
        } else {
            self.inv_down
        };
        self.current = flush_denormal(self.current + (input - self.current) * inv);
        self.current
    }

    /// Slide toward the stored destination.
    #[inline]
    pub fn tick_no_input(&mut self) -> f32 {
        self.tick(self.dest)
    }

    /// Current value without advancing.
    #[inline]
    pub fn sample(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_arrives_exactly_without_overshoot() {
        let mut r = Ramp::new(48000.0, 7.0, 1);
        r.set_dest(1.0);
        let mut prev = 0.0;
        for i in 0..336 {
            let v = r.tick();
            assert!(v >= prev && v <= 1.0, "sample {}: {}", i, v);
            prev = v;
        }
        assert_eq!(prev, 1.0);
        assert!(r.is_settled());
    }

    #[test]
    fn ramp_retarget_starts_from_current() {
        let mut r = Ramp::new(48000.0, 1.0, 1);
        r.set_dest(1.0);
        for _ in 0..24 {
            r.tick();
        }
        let mid = r.sample();
        r.set_dest(0.0);
        let next = r.tick();
        assert!(next < mid && next > 0.0);
    }

    #[test]
    fn zero_time_ramp_jumps() {
        let mut r = Ramp::new(48000.0, 0.0, 1);
        r.set_dest(0.3);
        assert_eq!(r.sample(), 0.3);
    }

    #[test]
    fn block_rate_ramp_counts_ticks() {
        let mut r = Ramp::new(48000.0, 10.0, 16);
        r.set_dest(-2.0);
        // 480 samples / 16 per tick = 30 ticks
        for _ in 0..29 {
            assert!(r.tick() > -2.0);
        }
        assert_eq!(r.tick(), -2.0);
    }

    #[test]
    fn up_down_uses_direction() {
        let mut r = RampUpDown::new(48000.0, 1.0, 10.0, 1);
        r.set_dest(1.0);
        for _ in 0..48 {
            r.tick();
        }
        assert_eq!(r.sample(), 1.0);
        r.set_dest(0.0);
        for _ in 0..48 {
            r.tick();
        }
        assert!(r.sample() > 0.85, "fall should take 480 samples");
    }

    #[test]
    fn exp_smooth_converges() {
        let mut s = ExpSmooth::new(0.0, 0.01);
        s.set_dest(1.0);
        for _ in 0..2000 {
            s.tick();
        }
        assert!((s.sample() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn slide_is_asymmetric() {
        let mut s = Slide::new(1.0, 100.0);
        assert_eq!(s.tick(1.0), 1.0);
        let v = s.tick(0.0);
        assert!((v - 0.99).abs() < 1e-6);
    }
}
