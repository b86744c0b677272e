//! Pool-backed fractional delay lines for waveguides.
//!
//! # Types
//!
//! - [`LinearDelay`] - linear interpolation, cheap, safe to modulate
//! - [`AllpassDelay`] - first-order allpass interpolation, flat magnitude
//!   response, the usual choice inside a Karplus-Strong loop
//!
//! Both keep their circular buffer in a [`Pool`] block. The tick path
//! borrows the pool only to reach that block.
//!
//! # Timing
//!
//! A delay of `d` returns the input written `d` samples ago, measured from
//! the most recent write: `tick(x)` with `d = 0` returns `x`. Loops that
//! feed `last_out` back on the next tick add one sample on top of `d`.
//!
//! `tick_in` and `tick_out` split a tick in two so that a waveguide can
//! write every line before reading any of them.

use crate::context::Context;
use crate::error::PoolError;
use crate::math::{finite_or_zero, lerp};
use crate::module::Module;
use crate::pool::{Block, Pool};

/// Reads the sample written `delay_int` samples before the last write,
/// interpolating toward one sample older by `frac`.
#[inline]
fn read_linear(buffer: &[f32], write_pos: usize, delay_int: usize, frac: f32) -> f32 {
    let len = buffer.len();
    // read_pos = (write_pos + len - delay_int - 1) % len
    let read_pos = (write_pos + len - delay_int - 1) % len;
    let next_pos = (read_pos + len - 1) % len;
    let a = buffer[read_pos];
    let b = buffer[next_pos];
    lerp(a, b, frac)
}

/// Linearly interpolated delay line.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Discipline, LinearDelay, Pool};
///
/// let mut memory = [0.0f32; 64];
/// let mut pool = Pool::new("delay", &mut memory, Discipline::Stack);
/// let mut delay = LinearDelay::init_to_pool(&mut pool, 2.0, 16).unwrap();
///
/// assert_eq!(delay.tick(&mut pool, 1.0), 0.0);
/// assert_eq!(delay.tick(&mut pool, 0.0), 0.0);
/// assert_eq!(delay.tick(&mut pool, 0.0), 1.0);
/// delay.free(&mut pool).unwrap();
/// ```
#[derive(Debug)]
pub struct LinearDelay {
    block: Block,
    write_pos: usize,
    max_delay: usize,
    delay: f32,
    delay_int: usize,
    frac: f32,
    gain: f32,
    last_in: f32,
    last_out: f32,
}

impl LinearDelay {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, delay: f32, max_delay: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, delay, max_delay))
    }

    /// Allocates from `pool`. `max_delay` is raised to at least one sample.
    pub fn init_to_pool(pool: &mut Pool<'_>, delay: f32, max_delay: usize) -> Result<Self, PoolError> {
        let max_delay = max_delay.max(1);
        let block = pool.allocate(max_delay + 2)?;
        let mut line = Self {
            block,
            write_pos: 0,
            max_delay,
            delay: 0.0,
            delay_int: 0,
            frac: 0.0,
            gain: 1.0,
            last_in: 0.0,
            last_out: 0.0,
        };
        line.set_delay(delay);
        Ok(line)
    }

    /// Returns the buffer to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.block).map_err(PoolError::from)
    }

    /// Set the delay in samples, clamped to `[0, max_delay]`.
    pub fn set_delay(&mut self, delay: f32) {
        let delay = finite_or_zero(delay);
        self.delay = delay.clamp(0.0, self.max_delay as f32);
        self.delay_int = self.delay as usize;
        self.frac = self.delay - self.delay_int as f32;
    }

    /// Current delay in samples.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Longest settable delay.
    pub fn max_delay(&self) -> usize {
        self.max_delay
    }

    /// Input gain applied on write.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Last value written.
    pub fn last_in(&self) -> f32 {
        self.last_in
    }

    /// Last value read.
    pub fn last_out(&self) -> f32 {
        self.last_out
    }

    /// Write then read one sample.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick_in(pool, input);
        self.tick_out(pool)
    }

    /// Write one sample.
    #[inline]
    pub fn tick_in(&mut self, pool: &mut Pool<'_>, input: f32) {
        let buffer = pool.slice_mut(&self.block);
        if buffer.is_empty() {
            return;
        }
        self.last_in = input * self.gain;
        buffer[self.write_pos] = self.last_in;
        self.write_pos = (self.write_pos + 1) % buffer.len();
    }

    /// Read at the current delay relative to the last write.
    #[inline]
    pub fn tick_out(&mut self, pool: &Pool<'_>) -> f32 {
        let buffer = pool.slice(&self.block);
        if buffer.is_empty() {
            return 0.0;
        }
        self.last_out = read_linear(buffer, self.write_pos, self.delay_int, self.frac);
        self.last_out
    }

    /// Read at an arbitrary delay without moving the main tap.
    #[inline]
    pub fn tap_out(&self, pool: &Pool<'_>, delay: f32) -> f32 {
        let buffer = pool.slice(&self.block);
        if buffer.is_empty() {
            return 0.0;
        }
        let delay = delay.clamp(0.0, self.max_delay as f32);
        let delay_int = delay as usize;
        read_linear(buffer, self.write_pos, delay_int, delay - delay_int as f32)
    }

    /// Zero the buffer.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        pool.slice_mut(&self.block).fill(0.0);
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

/// Allpass-interpolated delay line.
///
/// The fractional part `Δ ∈ [0.5, 1.5)` is realized by a first-order
/// allpass with coefficient `(1 - Δ) / (1 + Δ)`, so the shortest delay is
/// half a sample.
///
/// # Reference
///
/// D. A. Jaffe and J. O. Smith, "Extensions of the Karplus-Strong
/// Plucked-String Algorithm", Computer Music Journal 7(2), 1983.
#[derive(Debug)]
pub struct AllpassDelay {
    block: Block,
    write_pos: usize,
    max_delay: usize,
    delay: f32,
    delay_int: usize,
    coeff: f32,
    ap_input: f32,
    gain: f32,
    last_in: f32,
    last_out: f32,
}

impl AllpassDelay {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, delay: f32, max_delay: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, delay, max_delay))
    }

    /// Allocates from `pool`. `max_delay` is raised to at least two samples.
    pub fn init_to_pool(pool: &mut Pool<'_>, delay: f32, max_delay: usize) -> Result<Self, PoolError> {
        let max_delay = max_delay.max(2);
        let block = pool.allocate(max_delay + 2)?;
        let mut line = Self {
            block,
            write_pos: 0,
            max_delay,
            delay: 0.5,
            delay_int: 0,
            coeff: 0.0,
            ap_input: 0.0,
            gain: 1.0,
            last_in: 0.0,
            last_out: 0.0,
        };
        line.set_delay(delay);
        Ok(line)
    }

    /// Returns the buffer to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.block).map_err(PoolError::from)
    }

    /// Set the delay in samples, clamped to `[0.5, max_delay]`.
    pub fn set_delay(&mut self, delay: f32) {
        let delay = if delay.is_finite() { delay } else { 0.5 };
        self.delay = delay.clamp(0.5, self.max_delay as f32);
        let mut whole = libm::floorf(self.delay);
        let mut alpha = self.delay - whole;
        if alpha < 0.5 {
            alpha += 1.0;
            whole -= 1.0;
        }
        self.delay_int = whole.max(0.0) as usize;
        self.coeff = (1.0 - alpha) / (1.0 + alpha);
    }

    /// Current delay in samples.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Longest settable delay.
    pub fn max_delay(&self) -> usize {
        self.max_delay
    }

    /// Input gain applied on write.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Last value written.
    pub fn last_in(&self) -> f32 {
        self.last_in
    }

    /// Last value read.
    pub fn last_out(&self) -> f32 {
        self.last_out
    }

    /// Write then read one sample.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick_in(pool, input);
        self.tick_out(pool)
    }

    /// Write one sample.
    #[inline]
    pub fn tick_in(&mut self, pool: &mut Pool<'_>, input: f32) {
        let buffer = pool.slice_mut(&self.block);
        if buffer.is_empty() {
            return;
        }
        self.last_in = input * self.gain;
        buffer[self.write_pos] = self.last_in;
        self.write_pos = (self.write_pos + 1) % buffer.len();
    }

    /// Read through the allpass interpolator. Call once per tick.
    #[inline]
    pub fn tick_out(&mut self, pool: &Pool<'_>) -> f32 {
        let buffer = pool.slice(&self.block);
        if buffer.is_empty() {
            return 0.0;
        }
        let len = buffer.len();
        let tap = buffer[(self.write_pos + len - self.delay_int - 1) % len];
        // y[n] = c * u[n] + u[n-1] - c * y[n-1]
        self.last_out =
            crate::flush_denormal(self.coeff * tap + self.ap_input - self.coeff * self.last_out);
        self.ap_input = tap;
        self.last_out
    }

    /// Zero the buffer and interpolator state.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        pool.slice_mut(&self.block).fill(0.0);
        self.ap_input = 0.0;
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

impl Module for LinearDelay {
    #[inline]
    fn process(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick(pool, input)
    }

    fn reset(&mut self, pool: &mut Pool<'_>) {
        self.clear(pool);
    }

    fn release(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        self.free(pool)
    }
}

impl Module for AllpassDelay {
    #[inline]
    fn process(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick(pool, input)
    }

    fn reset(&mut self, pool: &mut Pool<'_>) {
        self.clear(pool);
    }

    fn release(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        self.free(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Discipline;

    #[test]
    fn linear_integer_delay_is_exact() {
        let mut mem = [0.0f32; 64];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let mut d = LinearDelay::init_to_pool(&mut pool, 5.0, 32).unwrap();
        let mut out = [0.0f32; 10];
        for (i, o) in out.iter_mut().enumerate() {
            *o = d.tick(&mut pool, if i == 0 { 1.0 } else { 0.0 });
        }
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn linear_zero_delay_passes_through() {
        let mut mem = [0.0f32; 16];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let mut d = LinearDelay::init_to_pool(&mut pool, 0.0, 8).unwrap();
        assert_eq!(d.tick(&mut pool, 0.75), 0.75);
    }

    #[test]
    fn linear_fraction_splits_impulse() {
        let mut mem = [0.0f32; 64];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let mut d = LinearDelay::init_to_pool(&mut pool, 2.25, 16).unwrap();
        let out: [f32; 5] = core::array::from_fn(|i| d.tick(&mut pool, if i == 0 { 1.0 } else { 0.0 }));
        assert!((out[2] - 0.75).abs() < 1e-6);
        assert!((out[3] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn delay_is_clamped() {
        let mut mem = [0.0f32; 64];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let mut d = LinearDelay::init_to_pool(&mut pool, 100.0, 16).unwrap();
        assert_eq!(d.delay(), 16.0);
        d.set_delay(f32::NAN);
        assert_eq!(d.delay(), 0.0);
    }

    #[test]
    fn allpass_group_delay_matches_setting() {
        let mut mem = [0.0f32; 256];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let mut d = AllpassDelay::init_to_pool(&mut pool, 10.3, 64).unwrap();
        // centroid of the impulse response approximates the low-frequency delay
        let mut num = 0.0f32;
        let mut den = 0.0f32;
        for i in 0..200 {
            let y = d.tick(&mut pool, if i == 0 { 1.0 } else { 0.0 });
            num += i as f32 * y;
            den += y;
        }
        let centroid = num / den;
        assert!((centroid - 10.3).abs() < 0.05, "centroid {}", centroid);
    }

    #[test]
    fn free_returns_storage() {
        let mut mem = [0.0f32; 64];
        let mut pool = Pool::new("t", &mut mem, Discipline::Stack);
        let d = AllpassDelay::init_to_pool(&mut pool, 3.0, 20).unwrap();
        assert_eq!(pool.live(), 22);
        d.free(&mut pool).unwrap();
        assert_eq!(pool.live(), 0);
    }
}
