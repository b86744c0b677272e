//! Karplus-Strong plucked string.
//!
//! ```text
//!            +-----------------------------------------+
//!            v                                         |
//! burst --> (+) --> AllpassDelay --+--> out      loop_gain
//!                                  |                   |
//!                                  +--> OneZero (avg) -+
//! ```
//!
//! The loop length is `delay + 1 + 0.5` samples: one for feeding the last
//! output back, a half for the averaging filter's group delay. The
//! allpass interpolator supplies the fractional remainder so tuning stays
//! exact at high pitches.
//!
//! # Plucking
//!
//! [`Pluck::pluck`] does not rewrite the delay buffer. It arms a burst of
//! pick-filtered noise that is mixed into the loop over the next period,
//! one sample per tick. A retrigger over a ringing string adds to what is
//! already there, and the loop filter keeps its state.
//!
//! # Reference
//!
//! K. Karplus and A. Strong, "Digital Synthesis of Plucked-String and Drum
//! Timbres", Computer Music Journal 7(2), 1983.

use sprig_core::{
    AllpassDelay, Context, Module, OnePole, OneZero, Pool, PoolError, XorShift32,
};

/// Output scale; the loop runs well below unity.
const OUTPUT_GAIN: f32 = 3.0;

/// Samples of loop delay contributed by feedback and the averaging filter.
const LOOP_OVERHEAD: f32 = 1.5;

/// Highest loop gain accepted.
const MAX_LOOP_GAIN: f32 = 0.99999;

/// Plucked string.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Context, EngineConfig, XorShift32};
/// use sprig_synth::Pluck;
///
/// let mut memory = vec![0.0f32; 4096];
/// let mut rng = XorShift32::new(1);
/// let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
///
/// let mut string = Pluck::init(&mut ctx, 40.0).unwrap();
/// string.note_on(220.0, 0.8);
/// let out: Vec<f32> = (0..512).map(|_| string.tick(ctx.pool_mut())).collect();
/// assert!(out.iter().any(|s| s.abs() > 0.01));
/// string.free(ctx.pool_mut()).unwrap();
/// ```
#[derive(Debug)]
pub struct Pluck {
    delay: AllpassDelay,
    loop_filter: OneZero,
    pick_filter: OnePole,
    rng: XorShift32,
    sample_rate: f32,
    lowest_freq: f32,
    freq: f32,
    loop_gain: f32,
    burst_remaining: u32,
    last_out: f32,
}

impl Pluck {
    /// Allocates from the context's default pool.
    ///
    /// `lowest_freq` sizes the delay line and is the floor for
    /// [`set_frequency`](Self::set_frequency).
    pub fn init(ctx: &mut Context<'_>, lowest_freq: f32) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, lowest_freq))
    }

    /// Allocates from `pool`, seeding the burst generator from `ctx`.
    pub fn init_to_pool(
        ctx: &mut Context<'_>,
        pool: &mut Pool<'_>,
        lowest_freq: f32,
    ) -> Result<Self, PoolError> {
        let sample_rate = ctx.sample_rate();
        let lowest_freq = if lowest_freq.is_finite() {
            lowest_freq.clamp(1.0, sample_rate * 0.25)
        } else {
            20.0
        };
        let max_delay = libm::ceilf(sample_rate / lowest_freq) as usize + 1;
        let delay = AllpassDelay::init_to_pool(pool, 0.5, max_delay)?;

        let mut string = Self {
            delay,
            loop_filter: OneZero::averaging(),
            pick_filter: OnePole::with_pole(0.0),
            rng: XorShift32::new(ctx.next_seed()),
            sample_rate,
            lowest_freq,
            freq: 220.0,
            loop_gain: 0.99,
            burst_remaining: 0,
            last_out: 0.0,
        };
        string.set_frequency(220.0_f32.max(lowest_freq));

        #[cfg(feature = "tracing")]
        tracing::debug!(lowest_freq, max_delay, "pluck string allocated");

        Ok(string)
    }

    /// Returns the delay buffer to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        self.delay.free(pool)
    }

    /// Set pitch. Also resets loop gain to the pitch-dependent default
    /// `0.995 + f * 5e-6`; call [`set_loop_gain`](Self::set_loop_gain)
    /// afterwards to override.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        let freq = if freq_hz.is_finite() { freq_hz } else { self.freq };
        self.freq = freq.clamp(self.lowest_freq, self.sample_rate * 0.25);
        self.delay.set_delay(self.sample_rate / self.freq - LOOP_OVERHEAD);
        self.loop_gain = (0.995 + self.freq * 0.000_005).min(MAX_LOOP_GAIN);
    }

    /// Current pitch in Hz.
    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Amplitude kept per trip around the loop. Range: 0.0 to 0.99999.
    pub fn set_loop_gain(&mut self, gain: f32) {
        self.loop_gain = gain.clamp(0.0, MAX_LOOP_GAIN);
    }

    /// Current loop gain.
    pub fn loop_gain(&self) -> f32 {
        self.loop_gain
    }

    /// Loop period in samples.
    pub fn period(&self) -> f32 {
        self.delay.delay() + LOOP_OVERHEAD
    }

    /// Excite the string. `amplitude` (0 to 1) sets both level and
    /// brightness of the burst.
    pub fn pluck(&mut self, amplitude: f32) {
        let amplitude = amplitude.clamp(0.0, 1.0);
        self.pick_filter.set_pole(0.999 - amplitude * 0.15);
        self.pick_filter.set_gain(amplitude * 0.5);
        self.burst_remaining = libm::ceilf(self.period()) as u32;
    }

    /// Set pitch and pluck.
    pub fn note_on(&mut self, freq_hz: f32, amplitude: f32) {
        self.set_frequency(freq_hz);
        self.pluck(amplitude);
    }

    /// Damp the string: loop gain becomes `1 - amplitude`.
    pub fn note_off(&mut self, amplitude: f32) {
        self.set_loop_gain(1.0 - amplitude.clamp(0.0, 1.0));
    }

    /// Last output sample.
    pub fn last_out(&self) -> f32 {
        self.last_out
    }

    #[inline]
    fn step(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let burst = if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            self.pick_filter.tick(self.rng.next_bipolar())
        } else {
            0.0
        };
        let feedback = self.loop_gain * self.loop_filter.tick(self.delay.last_out());
        let y = self.delay.tick(pool, burst + input + feedback);
        self.last_out = OUTPUT_GAIN * y;
        self.last_out
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>) -> f32 {
        self.step(pool, 0.0)
    }

    /// Silence the string and drop any pending burst.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        self.delay.clear(pool);
        self.loop_filter.reset();
        self.pick_filter.reset();
        self.burst_remaining = 0;
        self.last_out = 0.0;
    }
}

impl Module for Pluck {
    /// Runs the string as a resonator: `input` is added into the loop.
    #[inline]
    fn process(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        self.step(pool, input)
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
    use sprig_core::{Discipline, EngineConfig};

    fn with_string<R>(f: impl FnOnce(&mut Pluck, &mut Pool<'_>) -> R) -> R {
        let mut ctx_mem = [0.0f32; 0];
        let mut rng = XorShift32::new(3);
        let mut ctx = Context::new(EngineConfig::default(), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("pluck", &mut memory, Discipline::Stack);
        let mut string = Pluck::init_to_pool(&mut ctx, &mut pool, 20.0).unwrap();
        let result = f(&mut string, &mut pool);
        string.free(&mut pool).unwrap();
        assert_eq!(pool.live(), 0);
        result
    }

    #[test]
    fn silent_until_plucked() {
        with_string(|s, pool| {
            for _ in 0..1000 {
                assert_eq!(s.tick(pool), 0.0);
            }
        });
    }

    #[test]
    fn decays_after_pluck() {
        with_string(|s, pool| {
            s.note_on(440.0, 1.0);
            s.set_loop_gain(0.95);
            let early: f32 = (0..2400).map(|_| s.tick(pool).abs()).sum();
            for _ in 0..24000 {
                s.tick(pool);
            }
            let late: f32 = (0..2400).map(|_| s.tick(pool).abs()).sum();
            assert!(early > 0.0);
            assert!(late < early * 0.01, "early {} late {}", early, late);
        });
    }

    #[test]
    fn period_matches_pitch() {
        with_string(|s, _| {
            s.set_frequency(480.0);
            assert!((s.period() - 100.0).abs() < 1e-3);
        });
    }

    #[test]
    fn note_off_damps() {
        with_string(|s, pool| {
            s.note_on(220.0, 1.0);
            for _ in 0..1000 {
                s.tick(pool);
            }
            s.note_off(0.5);
            for _ in 0..6000 {
                s.tick(pool);
            }
            assert!(s.last_out().abs() < 1e-4, "still ringing: {}", s.last_out());
        });
    }

    #[test]
    fn frequency_is_clamped_to_allocation() {
        with_string(|s, _| {
            s.set_frequency(1.0);
            assert_eq!(s.frequency(), 20.0);
            s.set_frequency(f32::NAN);
            assert_eq!(s.frequency(), 20.0);
        });
    }
}
