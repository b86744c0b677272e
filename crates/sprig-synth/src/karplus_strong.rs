//! Stiff Karplus-Strong string with a movable pickup.
//!
//! ```text
//!        +----------------------------------------------------------+
//!        v                                                          |
//! ---> (+) --> AllpassDelay --+--> (-) --> out                      |
//!                             |     ^                               |
//!                             |     +-- LinearDelay (pickup)        |
//!                             |                                     |
//!                             +--> gain --> 4x dispersion --> OneZero
//! ```
//!
//! Compared with [`Pluck`](crate::Pluck) the loop carries four
//! second-order allpass sections that stretch the upper partials (a stiff
//! string), and the output is a comb: the loop signal minus itself
//! delayed by half the pickup distance, which notches the harmonics that
//! have a node at the pickup.
//!
//! Plucking rewrites the loop over one period, one sample per tick: each
//! sample becomes `0.6 * old + 0.4 * amplitude * noise`.
//!
//! # Reference
//!
//! D. Jaffe and J. Smith, "Extensions of the Karplus-Strong Plucked-String
//! Algorithm", Computer Music Journal 7(2), 1983.

use sprig_core::{
    AllpassDelay, Context, LinearDelay, Module, OneZero, Pool, PoolError, XorShift32,
    flush_denormal,
};

/// Samples of loop delay contributed by feedback and the averaging filter.
const LOOP_OVERHEAD: f32 = 1.5;

/// Highest loop gain accepted.
const MAX_LOOP_GAIN: f32 = 0.99999;

/// Loop gain added per Hz so high notes ring as long as low ones.
const GAIN_PER_HZ: f32 = 0.000_005;

/// Pole radius ceiling for the dispersion sections.
const MAX_POLE_RADIUS: f32 = 0.9999;

/// Controller values run from 0 to 128.
const ONE_OVER_128: f32 = 1.0 / 128.0;

/// Parameters reachable through [`KarplusStrong::control_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringControl {
    /// Pickup position along the string.
    PickupPosition,
    /// Base loop gain, 0.97 to 1.0.
    Damping,
    /// Stretch, 1.0 down to 0.9 as the value rises.
    Detune,
}

/// Second-order allpass, Direct Form I:
/// `y = a2 x + a1 x1 + x2 - a1 y1 - a2 y2`.
#[derive(Debug, Clone, Copy, Default)]
struct Dispersion {
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Dispersion {
    fn set(&mut self, radius: f32, omega: f32) {
        self.a2 = radius * radius;
        self.a1 = -2.0 * radius * libm::cosf(omega);
    }

    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let y = self.a2 * x + self.a1 * self.x1 + self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = flush_denormal(y);
        self.y1
    }

    fn reset(&mut self) {
        *self = Self {
            a1: self.a1,
            a2: self.a2,
            ..Self::default()
        };
    }
}

/// Stiff plucked string.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Context, EngineConfig, XorShift32};
/// use sprig_synth::KarplusStrong;
///
/// let mut memory = vec![0.0f32; 4096];
/// let mut rng = XorShift32::new(1);
/// let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
///
/// let mut string = KarplusStrong::init(&mut ctx, 40.0).unwrap();
/// string.set_pickup_position(0.25);
/// string.note_on(330.0, 0.9);
/// let out: Vec<f32> = (0..512).map(|_| string.tick(ctx.pool_mut())).collect();
/// assert!(out.iter().any(|s| s.abs() > 0.01));
/// string.free(ctx.pool_mut()).unwrap();
/// ```
#[derive(Debug)]
pub struct KarplusStrong {
    delay: AllpassDelay,
    pickup: LinearDelay,
    filter: OneZero,
    dispersion: [Dispersion; 4],
    rng: XorShift32,
    sample_rate: f32,
    lowest_freq: f32,
    freq: f32,
    loop_gain: f32,
    base_loop_gain: f32,
    stretch: f32,
    pickup_position: f32,
    pluck_amplitude: f32,
    burst_remaining: u32,
    last_out: f32,
}

impl KarplusStrong {
    /// Allocates from the context's default pool.
    ///
    /// `lowest_freq` sizes both delay lines and is the floor for
    /// [`set_frequency`](Self::set_frequency).
    pub fn init(ctx: &mut Context<'_>, lowest_freq: f32) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, lowest_freq))
    }

    /// Allocates the loop and pickup lines from `pool`, seeding the pluck
    /// noise from `ctx`. Nothing stays allocated on failure.
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
        let length = libm::ceilf(sample_rate / lowest_freq) as usize;
        let delay = AllpassDelay::init_to_pool(pool, 0.5, length + 1)?;
        let pickup = match LinearDelay::init_to_pool(pool, 0.0, length / 2 + 1) {
            Ok(pickup) => pickup,
            Err(err) => {
                let _ = delay.free(pool);
                return Err(err);
            }
        };

        let mut string = Self {
            delay,
            pickup,
            filter: OneZero::averaging(),
            dispersion: [Dispersion::default(); 4],
            rng: XorShift32::new(ctx.next_seed()),
            sample_rate,
            lowest_freq,
            freq: 220.0,
            loop_gain: 0.999,
            base_loop_gain: 0.995,
            stretch: 0.9999,
            pickup_position: 0.4,
            pluck_amplitude: 0.3,
            burst_remaining: 0,
            last_out: 0.0,
        };
        string.set_frequency(220.0_f32.max(lowest_freq));

        #[cfg(feature = "tracing")]
        tracing::debug!(lowest_freq, length, "karplus-strong string allocated");

        Ok(string)
    }

    /// Returns both lines to `pool`, newest first.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        let pickup = self.pickup.free(pool);
        let delay = self.delay.free(pool);
        pickup.and(delay)
    }

    /// Set pitch. Retunes the loop, the dispersion sections and the pickup
    /// comb, and recomputes loop gain from the base gain.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        let freq = if freq_hz.is_finite() { freq_hz } else { self.freq };
        self.freq = freq.clamp(self.lowest_freq, self.sample_rate * 0.25);
        self.delay.set_delay(self.sample_rate / self.freq - LOOP_OVERHEAD);
        self.update_loop_gain();
        self.set_stretch(self.stretch);
        self.update_pickup();
    }

    /// Current pitch in Hz.
    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Loop period in samples.
    pub fn period(&self) -> f32 {
        self.delay.delay() + LOOP_OVERHEAD
    }

    fn update_loop_gain(&mut self) {
        self.loop_gain = (self.base_loop_gain + self.freq * GAIN_PER_HZ).clamp(0.0, MAX_LOOP_GAIN);
    }

    fn update_pickup(&mut self) {
        self.pickup
            .set_delay(0.5 * self.pickup_position * self.sample_rate / self.freq);
    }

    /// String stiffness, 0 to 1. Lower values stretch the upper partials
    /// further from harmonic.
    ///
    /// The four sections sit at `2 f`, then step by a quarter of the way
    /// to Nyquist; their pole radius is `0.5 + 0.5 * stretch`.
    pub fn set_stretch(&mut self, stretch: f32) {
        self.stretch = if stretch.is_finite() { stretch.clamp(0.0, 1.0) } else { 0.9999 };
        let radius = (0.5 + 0.5 * self.stretch).min(MAX_POLE_RADIUS);
        let mut freq = 2.0 * self.freq;
        let step = (0.5 * self.sample_rate - freq) * 0.25;
        for section in &mut self.dispersion {
            section.set(radius, core::f32::consts::TAU * freq / self.sample_rate);
            freq += step;
        }
    }

    /// Current stretch.
    pub fn stretch(&self) -> f32 {
        self.stretch
    }

    /// Pickup point, 0 (at the bridge, silent) to 1 (mid-string).
    pub fn set_pickup_position(&mut self, position: f32) {
        self.pickup_position = if position.is_finite() {
            position.clamp(0.0, 1.0)
        } else {
            0.4
        };
        self.update_pickup();
    }

    /// Current pickup position.
    pub fn pickup_position(&self) -> f32 {
        self.pickup_position
    }

    /// Loop gain before the per-Hz boost. The effective gain is capped at
    /// 0.99999.
    pub fn set_base_loop_gain(&mut self, gain: f32) {
        self.base_loop_gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.995 };
        self.update_loop_gain();
    }

    /// Effective loop gain.
    pub fn loop_gain(&self) -> f32 {
        self.loop_gain
    }

    /// Apply a controller value in `[0, 128]`.
    pub fn control_change(&mut self, control: StringControl, value: f32) {
        let norm = if value.is_finite() { value.clamp(0.0, 128.0) } else { 0.0 } * ONE_OVER_128;
        match control {
            StringControl::PickupPosition => self.set_pickup_position(norm),
            StringControl::Damping => self.set_base_loop_gain(0.97 + norm * 0.03),
            StringControl::Detune => self.set_stretch(0.9 + 0.1 * (1.0 - norm)),
        }
    }

    /// Excite the string over the next period. `amplitude` is 0 to 1.
    pub fn pluck(&mut self, amplitude: f32) {
        self.pluck_amplitude = amplitude.clamp(0.0, 1.0);
        self.burst_remaining = libm::ceilf(self.delay.delay()) as u32 + 1;
    }

    /// Set pitch and pluck.
    pub fn note_on(&mut self, freq_hz: f32, amplitude: f32) {
        self.set_frequency(freq_hz);
        self.pluck(amplitude);
    }

    /// Damp the string: loop gain becomes `(1 - amplitude) / 2`.
    pub fn note_off(&mut self, amplitude: f32) {
        self.loop_gain = (1.0 - amplitude.clamp(0.0, 1.0)) * 0.5;
    }

    /// Last output sample.
    pub fn last_out(&self) -> f32 {
        self.last_out
    }

    #[inline]
    fn step(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let fed = if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            0.6 * self.delay.last_out() + 0.4 * self.pluck_amplitude * self.rng.next_bipolar()
        } else {
            let mut x = self.delay.last_out() * self.loop_gain;
            for section in &mut self.dispersion {
                x = section.tick(x);
            }
            self.filter.tick(x)
        };
        let y = self.delay.tick(pool, fed + input);
        self.last_out = y - self.pickup.tick(pool, y);
        self.last_out
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>) -> f32 {
        self.step(pool, 0.0)
    }

    /// Silence the string and drop any pending pluck.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        self.delay.clear(pool);
        self.pickup.clear(pool);
        self.filter.reset();
        for section in &mut self.dispersion {
            section.reset();
        }
        self.burst_remaining = 0;
        self.last_out = 0.0;
    }
}

impl Module for KarplusStrong {
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
