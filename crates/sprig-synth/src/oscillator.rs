//! Audio-rate oscillators.
//!
//! | Type | Output | Method | Storage |
//! |---|---|---|---|
//! | [`Cycle`] | sine, ±1 | shared 2048-point table, linear interpolation | inline |
//! | [`Sine`] | sine, ±1 | private table of any size in a pool block | pool |
//! | [`Tri`] | triangle with skew, ±1 | leaky-integrated PolyBLEP pulse | inline |
//! | [`Pulse`] | pulse with width, ±1 | PolyBLEP on both edges | inline |
//! | [`Saw`] | sawtooth, ±1 | PolyBLEP at the wrap | inline |
//! | [`Phasor`] | ramp, [0, 1) | naive, reports wraps | inline |
//!
//! All phase accumulators run in cycles, `[0, 1)`.

use core::f32::consts::TAU;

use libm::{floorf, sinf};
use sprig_core::{
    Block, Context, Module, Pool, PoolError, SINE_TABLE, finite_or_zero, lookup_wrapped,
};

/// Euclidean remainder for f32, compatible with no_std.
#[inline]
fn rem_euclid_f32(a: f32, b: f32) -> f32 {
    let r = a - b * floorf(a / b);
    if r < 0.0 { r + b } else { r }
}

/// Phase accumulator shared by every oscillator.
#[derive(Debug, Clone)]
struct Phase {
    phase: f32,
    inc: f32,
    freq: f32,
    inv_sample_rate: f32,
}

impl Phase {
    fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            inc: 0.0,
            freq: 0.0,
            inv_sample_rate: 1.0 / sample_rate,
        }
    }

    /// Negative frequencies run the phase backwards; the increment is kept
    /// below one cycle per sample.
    fn set_freq(&mut self, freq: f32) {
        self.freq = finite_or_zero(freq);
        self.inc = (self.freq * self.inv_sample_rate).clamp(-0.5, 0.5);
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.inv_sample_rate = 1.0 / sample_rate;
        self.set_freq(self.freq);
    }

    fn set_phase(&mut self, phase: f32) {
        self.phase = rem_euclid_f32(phase, 1.0);
    }

    /// Advances and returns true when the phase wrapped.
    #[inline]
    fn advance(&mut self) -> bool {
        self.phase += self.inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            true
        } else if self.phase < 0.0 {
            self.phase += 1.0;
            true
        } else {
            false
        }
    }
}

macro_rules! phase_accessors {
    () => {
        /// Set frequency in Hz.
        pub fn set_freq(&mut self, freq: f32) {
            self.phase.set_freq(freq);
        }

        /// Frequency in Hz.
        pub fn freq(&self) -> f32 {
            self.phase.freq
        }

        /// Jump to `phase` (in cycles).
        pub fn set_phase(&mut self, phase: f32) {
            self.phase.set_phase(phase);
        }

        /// Current phase in `[0, 1)`.
        pub fn phase(&self) -> f32 {
            self.phase.phase
        }

        /// Update sample rate and recalculate the phase increment.
        pub fn set_sample_rate(&mut self, sample_rate: f32) {
            self.phase.set_sample_rate(sample_rate);
        }
    };
}

/// Table-lookup sine oscillator.
///
/// # Example
///
/// ```rust
/// use sprig_synth::Cycle;
///
/// let mut osc = Cycle::new(48000.0);
/// osc.set_freq(440.0);
/// let sample = osc.tick();
/// assert!(sample.abs() <= 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Cycle {
    phase: Phase,
}

impl Cycle {
    /// Create an oscillator at 0 Hz.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: Phase::new(sample_rate),
        }
    }

    /// Create an oscillator using the context's sample rate.
    pub fn init(ctx: &Context<'_>) -> Self {
        Self::new(ctx.sample_rate())
    }

    phase_accessors!();

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let out = lookup_wrapped(&SINE_TABLE, self.phase.phase);
        self.phase.advance();
        out
    }
}

/// Sine oscillator over a private, pool-allocated table.
///
/// Smaller tables trade accuracy for memory on tight pools.
#[derive(Debug)]
pub struct Sine {
    phase: Phase,
    table: Block,
}

impl Sine {
    /// Smallest accepted table.
    pub const MIN_SIZE: usize = 16;

    /// Allocates the table from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, size: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, size))
    }

    /// Allocates the table from `pool`. `size` is raised to [`Self::MIN_SIZE`].
    pub fn init_to_pool(ctx: &Context<'_>, pool: &mut Pool<'_>, size: usize) -> Result<Self, PoolError> {
        let size = size.max(Self::MIN_SIZE);
        let table = pool.allocate(size)?;
        for (i, v) in pool.slice_mut(&table).iter_mut().enumerate() {
            *v = sinf(TAU * i as f32 / size as f32);
        }
        Ok(Self {
            phase: Phase::new(ctx.sample_rate()),
            table,
        })
    }

    /// Returns the table to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.table).map_err(PoolError::from)
    }

    phase_accessors!();

    /// Table length.
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self, pool: &Pool<'_>) -> f32 {
        let out = lookup_wrapped(pool.slice(&self.table), self.phase.phase);
        self.phase.advance();
        out
    }
}

/// Triangle oscillator with adjustable skew.
///
/// Skew moves the peak: -1 is a falling ramp, 0 a symmetric triangle, +1 a
/// rising ramp (both ends clamped slightly inside so the slopes stay finite).
#[derive(Debug, Clone)]
pub struct Tri {
    phase: Phase,
    width: f32,
    integrator: f32,
}

impl Tri {
    /// Create a symmetric triangle at 0 Hz.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: Phase::new(sample_rate),
            width: 0.5,
            integrator: -1.0,
        }
    }

    /// Create an oscillator using the context's sample rate.
    pub fn init(ctx: &Context<'_>) -> Self {
        Self::new(ctx.sample_rate())
    }

    phase_accessors!();

    /// Peak position, `[-1, 1]`.
    pub fn set_skew(&mut self, skew: f32) {
        self.width = ((skew.clamp(-1.0, 1.0) + 1.0) * 0.5).clamp(0.01, 0.99);
    }

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let t = self.phase.phase;
        let dt = self.phase.inc.abs();
        let w = self.width;

        // zero-mean pulse: rises by 2 over the high part, falls by 2 over the low part
        let high = 1.0 / w;
        let low = -1.0 / (1.0 - w);
        let naive = if t < w { high } else { low };
        let step = 0.5 * (high - low);
        let pulse = naive + step * (poly_blep(t, dt) - poly_blep(rem_euclid_f32(t - w, 1.0), dt));

        // slow leak: pulls DC drift back to zero over ~20 cycles
        let leak = 1.0 - 0.05 * dt;
        self.integrator = leak * self.integrator + pulse * 2.0 * dt;
        self.phase.advance();
        self.integrator
    }
}

/// Band-limited pulse oscillator.
#[derive(Debug, Clone)]
pub struct Pulse {
    phase: Phase,
    width: f32,
}

impl Pulse {
    /// Create a square wave at 0 Hz.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: Phase::new(sample_rate),
            width: 0.5,
        }
    }

    /// Create an oscillator using the context's sample rate.
    pub fn init(ctx: &Context<'_>) -> Self {
        Self::new(ctx.sample_rate())
    }

    phase_accessors!();

    /// Duty cycle, clamped to `[0.01, 0.99]`.
    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(0.01, 0.99);
    }

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let t = self.phase.phase;
        let dt = self.phase.inc.abs();
        let naive = if t < self.width { 1.0 } else { -1.0 };
        let out = naive + poly_blep(t, dt) - poly_blep(rem_euclid_f32(t - self.width, 1.0), dt);
        self.phase.advance();
        out
    }
}

/// Band-limited sawtooth oscillator.
///
/// # Example
///
/// ```rust
/// use sprig_synth::Saw;
///
/// let mut saw = Saw::new(48000.0);
/// saw.set_freq(220.0);
/// let peak = (0..480).map(|_| saw.tick().abs()).fold(0.0, f32::max);
/// assert!(peak <= 1.05);
/// ```
#[derive(Debug, Clone)]
pub struct Saw {
    phase: Phase,
}

impl Saw {
    /// Create a sawtooth at 0 Hz.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: Phase::new(sample_rate),
        }
    }

    /// Create an oscillator using the context's sample rate.
    pub fn init(ctx: &Context<'_>) -> Self {
        Self::new(ctx.sample_rate())
    }

    phase_accessors!();

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let t = self.phase.phase;
        let out = 2.0 * t - 1.0 - poly_blep(t, self.phase.inc.abs());
        self.phase.advance();
        out
    }
}

/// Aliasing phasor in `[0, 1)`.
///
/// Useful as a clock: [`did_reset`](Self::did_reset) reports whether the
/// last tick wrapped.
#[derive(Debug, Clone)]
pub struct Phasor {
    phase: Phase,
    did_reset: bool,
}

impl Phasor {
    /// Create a phasor at 0 Hz.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: Phase::new(sample_rate),
            did_reset: false,
        }
    }

    /// Create a phasor using the context's sample rate.
    pub fn init(ctx: &Context<'_>) -> Self {
        Self::new(ctx.sample_rate())
    }

    phase_accessors!();

    /// Advance and return the new phase.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.did_reset = self.phase.advance();
        self.phase.phase
    }

    /// True if the last tick wrapped around.
    pub fn did_reset(&self) -> bool {
        self.did_reset
    }
}

macro_rules! generator_module {
    ($ty:ty) => {
        impl Module for $ty {
            #[inline]
            fn process(&mut self, _pool: &mut Pool<'_>, _input: f32) -> f32 {
                self.tick()
            }

            fn reset(&mut self, _pool: &mut Pool<'_>) {
                self.set_phase(0.0);
            }
        }
    };
}

generator_module!(Cycle);
generator_module!(Tri);
generator_module!(Pulse);
generator_module!(Saw);
generator_module!(Phasor);

impl Module for Sine {
    #[inline]
    fn process(&mut self, pool: &mut Pool<'_>, _input: f32) -> f32 {
        self.tick(pool)
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.set_phase(0.0);
    }

    fn release(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        self.free(pool)
    }
}

/// 4th-order PolyBLEP (Polynomial Band-Limited Step) correction.
///
/// A C²-continuous, degree-4 piecewise polynomial spanning two samples on
/// each side of the discontinuity, for roughly 50 dB of alias suppression.
/// The correction is sized for a step of height 2 (from -1 to +1).
///
/// Reference: Välimäki et al., "Antialiasing Oscillators", IEEE Signal
/// Processing Magazine, 2010.
#[inline]
pub(crate) fn poly_blep(t: f32, dt: f32) -> f32 {
    //   p₁(n) = A₄·n⁴ + A₃·n³ + A₂·n² + A₀  for n ∈ [0,1)
    //   p₂(n) = C·(2-n)⁴                     for n ∈ [1,2)
    const A4: f32 = -43.0 / 48.0;
    const A3: f32 = 7.0 / 6.0;
    const A2: f32 = 0.5;
    const A0: f32 = -1.0;
    const C: f32 = -11.0 / 48.0;

    if dt <= 0.0 {
        return 0.0;
    }
    let dt2 = 2.0 * dt;
    let branch = |n: f32| {
        if n < 1.0 {
            let n2 = n * n;
            A4 * n2 * n2 + A3 * n2 * n + A2 * n2 + A0
        } else {
            let u = 2.0 - n;
            let u2 = u * u;
            C * u2 * u2
        }
    };
    if t < dt2 {
        branch(t / dt)
    } else if t > 1.0 - dt2 {
        -branch((1.0 - t) / dt)
    } else {
        0.0
    }
}
