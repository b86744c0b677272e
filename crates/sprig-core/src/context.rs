//! Engine context: sample rate, default pool, randomness and error reporting.
//!
//! A [`Context`] replaces process-wide globals. Modules take it at
//! construction time to read the sample rate, draw seeds, and allocate from
//! the default pool; nothing in the tick path touches it.
//!
//! # Example
//!
//! ```rust
//! use sprig_core::{Context, EngineConfig, XorShift32};
//!
//! let mut memory = [0.0f32; 1024];
//! let mut rng = XorShift32::new(1);
//! let mut ctx = Context::new(EngineConfig::new(48000.0, 16), &mut memory, &mut rng);
//!
//! assert_eq!(ctx.sample_rate(), 48000.0);
//! let seed = ctx.next_seed();
//! assert_ne!(seed, 0);
//! ```

use crate::error::EngineError;
use crate::pool::{Discipline, Pool};

/// Lowest accepted sample rate in Hz.
pub const MIN_SAMPLE_RATE: f32 = 1000.0;
/// Highest accepted sample rate in Hz.
pub const MAX_SAMPLE_RATE: f32 = 384_000.0;
/// Largest accepted processing block.
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Startup configuration for an engine.
///
/// Values are clamped on construction, so a config is always usable.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per processing block.
    pub block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 16,
        }
    }
}

impl EngineConfig {
    /// Creates a config, clamping both values into range.
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate: sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE),
            block_size: block_size.clamp(1, MAX_BLOCK_SIZE),
        }
    }

    /// Returns a copy with both values clamped into range.
    ///
    /// Deserialized configs bypass [`EngineConfig::new`]; call this before use.
    pub fn sanitized(self) -> Self {
        let rate = if self.sample_rate.is_finite() {
            self.sample_rate
        } else {
            Self::default().sample_rate
        };
        Self::new(rate, self.block_size)
    }

    /// Seconds per sample.
    #[inline]
    pub fn inv_sample_rate(&self) -> f32 {
        1.0 / self.sample_rate
    }
}

/// Uniform random numbers in `[0, 1)`.
///
/// Any `FnMut() -> f32` closure is a random source.
pub trait RandomSource {
    /// Next value in `[0, 1)`.
    fn next_f32(&mut self) -> f32;
}

impl<F: FnMut() -> f32> RandomSource for F {
    fn next_f32(&mut self) -> f32 {
        self()
    }
}

/// Xorshift32 generator.
///
/// Small, fast and good enough for audio noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Creates a generator. A zero seed is replaced, since zero is a fixed point.
    pub const fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Next raw 32-bit value.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next value in `[-1, 1)`.
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        self.next_unipolar() * 2.0 - 1.0
    }

    /// Next value in `[0, 1)`.
    #[inline]
    pub fn next_unipolar(&mut self) -> f32 {
        // 24 high bits map exactly onto the f32 mantissa
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }
}

impl RandomSource for XorShift32 {
    fn next_f32(&mut self) -> f32 {
        self.next_unipolar()
    }
}

/// Shared setup state handed to module constructors.
pub struct Context<'a> {
    config: EngineConfig,
    pool: Pool<'a>,
    random: &'a mut dyn RandomSource,
    error_hook: Option<fn(&EngineError)>,
}

impl core::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<'a> Context<'a> {
    /// Creates a context whose default pool is a free-list pool over `memory`.
    pub fn new(
        config: EngineConfig,
        memory: &'a mut [f32],
        random: &'a mut dyn RandomSource,
    ) -> Self {
        Self::with_pool(config, Pool::new("default", memory, Discipline::FreeList), random)
    }

    /// Creates a context around an existing default pool.
    pub fn with_pool(
        config: EngineConfig,
        pool: Pool<'a>,
        random: &'a mut dyn RandomSource,
    ) -> Self {
        let config = config.sanitized();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            pool = pool.name(),
            "context created"
        );

        Self {
            config,
            pool,
            random,
            error_hook: None,
        }
    }

    /// Installs the single error hook.
    pub fn set_error_hook(&mut self, hook: fn(&EngineError)) {
        self.error_hook = Some(hook);
    }

    /// Passes an error to the hook, if one is installed.
    pub fn report(&self, error: &EngineError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "engine error");

        if let Some(hook) = self.error_hook {
            hook(error);
        }
    }

    /// The error hook, for code that reports after the context is gone.
    pub fn error_hook(&self) -> Option<fn(&EngineError)> {
        self.error_hook
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    /// Seconds per sample.
    #[inline]
    pub fn inv_sample_rate(&self) -> f32 {
        self.config.inv_sample_rate()
    }

    /// Changes the sample rate. Existing modules keep their coefficients
    /// until their own `set_sample_rate` is called.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.config = EngineConfig::new(sample_rate, self.config.block_size);
    }

    /// Next value from the random source.
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.random.next_f32()
    }

    /// Non-zero seed for a module-private generator.
    pub fn next_seed(&mut self) -> u32 {
        let hi = (self.random() * 65536.0) as u32 & 0xFFFF;
        let lo = (self.random() * 65536.0) as u32 & 0xFFFF;
        ((hi << 16) | lo).max(1)
    }

    /// The default pool.
    pub fn pool(&self) -> &Pool<'a> {
        &self.pool
    }

    /// The default pool, mutably.
    pub fn pool_mut(&mut self) -> &mut Pool<'a> {
        &mut self.pool
    }

    /// Runs `f` with the default pool lent out alongside the context.
    ///
    /// This is how `init` forwards to `init_to_pool`. While `f` runs, the
    /// context's own pool slot holds a detached pool.
    pub fn with_default_pool<R>(&mut self, f: impl FnOnce(&mut Self, &mut Pool<'a>) -> R) -> R {
        let mut pool = core::mem::replace(&mut self.pool, Pool::detached());
        let result = f(self, &mut pool);
        self.pool = pool;
        result
    }
}
