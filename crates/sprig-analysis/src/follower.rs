//! Lightweight signal followers.
//!
//! - [`EnvelopeFollower`] - peak follower with an attack threshold and a
//!   per-sample decay
//! - [`ZeroCrossing`] - sign changes per sample over a sliding window, a
//!   cheap noisiness or brightness measure

use sprig_core::{Block, Context, Module, Pool, PoolError, flush_denormal};

/// Peak follower.
///
/// Jumps to `|x|` when the input is at least the current level and above
/// the attack threshold, otherwise decays geometrically:
///
/// ```text
/// y = |x|          if |x| >= y and |x| > threshold
/// y = y * decay    otherwise
/// ```
///
/// # Example
///
/// ```rust
/// use sprig_analysis::EnvelopeFollower;
///
/// let mut env = EnvelopeFollower::new(0.01, 0.999);
/// assert_eq!(env.tick(0.8), 0.8);
/// assert!(env.tick(0.0) < 0.8);
/// ```
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    y: f32,
    attack_threshold: f32,
    decay: f32,
}

impl EnvelopeFollower {
    /// `attack_threshold` is the smallest magnitude that can raise the
    /// level; `decay` (0 to 1) is the per-sample fall.
    pub fn new(attack_threshold: f32, decay: f32) -> Self {
        let mut env = Self {
            y: 0.0,
            attack_threshold: 0.0,
            decay: 0.0,
        };
        env.set_attack_threshold(attack_threshold);
        env.set_decay_coefficient(decay);
        env
    }

    /// Smallest input magnitude that can raise the level.
    pub fn set_attack_threshold(&mut self, threshold: f32) {
        self.attack_threshold = threshold.max(0.0);
    }

    /// Per-sample decay factor. Range: 0.0 to 1.0.
    pub fn set_decay_coefficient(&mut self, decay: f32) {
        self.decay = decay.clamp(0.0, 1.0);
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        let x = input.abs();
        if x >= self.y && x > self.attack_threshold {
            self.y = x;
        } else {
            self.y = flush_denormal(self.y * self.decay);
        }
        self.y
    }

    /// Current level.
    pub fn level(&self) -> f32 {
        self.y
    }
}

impl Module for EnvelopeFollower {
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        self.tick(input)
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.y = 0.0;
    }
}

/// Zero-crossing rate over a sliding window.
///
/// Reports crossings per sample in `[0, 1]`; a sine at `f` Hz reads about
/// `2 f / sample_rate`.
///
/// # Example
///
/// ```rust
/// use sprig_analysis::ZeroCrossing;
/// use sprig_core::{Discipline, Pool};
///
/// let mut memory = [0.0f32; 64];
/// let mut pool = Pool::new("zc", &mut memory, Discipline::Stack);
/// let mut zc = ZeroCrossing::init_to_pool(&mut pool, 64).unwrap();
///
/// let mut rate = 0.0;
/// for i in 0..128 {
///     rate = zc.tick(&mut pool, if i % 2 == 0 { 1.0 } else { -1.0 });
/// }
/// assert_eq!(rate, 1.0);
/// zc.free(&mut pool).unwrap();
/// ```
#[derive(Debug)]
pub struct ZeroCrossing {
    flags: Block,
    max_window: usize,
    window: usize,
    position: usize,
    count: u32,
    previous: f32,
}

impl ZeroCrossing {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, max_window: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, max_window))
    }

    /// Allocates `max_window` words from `pool`. The window starts at its
    /// maximum.
    pub fn init_to_pool(pool: &mut Pool<'_>, max_window: usize) -> Result<Self, PoolError> {
        let max_window = max_window.max(1);
        let flags = pool.allocate(max_window)?;
        Ok(Self {
            flags,
            max_window,
            window: max_window,
            position: 0,
            count: 0,
            previous: 0.0,
        })
    }

    /// Returns the window buffer to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.flags).map_err(PoolError::from)
    }

    /// Window length in samples, clamped to `[1, max_window]`. Restarts
    /// the count.
    pub fn set_window(&mut self, pool: &mut Pool<'_>, window: usize) {
        self.window = window.clamp(1, self.max_window);
        self.clear(pool);
    }

    /// Current window length.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Feed one sample and return crossings per sample over the window.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let crossed = input * self.previous < 0.0;
        self.previous = input;

        if let Some(slot) = pool.slice_mut(&self.flags).get_mut(self.position) {
            let leaving = *slot > 0.0;
            *slot = if crossed { 1.0 } else { 0.0 };
            self.count = (self.count + u32::from(crossed)).saturating_sub(u32::from(leaving));
        }
        self.position = (self.position + 1) % self.window;
        self.count as f32 / self.window as f32
    }

    /// Forget all crossings.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        pool.slice_mut(&self.flags).fill(0.0);
        self.position = 0;
        self.count = 0;
        self.previous = 0.0;
    }
}

impl Module for ZeroCrossing {
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
