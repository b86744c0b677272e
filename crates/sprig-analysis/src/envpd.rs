//! Windowed signal energy reported once per hop.
//!
//! [`EnvPd`] weights the input's squared magnitude with a Hann window and
//! sums it over overlapping windows. Each block of input is added to every
//! window still open; a window closes once per hop and its sum becomes the
//! reported value.
//!
//! ```text
//! w[i]   = (1 - cos(2 pi i / N)) / N          i in 0..N
//! E      = sum_i w[i] * x[i]^2                 (mean square, Hann weighted)
//! dB     = 100 + 10 log10(E)                   (0 for silence)
//! ```
//!
//! The window weights sum to one, so a sine of amplitude `A` reads `A^2 / 2`
//! and a full-scale sine reads about 97 dB.
//!
//! The hop is rounded up to a whole number of blocks, and far enough that
//! no more than [`MAX_OVERLAP`] windows are ever open at once.

use sprig_core::{Block, Context, Pool, PoolError};

/// Most windows that may be summing at the same time.
pub const MAX_OVERLAP: usize = 32;

/// Convert mean-square power to the 0..100+ dB scale used by [`EnvPd::db`].
///
/// Silence (or anything below 0 dB on that scale) reads 0.
#[inline]
pub fn power_to_db(power: f32) -> f32 {
    if power <= 0.0 {
        return 0.0;
    }
    (100.0 + 10.0 * libm::log10f(power)).max(0.0)
}

/// Hann-weighted energy follower.
///
/// # Example
///
/// ```rust
/// use sprig_analysis::EnvPd;
/// use sprig_core::{Discipline, Pool};
///
/// let mut memory = vec![0.0f32; 2048];
/// let mut pool = Pool::new("env", &mut memory, Discipline::Stack);
/// let mut env = EnvPd::init_to_pool(&mut pool, 1024, 256, 64).unwrap();
///
/// let block = [0.5f32; 64];
/// for _ in 0..32 {
///     env.process_block(&pool, &block);
/// }
/// assert!((env.tick() - 0.25).abs() < 1e-3);
/// env.free(&mut pool).unwrap();
/// ```
#[derive(Debug)]
pub struct EnvPd {
    window_block: Block,
    capacity: usize,
    window: usize,
    hop: usize,
    block_size: usize,
    phase: isize,
    sums: [f32; MAX_OVERLAP],
    result: f32,
}

impl EnvPd {
    /// Allocates from the context's default pool.
    pub fn init(
        ctx: &mut Context<'_>,
        window: usize,
        hop: usize,
        block_size: usize,
    ) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, window, hop, block_size))
    }

    /// Allocates the window table from `pool`.
    ///
    /// `window` (at least 2) is also the largest size
    /// [`set_window_size`](Self::set_window_size) will accept later.
    /// `block_size` is clamped to `[1, window]` and `hop` to `[1, window]`
    /// before rounding.
    pub fn init_to_pool(
        pool: &mut Pool<'_>,
        window: usize,
        hop: usize,
        block_size: usize,
    ) -> Result<Self, PoolError> {
        let window = window.max(2);
        let block_size = block_size.clamp(1, window);
        // the tail past the window stays zero so the last partial block reads nothing
        let window_block = pool.allocate(window + block_size)?;

        let mut env = Self {
            window_block,
            capacity: window,
            window,
            hop: block_size,
            block_size,
            phase: 0,
            sums: [0.0; MAX_OVERLAP],
            result: 0.0,
        };
        env.fill_window(pool);
        env.set_hop_size(hop);

        #[cfg(feature = "tracing")]
        tracing::debug!(window, hop = env.hop, block_size, "envpd allocated");

        Ok(env)
    }

    /// Returns the window table to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.window_block).map_err(PoolError::from)
    }

    fn fill_window(&self, pool: &mut Pool<'_>) {
        let n = self.window;
        let table = pool.slice_mut(&self.window_block);
        let scale = core::f32::consts::TAU / n as f32;
        for (i, w) in table.iter_mut().enumerate() {
            *w = if i < n {
                (1.0 - libm::cosf(scale * i as f32)) / n as f32
            } else {
                0.0
            };
        }
    }

    /// Change the window length, up to the size given at init.
    ///
    /// Rebuilds the window table, re-checks the hop and drops any partial
    /// sums.
    pub fn set_window_size(&mut self, pool: &mut Pool<'_>, window: usize) {
        self.window = window.clamp(self.block_size.max(2), self.capacity);
        self.fill_window(pool);
        self.set_hop_size(self.hop);
        self.reset();
    }

    /// Samples between reports. Rounded up to a multiple of the block size
    /// and to at least `window / MAX_OVERLAP`.
    pub fn set_hop_size(&mut self, hop: usize) {
        let hop = hop.clamp(1, self.window).max(self.window.div_ceil(MAX_OVERLAP));
        self.hop = hop.div_ceil(self.block_size) * self.block_size;
        if self.phase >= self.hop as isize {
            self.phase = 0;
        }
    }

    /// Window length in samples.
    pub fn window_size(&self) -> usize {
        self.window
    }

    /// Effective hop in samples after rounding.
    pub fn hop_size(&self) -> usize {
        self.hop
    }

    /// Expected block length for [`process_block`](Self::process_block).
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Feed input. Longer slices are consumed one block at a time.
    ///
    /// Returns `true` if at least one window closed and
    /// [`tick`](Self::tick) holds a fresh value.
    pub fn process_block(&mut self, pool: &Pool<'_>, input: &[f32]) -> bool {
        let table = pool.slice(&self.window_block);
        let mut reported = false;
        for chunk in input.chunks(self.block_size) {
            reported |= self.accumulate(table, chunk);
        }
        reported
    }

    fn accumulate(&mut self, table: &[f32], chunk: &[f32]) -> bool {
        if table.len() < self.window + self.block_size {
            return false;
        }
        let n = chunk.len();
        let mut open = 0;
        let mut offset = self.phase.max(0) as usize;
        while offset < self.window && open < MAX_OVERLAP {
            // newest sample meets the start of the remaining window
            let weights = &table[offset..offset + n];
            let mut sum = self.sums[open];
            for (w, &x) in weights.iter().zip(chunk.iter().rev()) {
                sum += w * x * x;
            }
            self.sums[open] = sum;
            offset += self.hop;
            open += 1;
        }
        if open < MAX_OVERLAP {
            self.sums[open] = 0.0;
        }

        self.phase -= n as isize;
        if self.phase < 0 {
            self.result = self.sums[0];
            self.sums.copy_within(1..MAX_OVERLAP, 0);
            self.sums[MAX_OVERLAP - 1] = 0.0;
            self.phase += self.hop as isize;
            true
        } else {
            false
        }
    }

    /// Most recent windowed mean-square power.
    #[inline]
    pub fn tick(&self) -> f32 {
        self.result
    }

    /// Most recent value on the dB scale of [`power_to_db`].
    pub fn db(&self) -> f32 {
        power_to_db(self.result)
    }

    /// Drop partial sums and the last result.
    pub fn reset(&mut self) {
        self.sums = [0.0; MAX_OVERLAP];
        self.result = 0.0;
        self.phase = 0;
    }
}
