//! Frame-rate period tracking built from [`EnvPd`] and [`Snac`].
//!
//! Samples go into [`Snac`] one at a time and are gathered into frames for
//! [`EnvPd`]. At each frame boundary, if SNAC has produced a new analysis,
//! the signal is loud enough, and the fidelity clears the threshold, the
//! candidate period is folded into the tracked one:
//!
//! ```text
//! |p_new - p| > tolerance * p   ->  p = p_new                    (new note)
//! otherwise                     ->  p = alpha * p_new + (1 - alpha) * p
//! ```
//!
//! Otherwise the previous period is held.

use sprig_core::{Block, Context, Pool, PoolError};

use crate::envpd::EnvPd;
use crate::snac::{DEFAULT_FRAME, Snac};

/// Energy frames are split into blocks of this length.
const ENV_BLOCK: usize = 64;

/// Longest energy window that can be selected.
pub const MAX_WINDOW: usize = 1024;

/// Default energy window.
pub const DEFAULT_WINDOW: usize = 64;

/// Default energy hop.
pub const DEFAULT_HOP: usize = 64;

/// Fidelity a detection needs to be accepted.
pub const DEFAULT_FIDELITY_THRESHOLD: f32 = 0.95;

/// Frames quieter than this on the [`EnvPd::db`] scale never update.
const LEVEL_GATE_DB: f32 = 1.0;

/// Period tracker.
///
/// # Example
///
/// ```rust
/// use sprig_analysis::PeriodDetection;
/// use sprig_core::{Discipline, Pool};
///
/// let mut memory = vec![0.0f32; 8192];
/// let mut pool = Pool::new("pitch", &mut memory, Discipline::Stack);
/// let mut pd = PeriodDetection::init_to_pool(&mut pool, 256).unwrap();
///
/// let mut period = 0.0;
/// for i in 0..8192 {
///     let x = 0.5 * (i as f32 * core::f32::consts::TAU / 120.0).sin();
///     period = pd.tick(&mut pool, x);
/// }
/// assert!((period - 120.0).abs() < 1.0);
/// pd.free(&mut pool).unwrap();
/// ```
#[derive(Debug)]
pub struct PeriodDetection {
    input: Block,
    env: EnvPd,
    snac: Snac,
    frame: usize,
    index: usize,
    seen: u32,
    period: f32,
    fidelity: f32,
    fidelity_threshold: f32,
    alpha: f32,
    tolerance: f32,
}

impl PeriodDetection {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, frame: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, frame))
    }

    /// Allocates the frame buffer, the energy window and the SNAC buffers
    /// from `pool`. Nothing stays allocated on failure.
    pub fn init_to_pool(pool: &mut Pool<'_>, frame: usize) -> Result<Self, PoolError> {
        let frame = frame.max(1);
        let input = pool.allocate(frame)?;

        let mut env = match EnvPd::init_to_pool(pool, MAX_WINDOW, DEFAULT_HOP, ENV_BLOCK) {
            Ok(env) => env,
            Err(err) => {
                let _ = pool.free(input);
                return Err(err);
            }
        };
        env.set_window_size(pool, DEFAULT_WINDOW);

        let snac = match Snac::init_to_pool(pool, DEFAULT_FRAME, 1) {
            Ok(snac) => snac,
            Err(err) => {
                let _ = env.free(pool);
                let _ = pool.free(input);
                return Err(err);
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(frame, "period detection allocated");

        Ok(Self {
            input,
            env,
            snac,
            frame,
            index: 0,
            seen: 0,
            period: 0.0,
            fidelity: 0.0,
            fidelity_threshold: DEFAULT_FIDELITY_THRESHOLD,
            alpha: 1.0,
            tolerance: 1.0,
        })
    }

    /// Returns every buffer to `pool`, newest first.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        let snac = self.snac.free(pool);
        let env = self.env.free(pool);
        let input = pool.free(self.input).map_err(PoolError::from);
        snac.and(env).and(input)
    }

    /// Feed one sample and return the tracked period in samples (0 until
    /// the first accepted detection).
    pub fn tick(&mut self, pool: &mut Pool<'_>, sample: f32) -> f32 {
        if let Some(slot) = pool.slice_mut(&self.input).get_mut(self.index) {
            *slot = sample;
        }
        self.snac.tick(pool, sample);

        self.index += 1;
        if self.index >= self.frame {
            self.index = 0;
            let pool: &Pool<'_> = pool;
            self.env.process_block(pool, pool.slice(&self.input));
            self.update();
        }
        self.period
    }

    fn update(&mut self) {
        let count = self.snac.analysis_count();
        if count == self.seen {
            return;
        }
        self.seen = count;
        self.fidelity = self.snac.fidelity();

        if self.env.db() < LEVEL_GATE_DB || self.fidelity < self.fidelity_threshold {
            return;
        }
        let candidate = self.snac.period();
        if self.period <= 0.0 || (candidate - self.period).abs() > self.tolerance * self.period {
            self.period = candidate;
        } else {
            self.period += self.alpha * (candidate - self.period);
        }
    }

    /// Tracked period in samples.
    pub fn period(&self) -> f32 {
        self.period
    }

    /// Fidelity of the most recent analysis.
    pub fn fidelity(&self) -> f32 {
        self.fidelity
    }

    /// Level of the most recent frame on the [`EnvPd::db`] scale.
    pub fn level_db(&self) -> f32 {
        self.env.db()
    }

    /// Energy hop in samples (rounded as [`EnvPd::set_hop_size`] does).
    pub fn set_hop_size(&mut self, hop: usize) {
        self.env.set_hop_size(hop);
    }

    /// Energy window in samples, up to [`MAX_WINDOW`].
    pub fn set_window_size(&mut self, pool: &mut Pool<'_>, window: usize) {
        self.env.set_window_size(pool, window);
    }

    /// Minimum fidelity for a detection to be accepted. Range: 0.0 to 1.0.
    pub fn set_fidelity_threshold(&mut self, threshold: f32) {
        self.fidelity_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Weight of a new detection against the tracked period. 1.0 disables
    /// smoothing. Range: 0.0 to 1.0.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Relative jump above which a detection replaces the tracked period
    /// outright instead of being smoothed.
    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance.max(0.0);
    }

    /// The underlying detector, for bias, RMS gate and overlap.
    pub fn snac_mut(&mut self) -> &mut Snac {
        &mut self.snac
    }
}
