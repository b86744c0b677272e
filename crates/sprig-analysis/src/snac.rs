//! Period detection by specially normalized autocorrelation (SNAC).
//!
//! [`Snac`] keeps the last `frame` samples in a ring. Every `frame /
//! overlap` samples it unrolls the ring into a frame and computes
//!
//! ```text
//! r(k)   = sum_{i=0}^{N-1-k} x[i] x[i+k]
//! m(k)   = sum_{i=0}^{N-1-k} (x[i]^2 + x[i+k]^2)
//! n(k)   = 2 r(k) / m(k)                      in [-1, 1]
//! ```
//!
//! for lags up to `0.85 * frame`. `m(k)` starts at `2 r(0)` and loses two
//! squares per lag, so normalization costs nothing extra.
//!
//! # Scheduling
//!
//! The hop boundary only snapshots the frame. The lags are then worked off
//! a few per tick ([`Snac::lags_per_tick`]), so a tick costs at most that
//! many dot products of `frame` terms, and every analysis finishes before
//! the next boundary. Results arrive up to one hop after the snapshot.
//!
//! # Peak picking
//!
//! 1. Skip the main lobe around lag 0 (everything up to the first
//!    negative value).
//! 2. Among the remaining local maxima, pick the one with the largest
//!    `n(k) * bias(k)`. The bias falls off logarithmically with lag so
//!    the fundamental wins over its multiples.
//! 3. Fit a parabola through the peak and its neighbours. The vertex
//!    position is the period, its height the fidelity.
//!
//! Frames quieter than the minimum RMS report fidelity 0 and keep the
//! previous period.
//!
//! # Reference
//!
//! P. McLeod and G. Wyvill, "A Smarter Way to Find Pitch", ICMC 2005.
//! K. Vetter, "helmholtz~" (specially normalized autocorrelation for Pd).

use sprig_core::{Block, Context, Pool, PoolError};

/// Fraction of the frame searched for a period.
pub const SEEK: f32 = 0.85;

/// Smallest frame accepted.
pub const MIN_FRAME: usize = 64;

/// Default frame length.
pub const DEFAULT_FRAME: usize = 1024;

/// Largest overlap factor accepted by [`Snac::set_overlap`].
pub const MAX_OVERLAP: usize = 16;

/// Default short-period bias.
pub const DEFAULT_BIAS: f32 = 0.2;

/// Default RMS gate.
pub const DEFAULT_MIN_RMS: f32 = 0.003;

/// Lags below this are never reported.
const MIN_LAG: usize = 5;

/// Autocorrelation period detector.
///
/// # Example
///
/// ```rust
/// use sprig_analysis::Snac;
/// use sprig_core::{Discipline, Pool};
///
/// let mut memory = vec![0.0f32; 4096];
/// let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
/// let mut snac = Snac::init_to_pool(&mut pool, 1024, 1).unwrap();
///
/// for i in 0..4096 {
///     let x = (i as f32 * core::f32::consts::TAU / 100.0).sin();
///     snac.tick(&mut pool, x);
/// }
/// assert!((snac.period() - 100.0).abs() < 1.0);
/// assert!(snac.fidelity() > 0.9);
/// snac.free(&mut pool).unwrap();
/// ```
#[derive(Debug)]
pub struct Snac {
    block: Block,
    frame: usize,
    seek: usize,
    overlap: usize,
    hop: usize,
    time_index: usize,
    bias: f32,
    min_rms: f32,
    period: f32,
    fidelity: f32,
    analyses: u32,
    /// Next lag to correlate, `None` when idle.
    cursor: Option<usize>,
    /// Running `m(k)` for the lag at `cursor`.
    norm: f32,
}

impl Snac {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, frame: usize, overlap: usize) -> Result<Self, PoolError> {
        ctx.with_default_pool(|_, pool| Self::init_to_pool(pool, frame, overlap))
    }

    /// Allocates the ring, the work frame, the correlation and the bias
    /// curve as one block from `pool`.
    ///
    /// `frame` is raised to at least [`MIN_FRAME`]; the longest period
    /// that can be found is `0.85 * frame`.
    pub fn init_to_pool(
        pool: &mut Pool<'_>,
        frame: usize,
        overlap: usize,
    ) -> Result<Self, PoolError> {
        let frame = frame.max(MIN_FRAME);
        let seek = (frame as f32 * SEEK) as usize;
        let block = pool.allocate(2 * frame + 2 * seek)?;

        let mut snac = Self {
            block,
            frame,
            seek,
            overlap: 1,
            hop: frame,
            time_index: 0,
            bias: DEFAULT_BIAS,
            min_rms: DEFAULT_MIN_RMS,
            period: 0.0,
            fidelity: 0.0,
            analyses: 0,
            cursor: None,
            norm: 0.0,
        };
        snac.set_overlap(overlap);
        snac.fill_bias(pool);

        #[cfg(feature = "tracing")]
        tracing::debug!(frame, overlap = snac.overlap, "snac allocated");

        Ok(snac)
    }

    /// Returns the buffers to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        pool.free(self.block).map_err(PoolError::from)
    }

    /// Analyses per frame. Clamped to `[1, MAX_OVERLAP]`.
    pub fn set_overlap(&mut self, overlap: usize) {
        self.overlap = overlap.clamp(1, MAX_OVERLAP);
        self.hop = (self.frame / self.overlap).max(1);
    }

    /// Preference for short periods, 0 (none) to 1. Rewrites the bias curve.
    pub fn set_bias(&mut self, pool: &mut Pool<'_>, bias: f32) {
        self.bias = if bias.is_finite() {
            bias.clamp(0.0, 1.0)
        } else {
            DEFAULT_BIAS
        };
        self.fill_bias(pool);
    }

    /// Frames with RMS below this report fidelity 0.
    pub fn set_min_rms(&mut self, rms: f32) {
        self.min_rms = if rms.is_finite() { rms.max(0.0) } else { DEFAULT_MIN_RMS };
    }

    fn fill_bias(&self, pool: &mut Pool<'_>) {
        let (frame, seek) = (self.frame, self.seek);
        let buf = pool.slice_mut(&self.block);
        if buf.len() < 2 * frame + 2 * seek {
            return;
        }
        let curve = &mut buf[2 * frame + seek..];
        let norm = self.bias / libm::logf((seek - 4) as f32);
        for (n, b) in curve.iter_mut().enumerate() {
            *b = if n < MIN_LAG {
                0.0
            } else {
                1.0 - libm::logf((n - 4) as f32) * norm
            };
        }
    }

    /// Frame length in samples.
    pub fn frame_size(&self) -> usize {
        self.frame
    }

    /// Samples between analyses.
    pub fn hop_size(&self) -> usize {
        self.hop
    }

    /// Overlap factor.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Last detected period in samples, 0 before the first detection.
    pub fn period(&self) -> f32 {
        self.period
    }

    /// Confidence of the last analysis, 0 to 1.
    pub fn fidelity(&self) -> f32 {
        self.fidelity
    }

    /// Lags correlated per tick while an analysis is running.
    pub fn lags_per_tick(&self) -> usize {
        self.seek.div_ceil(self.hop)
    }

    /// True between a hop boundary and the end of its analysis.
    pub fn is_analyzing(&self) -> bool {
        self.cursor.is_some()
    }

    /// Number of analyses run so far, wrapping. Lets frame-rate readers
    /// tell a fresh result from a repeated one.
    pub fn analysis_count(&self) -> u32 {
        self.analyses
    }

    /// Push one sample. Snapshots the frame at hop boundaries and advances
    /// any running analysis. Returns the period.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, sample: f32) -> f32 {
        let ring = pool.slice_mut(&self.block);
        if let Some(slot) = ring.get_mut(self.time_index) {
            *slot = sample;
        }
        self.time_index = (self.time_index + 1) % self.frame;
        if self.time_index % self.hop == 0 {
            self.snapshot(pool);
        }
        if self.cursor.is_some() {
            self.correlate(pool);
        }
        self.period
    }

    /// Push a block. `output`, if long enough, receives the period after
    /// each sample.
    pub fn io_samples(&mut self, pool: &mut Pool<'_>, input: &[f32], output: &mut [f32]) {
        let mut out = output.iter_mut();
        for &x in input {
            let period = self.tick(pool, x);
            if let Some(o) = out.next() {
                *o = period;
            }
        }
    }

    /// Clear the ring and forget the last detection.
    pub fn reset(&mut self, pool: &mut Pool<'_>) {
        let frame = self.frame;
        let buf = pool.slice_mut(&self.block);
        let end = frame.min(buf.len());
        buf[..end].fill(0.0);
        self.time_index = 0;
        self.period = 0.0;
        self.fidelity = 0.0;
        self.cursor = None;
    }

    /// Unroll the ring into the work frame and start a new analysis. An
    /// unfinished one is dropped.
    fn snapshot(&mut self, pool: &mut Pool<'_>) {
        let (n, seek) = (self.frame, self.seek);
        let buf = pool.slice_mut(&self.block);
        if buf.len() < 2 * n + 2 * seek {
            return;
        }
        let (ring, rest) = buf.split_at_mut(n);
        let frame = &mut rest[..n];

        // oldest sample first
        let (newer, older) = ring.split_at(self.time_index);
        frame[..older.len()].copy_from_slice(older);
        frame[older.len()..].copy_from_slice(newer);

        let energy: f32 = frame.iter().map(|x| x * x).sum();
        if libm::sqrtf(energy / n as f32) < self.min_rms {
            self.cursor = None;
            self.fidelity = 0.0;
            self.analyses = self.analyses.wrapping_add(1);
            return;
        }
        self.norm = 2.0 * energy;
        self.cursor = Some(0);
    }

    /// Correlate the next batch of lags; pick the peak after the last one.
    fn correlate(&mut self, pool: &mut Pool<'_>) {
        let Some(start) = self.cursor else {
            return;
        };
        let (n, seek) = (self.frame, self.seek);
        let stop = (start + self.lags_per_tick()).min(seek);
        let buf = pool.slice_mut(&self.block);
        if buf.len() < 2 * n + 2 * seek {
            self.cursor = None;
            return;
        }
        let rest = &mut buf[n..];
        let (frame, rest) = rest.split_at_mut(n);
        let (nac, bias) = rest.split_at_mut(seek);

        let mut m = self.norm;
        for lag in start..stop {
            if lag > 0 {
                m -= frame[lag - 1] * frame[lag - 1] + frame[n - lag] * frame[n - lag];
            }
            let r: f32 = frame[lag..].iter().zip(frame.iter()).map(|(a, b)| a * b).sum();
            nac[lag] = if m > f32::EPSILON { 2.0 * r / m } else { 0.0 };
        }
        self.norm = m;

        if stop < seek {
            self.cursor = Some(stop);
            return;
        }
        self.cursor = None;
        self.analyses = self.analyses.wrapping_add(1);
        match pick_peak(nac, bias) {
            Some(index) => {
                let (shift, height) = parabolic_peak(nac[index - 1], nac[index], nac[index + 1]);
                self.period = index as f32 + shift;
                self.fidelity = height.clamp(0.0, 1.0);
            }
            None => self.fidelity = 0.0,
        }
    }
}

/// Lag of the best biased local maximum past the main lobe.
fn pick_peak(nac: &[f32], bias: &[f32]) -> Option<usize> {
    let seek = nac.len();
    let mut n = 1;
    while n < seek && nac[n] > 0.0 {
        n += 1;
    }

    let mut best = 0.0;
    let mut index = None;
    while n + 1 < seek {
        if nac[n] > nac[n - 1] && nac[n] >= nac[n + 1] {
            let weighted = nac[n] * bias[n];
            if weighted > best {
                best = weighted;
                index = Some(n);
            }
        }
        n += 1;
    }
    index
}

/// Vertex offset and height of the parabola through three points.
#[inline]
fn parabolic_peak(left: f32, mid: f32, right: f32) -> (f32, f32) {
    let denom = left - 2.0 * mid + right;
    if denom.abs() < 1e-12 {
        return (0.0, mid);
    }
    let shift = (0.5 * (left - right) / denom).clamp(-0.5, 0.5);
    (shift, mid - 0.25 * (left - right) * shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::Discipline;

    fn feed_sine(snac: &mut Snac, pool: &mut Pool<'_>, period: f32, amp: f32, len: usize) {
        for i in 0..len {
            let x = amp * libm::sinf(core::f32::consts::TAU * i as f32 / period);
            snac.tick(pool, x);
        }
    }

    #[test]
    fn finds_fractional_period() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 2).unwrap();
        feed_sine(&mut snac, &mut pool, 109.09, 0.5, 4096);
        assert!((snac.period() - 109.09).abs() < 0.5, "period {}", snac.period());
        assert!(snac.fidelity() > 0.95, "fidelity {}", snac.fidelity());
    }

    #[test]
    fn prefers_fundamental_over_multiples() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 1).unwrap();
        for i in 0..4096 {
            let t = core::f32::consts::TAU * i as f32 / 200.0;
            // strong second harmonic
            let x = 0.3 * libm::sinf(t) + 0.6 * libm::sinf(2.0 * t);
            snac.tick(&mut pool, x);
        }
        assert!((snac.period() - 200.0).abs() < 2.0, "period {}", snac.period());
    }

    #[test]
    fn bias_range_still_finds_pure_tone() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 1).unwrap();
        for bias in [0.0, 1.0, f32::NAN] {
            snac.set_bias(&mut pool, bias);
            snac.reset(&mut pool);
            feed_sine(&mut snac, &mut pool, 80.0, 0.5, 3072);
            assert!((snac.period() - 80.0).abs() < 0.5, "bias {} period {}", bias, snac.period());
        }
    }

    #[test]
    fn quiet_input_holds_period() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 512, 1).unwrap();
        feed_sine(&mut snac, &mut pool, 50.0, 0.5, 2048);
        // let the analysis of the last tone frame finish
        feed_sine(&mut snac, &mut pool, 80.0, 0.001, 511);
        assert!(!snac.is_analyzing());
        let period = snac.period();
        assert!((period - 50.0).abs() < 0.5);

        feed_sine(&mut snac, &mut pool, 80.0, 0.001, 2048);
        assert_eq!(snac.fidelity(), 0.0);
        assert_eq!(snac.period(), period);
    }

    #[test]
    fn analysis_is_spread_over_the_hop() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 1).unwrap();
        // 870 lags over a 1024-sample hop
        assert_eq!(snac.lags_per_tick(), 1);

        feed_sine(&mut snac, &mut pool, 100.0, 0.5, 1024);
        assert!(snac.is_analyzing());
        assert_eq!(snac.analysis_count(), 0);
        assert_eq!(snac.period(), 0.0);

        for _ in 0..1023 {
            snac.tick(&mut pool, 0.0);
        }
        assert!(!snac.is_analyzing());
        assert_eq!(snac.analysis_count(), 1);
        assert!((snac.period() - 100.0).abs() < 0.5, "period {}", snac.period());
    }

    #[test]
    fn overlap_raises_lags_per_tick() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 4).unwrap();
        assert_eq!(snac.lags_per_tick(), 4);
        snac.set_overlap(MAX_OVERLAP);
        assert_eq!(snac.hop_size(), 64);
        assert_eq!(snac.lags_per_tick(), 14);

        // 24 boundaries; all but the one just snapshotted have finished
        feed_sine(&mut snac, &mut pool, 60.0, 0.5, 24 * 64);
        assert!(snac.is_analyzing());
        assert_eq!(snac.analysis_count(), 23);
        assert!((snac.period() - 60.0).abs() < 0.5, "period {}", snac.period());
    }

    #[test]
    fn overlap_sets_hop() {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 4).unwrap();
        assert_eq!(snac.hop_size(), 256);
        snac.set_overlap(0);
        assert_eq!(snac.hop_size(), 1024);
        snac.set_overlap(1000);
        assert_eq!(snac.overlap(), MAX_OVERLAP);
    }

    #[test]
    fn small_frame_is_raised() {
        let mut memory = vec![0.0f32; 1024];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let snac = Snac::init_to_pool(&mut pool, 8, 1).unwrap();
        assert_eq!(snac.frame_size(), MIN_FRAME);
        assert_eq!(pool.live(), 2 * 64 + 2 * 54);
    }

    #[test]
    fn io_samples_reports_running_period() {
        let mut memory = vec![0.0f32; 2048];
        let mut pool = Pool::new("snac", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 256, 1).unwrap();
        let input: Vec<f32> = (0..1024)
            .map(|i| libm::sinf(core::f32::consts::TAU * i as f32 / 40.0))
            .collect();
        let mut output = vec![0.0f32; 1024];
        snac.io_samples(&mut pool, &input, &mut output);
        assert_eq!(output[0], 0.0);
        assert!((output[1023] - 40.0).abs() < 0.5, "period {}", output[1023]);
    }

    #[test]
    fn parabola_vertex() {
        let (shift, height) = parabolic_peak(0.5, 1.0, 0.5);
        assert_eq!(shift, 0.0);
        assert_eq!(height, 1.0);
        let (shift, _) = parabolic_peak(0.9, 1.0, 0.1);
        assert!(shift < 0.0);
    }
}
