//! Self-sustaining waveguide strings.
//!
//! "Living" strings keep ringing: a [`FeedbackLeveler`] in each termination
//! holds loop power near a target instead of letting it decay, so the string
//! behaves like a bowed or e-bowed resonator that input merely colours.
//!
//! | Type | Delay lines | Junctions |
//! |------|-------------|-----------|
//! | [`SimpleLivingString`] | 1 | none |
//! | [`LivingString`] | 4 | pick point (with preparation) |
//! | [`ComplexLivingString`] | 6 | pick point, preparation point |
//!
//! Each termination (bridge, nut) is `-(leveler(decay * dc_block(lowpass(x))))`.
//! A preparation junction reflects `prep_index` of each arriving wave back
//! through its own one-pole filter and transmits the rest.
//!
//! Pitch, pick position and preparation position never jump: setters move
//! an [`ExpSmooth`] target and delay lengths follow it one tick at a time.

use sprig_core::{
    Context, ExpSmooth, FeedbackLeveler, Highpass, LevelerMode, LinearDelay, Module, OnePole,
    Pool, PoolError, finite_or_zero,
};

/// Longest delay line, in samples.
pub const MAX_DELAY: usize = 2400;

/// DC blocker corner, Hz.
const DC_BLOCK_HZ: f32 = 13.0;

/// Per-tick smoothing for wavelength and positions.
const SMOOTH_FACTOR: f32 = 0.01;

/// Construction parameters shared by the living strings.
///
/// `SimpleLivingString` ignores the pick and preparation fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringConfig {
    /// Fundamental, Hz.
    pub freq: f32,
    /// Pick point as a fraction of string length from the bridge.
    pub pick_pos: f32,
    /// Preparation point as a fraction of string length from the bridge.
    pub prep_pos: f32,
    /// Reflection at the preparation (0 = soft, 1 = hard object).
    pub prep_index: f32,
    /// Termination lowpass corner, Hz.
    pub damp_freq: f32,
    /// Loop attenuation, effective only in [`LevelerMode::Compress`].
    pub decay: f32,
    /// Power the levelers steer toward.
    pub target_level: f32,
    /// Leveler power follower smoothing.
    pub lev_smooth_factor: f32,
    /// Leveler correction strength.
    pub lev_strength: f32,
    /// Leveler mode.
    pub lev_mode: LevelerMode,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            freq: 220.0,
            pick_pos: 0.4,
            prep_pos: 0.6,
            prep_index: 0.0,
            damp_freq: 4000.0,
            decay: 0.999,
            target_level: 0.5,
            lev_smooth_factor: 0.01,
            lev_strength: 0.3,
            lev_mode: LevelerMode::Compress,
        }
    }
}

fn clamp_position(pos: f32) -> f32 {
    if pos.is_finite() { pos.clamp(0.0, 1.0) } else { 0.5 }
}

fn wavelength(sample_rate: f32, freq: f32) -> f32 {
    let freq = if freq.is_finite() { freq.max(1.0) } else { 220.0 };
    (sample_rate / freq).min(MAX_DELAY as f32)
}

/// Splits a half wavelength into `N` segment delays at the given fractions
/// (which sum to one).
///
/// Every segment adds one sample of read-before-write latency, so the
/// overhead comes off the total once and the delays always sum to
/// `half_wavelength - N`, even when a segment shrinks to nothing.
fn split_segments<const N: usize>(half_wavelength: f32, fractions: [f32; N]) -> [f32; N] {
    let mut remaining = (half_wavelength - N as f32).max(0.0);
    let mut delays = [0.0; N];
    for (delay, fraction) in delays.iter_mut().zip(fractions).take(N.saturating_sub(1)) {
        *delay = (fraction * half_wavelength - 1.0).clamp(0.0, remaining);
        remaining -= *delay;
    }
    if let Some(last) = delays.last_mut() {
        *last = remaining;
    }
    delays
}

/// Allocates `N` lines, releasing the ones already taken if a later one fails.
fn allocate_lines<const N: usize>(pool: &mut Pool<'_>) -> Result<[Option<LinearDelay>; N], PoolError> {
    let mut lines: [Option<LinearDelay>; N] = [const { None }; N];
    let mut failure = None;
    for slot in &mut lines {
        match LinearDelay::init_to_pool(pool, 0.0, MAX_DELAY) {
            Ok(line) => *slot = Some(line),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        // the exhaustion is the error worth reporting
        let _ = release_lines(lines, pool);
        return Err(e);
    }
    Ok(lines)
}

/// Frees lines newest first so stack pools accept the order.
fn release_lines<const N: usize>(lines: [Option<LinearDelay>; N], pool: &mut Pool<'_>) -> Result<(), PoolError> {
    let mut result = Ok(());
    for line in lines.into_iter().rev().flatten() {
        let freed = line.free(pool);
        if result.is_ok() {
            result = freed;
        }
    }
    result
}

/// Damping, DC blocking and leveling at one end of the string.
#[derive(Debug, Clone)]
struct Termination {
    damp: OnePole,
    dc: Highpass,
    leveler: FeedbackLeveler,
}

impl Termination {
    fn new(sample_rate: f32, cfg: &StringConfig) -> Self {
        Self {
            damp: OnePole::new(sample_rate, cfg.damp_freq),
            dc: Highpass::new(sample_rate, DC_BLOCK_HZ),
            leveler: FeedbackLeveler::new(
                cfg.target_level,
                cfg.lev_smooth_factor,
                cfg.lev_strength,
                cfg.lev_mode,
            ),
        }
    }

    #[inline]
    fn reflect(&mut self, x: f32, decay: f32) -> f32 {
        -self.leveler.tick(decay * self.dc.tick(self.damp.tick(x)))
    }

    fn reset(&mut self) {
        self.damp.reset();
        self.dc.reset();
        self.leveler.reset();
    }
}

/// Partial reflector at a preparation point.
#[derive(Debug, Clone)]
struct Preparation {
    upper: OnePole,
    lower: OnePole,
}

impl Preparation {
    fn new(sample_rate: f32, damp_freq: f32) -> Self {
        Self {
            upper: OnePole::new(sample_rate, damp_freq),
            lower: OnePole::new(sample_rate, damp_freq),
        }
    }

    /// `rising` arrives from the bridge side, `falling` from the nut side.
    /// Returns `(into_upper, into_lower)`.
    #[inline]
    fn scatter(&mut self, rising: f32, falling: f32, index: f32) -> (f32, f32) {
        let bounced_down = -self.lower.tick(rising);
        let bounced_up = -self.upper.tick(falling);
        (
            index * bounced_up + (1.0 - index) * rising,
            index * bounced_down + (1.0 - index) * falling,
        )
    }

    fn set_frequency(&mut self, freq: f32) {
        self.upper.set_frequency(freq);
        self.lower.set_frequency(freq);
    }

    fn reset(&mut self) {
        self.upper.reset();
        self.lower.reset();
    }
}

/// Parameters every living string carries.
#[derive(Debug, Clone)]
struct Common {
    sample_rate: f32,
    freq: f32,
    decay: f32,
    mode: LevelerMode,
    wavelength: ExpSmooth,
    curr: f32,
}

impl Common {
    fn new(sample_rate: f32, cfg: &StringConfig, scale: f32) -> Self {
        let wl = wavelength(sample_rate, cfg.freq) * scale;
        Self {
            sample_rate,
            freq: cfg.freq,
            decay: cfg.decay.clamp(0.0, 1.0),
            mode: cfg.lev_mode,
            wavelength: ExpSmooth::new(wl, SMOOTH_FACTOR),
            curr: 0.0,
        }
    }

    /// Loop attenuation in effect: only compress mode needs it.
    #[inline]
    fn loop_decay(&self) -> f32 {
        match self.mode {
            LevelerMode::Compress => self.decay,
            LevelerMode::Normalize => 1.0,
        }
    }
}

macro_rules! common_setters {
    ($scale:expr) => {
        /// Set pitch in Hz. The delay lengths glide to the new value.
        pub fn set_freq(&mut self, freq: f32) {
            self.common.freq = freq;
            self.common
                .wavelength
                .set_dest(wavelength(self.common.sample_rate, freq) * $scale);
        }

        /// Set the wavelength directly, in samples.
        pub fn set_wavelength(&mut self, samples: f32) {
            let samples = finite_or_zero(samples);
            self.common
                .wavelength
                .set_dest(samples.clamp(2.0, MAX_DELAY as f32) * $scale);
        }

        /// Loop attenuation for compress mode, near 1.0.
        pub fn set_decay(&mut self, decay: f32) {
            self.common.decay = decay.clamp(0.0, 1.0);
        }

        /// Pitch last set, Hz.
        pub fn freq(&self) -> f32 {
            self.common.freq
        }

        /// Last output sample.
        pub fn sample(&self) -> f32 {
            self.common.curr
        }
    };
}

macro_rules! leveler_setters {
    ($($term:ident),+) => {
        /// Power the levelers steer toward.
        pub fn set_target_level(&mut self, level: f32) {
            $(self.$term.leveler.set_target_level(level);)+
        }

        /// Leveler power follower smoothing.
        pub fn set_lev_smooth_factor(&mut self, factor: f32) {
            $(self.$term.leveler.set_factor(factor);)+
        }

        /// Leveler correction strength.
        pub fn set_lev_strength(&mut self, strength: f32) {
            $(self.$term.leveler.set_strength(strength);)+
        }

        /// Leveler mode; compress mode also enables `decay`.
        pub fn set_lev_mode(&mut self, mode: LevelerMode) {
            self.common.mode = mode;
            $(self.$term.leveler.set_mode(mode);)+
        }
    };
}

// ============================================================================
// SimpleLivingString
// ============================================================================

/// One delay loop with a damped, leveled bridge.
#[derive(Debug)]
pub struct SimpleLivingString {
    common: Common,
    line: LinearDelay,
    bridge: Termination,
}

impl SimpleLivingString {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, cfg))
    }

    /// Allocates from `pool`.
    pub fn init_to_pool(ctx: &Context<'_>, pool: &mut Pool<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        let sample_rate = ctx.sample_rate();
        let common = Common::new(sample_rate, cfg, 1.0);
        let mut line = LinearDelay::init_to_pool(pool, 0.0, MAX_DELAY)?;
        line.set_delay(common.wavelength.sample() - 1.0);
        Ok(Self {
            common,
            line,
            bridge: Termination::new(sample_rate, cfg),
        })
    }

    /// Returns the delay buffer to `pool`.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        self.line.free(pool)
    }

    common_setters!(1.0);
    leveler_setters!(bridge);

    /// Bridge lowpass corner, Hz.
    pub fn set_damp_freq(&mut self, freq: f32) {
        self.bridge.damp.set_frequency(freq);
    }

    /// Advance one sample with `input` injected into the loop.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let string_out = self.bridge.damp.tick(self.line.last_out());
        let fed = self.common.loop_decay() * string_out + input;
        let string_in = self.bridge.dc.tick(self.bridge.leveler.tick(fed));
        self.line.tick_in(pool, string_in);
        self.line.set_delay(self.common.wavelength.tick() - 1.0);
        self.line.tick_out(pool);
        self.common.curr = string_out;
        self.common.curr
    }

    /// Silence the string.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        self.line.clear(pool);
        self.bridge.reset();
        self.common.curr = 0.0;
    }
}

// ============================================================================
// LivingString
// ============================================================================

/// Bidirectional waveguide split at the pick point.
///
/// Four lines: lower forward/backward (bridge to pick) and upper
/// forward/backward (pick to nut). Input enters both directions at the
/// pick point, where the preparation also sits.
#[derive(Debug)]
pub struct LivingString {
    common: Common,
    pick_pos: ExpSmooth,
    prep_index: f32,
    lower_fwd: LinearDelay,
    upper_fwd: LinearDelay,
    upper_back: LinearDelay,
    lower_back: LinearDelay,
    bridge: Termination,
    nut: Termination,
    prep: Preparation,
}

impl LivingString {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, cfg))
    }

    /// Allocates four lines from `pool`.
    pub fn init_to_pool(ctx: &Context<'_>, pool: &mut Pool<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        let sample_rate = ctx.sample_rate();
        let lines = allocate_lines::<4>(pool)?;
        let [Some(lower_fwd), Some(upper_fwd), Some(upper_back), Some(lower_back)] = lines else {
            return Err(PoolError::InvalidBlock);
        };
        let mut string = Self {
            common: Common::new(sample_rate, cfg, 0.5),
            pick_pos: ExpSmooth::new(clamp_position(cfg.pick_pos), SMOOTH_FACTOR),
            prep_index: cfg.prep_index.clamp(0.0, 1.0),
            lower_fwd,
            upper_fwd,
            upper_back,
            lower_back,
            bridge: Termination::new(sample_rate, cfg),
            nut: Termination::new(sample_rate, cfg),
            prep: Preparation::new(sample_rate, cfg.damp_freq),
        };
        string.update_lengths(string.common.wavelength.sample(), string.pick_pos.sample());

        #[cfg(feature = "tracing")]
        tracing::debug!(freq = cfg.freq, pick = cfg.pick_pos, "living string allocated");

        Ok(string)
    }

    /// Returns all four buffers to `pool`, newest first.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        release_lines(
            [
                Some(self.lower_fwd),
                Some(self.upper_fwd),
                Some(self.upper_back),
                Some(self.lower_back),
            ],
            pool,
        )
    }

    common_setters!(0.5);
    leveler_setters!(bridge, nut);

    /// Pick point, 0 (bridge) to 1 (nut). Glides.
    pub fn set_pick_pos(&mut self, pos: f32) {
        self.pick_pos.set_dest(clamp_position(pos));
    }

    /// Preparation hardness, 0 to 1.
    pub fn set_prep_index(&mut self, index: f32) {
        self.prep_index = index.clamp(0.0, 1.0);
    }

    /// Termination and preparation lowpass corner, Hz.
    pub fn set_damp_freq(&mut self, freq: f32) {
        self.bridge.damp.set_frequency(freq);
        self.nut.damp.set_frequency(freq);
        self.prep.set_frequency(freq);
    }

    fn update_lengths(&mut self, half_wavelength: f32, pick: f32) {
        let [lower, upper] = split_segments(half_wavelength, [pick, 1.0 - pick]);
        self.lower_fwd.set_delay(lower);
        self.lower_back.set_delay(lower);
        self.upper_fwd.set_delay(upper);
        self.upper_back.set_delay(upper);
    }

    /// Advance one sample with `input` injected at the pick point.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let from_lower_fwd = self.lower_fwd.tick_out(pool);
        let from_upper_fwd = self.upper_fwd.tick_out(pool);
        let from_upper_back = self.upper_back.tick_out(pool);
        let from_lower_back = self.lower_back.tick_out(pool);
        let decay = self.common.loop_decay();

        let from_nut = self.nut.reflect(from_upper_fwd, decay);
        self.upper_back.tick_in(pool, from_nut);

        let from_bridge = self.bridge.reflect(from_lower_back, decay);
        self.lower_fwd.tick_in(pool, from_bridge);

        let (into_upper, into_lower) =
            self.prep.scatter(from_lower_fwd, from_upper_back, self.prep_index);
        self.lower_back.tick_in(pool, into_lower + input);
        self.upper_fwd.tick_in(pool, into_upper + input);

        let pick = self.pick_pos.tick();
        let half = self.common.wavelength.tick();
        self.update_lengths(half, pick);

        self.common.curr = from_bridge;
        self.common.curr
    }

    /// Silence the string.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        for line in [
            &mut self.lower_fwd,
            &mut self.upper_fwd,
            &mut self.upper_back,
            &mut self.lower_back,
        ] {
            line.clear(pool);
        }
        self.bridge.reset();
        self.nut.reset();
        self.prep.reset();
        self.common.curr = 0.0;
    }
}

// ============================================================================
// ComplexLivingString
// ============================================================================

/// Waveguide with independent pick and preparation points.
///
/// Six lines in three segments: bridge to the lower junction, between the
/// junctions, and upper junction to nut. Whichever of pick and preparation
/// sits closer to the bridge is the lower junction; this is re-evaluated
/// every tick as positions glide.
#[derive(Debug)]
pub struct ComplexLivingString {
    common: Common,
    pick_pos: ExpSmooth,
    prep_pos: ExpSmooth,
    prep_index: f32,
    prep_lower: bool,
    lower_fwd: LinearDelay,
    upper_fwd: LinearDelay,
    mid_fwd: LinearDelay,
    mid_back: LinearDelay,
    upper_back: LinearDelay,
    lower_back: LinearDelay,
    bridge: Termination,
    nut: Termination,
    prep: Preparation,
}

impl ComplexLivingString {
    /// Allocates from the context's default pool.
    pub fn init(ctx: &mut Context<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        ctx.with_default_pool(|ctx, pool| Self::init_to_pool(ctx, pool, cfg))
    }

    /// Allocates six lines from `pool`.
    pub fn init_to_pool(ctx: &Context<'_>, pool: &mut Pool<'_>, cfg: &StringConfig) -> Result<Self, PoolError> {
        let sample_rate = ctx.sample_rate();
        let lines = allocate_lines::<6>(pool)?;
        let [
            Some(lower_fwd),
            Some(upper_fwd),
            Some(mid_fwd),
            Some(mid_back),
            Some(upper_back),
            Some(lower_back),
        ] = lines
        else {
            return Err(PoolError::InvalidBlock);
        };
        let pick = clamp_position(cfg.pick_pos);
        let prep = clamp_position(cfg.prep_pos);
        let mut string = Self {
            common: Common::new(sample_rate, cfg, 0.5),
            pick_pos: ExpSmooth::new(pick, SMOOTH_FACTOR),
            prep_pos: ExpSmooth::new(prep, SMOOTH_FACTOR),
            prep_index: cfg.prep_index.clamp(0.0, 1.0),
            prep_lower: prep < pick,
            lower_fwd,
            upper_fwd,
            mid_fwd,
            mid_back,
            upper_back,
            lower_back,
            bridge: Termination::new(sample_rate, cfg),
            nut: Termination::new(sample_rate, cfg),
            prep: Preparation::new(sample_rate, cfg.damp_freq),
        };
        string.update_lengths(string.common.wavelength.sample(), pick, prep);
        Ok(string)
    }

    /// Returns all six buffers to `pool`, newest first.
    pub fn free(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        release_lines(
            [
                Some(self.lower_fwd),
                Some(self.upper_fwd),
                Some(self.mid_fwd),
                Some(self.mid_back),
                Some(self.upper_back),
                Some(self.lower_back),
            ],
            pool,
        )
    }

    common_setters!(0.5);
    leveler_setters!(bridge, nut);

    /// Pick point, 0 (bridge) to 1 (nut). Glides.
    pub fn set_pick_pos(&mut self, pos: f32) {
        self.pick_pos.set_dest(clamp_position(pos));
    }

    /// Preparation point, 0 (bridge) to 1 (nut). Glides.
    pub fn set_prep_pos(&mut self, pos: f32) {
        self.prep_pos.set_dest(clamp_position(pos));
    }

    /// Preparation hardness, 0 to 1.
    pub fn set_prep_index(&mut self, index: f32) {
        self.prep_index = index.clamp(0.0, 1.0);
    }

    /// Termination and preparation lowpass corner, Hz.
    pub fn set_damp_freq(&mut self, freq: f32) {
        self.bridge.damp.set_frequency(freq);
        self.nut.damp.set_frequency(freq);
        self.prep.set_frequency(freq);
    }

    fn update_lengths(&mut self, half_wavelength: f32, pick: f32, prep: f32) {
        self.prep_lower = prep < pick;
        let (low, high) = if self.prep_lower { (prep, pick) } else { (pick, prep) };
        let [lower, mid, upper] = split_segments(half_wavelength, [low, high - low, 1.0 - high]);
        self.lower_fwd.set_delay(lower);
        self.lower_back.set_delay(lower);
        self.mid_fwd.set_delay(mid);
        self.mid_back.set_delay(mid);
        self.upper_fwd.set_delay(upper);
        self.upper_back.set_delay(upper);
    }

    /// Advance one sample with `input` injected at the pick point.
    #[inline]
    pub fn tick(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let from_lower_fwd = self.lower_fwd.tick_out(pool);
        let from_mid_fwd = self.mid_fwd.tick_out(pool);
        let from_upper_fwd = self.upper_fwd.tick_out(pool);
        let from_upper_back = self.upper_back.tick_out(pool);
        let from_mid_back = self.mid_back.tick_out(pool);
        let from_lower_back = self.lower_back.tick_out(pool);
        let decay = self.common.loop_decay();

        let from_nut = self.nut.reflect(from_upper_fwd, decay);
        self.upper_back.tick_in(pool, from_nut);

        let from_bridge = self.bridge.reflect(from_lower_back, decay);
        self.lower_fwd.tick_in(pool, from_bridge);

        if self.prep_lower {
            // bridge .. prep .. pick .. nut
            let (into_mid, into_lower) =
                self.prep.scatter(from_lower_fwd, from_mid_back, self.prep_index);
            self.mid_fwd.tick_in(pool, into_mid);
            self.lower_back.tick_in(pool, into_lower);
            self.upper_fwd.tick_in(pool, from_mid_fwd + input);
            self.mid_back.tick_in(pool, from_upper_back + input);
        } else {
            // bridge .. pick .. prep .. nut
            self.mid_fwd.tick_in(pool, from_lower_fwd + input);
            self.lower_back.tick_in(pool, from_mid_back + input);
            let (into_upper, into_mid) =
                self.prep.scatter(from_mid_fwd, from_upper_back, self.prep_index);
            self.upper_fwd.tick_in(pool, into_upper);
            self.mid_back.tick_in(pool, into_mid);
        }

        let pick = self.pick_pos.tick();
        let prep = self.prep_pos.tick();
        let half = self.common.wavelength.tick();
        self.update_lengths(half, pick, prep);

        self.common.curr = from_bridge;
        self.common.curr
    }

    /// Silence the string.
    pub fn clear(&mut self, pool: &mut Pool<'_>) {
        for line in [
            &mut self.lower_fwd,
            &mut self.upper_fwd,
            &mut self.mid_fwd,
            &mut self.mid_back,
            &mut self.upper_back,
            &mut self.lower_back,
        ] {
            line.clear(pool);
        }
        self.bridge.reset();
        self.nut.reset();
        self.prep.reset();
        self.common.curr = 0.0;
    }
}

macro_rules! string_module {
    ($($ty:ty),+) => {$(
        impl Module for $ty {
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
    )+};
}

string_module!(SimpleLivingString, LivingString, ComplexLivingString);

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::{Discipline, EngineConfig, XorShift32};

    const SR: f32 = 48000.0;

    fn excite_and_run<F: FnMut(&mut Pool<'_>, f32) -> f32>(pool: &mut Pool<'_>, n: usize, mut tick: F) -> Vec<f32> {
        (0..n)
            .map(|i| tick(pool, if i < 32 { 0.5 } else { 0.0 }))
            .collect()
    }

    fn context_parts() -> (Vec<f32>, XorShift32) {
        (Vec::new(), XorShift32::new(1))
    }

    #[test]
    fn simple_string_rings_and_stays_bounded() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);
        let cfg = StringConfig {
            lev_mode: LevelerMode::Normalize,
            ..StringConfig::default()
        };
        let mut s = SimpleLivingString::init_to_pool(&ctx, &mut pool, &cfg).unwrap();
        let out = excite_and_run(&mut pool, 48000, |p, x| s.tick(p, x));
        assert!(out.iter().all(|v| v.is_finite() && v.abs() < 4.0));
        let tail_peak = out[40000..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(tail_peak > 0.01, "string died: {}", tail_peak);
        s.free(&mut pool).unwrap();
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn living_string_allocates_four_lines() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 4 * (MAX_DELAY + 2)];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);
        let mut s = LivingString::init_to_pool(&ctx, &mut pool, &StringConfig::default()).unwrap();
        assert_eq!(pool.live_blocks(), 4);
        let out = excite_and_run(&mut pool, 9600, |p, x| s.tick(p, x));
        assert!(out.iter().all(|v| v.is_finite() && v.abs() < 4.0));
        assert!(out.iter().any(|v| v.abs() > 1e-4));
        s.free(&mut pool).unwrap();
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn failed_allocation_returns_partial_lines() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 5 * (MAX_DELAY + 2)];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);
        let err = ComplexLivingString::init_to_pool(&ctx, &mut pool, &StringConfig::default());
        assert!(matches!(err, Err(PoolError::Exhausted { .. })));
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn complex_string_survives_crossing_positions() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 6 * (MAX_DELAY + 2)];
        let mut pool = Pool::new("string", &mut memory, Discipline::FreeList);
        let cfg = StringConfig {
            prep_index: 0.7,
            ..StringConfig::default()
        };
        let mut s = ComplexLivingString::init_to_pool(&ctx, &mut pool, &cfg).unwrap();
        excite_and_run(&mut pool, 4800, |p, x| s.tick(p, x));
        // swap pick and prep: the junction roles flip mid-glide
        s.set_pick_pos(0.7);
        s.set_prep_pos(0.3);
        s.set_freq(330.0);
        for _ in 0..9600 {
            let y = s.tick(&mut pool, 0.0);
            assert!(y.is_finite() && y.abs() < 4.0, "unstable: {}", y);
        }
        s.free(&mut pool).unwrap();
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn segment_delays_keep_the_loop_length_at_the_ends() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 4 * (MAX_DELAY + 2)];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);

        for pick in [0.0, 0.01, 0.5, 1.0] {
            let cfg = StringConfig {
                pick_pos: pick,
                ..StringConfig::default()
            };
            let s = LivingString::init_to_pool(&ctx, &mut pool, &cfg).unwrap();
            let half = s.common.wavelength.sample();
            let total = s.lower_fwd.delay() + s.upper_fwd.delay() + 2.0;
            assert!((total - half).abs() < 1e-3, "pick {}: {} vs {}", pick, total, half);
            assert_eq!(s.lower_back.delay(), s.lower_fwd.delay());
            s.free(&mut pool).unwrap();
        }
    }

    #[test]
    fn coincident_pick_and_prep_keep_the_loop_length() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 6 * (MAX_DELAY + 2)];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);

        for (pick, prep) in [(0.4, 0.4), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)] {
            let cfg = StringConfig {
                pick_pos: pick,
                prep_pos: prep,
                ..StringConfig::default()
            };
            let s = ComplexLivingString::init_to_pool(&ctx, &mut pool, &cfg).unwrap();
            let half = s.common.wavelength.sample();
            let total = s.lower_fwd.delay() + s.mid_fwd.delay() + s.upper_fwd.delay() + 3.0;
            assert!((total - half).abs() < 1e-3, "{}/{}: {} vs {}", pick, prep, total, half);
            s.free(&mut pool).unwrap();
        }
    }

    #[test]
    fn frequency_changes_glide() {
        let (mut ctx_mem, mut rng) = context_parts();
        let ctx = Context::new(EngineConfig::new(SR, 16), &mut ctx_mem, &mut rng);
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("string", &mut memory, Discipline::Stack);
        let mut s = SimpleLivingString::init_to_pool(&ctx, &mut pool, &StringConfig::default()).unwrap();
        let before = s.common.wavelength.sample();
        s.set_freq(440.0);
        s.tick(&mut pool, 0.0);
        let after = s.common.wavelength.sample();
        assert!(after < before && after > before * 0.9, "{} -> {}", before, after);
        s.free(&mut pool).unwrap();
    }
}
