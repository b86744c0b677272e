//! Envelope generators.
//!
//! Three shapes share one state machine:
//!
//! ```text
//! Idle --on--> Attack --> Decay --> Sustain --off--> Release --> Idle
//!   ^            ^                                      |
//!   |            +---- Ramp <--- on (while sounding) ---+
//! ```
//!
//! | Type | Segment curve | Notes |
//! |------|---------------|-------|
//! | [`Adsr`] | one-pole coefficients (overshoot target) | cheapest per tick |
//! | [`AdsrTable`] | interpolated [`EXP_DECAY_TABLE`] lookups | curve independent of time |
//! | [`Envelope`] | interpolated table, attack/decay only | optional looping |
//!
//! A note-on while the envelope is still sounding enters `Ramp`: the running
//! value falls linearly to zero over [`RAMP_SAMPLES`] samples before the new
//! attack starts, so retriggers never click.
//!
//! Segment times are read when a segment starts. Sustain is the exception:
//! changing it moves the target at once and the output glides toward it.
//! During sustain the held level is multiplied by the leak factor each sample.
//!
//! Used as a [`Module`], an envelope is a VCA: `process` returns
//! `input * tick()`.

use sprig_core::{
    Context, EXP_DECAY_TABLE, Module, Pool, flush_denormal, lookup_clamped, ms_to_samples,
};

/// Length of the retrigger ramp to zero, in samples.
pub const RAMP_SAMPLES: f32 = 48.0;

/// Per-sample glide coefficient toward a moved sustain level (~4 ms at 48 kHz).
const SUSTAIN_GLIDE: f32 = 0.995;

/// Last entry of [`EXP_DECAY_TABLE`]; table curves are rescaled so segments
/// land exactly on their targets.
const TABLE_FLOOR: f32 = 0.001;

/// Envelope state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Silent, waiting for a note-on.
    #[default]
    Idle,
    /// Rising toward peak.
    Attack,
    /// Falling toward sustain.
    Decay,
    /// Holding (and leaking).
    Sustain,
    /// Falling toward zero after note-off.
    Release,
    /// Fast fall to zero before a retriggered attack.
    Ramp,
}

fn segment_samples(ms: f32, sample_rate: f32) -> f32 {
    ms_to_samples(ms.max(0.0), sample_rate).max(1.0)
}

// ============================================================================
// Coefficient ADSR
// ============================================================================

/// Coefficient-driven ADSR.
///
/// Each segment is a one-pole recursion aimed past its goal (by
/// `target_ratio`) and cut off when the goal is crossed. Attack curves are
/// mildly convex; decay and release are near-exponential.
///
/// # Example
///
/// ```rust
/// use sprig_synth::Adsr;
///
/// let mut env = Adsr::new(48000.0, 10.0, 20.0, 0.5, 50.0);
/// env.on(1.0);
/// let first = env.tick();
/// assert!(first > 0.0 && first < 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct Adsr {
    sample_rate: f32,
    attack_ms: f32,
    decay_ms: f32,
    release_ms: f32,
    sustain: f32,
    leak: f32,
    ratio_attack: f32,
    ratio_decay_release: f32,

    stage: Stage,
    output: f32,
    gain: f32,
    pending_gain: f32,
    held: f32,
    coef: f32,
    base: f32,
    ramp_inc: f32,
}

impl Adsr {
    /// Create an envelope. Times in milliseconds, sustain as a fraction of peak.
    pub fn new(sample_rate: f32, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        Self {
            sample_rate,
            attack_ms: attack_ms.max(0.0),
            decay_ms: decay_ms.max(0.0),
            release_ms: release_ms.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            leak: 1.0,
            ratio_attack: 0.3,
            ratio_decay_release: 0.0001,
            stage: Stage::Idle,
            output: 0.0,
            gain: 1.0,
            pending_gain: 1.0,
            held: 0.0,
            coef: 0.0,
            base: 0.0,
            ramp_inc: 0.0,
        }
    }

    /// Create an envelope at the context's sample rate.
    pub fn init(ctx: &Context<'_>, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        Self::new(ctx.sample_rate(), attack_ms, decay_ms, sustain, release_ms)
    }

    /// Pole for a recursion aimed `ratio` past its goal that crosses the
    /// goal after `rate` samples.
    fn coefficient(rate: f32, ratio: f32) -> f32 {
        libm::expf(-libm::logf((1.0 + ratio) / ratio) / rate)
    }

    fn start_attack(&mut self) {
        self.gain = self.pending_gain;
        self.coef = Self::coefficient(segment_samples(self.attack_ms, self.sample_rate), self.ratio_attack);
        self.base = self.gain * (1.0 + self.ratio_attack) * (1.0 - self.coef);
        self.stage = Stage::Attack;
    }

    fn start_decay(&mut self) {
        self.coef = Self::coefficient(
            segment_samples(self.decay_ms, self.sample_rate),
            self.ratio_decay_release,
        );
        self.retarget_decay();
        self.stage = Stage::Decay;
    }

    fn retarget_decay(&mut self) {
        let goal = self.sustain * self.gain;
        self.base = (goal - self.ratio_decay_release * self.gain) * (1.0 - self.coef);
    }

    /// Note-on. `velocity` scales the peak and is clamped to [0, 1].
    pub fn on(&mut self, velocity: f32) {
        self.pending_gain = velocity.clamp(0.0, 1.0);
        if self.stage == Stage::Idle || self.output <= 0.0 {
            self.output = 0.0;
            self.start_attack();
        } else {
            self.ramp_inc = self.output / RAMP_SAMPLES;
            self.stage = Stage::Ramp;
        }
    }

    /// Note-off. Enters release from any sounding stage.
    pub fn off(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        let peak = self.gain.max(f32::MIN_POSITIVE);
        self.coef = Self::coefficient(
            segment_samples(self.release_ms, self.sample_rate),
            self.ratio_decay_release,
        );
        self.base = -self.ratio_decay_release * peak * (1.0 - self.coef);
        self.stage = Stage::Release;
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.output = self.base + self.output * self.coef;
                if self.output >= self.gain {
                    self.output = self.gain;
                    self.start_decay();
                }
            }
            Stage::Decay => {
                let goal = self.sustain * self.gain;
                let next = self.base + self.output * self.coef;
                if next <= goal {
                    // a sustain raised mid-decay is reached by gliding, not jumping
                    self.output = if self.output >= goal { goal } else { next };
                    self.held = goal;
                    self.stage = Stage::Sustain;
                } else {
                    self.output = next;
                }
            }
            Stage::Sustain => {
                self.held = flush_denormal(self.held * self.leak);
                self.output = self.held + (self.output - self.held) * SUSTAIN_GLIDE;
            }
            Stage::Release => {
                self.output = flush_denormal(self.base + self.output * self.coef);
                if self.output <= 0.0 {
                    self.output = 0.0;
                    self.stage = Stage::Idle;
                }
            }
            Stage::Ramp => {
                self.output -= self.ramp_inc;
                if self.output <= 0.0 {
                    self.output = 0.0;
                    self.start_attack();
                }
            }
        }
        self.output = self.output.clamp(0.0, self.gain);
        self.output
    }

    /// Attack time in ms, used from the next attack.
    pub fn set_attack(&mut self, ms: f32) {
        self.attack_ms = ms.max(0.0);
    }

    /// Decay time in ms, used from the next decay.
    pub fn set_decay(&mut self, ms: f32) {
        self.decay_ms = ms.max(0.0);
    }

    /// Sustain level (0 to 1). Retargets a running decay or sustain at once.
    pub fn set_sustain(&mut self, level: f32) {
        self.sustain = level.clamp(0.0, 1.0);
        match self.stage {
            Stage::Decay => self.retarget_decay(),
            Stage::Sustain => self.held = self.sustain * self.gain,
            _ => {}
        }
    }

    /// Release time in ms, used from the next note-off.
    pub fn set_release(&mut self, ms: f32) {
        self.release_ms = ms.max(0.0);
    }

    /// Per-sample multiplier applied to the held level during sustain.
    /// Range: 0.0 to 1.0, where 1.0 disables leaking.
    pub fn set_leak(&mut self, factor: f32) {
        self.leak = factor.clamp(0.0, 1.0);
    }

    /// Attack curvature: smaller ratios give a more exponential attack.
    pub fn set_attack_ratio(&mut self, ratio: f32) {
        self.ratio_attack = ratio.clamp(1.0e-4, 100.0);
    }

    /// Decay/release curvature.
    pub fn set_decay_release_ratio(&mut self, ratio: f32) {
        self.ratio_decay_release = ratio.clamp(1.0e-6, 100.0);
    }

    /// Update the sample rate. Applies from the next segment.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// True unless idle.
    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Last output.
    pub fn sample(&self) -> f32 {
        self.output
    }
}

impl Module for Adsr {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        input * self.tick()
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.stage = Stage::Idle;
        self.output = 0.0;
    }
}

// ============================================================================
// Table ADSR
// ============================================================================

/// Rising curve built from the decay table: 0 at `phase = 0`, 1 at `phase = 1`.
#[inline]
fn table_rise(phase: f32) -> f32 {
    (1.0 - lookup_clamped(&EXP_DECAY_TABLE, phase)) / (1.0 - TABLE_FLOOR)
}

/// Falling curve: 1 at `phase = 0`, 0 at `phase = 1`.
#[inline]
fn table_fall(phase: f32) -> f32 {
    (lookup_clamped(&EXP_DECAY_TABLE, phase) - TABLE_FLOOR) / (1.0 - TABLE_FLOOR)
}

/// Table-driven ADSR.
///
/// Each segment walks a phase from 0 to 1 and reads the shared exponential
/// table, so the curve shape is identical at every segment length.
#[derive(Debug, Clone)]
pub struct AdsrTable {
    sample_rate: f32,
    attack_ms: f32,
    decay_ms: f32,
    release_ms: f32,
    sustain: f32,
    leak: f32,

    stage: Stage,
    output: f32,
    gain: f32,
    pending_gain: f32,
    held: f32,
    phase: f32,
    inc: f32,
    segment_start: f32,
    ramp_inc: f32,
}

impl AdsrTable {
    /// Create an envelope. Times in milliseconds, sustain as a fraction of peak.
    pub fn new(sample_rate: f32, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        Self {
            sample_rate,
            attack_ms: attack_ms.max(0.0),
            decay_ms: decay_ms.max(0.0),
            release_ms: release_ms.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            leak: 1.0,
            stage: Stage::Idle,
            output: 0.0,
            gain: 1.0,
            pending_gain: 1.0,
            held: 0.0,
            phase: 0.0,
            inc: 0.0,
            segment_start: 0.0,
            ramp_inc: 0.0,
        }
    }

    /// Create an envelope at the context's sample rate.
    pub fn init(ctx: &Context<'_>, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        Self::new(ctx.sample_rate(), attack_ms, decay_ms, sustain, release_ms)
    }

    fn enter(&mut self, stage: Stage, ms: f32) {
        self.stage = stage;
        self.phase = 0.0;
        self.inc = 1.0 / segment_samples(ms, self.sample_rate);
        self.segment_start = self.output;
    }

    /// Note-on. `velocity` scales the peak and is clamped to [0, 1].
    pub fn on(&mut self, velocity: f32) {
        self.pending_gain = velocity.clamp(0.0, 1.0);
        if self.stage == Stage::Idle || self.output <= 0.0 {
            self.output = 0.0;
            self.gain = self.pending_gain;
            self.enter(Stage::Attack, self.attack_ms);
        } else {
            self.ramp_inc = self.output / RAMP_SAMPLES;
            self.stage = Stage::Ramp;
        }
    }

    /// Note-off.
    pub fn off(&mut self) {
        if self.stage != Stage::Idle {
            self.enter(Stage::Release, self.release_ms);
        }
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.phase += self.inc;
                if self.phase >= 1.0 {
                    self.output = self.gain;
                    self.enter(Stage::Decay, self.decay_ms);
                } else {
                    self.output = self.gain * table_rise(self.phase);
                }
            }
            Stage::Decay => {
                let goal = self.sustain * self.gain;
                self.phase += self.inc;
                if self.phase >= 1.0 {
                    self.output = goal;
                    self.held = goal;
                    self.stage = Stage::Sustain;
                } else {
                    self.output = goal + (self.segment_start - goal) * table_fall(self.phase);
                }
            }
            Stage::Sustain => {
                self.held = flush_denormal(self.held * self.leak);
                self.output = self.held + (self.output - self.held) * SUSTAIN_GLIDE;
            }
            Stage::Release => {
                self.phase += self.inc;
                if self.phase >= 1.0 {
                    self.output = 0.0;
                    self.stage = Stage::Idle;
                } else {
                    self.output = self.segment_start * table_fall(self.phase);
                }
            }
            Stage::Ramp => {
                self.output -= self.ramp_inc;
                if self.output <= 0.0 {
                    self.output = 0.0;
                    self.gain = self.pending_gain;
                    self.enter(Stage::Attack, self.attack_ms);
                }
            }
        }
        self.output = self.output.clamp(0.0, self.gain);
        self.output
    }

    /// Attack time in ms, used from the next attack.
    pub fn set_attack(&mut self, ms: f32) {
        self.attack_ms = ms.max(0.0);
    }

    /// Decay time in ms, used from the next decay.
    pub fn set_decay(&mut self, ms: f32) {
        self.decay_ms = ms.max(0.0);
    }

    /// Sustain level (0 to 1). Retargets a running decay or sustain at once.
    pub fn set_sustain(&mut self, level: f32) {
        self.sustain = level.clamp(0.0, 1.0);
        match self.stage {
            // restart the remaining curve from where the output is now
            Stage::Decay => {
                self.segment_start = self.output;
                self.phase = 0.0;
            }
            Stage::Sustain => self.held = self.sustain * self.gain,
            _ => {}
        }
    }

    /// Release time in ms, used from the next note-off.
    pub fn set_release(&mut self, ms: f32) {
        self.release_ms = ms.max(0.0);
    }

    /// Per-sample sustain leak. 1.0 disables leaking.
    pub fn set_leak(&mut self, factor: f32) {
        self.leak = factor.clamp(0.0, 1.0);
    }

    /// Update the sample rate. Applies from the next segment.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// True unless idle.
    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Last output.
    pub fn sample(&self) -> f32 {
        self.output
    }
}

impl Module for AdsrTable {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        input * self.tick()
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.stage = Stage::Idle;
        self.output = 0.0;
    }
}

// ============================================================================
// Attack/decay envelope
// ============================================================================

/// Attack/decay envelope with optional looping.
///
/// With looping enabled the envelope re-enters attack whenever decay
/// completes, turning it into a one-shot-shaped LFO.
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f32,
    attack_ms: f32,
    decay_ms: f32,
    looping: bool,

    stage: Stage,
    output: f32,
    gain: f32,
    pending_gain: f32,
    phase: f32,
    inc: f32,
    ramp_inc: f32,
}

impl Envelope {
    /// Create an envelope. Times in milliseconds.
    pub fn new(sample_rate: f32, attack_ms: f32, decay_ms: f32, looping: bool) -> Self {
        Self {
            sample_rate,
            attack_ms: attack_ms.max(0.0),
            decay_ms: decay_ms.max(0.0),
            looping,
            stage: Stage::Idle,
            output: 0.0,
            gain: 1.0,
            pending_gain: 1.0,
            phase: 0.0,
            inc: 0.0,
            ramp_inc: 0.0,
        }
    }

    /// Create an envelope at the context's sample rate.
    pub fn init(ctx: &Context<'_>, attack_ms: f32, decay_ms: f32, looping: bool) -> Self {
        Self::new(ctx.sample_rate(), attack_ms, decay_ms, looping)
    }

    fn enter(&mut self, stage: Stage, ms: f32) {
        self.stage = stage;
        self.phase = 0.0;
        self.inc = 1.0 / segment_samples(ms, self.sample_rate);
    }

    /// Trigger. `velocity` scales the peak and is clamped to [0, 1].
    pub fn on(&mut self, velocity: f32) {
        self.pending_gain = velocity.clamp(0.0, 1.0);
        if self.stage == Stage::Idle || self.output <= 0.0 {
            self.output = 0.0;
            self.gain = self.pending_gain;
            self.enter(Stage::Attack, self.attack_ms);
        } else {
            self.ramp_inc = self.output / RAMP_SAMPLES;
            self.stage = Stage::Ramp;
        }
    }

    /// Advance one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        match self.stage {
            Stage::Attack => {
                self.phase += self.inc;
                if self.phase >= 1.0 {
                    self.output = self.gain;
                    self.enter(Stage::Decay, self.decay_ms);
                } else {
                    self.output = self.gain * table_rise(self.phase);
                }
            }
            Stage::Decay => {
                self.phase += self.inc;
                if self.phase >= 1.0 {
                    self.output = 0.0;
                    if self.looping {
                        self.enter(Stage::Attack, self.attack_ms);
                    } else {
                        self.stage = Stage::Idle;
                    }
                } else {
                    self.output = self.gain * table_fall(self.phase);
                }
            }
            Stage::Ramp => {
                self.output -= self.ramp_inc;
                if self.output <= 0.0 {
                    self.output = 0.0;
                    self.gain = self.pending_gain;
                    self.enter(Stage::Attack, self.attack_ms);
                }
            }
            Stage::Idle | Stage::Sustain | Stage::Release => {}
        }
        self.output = self.output.clamp(0.0, self.gain);
        self.output
    }

    /// Attack time in ms.
    pub fn set_attack(&mut self, ms: f32) {
        self.attack_ms = ms.max(0.0);
    }

    /// Decay time in ms.
    pub fn set_decay(&mut self, ms: f32) {
        self.decay_ms = ms.max(0.0);
    }

    /// Enable or disable looping.
    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Update the sample rate. Applies from the next segment.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Last output.
    pub fn sample(&self) -> f32 {
        self.output
    }
}

impl Module for Envelope {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
        input * self.tick()
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.stage = Stage::Idle;
        self.output = 0.0;
    }
}
