//! Block-wise attack (onset) detection.
//!
//! An attack/release envelope follower runs over each block:
//!
//! ```text
//! c = |x| > env ? attack_coeff : release_coeff
//! env = c * (env - |x|) + |x|
//! ```
//!
//! where a coefficient is `0.01^(1 / samples)`, i.e. the envelope covers
//! 99 % of a step in the configured time. A block is an attack when its
//! envelope climbs at least `threshold` dB above the level the previous
//! block ended on. The onset is the first sample where it crossed that
//! line.

use sprig_core::{Context, ms_to_samples};

/// Default expected block length.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default rise, in dB, that counts as an attack.
pub const DEFAULT_THRESHOLD_DB: f32 = 6.0;

/// Default attack time in ms.
pub const DEFAULT_ATTACK_MS: f32 = 10.0;

/// Default release time in ms.
pub const DEFAULT_RELEASE_MS: f32 = 10.0;

/// Envelope level below which nothing counts as an attack (-80 dB).
const MIN_LEVEL: f32 = 1.0e-4;

/// Onset detector.
///
/// # Example
///
/// ```rust
/// use sprig_analysis::AttackDetection;
///
/// let mut detector = AttackDetection::new(48000.0, 256, 1.0, 50.0);
/// let quiet = [0.01f32; 256];
/// // the first sound after silence is itself an onset
/// assert_eq!(detector.detect(&quiet), Some(0));
/// assert_eq!(detector.detect(&quiet), None);
///
/// let mut hit = [0.01f32; 256];
/// hit[100..].fill(0.8);
/// let onset = detector.detect(&hit).unwrap();
/// assert!((100..110).contains(&onset));
/// ```
#[derive(Debug, Clone)]
pub struct AttackDetection {
    sample_rate: f32,
    block_size: usize,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    threshold_db: f32,
    ratio: f32,
    env: f32,
    prev_level: f32,
}

impl AttackDetection {
    /// Detector for blocks of `block_size` samples.
    pub fn new(sample_rate: f32, block_size: usize, attack_ms: f32, release_ms: f32) -> Self {
        let mut detector = Self {
            sample_rate,
            block_size: block_size.max(1),
            attack_ms: 0.0,
            release_ms: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            threshold_db: 0.0,
            ratio: 1.0,
            env: 0.0,
            prev_level: 0.0,
        };
        detector.set_attack(attack_ms);
        detector.set_release(release_ms);
        detector.set_threshold(DEFAULT_THRESHOLD_DB);
        detector
    }

    /// Detector at the context's sample rate.
    pub fn init(ctx: &Context<'_>, block_size: usize, attack_ms: f32, release_ms: f32) -> Self {
        Self::new(ctx.sample_rate(), block_size, attack_ms, release_ms)
    }

    fn coefficient(&self, ms: f32) -> f32 {
        libm::powf(0.01, 1.0 / ms_to_samples(ms, self.sample_rate).max(1.0))
    }

    /// Samples examined per call to [`detect`](Self::detect).
    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    /// Expected block length.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Recomputes both coefficients.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.attack_coeff = self.coefficient(self.attack_ms);
        self.release_coeff = self.coefficient(self.release_ms);
    }

    /// Envelope rise time in ms.
    pub fn set_attack(&mut self, ms: f32) {
        self.attack_ms = if ms.is_finite() { ms.max(0.0) } else { DEFAULT_ATTACK_MS };
        self.attack_coeff = self.coefficient(self.attack_ms);
    }

    /// Envelope fall time in ms.
    pub fn set_release(&mut self, ms: f32) {
        self.release_ms = if ms.is_finite() { ms.max(0.0) } else { DEFAULT_RELEASE_MS };
        self.release_coeff = self.coefficient(self.release_ms);
    }

    /// Rise in dB over the previous block that counts as an attack.
    pub fn set_threshold(&mut self, db: f32) {
        self.threshold_db = if db.is_finite() { db.max(0.0) } else { DEFAULT_THRESHOLD_DB };
        self.ratio = libm::powf(10.0, self.threshold_db / 20.0);
    }

    /// Current threshold in dB.
    pub fn threshold(&self) -> f32 {
        self.threshold_db
    }

    /// Envelope level at the end of the last block.
    pub fn level(&self) -> f32 {
        self.env
    }

    /// Run one block and return the index of the onset, if the block holds
    /// an attack. Only the first [`block_size`](Self::block_size) samples
    /// are examined.
    pub fn detect(&mut self, input: &[f32]) -> Option<usize> {
        let line = (self.prev_level * self.ratio).max(MIN_LEVEL);
        let mut onset = None;
        for (i, &x) in input.iter().take(self.block_size).enumerate() {
            let x = if x.is_finite() { x.abs() } else { 0.0 };
            let coeff = if x > self.env { self.attack_coeff } else { self.release_coeff };
            self.env = coeff * (self.env - x) + x;
            if onset.is_none() && self.env >= line {
                onset = Some(i);
            }
        }

        let rose = self.env >= line;
        self.prev_level = self.env;
        if rose { onset } else { None }
    }

    /// Forget the envelope.
    pub fn reset(&mut self) {
        self.env = 0.0;
        self.prev_level = 0.0;
    }
}

impl Default for AttackDetection {
    fn default() -> Self {
        Self::new(48000.0, DEFAULT_BLOCK_SIZE, DEFAULT_ATTACK_MS, DEFAULT_RELEASE_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn tone(amp: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amp * libm::sinf(core::f32::consts::TAU * i as f32 / 48.0))
            .collect()
    }

    #[test]
    fn silence_is_never_an_attack() {
        let mut detector = AttackDetection::new(SR, 512, 10.0, 10.0);
        for _ in 0..8 {
            assert_eq!(detector.detect(&[0.0; 512]), None);
        }
    }

    #[test]
    fn steady_tone_triggers_once() {
        let mut detector = AttackDetection::new(SR, 512, 1.0, 50.0);
        let block = tone(0.5, 512);
        assert!(detector.detect(&block).is_some());
        for _ in 0..10 {
            assert_eq!(detector.detect(&block), None);
        }
    }

    #[test]
    fn onset_index_follows_the_step() {
        let mut detector = AttackDetection::new(SR, 1024, 0.5, 50.0);
        detector.detect(&tone(0.02, 1024));

        let mut block = tone(0.02, 1024);
        block[600..].copy_from_slice(&tone(0.9, 424));
        let onset = detector.detect(&block).expect("attack");
        assert!((600..640).contains(&onset), "onset {}", onset);
    }

    #[test]
    fn small_rise_stays_below_threshold() {
        let mut detector = AttackDetection::new(SR, 512, 0.1, 50.0);
        detector.detect(&tone(0.4, 512));
        detector.detect(&tone(0.4, 512));
        // +4.9 dB
        assert_eq!(detector.detect(&tone(0.7, 512)), None);

        detector.set_threshold(3.0);
        detector.detect(&tone(0.4, 512));
        detector.detect(&tone(0.4, 512));
        assert!(detector.detect(&tone(0.7, 512)).is_some());
    }

    #[test]
    fn only_block_size_samples_are_read() {
        let mut detector = AttackDetection::new(SR, 256, 0.5, 50.0);
        let mut block = vec![0.0; 512];
        block[300..].fill(1.0);
        assert_eq!(detector.detect(&block), None);
        assert_eq!(detector.level(), 0.0);

        detector.set_block_size(512);
        assert_eq!(detector.detect(&block).map(|i| i >= 300), Some(true));
    }

    #[test]
    fn coefficients_follow_time_and_rate() {
        let mut detector = AttackDetection::new(SR, 64, 10.0, 10.0);
        // 99 % of a step after 480 samples
        let step = [1.0f32; 64];
        for _ in 0..7 {
            detector.detect(&step);
        }
        let at_448 = detector.level();
        detector.detect(&step);
        assert!(at_448 < 0.99 && detector.level() > 0.98, "{} {}", at_448, detector.level());

        detector.reset();
        detector.set_sample_rate(24000.0);
        for _ in 0..4 {
            detector.detect(&step);
        }
        assert!(detector.level() > 0.98, "level {}", detector.level());
    }
}
