//! Noise generators.
//!
//! Each [`Noise`] owns a private [`XorShift32`] seeded from the context's
//! random source at construction, so output is reproducible per instance
//! while different instances decorrelate.
//!
//! Pink noise uses Paul Kellet's economy filter: three leaky integrators at
//! staggered corner frequencies, accurate to about ±0.5 dB above 40 Hz.

use sprig_core::{Context, Module, Pool, XorShift32, flush_denormal};

/// Spectral shape of a [`Noise`] generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseType {
    /// Flat spectrum.
    #[default]
    White,
    /// -3 dB per octave.
    Pink,
}

/// White or pink noise source, output roughly in ±1.
///
/// # Example
///
/// ```rust
/// use sprig_synth::{Noise, NoiseType};
///
/// let mut white = Noise::new(0xC0FFEE, NoiseType::White);
/// let s = white.tick();
/// assert!((-1.0..1.0).contains(&s));
/// ```
#[derive(Debug, Clone)]
pub struct Noise {
    rng: XorShift32,
    kind: NoiseType,
    b0: f32,
    b1: f32,
    b2: f32,
}

impl Noise {
    /// Create a generator from an explicit seed.
    pub fn new(seed: u32, kind: NoiseType) -> Self {
        Self {
            rng: XorShift32::new(seed),
            kind,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
        }
    }

    /// Create a generator seeded from the context's random source.
    pub fn init(ctx: &mut Context<'_>, kind: NoiseType) -> Self {
        Self::new(ctx.next_seed(), kind)
    }

    /// Switch spectral shape. Pink filter state is kept.
    pub fn set_type(&mut self, kind: NoiseType) {
        self.kind = kind;
    }

    /// Current spectral shape.
    pub fn kind(&self) -> NoiseType {
        self.kind
    }

    /// Generate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let white = self.rng.next_bipolar();
        match self.kind {
            NoiseType::White => white,
            NoiseType::Pink => {
                self.b0 = flush_denormal(0.99765 * self.b0 + white * 0.099_046);
                self.b1 = flush_denormal(0.963 * self.b1 + white * 0.296_516_4);
                self.b2 = flush_denormal(0.57 * self.b2 + white * 1.052_691_3);
                (self.b0 + self.b1 + self.b2 + white * 0.1848) * 0.25
            }
        }
    }
}

impl Module for Noise {
    #[inline]
    fn process(&mut self, _pool: &mut Pool<'_>, _input: f32) -> f32 {
        self.tick()
    }

    fn reset(&mut self, _pool: &mut Pool<'_>) {
        self.b0 = 0.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
    }
}
