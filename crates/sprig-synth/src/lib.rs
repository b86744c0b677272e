//! Sprig Synth - sound sources for the sprig embedded DSP kernel
//!
//! Everything here ticks one sample at a time and keeps any buffers in a
//! [`sprig_core::Pool`]. Pointer-free generators are built with `new` or
//! `init(&Context)`; pool-backed ones with `init` / `init_to_pool` and are
//! returned with `free`.
//!
//! # Core Components
//!
//! ## Oscillators
//!
//! - [`Cycle`] - Sine from the shared compile-time table
//! - [`Sine`] - Sine from a pool-allocated table of any size
//! - [`Saw`], [`Pulse`], [`Tri`] - PolyBLEP band-limited shapes
//! - [`Phasor`] - Raw 0..1 ramp with wrap detection
//!
//! ```rust
//! use sprig_synth::Saw;
//!
//! let mut saw = Saw::new(48000.0);
//! saw.set_freq(110.0);
//! let sample = saw.tick();
//! assert!(sample.abs() <= 1.0);
//! ```
//!
//! ## Noise
//!
//! - [`Noise`] / [`NoiseType`] - White or pink, privately seeded
//!
//! ## Envelopes
//!
//! - [`Adsr`] - Coefficient-driven ADSR with retrigger ramp and sustain leak
//! - [`AdsrTable`] - Table-driven ADSR
//! - [`Envelope`] - Attack/decay with optional looping
//!
//! ```rust
//! use sprig_synth::{Adsr, Stage};
//!
//! let mut env = Adsr::new(48000.0, 10.0, 100.0, 0.7, 200.0);
//! env.on(1.0);
//! for _ in 0..500 {
//!     env.tick();
//! }
//! assert_eq!(env.stage(), Stage::Decay);
//! ```
//!
//! ## Physical Models
//!
//! - [`Pluck`] - Karplus-Strong string with burst excitation
//! - [`KarplusStrong`] - Stiff string with dispersion and a movable pickup
//! - [`SimpleLivingString`], [`LivingString`], [`ComplexLivingString`] -
//!   Self-sustaining waveguides with feedback leveling
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! sprig-synth = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod envelope;
pub mod karplus_strong;
pub mod living_string;
pub mod noise;
pub mod oscillator;
pub mod pluck;

pub use envelope::{Adsr, AdsrTable, Envelope, RAMP_SAMPLES, Stage};
pub use karplus_strong::{KarplusStrong, StringControl};
pub use living_string::{ComplexLivingString, LivingString, SimpleLivingString, StringConfig};
pub use noise::{Noise, NoiseType};
pub use oscillator::{Cycle, Phasor, Pulse, Saw, Sine, Tri};
pub use pluck::Pluck;
