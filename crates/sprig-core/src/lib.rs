//! Sprig Core - arena memory and DSP primitives for embedded synthesis
//!
//! This crate provides the foundation every sprig module is built on: a
//! heap-free pool allocator, the module lifecycle, and the small filters and
//! smoothers that oscillators, envelopes, and waveguides are assembled from.
//!
//! # Core Abstractions
//!
//! ## Memory
//!
//! - [`Pool`] - Arena over a caller-provided region, stack or free-list discipline
//! - [`Block`] - Move-only handle to pool storage
//! - [`Context`] - Sample rate, default pool, random source, error hook
//!
//! ## Module System
//!
//! - [`Module`] - Object-safe tick interface
//! - [`ModuleExt`] / [`Chain`] - Static composition
//! - [`mix_modules`] - Dynamic composition
//!
//! ## Smoothing
//!
//! - [`Ramp`] / [`RampUpDown`] - Linear, exact arrival
//! - [`ExpSmooth`] - One-pole toward a destination
//! - [`Slide`] - Asymmetric rise/fall
//!
//! ## Filters and Delays
//!
//! - [`OnePole`] / [`OneZero`] - Loop damping
//! - [`Highpass`] - DC blocker
//! - [`LinearDelay`] / [`AllpassDelay`] - Pool-backed fractional delays
//! - [`PowerFollower`] / [`FeedbackLeveler`] - Loop level control
//!
//! ## Tables and Utilities
//!
//! - [`SINE_TABLE`], [`EXP_DECAY_TABLE`] - Compile-time lookup tables
//! - Math helpers: [`flush_denormal`], [`finite_or_zero`], [`lerp`], [`ms_to_samples`]
//!
//! # no_std Support
//!
//! This crate is `no_std` and never allocates from a global heap. Disable the
//! default `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sprig-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use sprig_core::{Context, EngineConfig, LinearDelay, XorShift32};
//!
//! let mut memory = [0.0f32; 4096];
//! let mut rng = XorShift32::new(7);
//! let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
//!
//! let mut echo = LinearDelay::init(&mut ctx, 480.0, 1024).unwrap();
//! let out = echo.tick(ctx.pool_mut(), 1.0);
//! assert_eq!(out, 0.0);
//! echo.free(ctx.pool_mut()).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod context;
pub mod delay;
pub mod dynamics;
pub mod error;
pub mod highpass;
pub mod math;
pub mod module;
pub mod one_pole;
pub mod one_zero;
pub mod pool;
pub mod smooth;
pub mod tables;

pub use context::{Context, EngineConfig, RandomSource, XorShift32};
pub use delay::{AllpassDelay, LinearDelay};
pub use dynamics::{FeedbackLeveler, LevelerMode, PowerFollower};
pub use error::{EngineError, FreeError, PoolError};
pub use highpass::Highpass;
pub use math::{finite_or_zero, flush_denormal, lerp, ms_to_samples};
pub use module::{Chain, Module, ModuleExt, mix_modules};
pub use one_pole::OnePole;
pub use one_zero::OneZero;
pub use pool::{Block, Discipline, MAX_WORDS, Pool};
pub use smooth::{ExpSmooth, Ramp, RampUpDown, Slide};
pub use tables::{
    EXP_DECAY_TABLE, EXP_DECAY_TABLE_SIZE, SINE_TABLE, SINE_TABLE_SIZE, lookup_clamped,
    lookup_wrapped,
};
