//! Sprig Analysis - level and pitch tracking for the sprig embedded DSP kernel
//!
//! Everything here consumes audio one sample (or one block) at a time and
//! keeps its buffers in a [`sprig_core::Pool`]. Heavy work happens only at
//! hop boundaries, so an analysis tick can run from a lower-priority
//! interrupt than the audio tick and publish its result through a handoff
//! cell.
//!
//! # Modules
//!
//! - [`envpd`] - Hann-windowed energy with overlapping windows ([`EnvPd`])
//! - [`snac`] - Specially normalized autocorrelation period detector ([`Snac`])
//! - [`period`] - Gated, smoothed period tracking from both ([`PeriodDetection`])
//! - [`follower`] - Peak follower and zero-crossing rate
//! - [`attack`] - Block-wise onset detection ([`AttackDetection`])
//!
//! # Example
//!
//! ```rust
//! use sprig_analysis::Snac;
//! use sprig_core::{Context, EngineConfig, XorShift32};
//!
//! let mut memory = vec![0.0f32; 4096];
//! let mut rng = XorShift32::new(1);
//! let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
//! let mut snac = Snac::init(&mut ctx, 1024, 2).unwrap();
//!
//! for i in 0..4096 {
//!     let x = (i as f32 * core::f32::consts::TAU / 64.0).sin();
//!     snac.tick(ctx.pool_mut(), x);
//! }
//! // 48 kHz / 64 samples = 750 Hz
//! assert!((ctx.sample_rate() / snac.period() - 750.0).abs() < 5.0);
//! snac.free(ctx.pool_mut()).unwrap();
//! ```
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! sprig-analysis = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod attack;
pub mod envpd;
pub mod follower;
pub mod period;
pub mod snac;

pub use attack::AttackDetection;
pub use envpd::{EnvPd, power_to_db};
pub use follower::{EnvelopeFollower, ZeroCrossing};
pub use period::PeriodDetection;
pub use snac::Snac;
