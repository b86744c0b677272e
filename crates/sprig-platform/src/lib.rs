//! Sprig Platform - the hardware boundary of the sprig embedded DSP kernel
//!
//! Everything between the DMA buffers and the synthesis modules: sample
//! format conversion, a block runner, cycle budgeting, smoothed knob
//! inputs, and a lock-free cell for passing pitch analysis from a low
//! priority interrupt to the audio interrupt.
//!
//! # Modules
//!
//! - [`format`] - 24-bit codec and 16-bit ADC conversions, (de)interleaving
//! - [`block`] - [`StereoBlock`] runner, [`BlockProcessor`], [`OverrunGuard`]
//! - [`controls`] - [`KnobBank`] with 7 ms smoothing per knob
//! - [`handoff`] - [`AnalysisHandoff`] double-buffered result cell
//!
//! # Example
//!
//! ```rust
//! use sprig_core::{Context, EngineConfig, OnePole, XorShift32};
//! use sprig_platform::{ChannelOrder, DualMono, KnobBank, OverrunGuard, StereoBlock};
//!
//! let mut memory = [0.0f32; 256];
//! let mut rng = XorShift32::new(7);
//! let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
//!
//! let mut knobs = KnobBank::<4>::init(&ctx, 16);
//! let mut tone = DualMono::new(OnePole::new(48000.0, 2000.0), OnePole::new(48000.0, 2000.0));
//! let mut io = StereoBlock::<16>::new(ChannelOrder::RightFirst);
//! let mut guard = OverrunGuard::for_block(&ctx, || 0u32, 480_000_000);
//!
//! // one audio interrupt
//! let rx = [0i32; 32];
//! let mut tx = [0i32; 32];
//! knobs.set_all_raw(&[0, 16384, 32768, 65535]);
//! knobs.tick();
//! guard.begin();
//! io.run(ctx.pool_mut(), &mut tone, &rx, &mut tx);
//! assert!(guard.end().is_ok());
//! ```
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! sprig-platform = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod block;
pub mod controls;
pub mod format;
pub mod handoff;

pub use block::{
    BlockProcessor, ChannelOrder, CycleCounter, DualMono, OverrunGuard, StereoBlock, block_budget,
};
pub use controls::{KNOB_RAMP_MS, KnobBank};
pub use format::{adc_to_bipolar, adc_to_unipolar, codec_to_f32, f32_to_codec};
pub use handoff::{AnalysisHandoff, AnalysisSnapshot};
