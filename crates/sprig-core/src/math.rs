//! Small numeric helpers shared by the tick paths.
//!
//! - [`lerp`] - linear interpolation, used by fractional delay reads
//! - [`ms_to_samples`] - segment and ramp lengths
//! - [`flush_denormal`] - keeps decaying feedback out of the subnormal range
//! - [`finite_or_zero`] - guard for parameters computed from user input

/// Linear interpolation from `a` to `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Milliseconds to (fractional) samples.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> f32 {
    ms * sample_rate / 1000.0
}

/// Flush tiny values to zero.
///
/// Anything below 1e-20 becomes 0, well above the f32 subnormal range.
/// Cortex-M7 runs with flush-to-zero off by default, so feedback loops
/// that decay forever call this on their state.
#[allow(clippy::inline_always)]
#[inline(always)]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Replace NaN and infinities with zero.
#[inline]
pub fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() { x } else { 0.0 }
}
