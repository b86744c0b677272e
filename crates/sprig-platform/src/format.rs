//! Sample format conversion at the hardware boundary.
//!
//! | Source | Word | To f32 | From f32 |
//! |---|---|---|---|
//! | Audio codec | 24-bit signed in the low bits of an `i32` | [`codec_to_f32`] | [`f32_to_codec`] |
//! | Control ADC | 16-bit unsigned | [`adc_to_unipolar`], [`adc_to_bipolar`] | - |
//!
//! Codec input is shifted up by 8 so the 24-bit sign lands in bit 31, then
//! scaled by 2^-31. Output is scaled by 2^23 and clamped one step short of
//! full scale, so `f32_to_codec(codec_to_f32(w)) == w` for every 24-bit `w`.
//!
//! [`interleave`] and [`deinterleave`] move between the codec's frame
//! layout (`a0 b0 a1 b1 ...`) and one buffer per channel.

/// 2^15.
pub const TWO_TO_15: f32 = 32768.0;

/// 2^-15.
pub const INV_TWO_TO_15: f32 = 1.0 / 32768.0;

/// 2^-16.
pub const INV_TWO_TO_16: f32 = 1.0 / 65536.0;

/// 2^23, full scale of a 24-bit word.
pub const TWO_TO_23: f32 = 8_388_608.0;

/// 2^-31.
pub const INV_TWO_TO_31: f32 = 1.0 / 2_147_483_648.0;

/// Largest f32 that still fits a 24-bit word after scaling.
const MAX_CODEC_F32: f32 = (TWO_TO_23 - 1.0) / TWO_TO_23;

/// Convert a 24-bit codec word to `[-1, 1)`.
///
/// ```rust
/// use sprig_platform::format::codec_to_f32;
///
/// assert_eq!(codec_to_f32(0x40_0000), 0.5);
/// assert_eq!(codec_to_f32(-0x80_0000), -1.0);
/// ```
#[inline]
pub fn codec_to_f32(word: i32) -> f32 {
    word.wrapping_shl(8) as f32 * INV_TWO_TO_31
}

/// Convert a sample to a sign-extended 24-bit codec word.
///
/// Out-of-range input is clamped; NaN becomes silence.
#[inline]
pub fn f32_to_codec(sample: f32) -> i32 {
    let sample = if sample.is_nan() { 0.0 } else { sample };
    (sample.clamp(-1.0, MAX_CODEC_F32) * TWO_TO_23) as i32
}

/// Convert a 16-bit ADC reading to `[0, 1)`. Used for knobs.
#[inline]
pub fn adc_to_unipolar(raw: u16) -> f32 {
    f32::from(raw) * INV_TWO_TO_16
}

/// Convert a 16-bit ADC reading centred at 2^15 to `[-1, 1)`. Used for
/// audio-rate ADC inputs.
#[inline]
pub fn adc_to_bipolar(raw: u16) -> f32 {
    (f32::from(raw) - TWO_TO_15) * INV_TWO_TO_15
}

/// Write `first` and `second` into alternating slots of `out`.
///
/// Returns the number of frames written: the shortest of the two channels
/// and half of `out`.
pub fn interleave<T: Copy>(first: &[T], second: &[T], out: &mut [T]) -> usize {
    let mut frames = 0;
    for ((frame, &a), &b) in out.chunks_exact_mut(2).zip(first).zip(second) {
        frame[0] = a;
        frame[1] = b;
        frames += 1;
    }
    frames
}

/// Split alternating slots of `input` into `first` and `second`.
///
/// Returns the number of frames read.
pub fn deinterleave<T: Copy>(input: &[T], first: &mut [T], second: &mut [T]) -> usize {
    let mut frames = 0;
    for ((frame, a), b) in input.chunks_exact(2).zip(first.iter_mut()).zip(second.iter_mut()) {
        *a = frame[0];
        *b = frame[1];
        frames += 1;
    }
    frames
}
