//! Knob inputs.
//!
//! The control ADC is scanned by DMA at its own rate. Each raw reading is
//! scaled to `[0, 1)` and becomes the destination of a short [`Ramp`], so
//! the synth sees a smoothed value on every tick instead of the ADC's
//! staircase.

use sprig_core::{Context, Ramp};

use crate::format::adc_to_unipolar;

/// Glide time from one ADC reading to the next.
pub const KNOB_RAMP_MS: f32 = 7.0;

/// `N` smoothed knobs.
///
/// # Example
///
/// ```rust
/// use sprig_platform::KnobBank;
///
/// let mut knobs = KnobBank::<2>::new(48000.0, 1);
/// knobs.set_all_raw(&[0, 32768]);
/// for _ in 0..400 {
///     knobs.tick();
/// }
/// assert_eq!(knobs.values(), [0.0, 0.5]);
/// ```
#[derive(Debug, Clone)]
pub struct KnobBank<const N: usize> {
    ramps: [Ramp; N],
}

impl<const N: usize> KnobBank<N> {
    /// Knobs resting at 0. `samples_per_tick` is how often [`tick`](Self::tick)
    /// runs: 1 per sample, or the block size per block.
    pub fn new(sample_rate: f32, samples_per_tick: usize) -> Self {
        Self {
            ramps: core::array::from_fn(|_| Ramp::new(sample_rate, KNOB_RAMP_MS, samples_per_tick)),
        }
    }

    /// Knobs at the context's sample rate.
    pub fn init(ctx: &Context<'_>, samples_per_tick: usize) -> Self {
        Self::new(ctx.sample_rate(), samples_per_tick)
    }

    /// Feed one raw 16-bit reading. Out-of-range indices are ignored.
    pub fn set_raw(&mut self, index: usize, raw: u16) {
        if let Some(ramp) = self.ramps.get_mut(index) {
            ramp.set_dest(adc_to_unipolar(raw));
        }
    }

    /// Feed a whole ADC scan.
    pub fn set_all_raw(&mut self, raw: &[u16; N]) {
        for (ramp, &r) in self.ramps.iter_mut().zip(raw) {
            ramp.set_dest(adc_to_unipolar(r));
        }
    }

    /// Jump a knob to `value` without gliding, e.g. at startup.
    pub fn set_value(&mut self, index: usize, value: f32) {
        if let Some(ramp) = self.ramps.get_mut(index) {
            ramp.set_val(value);
        }
    }

    /// Advance every ramp one tick.
    #[inline]
    pub fn tick(&mut self) {
        for ramp in &mut self.ramps {
            ramp.tick();
        }
    }

    /// Smoothed value of one knob, 0 for an out-of-range index.
    #[inline]
    pub fn value(&self, index: usize) -> f32 {
        self.ramps.get(index).map_or(0.0, Ramp::sample)
    }

    /// Every smoothed value.
    pub fn values(&self) -> [f32; N] {
        core::array::from_fn(|i| self.ramps[i].sample())
    }

    /// True once every knob has reached its latest reading.
    pub fn is_settled(&self) -> bool {
        self.ramps.iter().all(Ramp::is_settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glide_takes_seven_ms() {
        let mut knobs = KnobBank::<1>::new(48000.0, 1);
        knobs.set_raw(0, u16::MAX);
        let target = adc_to_unipolar(u16::MAX);

        // 7 ms at 48 kHz
        for _ in 0..335 {
            knobs.tick();
        }
        assert!(knobs.value(0) < target);
        assert!(!knobs.is_settled());
        knobs.tick();
        assert_eq!(knobs.value(0), target);
        assert!(knobs.is_settled());
    }

    #[test]
    fn block_rate_ticks() {
        let mut knobs = KnobBank::<3>::new(48000.0, 16);
        knobs.set_all_raw(&[16384, 32768, 49152]);
        // ceil(336 / 16)
        for _ in 0..21 {
            knobs.tick();
        }
        assert_eq!(knobs.values(), [0.25, 0.5, 0.75]);
    }

    #[test]
    fn set_value_skips_the_glide() {
        let mut knobs = KnobBank::<2>::new(48000.0, 1);
        knobs.set_value(1, 0.3);
        assert_eq!(knobs.value(1), 0.3);
        assert_eq!(knobs.value(5), 0.0);
        knobs.set_raw(5, 100);
        assert!(knobs.is_settled());
    }

    #[test]
    fn values_move_monotonically() {
        let mut knobs = KnobBank::<1>::new(48000.0, 1);
        knobs.set_value(0, 1.0);
        knobs.set_raw(0, 0);
        let mut last = knobs.value(0);
        while !knobs.is_settled() {
            knobs.tick();
            assert!(knobs.value(0) <= last);
            last = knobs.value(0);
        }
        assert_eq!(last, 0.0);
    }
}
