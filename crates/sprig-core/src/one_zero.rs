//! One-zero FIR filter.
//!
//! ```text
//! y[n] = gain * (b0 * x[n] + b1 * x[n-1])
//! b0 = 1 / (1 + |zero|),  b1 = -zero * b0
//! ```
//!
//! A zero at -1 is the two-point average used as the Karplus-Strong loop
//! filter: unity at DC, a null at Nyquist, and exactly half a sample of delay.

/// One-zero FIR filter.
#[derive(Debug, Clone)]
pub struct OneZero {
    b0: f32,
    b1: f32,
    gain: f32,
    last_in: f32,
    last_out: f32,
}

impl Default for OneZero {
    fn default() -> Self {
        Self::averaging()
    }
}

impl OneZero {
    /// Create a filter with its zero at `zero` (clamped to ±1).
    pub fn new(zero: f32) -> Self {
        let mut filter = Self {
            b0: 1.0,
            b1: 0.0,
            gain: 1.0,
            last_in: 0.0,
            last_out: 0.0,
        };
        filter.set_zero(zero);
        filter
    }

    /// Two-point moving average (zero at -1).
    pub fn averaging() -> Self {
        Self::new(-1.0)
    }

    /// Move the zero. DC gain stays normalized for zeros away from +1.
    pub fn set_zero(&mut self, zero: f32) {
        let zero = zero.clamp(-1.0, 1.0);
        self.b0 = 1.0 / (1.0 + zero.abs());
        self.b1 = -zero * self.b0;
    }

    /// Output gain.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Last output.
    pub fn last_out(&self) -> f32 {
        self.last_out
    }

    /// Process one sample.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        self.last_out = self.gain * (self.b0 * input + self.b1 * self.last_in);
        self.last_in = input;
        self.last_out
    }

    /// Clear the delayed input.
    pub fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averaging_nulls_nyquist() {
        let mut f = OneZero::averaging();
        f.tick(1.0);
        for i in 1..64 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            assert_eq!(f.tick(x), 0.0);
        }
    }

    #[test]
    fn averaging_passes_dc() {
        let mut f = OneZero::averaging();
        f.tick(1.0);
        assert_eq!(f.tick(1.0), 1.0);
    }
}
