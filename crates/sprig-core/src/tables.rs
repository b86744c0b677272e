//! Lookup tables evaluated at compile time.
//!
//! | Table | Size | Contents |
//! |---|---|---|
//! | [`SINE_TABLE`] | 2048 | one cycle of `sin(2πi/N)` |
//! | [`EXP_DECAY_TABLE`] | 2048 | `e^(-ln(1000)·i/(N-1))`, 1.0 down to 0.001 |
//!
//! Both live in flash on embedded targets. Values are computed in `f64`
//! with range-reduced Taylor series, then rounded once to `f32`.

/// Entries in [`SINE_TABLE`].
pub const SINE_TABLE_SIZE: usize = 2048;
/// Entries in [`EXP_DECAY_TABLE`].
pub const EXP_DECAY_TABLE_SIZE: usize = 2048;

/// One cycle of a sine wave.
pub static SINE_TABLE: [f32; SINE_TABLE_SIZE] = sine_table();

/// Exponential decay from 1.0 to 0.001 (-60 dB).
pub static EXP_DECAY_TABLE: [f32; EXP_DECAY_TABLE_SIZE] = exp_decay_table();

const PI: f64 = core::f64::consts::PI;
const LN_1000: f64 = 6.907_755_278_982_137;

const fn taylor_sin(x: f64) -> f64 {
    // x in [-pi, pi]
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    let mut n = 1;
    while n < 14 {
        term = -term * x2 / (((2 * n) * (2 * n + 1)) as f64);
        sum += term;
        n += 1;
    }
    sum
}

const fn taylor_exp(x: f64) -> f64 {
    // exp(x) = exp(x / 256)^256
    let y = x / 256.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut n = 1;
    while n < 12 {
        term = term * y / (n as f64);
        sum += term;
        n += 1;
    }
    let mut k = 0;
    while k < 8 {
        sum *= sum;
        k += 1;
    }
    sum
}

const fn sine_table() -> [f32; SINE_TABLE_SIZE] {
    let mut table = [0.0f32; SINE_TABLE_SIZE];
    let mut i = 0;
    while i < SINE_TABLE_SIZE {
        let mut phase = 2.0 * PI * (i as f64) / (SINE_TABLE_SIZE as f64);
        if phase > PI {
            phase -= 2.0 * PI;
        }
        table[i] = taylor_sin(phase) as f32;
        i += 1;
    }
    table
}

const fn exp_decay_table() -> [f32; EXP_DECAY_TABLE_SIZE] {
    let mut table = [0.0f32; EXP_DECAY_TABLE_SIZE];
    let last = (EXP_DECAY_TABLE_SIZE - 1) as f64;
    let mut i = 0;
    while i < EXP_DECAY_TABLE_SIZE {
        table[i] = taylor_exp(-LN_1000 * (i as f64) / last) as f32;
        i += 1;
    }
    table
}

/// Linearly interpolated lookup into a table treated as one cycle.
///
/// `phase` is in cycles; only its fractional part matters.
#[inline]
pub fn lookup_wrapped(table: &[f32], phase: f32) -> f32 {
    let len = table.len();
    if len == 0 {
        return 0.0;
    }
    let pos = (phase - libm::floorf(phase)) * len as f32;
    let i = (pos as usize).min(len - 1);
    let frac = pos - i as f32;
    let a = table[i];
    let b = table[(i + 1) % len];
    a + (b - a) * frac
}

/// Linearly interpolated lookup into a table treated as a one-shot curve.
///
/// `position` runs from 0.0 (first entry) to 1.0 (last entry) and is clamped.
#[inline]
pub fn lookup_clamped(table: &[f32], position: f32) -> f32 {
    let len = table.len();
    if len == 0 {
        return 0.0;
    }
    let pos = position.clamp(0.0, 1.0) * (len - 1) as f32;
    let i = (pos as usize).min(len - 1);
    let frac = pos - i as f32;
    let a = table[i];
    let b = table[(i + 1).min(len - 1)];
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_table_matches_libm() {
        for (i, &v) in SINE_TABLE.iter().enumerate() {
            let expected = libm::sin(2.0 * PI * i as f64 / SINE_TABLE_SIZE as f64) as f32;
            assert!((v - expected).abs() < 1e-6, "index {}: {} vs {}", i, v, expected);
        }
    }

    #[test]
    fn exp_table_endpoints() {
        assert!((EXP_DECAY_TABLE[0] - 1.0).abs() < 1e-6);
        assert!((EXP_DECAY_TABLE[EXP_DECAY_TABLE_SIZE - 1] - 0.001).abs() < 1e-6);
        assert!(EXP_DECAY_TABLE.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn wrapped_lookup_interpolates() {
        assert!(lookup_wrapped(&SINE_TABLE, 0.25) > 0.9999);
        assert!(lookup_wrapped(&SINE_TABLE, 1.75) < -0.9999);
        let half_step = 0.5 / SINE_TABLE_SIZE as f32;
        let mid = lookup_wrapped(&SINE_TABLE, half_step);
        assert!(mid > 0.0 && mid < SINE_TABLE[1]);
    }

    #[test]
    fn clamped_lookup_holds_ends() {
        assert_eq!(lookup_clamped(&EXP_DECAY_TABLE, -1.0), 1.0);
        assert_eq!(
            lookup_clamped(&EXP_DECAY_TABLE, 2.0),
            EXP_DECAY_TABLE[EXP_DECAY_TABLE_SIZE - 1]
        );
    }
}
