//! Property-based tests for sprig-analysis.
//!
//! Detectors stay finite and in range on arbitrary input, and SNAC finds
//! any period inside its search range.

use proptest::prelude::*;
use sprig_analysis::{EnvPd, EnvelopeFollower, Snac, ZeroCrossing};
use sprig_core::{Discipline, Pool};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A sine with any period between 8 and 400 samples is found within 2%.
    #[test]
    fn snac_finds_sine_period(period in 8.0f32..400.0, amp in 0.05f32..1.0, phase in 0.0f32..6.28) {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("prop", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 1024, 1).unwrap();
        for i in 0..2048 {
            let x = amp * libm::sinf(phase + core::f32::consts::TAU * i as f32 / period);
            snac.tick(&mut pool, x);
        }
        prop_assert!((snac.period() - period).abs() <= period * 0.02, "{} vs {}", snac.period(), period);
        prop_assert!((0.0..=1.0).contains(&snac.fidelity()));
    }

    /// Arbitrary input never produces a non-finite or out-of-range report.
    #[test]
    fn detectors_stay_in_range(input in prop::collection::vec(-10.0f32..10.0, 256..2048)) {
        let mut memory = vec![0.0f32; 4096];
        let mut pool = Pool::new("prop", &mut memory, Discipline::Stack);
        let mut snac = Snac::init_to_pool(&mut pool, 256, 4).unwrap();
        let mut env = EnvPd::init_to_pool(&mut pool, 256, 64, 32).unwrap();
        let mut zc = ZeroCrossing::init_to_pool(&mut pool, 128).unwrap();
        let mut follower = EnvelopeFollower::new(0.01, 0.99);

        for &x in &input {
            let period = snac.tick(&mut pool, x);
            prop_assert!(period.is_finite() && period >= 0.0);
            prop_assert!((0.0..=1.0).contains(&snac.fidelity()));
            prop_assert!((0.0..=1.0).contains(&zc.tick(&mut pool, x)));
            prop_assert!(follower.tick(x) <= 10.0);
        }
        env.process_block(&pool, &input);
        prop_assert!(env.tick().is_finite() && env.tick() >= 0.0);
    }
}
