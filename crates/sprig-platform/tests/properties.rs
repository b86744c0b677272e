//! Property tests for the hardware boundary.

use proptest::prelude::*;
use sprig_core::Pool;
use sprig_platform::{
    AnalysisHandoff, BlockProcessor, ChannelOrder, StereoBlock, adc_to_bipolar, adc_to_unipolar,
    codec_to_f32, f32_to_codec,
};

struct Passthrough;

impl BlockProcessor for Passthrough {
    fn process(&mut self, _pool: &mut Pool<'_>, _left: &mut [f32], _right: &mut [f32]) {}
}

proptest! {
    #[test]
    fn codec_words_survive_conversion(word in -0x80_0000i32..=0x7F_FFFF) {
        let x = codec_to_f32(word);
        prop_assert!((-1.0..1.0).contains(&x));
        prop_assert_eq!(f32_to_codec(x), word);
    }

    #[test]
    fn codec_output_is_always_24_bit(x in proptest::num::f32::ANY) {
        let word = f32_to_codec(x);
        prop_assert!((-0x80_0000..=0x7F_FFFF).contains(&word));
    }

    #[test]
    fn adc_readings_stay_in_range(raw in any::<u16>()) {
        prop_assert!((0.0..1.0).contains(&adc_to_unipolar(raw)));
        prop_assert!((-1.0..1.0).contains(&adc_to_bipolar(raw)));
    }

    #[test]
    fn passthrough_block_is_transparent(
        words in proptest::collection::vec(-0x80_0000i32..=0x7F_FFFF, 0..200),
        right_first in any::<bool>(),
    ) {
        let order = if right_first { ChannelOrder::RightFirst } else { ChannelOrder::LeftFirst };
        let mut io = StereoBlock::<16>::new(order);
        let mut pool = Pool::detached();
        let mut out = vec![0i32; words.len()];

        let frames = io.run(&mut pool, &mut Passthrough, &words, &mut out);
        prop_assert_eq!(frames, words.len() / 2);
        prop_assert_eq!(&out[..2 * frames], &words[..2 * frames]);
    }

    #[test]
    fn handoff_returns_the_last_publish(
        pairs in proptest::collection::vec((0.0f32..2000.0, 0.0f32..=1.0), 1..50),
    ) {
        let cell = AnalysisHandoff::new();
        for &(period, fidelity) in &pairs {
            cell.publish(period, fidelity);
        }
        let snap = cell.read();
        let &(period, fidelity) = pairs.last().unwrap();
        prop_assert_eq!(snap.period, period);
        prop_assert_eq!(snap.fidelity, fidelity);
        prop_assert_eq!(snap.sequence as usize, pairs.len());
    }
}
