//! Property-based tests for sprig-core.
//!
//! Drives pools through random allocate/free sequences with canary-filled
//! blocks, and checks smoother convergence and filter stability for random
//! parameters.

use proptest::prelude::*;
use sprig_core::{
    Block, Discipline, ExpSmooth, FeedbackLeveler, LevelerMode, LinearDelay, OnePole, Pool,
    PoolError, Ramp,
};

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    /// Free the live block at this index (modulo live count).
    Free(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..96).prop_map(Op::Alloc),
        2 => (0usize..64).prop_map(Op::Free),
    ]
}

fn fill_canary(pool: &mut Pool<'_>, block: &Block, tag: f32) {
    for (i, w) in pool.slice_mut(block).iter_mut().enumerate() {
        *w = tag + i as f32 * 0.001;
    }
}

fn canary_intact(pool: &Pool<'_>, block: &Block, tag: f32) -> bool {
    pool.slice(block)
        .iter()
        .enumerate()
        .all(|(i, &w)| w == tag + i as f32 * 0.001)
}

fn run_ops(discipline: Discipline, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut memory = vec![0.0f32; 1024];
    let mut pool = Pool::new("prop", &mut memory, discipline);
    let mut live: Vec<(Block, f32)> = Vec::new();
    let mut next_tag = 1.0f32;

    for op in ops {
        match *op {
            Op::Alloc(len) => match pool.allocate(len) {
                Ok(block) => {
                    prop_assert_eq!(block.len(), len);
                    prop_assert!(pool.slice(&block).iter().all(|&w| w == 0.0));
                    fill_canary(&mut pool, &block, next_tag);
                    live.push((block, next_tag));
                    next_tag += 1.0;
                }
                Err(PoolError::Exhausted { available, .. }) => {
                    prop_assert!(available < len.max(2));
                }
                Err(other) => prop_assert!(false, "unexpected {:?}", other),
            },
            Op::Free(index) => {
                if live.is_empty() {
                    continue;
                }
                // stack pools only ever release the top block
                let index = match discipline {
                    Discipline::Stack => live.len() - 1,
                    Discipline::FreeList => index % live.len(),
                };
                let (block, _) = live.remove(index);
                prop_assert_eq!(pool.free(block), Ok(()));
            }
        }

        prop_assert!(pool.live() <= pool.capacity());
        prop_assert_eq!(pool.live_blocks(), live.len());
        for (block, tag) in &live {
            prop_assert!(canary_intact(&pool, block, *tag), "canary {} corrupted", tag);
        }
    }

    // release everything; the region must come back whole
    while let Some((block, _)) = live.pop() {
        prop_assert_eq!(pool.free(block), Ok(()));
    }
    prop_assert_eq!(pool.live(), 0);
    prop_assert_eq!(pool.largest_free(), 1024);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Random free-list workloads never exceed capacity, never corrupt a
    /// live block, and coalesce back to one span.
    #[test]
    fn free_list_preserves_live_blocks(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_ops(Discipline::FreeList, &ops)?;
    }

    /// Same workload under LIFO release.
    #[test]
    fn stack_preserves_live_blocks(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_ops(Discipline::Stack, &ops)?;
    }

    /// An over-capacity request fails deterministically and changes nothing.
    #[test]
    fn oversize_request_is_harmless(first in 1usize..512, extra in 1usize..512) {
        let mut memory = vec![0.0f32; 512];
        let mut pool = Pool::new("prop", &mut memory, Discipline::FreeList);
        let block = pool.allocate(first).unwrap();
        fill_canary(&mut pool, &block, 9.0);
        let live = pool.live();
        let request = 512 - live + extra;
        let err = pool.allocate(request);
        prop_assert!(matches!(err, Err(PoolError::Exhausted { .. })), "expected PoolError::Exhausted");
        prop_assert_eq!(pool.live(), live);
        prop_assert!(canary_intact(&pool, &block, 9.0));
    }

    /// A ramp to any destination over any time arrives exactly and never
    /// passes the destination.
    #[test]
    fn ramp_exact_arrival(dest in -10.0f32..10.0, time_ms in 0.1f32..50.0) {
        let mut ramp = Ramp::new(48000.0, time_ms, 1);
        ramp.set_dest(dest);
        let steps = (time_ms * 48.0).ceil() as usize + 1;
        for _ in 0..steps {
            let v = ramp.tick();
            if dest >= 0.0 {
                prop_assert!(v <= dest && v >= 0.0);
            } else {
                prop_assert!(v >= dest && v <= 0.0);
            }
        }
        prop_assert_eq!(ramp.sample(), dest);
    }

    /// Exponential smoothing never leaves the interval between start and
    /// destination.
    #[test]
    fn exp_smooth_bounded(start in -1.0f32..1.0, dest in -1.0f32..1.0, factor in 0.0f32..=1.0) {
        let mut s = ExpSmooth::new(start, factor);
        s.set_dest(dest);
        let (lo, hi) = if start < dest { (start, dest) } else { (dest, start) };
        for _ in 0..256 {
            let v = s.tick();
            prop_assert!(v >= lo - 1e-6 && v <= hi + 1e-6);
        }
    }

    /// One-pole filters stay finite for any pole and bounded input.
    #[test]
    fn one_pole_stability(
        pole in -1.5f32..1.5,
        input in prop::array::uniform32(-1.0f32..=1.0f32),
    ) {
        let mut f = OnePole::with_pole(pole);
        for _ in 0..32 {
            for &x in &input {
                prop_assert!(f.tick(x).is_finite());
            }
        }
    }

    /// A leveled feedback loop stays bounded for any strength.
    #[test]
    fn leveled_loop_is_bounded(strength in 0.2f32..1.0, delay in 8.0f32..200.0) {
        let mut memory = vec![0.0f32; 256];
        let mut pool = Pool::new("prop", &mut memory, Discipline::Stack);
        let mut line = LinearDelay::init_to_pool(&mut pool, delay, 250).unwrap();
        let mut lev = FeedbackLeveler::new(0.25, 0.01, strength, LevelerMode::Compress);
        let mut y = 1.0f32;
        for _ in 0..20_000 {
            let x = lev.tick(y * 1.05);
            y = line.tick(&mut pool, x);
            prop_assert!(y.is_finite() && y.abs() < 10.0, "runaway: {}", y);
        }
    }
}
