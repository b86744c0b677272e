//! Criterion benchmarks for sprig-core primitives
//!
//! Run with: cargo bench -p sprig-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sprig_core::{
    AllpassDelay, Discipline, ExpSmooth, FeedbackLeveler, LevelerMode, LinearDelay, OnePole, Pool,
    Ramp,
};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[16, 64, 256, 1024];

fn generate_test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pool");

    group.bench_function("stack_alloc_free", |b| {
        let mut memory = vec![0.0f32; 1 << 16];
        let mut pool = Pool::new("bench", &mut memory, Discipline::Stack);
        b.iter(|| {
            let block = pool.allocate(black_box(2400)).unwrap();
            pool.free(block).unwrap();
        });
    });

    // Fragmented list: every other block is live
    group.bench_function("free_list_fragmented", |b| {
        let mut memory = vec![0.0f32; 1 << 16];
        let mut pool = Pool::new("bench", &mut memory, Discipline::FreeList);
        let mut keep = Vec::new();
        for i in 0..64 {
            let block = pool.allocate(256).unwrap();
            if i % 2 == 0 {
                keep.push(block);
            } else {
                pool.free(block).unwrap();
            }
        }
        b.iter(|| {
            let block = pool.allocate(black_box(300)).unwrap();
            pool.free(block).unwrap();
        });
    });

    group.finish();
}

fn bench_delays(c: &mut Criterion) {
    let mut group = c.benchmark_group("Delay");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("linear", block_size),
            &block_size,
            |b, _| {
                let mut memory = vec![0.0f32; 4096];
                let mut pool = Pool::new("bench", &mut memory, Discipline::Stack);
                let mut delay = LinearDelay::init_to_pool(&mut pool, 123.4, 2400).unwrap();
                b.iter(|| {
                    for &sample in &input {
                        black_box(delay.tick(&mut pool, black_box(sample)));
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("allpass", block_size),
            &block_size,
            |b, _| {
                let mut memory = vec![0.0f32; 4096];
                let mut pool = Pool::new("bench", &mut memory, Discipline::Stack);
                let mut delay = AllpassDelay::init_to_pool(&mut pool, 123.4, 2400).unwrap();
                b.iter(|| {
                    for &sample in &input {
                        black_box(delay.tick(&mut pool, black_box(sample)));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Smoothing");

    group.bench_function("ramp_1024", |b| {
        let mut ramp = Ramp::new(SAMPLE_RATE, 7.0, 1);
        b.iter(|| {
            ramp.set_dest(black_box(1.0));
            for _ in 0..1024 {
                black_box(ramp.tick());
            }
            ramp.set_val(0.0);
        });
    });

    group.bench_function("exp_smooth_1024", |b| {
        let mut s = ExpSmooth::new(0.0, 0.01);
        s.set_dest(1.0);
        b.iter(|| {
            for _ in 0..1024 {
                black_box(s.tick());
            }
        });
    });

    group.bench_function("leveler_one_pole_1024", |b| {
        let input = generate_test_signal(1024);
        let mut lev = FeedbackLeveler::new(0.25, 0.01, 0.5, LevelerMode::Compress);
        let mut lp = OnePole::new(SAMPLE_RATE, 4000.0);
        b.iter(|| {
            for &x in &input {
                black_box(lp.tick(lev.tick(black_box(x))));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pool, bench_delays, bench_smoothing);
criterion_main!(benches);
