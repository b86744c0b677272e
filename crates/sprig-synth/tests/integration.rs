//! Integration tests for sprig-synth.
//!
//! Signal-level checks on envelopes and strings, composition through the
//! module trait, and bit-level reproducibility of identically built voices.

use sprig_core::{Context, Discipline, EngineConfig, Module, ModuleExt, Pool, XorShift32};
use sprig_synth::{Adsr, Cycle, LivingString, Noise, NoiseType, Pluck, Stage, StringConfig};

const SAMPLE_RATE: f32 = 48000.0;

/// Measure RMS amplitude of a signal buffer.
fn rms(signal: &[f32]) -> f32 {
    let sum_sq: f32 = signal.iter().map(|&s| s * s).sum();
    libm::sqrtf(sum_sq / signal.len() as f32)
}

/// Lag in `[lo, hi]` with the largest (unnormalized) autocorrelation.
fn dominant_lag(signal: &[f32], lo: usize, hi: usize) -> usize {
    let mut best = lo;
    let mut best_r = f32::MIN;
    for lag in lo..=hi {
        let r: f32 = signal[lag..]
            .iter()
            .zip(signal)
            .map(|(a, b)| a * b)
            .sum();
        if r > best_r {
            best_r = r;
            best = lag;
        }
    }
    best
}

// ============================================================================
// 1. Envelopes
// ============================================================================

#[test]
fn adsr_attack_and_release_shape() {
    let mut env = Adsr::new(SAMPLE_RATE, 10.0, 20.0, 0.5, 50.0);
    env.on(1.0);
    let attack: Vec<f32> = (0..480).map(|_| env.tick()).collect();

    assert!(
        attack.windows(2).all(|w| w[1] >= w[0]),
        "attack is not monotonic"
    );
    assert!(attack[479] >= 0.95, "peak not reached: {}", attack[479]);

    for _ in 0..4800 {
        env.tick();
    }
    assert_eq!(env.stage(), Stage::Sustain);

    env.off();
    let release: Vec<f32> = (0..4800).map(|_| env.tick()).collect();
    assert!(release.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(*release.last().unwrap(), 0.0);
    assert_eq!(env.stage(), Stage::Idle);
}

#[test]
fn envelope_gates_an_oscillator() {
    let mut memory = vec![0.0f32; 16];
    let mut pool = Pool::new("vca", &mut memory, Discipline::Stack);

    let mut osc = Cycle::new(SAMPLE_RATE);
    osc.set_freq(440.0);
    let mut env = Adsr::new(SAMPLE_RATE, 2.0, 50.0, 0.6, 30.0);
    env.on(1.0);
    let mut voice = osc.chain(env);

    let sounding: Vec<f32> = (0..9600).map(|_| voice.process(&mut pool, 0.0)).collect();
    let held = rms(&sounding[4800..]);
    assert!((held - 0.6 * core::f32::consts::FRAC_1_SQRT_2).abs() < 0.02, "rms {}", held);

    voice.second_mut().off();
    for _ in 0..9600 {
        voice.process(&mut pool, 0.0);
    }
    let silent: Vec<f32> = (0..480).map(|_| voice.process(&mut pool, 0.0)).collect();
    assert_eq!(rms(&silent), 0.0);
}

// ============================================================================
// 2. Karplus-Strong
// ============================================================================

#[test]
fn pluck_period_matches_pitch() {
    let mut memory = vec![0.0f32; 2048];
    let mut rng = XorShift32::new(21);
    let mut ctx = Context::new(EngineConfig::new(SAMPLE_RATE, 16), &mut memory, &mut rng);
    let mut string = Pluck::init(&mut ctx, 60.0).unwrap();

    for &freq in &[80.0f32, 110.0, 220.0, 440.0, 1000.0] {
        for &gain in &[0.9f32, 0.99, 0.999] {
            string.clear(ctx.pool_mut());
            string.note_on(freq, 1.0);
            string.set_loop_gain(gain);
            let out: Vec<f32> = (0..4096).map(|_| string.tick(ctx.pool_mut())).collect();

            let expected = SAMPLE_RATE / freq;
            let lo = (expected * 0.5) as usize;
            let hi = (expected * 1.5) as usize;
            let lag = dominant_lag(&out, lo, hi) as f32;
            assert!(
                (lag - expected).abs() <= 1.0,
                "f={} g={}: lag {} expected {}",
                freq,
                gain,
                lag,
                expected
            );
        }
    }
    string.free(ctx.pool_mut()).unwrap();
}

#[test]
fn repluck_adds_to_ringing_string() {
    let mut memory = vec![0.0f32; 2048];
    let mut rng = XorShift32::new(8);
    let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
    let mut string = Pluck::init(&mut ctx, 100.0).unwrap();

    string.note_on(220.0, 0.5);
    for _ in 0..2000 {
        string.tick(ctx.pool_mut());
    }
    let before = string.last_out();
    string.pluck(0.5);
    let next = string.tick(ctx.pool_mut());
    // the burst starts at one filtered noise sample, far below the ringing level
    assert!((next - before).abs() < 0.5, "retrigger jumped {} -> {}", before, next);
    string.free(ctx.pool_mut()).unwrap();
}

// ============================================================================
// 3. Reproducibility
// ============================================================================

#[test]
fn identically_seeded_voices_are_bit_identical() {
    let run = || {
        let mut memory = vec![0.0f32; 16384];
        let mut rng = XorShift32::new(1234);
        let mut ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
        let mut noise = Noise::init(&mut ctx, NoiseType::Pink);
        let mut pluck = Pluck::init(&mut ctx, 50.0).unwrap();
        let mut string = LivingString::init(&mut ctx, &StringConfig::default()).unwrap();
        pluck.note_on(330.0, 0.9);

        let out: Vec<u32> = (0..4800)
            .map(|_| {
                let n = noise.tick() * 0.1;
                let p = pluck.tick(ctx.pool_mut());
                string.tick(ctx.pool_mut(), n + p).to_bits()
            })
            .collect();
        string.free(ctx.pool_mut()).unwrap();
        pluck.free(ctx.pool_mut()).unwrap();
        out
    };
    assert_eq!(run(), run());
}

#[test]
fn strings_release_through_module_trait() {
    let mut memory = vec![0.0f32; 16384];
    let mut pool = Pool::new("voices", &mut memory, Discipline::Stack);
    let mut rng = XorShift32::new(3);
    let mut ctx_mem = [0.0f32; 0];
    let mut ctx = Context::new(EngineConfig::default(), &mut ctx_mem, &mut rng);

    let string = LivingString::init_to_pool(&ctx, &mut pool, &StringConfig::default()).unwrap();
    let pluck = Pluck::init_to_pool(&mut ctx, &mut pool, 100.0).unwrap();
    assert_eq!(pool.live_blocks(), 5);

    // stack pools take the newest voice back first
    Module::release(pluck, &mut pool).unwrap();
    Module::release(string, &mut pool).unwrap();
    assert_eq!(pool.live(), 0);
}
