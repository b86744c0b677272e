//! Block processing at the codec boundary.
//!
//! The audio interrupt hands over one half of a DMA buffer: `N` interleaved
//! stereo frames of 24-bit codec words in, `N` frames out. [`StereoBlock`]
//! converts them to two f32 channel buffers, runs a [`BlockProcessor`] over
//! them in place, and converts back.
//!
//! [`OverrunGuard`] times a block against its cycle budget and reports
//! overruns through the engine's error hook.

use sprig_core::{Context, EngineConfig, EngineError, Module, Pool};

use crate::format::{codec_to_f32, f32_to_codec};

/// Stereo processing, `N` frames in, `N` frames out.
pub trait BlockProcessor {
    /// Process one block in place. `left` and `right` have the same length.
    fn process(&mut self, pool: &mut Pool<'_>, left: &mut [f32], right: &mut [f32]);
}

/// Two independent mono modules, one per channel.
#[derive(Debug, Clone)]
pub struct DualMono<L, R> {
    /// Left channel module.
    pub left: L,
    /// Right channel module.
    pub right: R,
}

impl<L, R> DualMono<L, R> {
    /// Pair two modules.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

impl<L: Module, R: Module> BlockProcessor for DualMono<L, R> {
    fn process(&mut self, pool: &mut Pool<'_>, left: &mut [f32], right: &mut [f32]) {
        self.left.process_block_inplace(pool, left);
        self.right.process_block_inplace(pool, right);
    }
}

/// Which channel comes first in an interleaved frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    /// `L R L R ...`
    #[default]
    LeftFirst,
    /// `R L R L ...`
    RightFirst,
}

/// Converts interleaved codec buffers and runs a processor over them.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Discipline, OnePole, Pool};
/// use sprig_platform::{ChannelOrder, DualMono, StereoBlock};
///
/// let mut memory = [0.0f32; 0];
/// let mut pool = Pool::new("io", &mut memory, Discipline::Stack);
/// let mut smoother = DualMono::new(OnePole::new(48000.0, 1000.0), OnePole::new(48000.0, 1000.0));
/// let mut block = StereoBlock::<16>::new(ChannelOrder::LeftFirst);
///
/// let input = [0x40_0000i32; 32];
/// let mut output = [0i32; 32];
/// assert_eq!(block.run(&mut pool, &mut smoother, &input, &mut output), 16);
/// assert!(output[30] > 0 && output[30] <= 0x40_0000);
/// ```
#[derive(Debug, Clone)]
pub struct StereoBlock<const N: usize> {
    left: [f32; N],
    right: [f32; N],
    order: ChannelOrder,
}

impl<const N: usize> StereoBlock<N> {
    /// Scratch buffers for `N` frames.
    pub fn new(order: ChannelOrder) -> Self {
        Self {
            left: [0.0; N],
            right: [0.0; N],
            order,
        }
    }

    /// Frame layout.
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Run `processor` over `input`, writing `output`.
    ///
    /// Buffers longer than `N` frames are handled `N` frames at a time.
    /// Returns the number of frames processed: the shorter of the two
    /// buffers, counted in whole frames.
    pub fn run<P: BlockProcessor + ?Sized>(
        &mut self,
        pool: &mut Pool<'_>,
        processor: &mut P,
        input: &[i32],
        output: &mut [i32],
    ) -> usize {
        let mut total = 0;
        let chunk = 2 * N.max(1);
        for (inp, out) in input.chunks(chunk).zip(output.chunks_mut(chunk)) {
            let frames = (inp.len() / 2).min(out.len() / 2).min(N);
            let (first, second) = match self.order {
                ChannelOrder::LeftFirst => (&mut self.left, &mut self.right),
                ChannelOrder::RightFirst => (&mut self.right, &mut self.left),
            };
            for ((frame, a), b) in inp.chunks_exact(2).zip(first.iter_mut()).zip(second.iter_mut()) {
                *a = codec_to_f32(frame[0]);
                *b = codec_to_f32(frame[1]);
            }

            processor.process(pool, &mut self.left[..frames], &mut self.right[..frames]);

            let (first, second) = match self.order {
                ChannelOrder::LeftFirst => (&self.left, &self.right),
                ChannelOrder::RightFirst => (&self.right, &self.left),
            };
            for ((frame, &a), &b) in out.chunks_exact_mut(2).zip(first.iter()).zip(second.iter()) {
                frame[0] = f32_to_codec(a);
                frame[1] = f32_to_codec(b);
            }
            total += frames;
        }
        total
    }
}

/// A free-running cycle counter, such as the Cortex-M DWT `CYCCNT`.
///
/// Closures returning `u32` implement it, so tests can drive time by hand.
pub trait CycleCounter {
    /// Current count. Wraps at `u32::MAX`.
    fn cycles(&mut self) -> u32;
}

impl<F: FnMut() -> u32> CycleCounter for F {
    fn cycles(&mut self) -> u32 {
        self()
    }
}

/// Measures each block against a cycle budget.
///
/// Overruns are counted, passed to the error hook that was installed on
/// the [`Context`] when the guard was built, and returned. Nothing is
/// retried.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Context, EngineConfig, EngineError, XorShift32};
/// use sprig_platform::OverrunGuard;
///
/// let mut memory = [0.0f32; 0];
/// let mut rng = XorShift32::new(1);
/// let ctx = Context::new(EngineConfig::default(), &mut memory, &mut rng);
///
/// let clock = core::cell::Cell::new(0u32);
/// let mut guard = OverrunGuard::new(&ctx, || clock.get(), 1000);
/// guard.begin();
/// clock.set(700);
/// assert_eq!(guard.end(), Ok(700));
/// guard.begin();
/// clock.set(2100);
/// assert!(matches!(guard.end(), Err(EngineError::Overrun { elapsed: 1400, budget: 1000 })));
/// ```
#[derive(Debug)]
pub struct OverrunGuard<C> {
    counter: C,
    budget: u32,
    start: u32,
    hook: Option<fn(&EngineError)>,
    overruns: u32,
    worst: u32,
}

impl<C: CycleCounter> OverrunGuard<C> {
    /// A guard allowing `budget` cycles per block.
    pub fn new(ctx: &Context<'_>, counter: C, budget: u32) -> Self {
        #[cfg(feature = "tracing")]
        tracing::debug!(budget, "overrun guard armed");

        Self {
            counter,
            budget: budget.max(1),
            start: 0,
            hook: ctx.error_hook(),
            overruns: 0,
            worst: 0,
        }
    }

    /// A guard whose budget is one block period of `ctx`'s configuration
    /// on a core running at `cpu_hz`.
    pub fn for_block(ctx: &Context<'_>, counter: C, cpu_hz: u32) -> Self {
        Self::new(ctx, counter, block_budget(*ctx.config(), cpu_hz))
    }

    /// Mark the start of a block.
    #[inline]
    pub fn begin(&mut self) {
        self.start = self.counter.cycles();
    }

    /// Mark the end of a block. Returns the elapsed cycles, or the overrun
    /// after reporting it.
    #[inline]
    pub fn end(&mut self) -> Result<u32, EngineError> {
        let elapsed = self.counter.cycles().wrapping_sub(self.start);
        self.worst = self.worst.max(elapsed);
        if elapsed <= self.budget {
            return Ok(elapsed);
        }
        self.overruns = self.overruns.saturating_add(1);
        let error = EngineError::Overrun {
            elapsed,
            budget: self.budget,
        };
        if let Some(hook) = self.hook {
            hook(&error);
        }
        Err(error)
    }

    /// Cycles allowed per block.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Blocks that ran over budget.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Longest block seen, in cycles.
    pub fn worst(&self) -> u32 {
        self.worst
    }

    /// Forget the overrun count and the worst case.
    pub fn reset_stats(&mut self) {
        self.overruns = 0;
        self.worst = 0;
    }
}

/// Cycles in one block period: `cpu_hz * block_size / sample_rate`.
pub fn block_budget(config: EngineConfig, cpu_hz: u32) -> u32 {
    let cycles = cpu_hz as f32 * config.block_size as f32 / config.sample_rate;
    if cycles.is_finite() { cycles as u32 } else { u32::MAX }
}
