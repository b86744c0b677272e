//! Module lifecycle and dispatch.
//!
//! Every DSP module follows the same four-step lifecycle:
//!
//! | Step | Shape | When |
//! |---|---|---|
//! | `init` | `init(ctx, params…)` | setup, default pool |
//! | `init_to_pool` | `init_to_pool(ctx, pool, params…)` | setup, explicit pool |
//! | `tick` | `tick(…) -> f32` | real time, one sample |
//! | `free` | `free(self, pool)` | teardown |
//!
//! Modules that embed all of their state inline (filters, smoothers,
//! envelopes) have an infallible `init` and no `free`. Modules that hold
//! [`Block`](crate::Block)s take the pool again in `tick` to reach them.
//!
//! The [`Module`] trait puts that shape behind one object-safe interface so
//! that heterogeneous modules can be chained statically ([`ModuleExt::chain`])
//! or mixed dynamically ([`mix_modules`]).
//!
//! ## Design Decisions
//!
//! - **Mono**: one `f32` in, one `f32` out. Generators ignore their input.
//! - **Pool in the call**: the pool is passed per call instead of stored,
//!   so modules never hold a reference into it.
//! - **Consuming release**: [`Module::release`] takes `self`, so a released
//!   module cannot be ticked again.

use crate::error::PoolError;
use crate::pool::Pool;

/// Object-safe interface over a ticking module.
///
/// # Example
///
/// ```rust
/// use sprig_core::{Module, Pool};
///
/// struct Gain(f32);
///
/// impl Module for Gain {
///     fn process(&mut self, _pool: &mut Pool<'_>, input: f32) -> f32 {
///         input * self.0
///     }
///
///     fn reset(&mut self, _pool: &mut Pool<'_>) {}
/// }
///
/// let mut pool = Pool::detached();
/// let mut gain = Gain(0.5);
/// assert_eq!(gain.process(&mut pool, 2.0), 1.0);
/// ```
pub trait Module {
    /// Advance one sample.
    fn process(&mut self, pool: &mut Pool<'_>, input: f32) -> f32;

    /// Advance one block. `input` and `output` must be the same length.
    fn process_block(&mut self, pool: &mut Pool<'_>, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(
            input.len(),
            output.len(),
            "Input and output buffers must have same length"
        );
        for (inp, out) in input.iter().zip(output.iter_mut()) {
            *out = self.process(pool, *inp);
        }
    }

    /// Advance one block in place.
    fn process_block_inplace(&mut self, pool: &mut Pool<'_>, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(pool, *sample);
        }
    }

    /// Clear internal state without touching parameters.
    fn reset(&mut self, pool: &mut Pool<'_>);

    /// Return any pool storage. Pointer-free modules keep the default.
    fn release(self, pool: &mut Pool<'_>) -> Result<(), PoolError>
    where
        Self: Sized,
    {
        let _ = pool;
        Ok(())
    }
}

/// Extension trait for chaining modules.
pub trait ModuleExt: Module + Sized {
    /// Feed the output of `self` into `next`.
    fn chain<M: Module>(self, next: M) -> Chain<Self, M> {
        Chain {
            first: self,
            second: next,
        }
    }
}

impl<T: Module> ModuleExt for T {}

/// Two modules in series.
///
/// Created by [`ModuleExt::chain`]. Both must draw from the same pool.
#[derive(Debug)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: Module, B: Module> Module for Chain<A, B> {
    #[inline]
    fn process(&mut self, pool: &mut Pool<'_>, input: f32) -> f32 {
        let mid = self.first.process(pool, input);
        self.second.process(pool, mid)
    }

    fn process_block(&mut self, pool: &mut Pool<'_>, input: &[f32], output: &mut [f32]) {
        self.first.process_block(pool, input, output);
        self.second.process_block_inplace(pool, output);
    }

    fn reset(&mut self, pool: &mut Pool<'_>) {
        self.first.reset(pool);
        self.second.reset(pool);
    }

    /// Releases in reverse construction order, as stack pools require.
    fn release(self, pool: &mut Pool<'_>) -> Result<(), PoolError> {
        let second = self.second.release(pool);
        let first = self.first.release(pool);
        second.and(first)
    }
}

impl<A, B> Chain<A, B> {
    /// The first module.
    pub fn first(&self) -> &A {
        &self.first
    }

    /// The first module, mutably.
    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    /// The second module.
    pub fn second(&self) -> &B {
        &self.second
    }

    /// The second module, mutably.
    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }
}

/// Feed `input` to every module and sum the outputs.
///
/// The dynamic counterpart of [`Chain`], for voices chosen at run time.
#[inline]
pub fn mix_modules(modules: &mut [&mut dyn Module], pool: &mut Pool<'_>, input: f32) -> f32 {
    modules.iter_mut().map(|m| m.process(pool, input)).sum()
}
