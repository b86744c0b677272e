//! Error types for pool allocation and real-time engine reporting.

use thiserror::Error;

use crate::pool::Block;

/// Errors returned by [`Pool`](crate::Pool) operations.
///
/// Every variant is recoverable: a failed call leaves the pool and all
/// of its live blocks exactly as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No contiguous span large enough for the request.
    #[error("pool exhausted: requested {requested} words, largest free span is {available}")]
    Exhausted {
        /// Words requested by the caller.
        requested: usize,
        /// Largest contiguous span that was available.
        available: usize,
    },

    /// A zero-length allocation was requested.
    #[error("zero-length allocation")]
    ZeroSize,

    /// A stack-discipline pool was asked to free a block that is not on top.
    #[error("stack pool blocks must be freed in reverse allocation order")]
    OutOfOrder,

    /// The block was allocated from a different pool.
    #[error("block belongs to a different pool")]
    ForeignBlock,

    /// The block does not describe a live allocation (double free or overlap).
    #[error("block does not describe a live allocation")]
    InvalidBlock,
}

/// A rejected [`Pool::free`](crate::Pool::free).
///
/// The pool hands the block back untouched so the caller can retry, for
/// example after releasing newer blocks of a stack pool first.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct FreeError {
    /// Why the block was rejected.
    pub error: PoolError,
    /// The block, still live and still owned by the caller.
    pub block: Block,
}

impl FreeError {
    /// Take the block back for another attempt.
    pub fn into_block(self) -> Block {
        self.block
    }
}

impl From<FreeError> for PoolError {
    fn from(err: FreeError) -> Self {
        err.error
    }
}

/// Errors reported upward through the [`Context`](crate::Context) error hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Module setup failed to obtain storage.
    #[error("allocation failed: {0}")]
    Alloc(#[from] PoolError),

    /// A processing block exceeded its cycle budget.
    #[error("real-time overrun: {elapsed} cycles against a budget of {budget}")]
    Overrun {
        /// Cycles consumed by the block.
        elapsed: u32,
        /// Cycles available per block.
        budget: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_error_converts_into_engine_error() {
        let err: EngineError = PoolError::ZeroSize.into();
        assert_eq!(err, EngineError::Alloc(PoolError::ZeroSize));
    }

    #[cfg(feature = "std")]
    #[test]
    fn messages_name_the_numbers() {
        let msg = std::format!(
            "{}",
            PoolError::Exhausted {
                requested: 64,
                available: 12
            }
        );
        assert!(msg.contains("64") && msg.contains("12"), "{msg}");
    }
}
