//! Arena pool allocator.
//!
//! A [`Pool`] carves fixed-size [`Block`]s out of one caller-provided region
//! of `f32` words. Nothing here touches a global heap, so pools work on bare
//! metal where the region is a `static` buffer in SRAM or SDRAM.
//!
//! ## Disciplines
//!
//! | Discipline | Allocate | Free | Use |
//! |---|---|---|---|
//! | [`Discipline::Stack`] | O(1) bump | O(1), top block only | build once, tear down in reverse |
//! | [`Discipline::FreeList`] | O(free blocks), first fit | O(free blocks), coalescing | voices created and destroyed in any order |
//!
//! Both disciplines are meant for setup time. The tick path only ever calls
//! [`Pool::slice`] and [`Pool::slice_mut`], which are O(1).
//!
//! ## Free-list layout
//!
//! Free spans keep their bookkeeping in-band: word 0 holds the span length and
//! word 1 holds the offset of the next free span plus one (zero ends the list).
//! Both are stored as exactly representable `f32` integers, which is why a
//! region is capped at [`MAX_WORDS`]. Live blocks carry no header; every
//! free-list span is at least two words long.
//!
//! # Example
//!
//! ```rust
//! use sprig_core::{Discipline, Pool};
//!
//! let mut memory = [0.0f32; 256];
//! let mut pool = Pool::new("small", &mut memory, Discipline::FreeList);
//!
//! let a = pool.allocate(64).unwrap();
//! let b = pool.allocate(32).unwrap();
//! pool.slice_mut(&a)[0] = 1.0;
//!
//! pool.free(a).unwrap();
//! pool.free(b).unwrap();
//! assert_eq!(pool.live(), 0);
//! assert_eq!(pool.free_block_count(), 1);
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{FreeError, PoolError};

/// Largest region a pool manages, in words.
///
/// Free-list headers are stored as `f32`, which represents every integer up
/// to 2^24 exactly.
pub const MAX_WORDS: usize = 1 << 24;

/// Smallest span the free-list discipline hands out or keeps on its list.
const MIN_SPAN: usize = 2;

/// Identifier reserved for [`Pool::detached`].
const DETACHED_ID: u32 = 0;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Allocation discipline of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Bump allocation, LIFO release.
    Stack,
    /// Address-ordered first-fit free list with neighbour coalescing.
    FreeList,
}

/// Handle to storage owned by a [`Pool`].
///
/// Blocks are move-only: returning one to [`Pool::free`] consumes it, so a
/// handle cannot be freed twice or used after release.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    pool: u32,
    offset: u32,
    span: u32,
    len: u32,
}

impl Block {
    /// Number of usable words.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false for blocks handed out by a pool.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the block within its pool region, in words.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Identifier of the owning pool.
    #[inline]
    pub fn pool_id(&self) -> u32 {
        self.pool
    }

    #[inline]
    fn end(&self) -> usize {
        (self.offset + self.span) as usize
    }
}

/// Arena allocator over a caller-provided region.
///
/// # Invariants
///
/// - `live() <= capacity()` at all times.
/// - No block ever extends past the region.
/// - A failed call leaves the pool and every live block untouched.
pub struct Pool<'a> {
    name: &'static str,
    id: u32,
    region: &'a mut [f32],
    discipline: Discipline,
    /// Stack: bump cursor. Free list: unused.
    top: usize,
    /// Free list: offset of first free span.
    head: Option<usize>,
    live: usize,
    live_blocks: usize,
    high_water: usize,
}

impl core::fmt::Debug for Pool<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("discipline", &self.discipline)
            .field("capacity", &self.capacity())
            .field("live", &self.live)
            .field("high_water", &self.high_water)
            .finish_non_exhaustive()
    }
}

impl<'a> Pool<'a> {
    /// Creates a pool over `region`.
    ///
    /// Regions longer than [`MAX_WORDS`] are truncated to it. The region is
    /// zeroed lazily: each block is cleared when it is allocated.
    pub fn new(name: &'static str, region: &'a mut [f32], discipline: Discipline) -> Self {
        let words = region.len().min(MAX_WORDS);
        let region = &mut region[..words];
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut pool = Self {
            name,
            id,
            region,
            discipline,
            top: 0,
            head: None,
            live: 0,
            live_blocks: 0,
            high_water: 0,
        };
        pool.reset_free_list();

        #[cfg(feature = "tracing")]
        tracing::debug!(pool = name, id, words, ?discipline, "pool created");

        pool
    }

    /// A zero-capacity pool that belongs to nobody.
    ///
    /// Every allocation from it fails with [`PoolError::Exhausted`].
    pub fn detached() -> Pool<'static> {
        Pool {
            name: "detached",
            id: DETACHED_ID,
            region: &mut [],
            discipline: Discipline::Stack,
            top: 0,
            head: None,
            live: 0,
            live_blocks: 0,
            high_water: 0,
        }
    }

    fn reset_free_list(&mut self) {
        if self.discipline == Discipline::FreeList && self.region.len() >= MIN_SPAN {
            self.write_header(0, self.region.len(), None);
            self.head = Some(0);
        } else {
            self.head = None;
        }
    }

    /// Pool name given at creation.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unique identifier stamped into every block this pool allocates.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Allocation discipline.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Region size in words.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Region size in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.region.len() * core::mem::size_of::<f32>()
    }

    /// Words currently held by live blocks (including free-list rounding).
    pub fn live(&self) -> usize {
        self.live
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Words not held by live blocks.
    pub fn available(&self) -> usize {
        self.capacity() - self.live
    }

    /// Highest word offset ever reached by an allocation.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Number of spans on the free list (always 0 for stack pools).
    pub fn free_block_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(off) = cursor {
            count += 1;
            cursor = self.read_header(off).1;
        }
        count
    }

    /// Largest request that would currently succeed.
    pub fn largest_free(&self) -> usize {
        match self.discipline {
            Discipline::Stack => self.capacity() - self.top,
            Discipline::FreeList => {
                let mut best = 0;
                let mut cursor = self.head;
                while let Some(off) = cursor {
                    let (len, next) = self.read_header(off);
                    best = best.max(len);
                    cursor = next;
                }
                best
            }
        }
    }

    /// Allocates `len` zeroed words.
    pub fn allocate(&mut self, len: usize) -> Result<Block, PoolError> {
        if len == 0 {
            return Err(PoolError::ZeroSize);
        }
        let result = match self.discipline {
            Discipline::Stack => self.allocate_stack(len),
            Discipline::FreeList => self.allocate_first_fit(len),
        };

        match &result {
            Ok(block) => {
                self.region[block.offset()..block.end()].fill(0.0);
                self.live += block.span as usize;
                self.live_blocks += 1;
                self.high_water = self.high_water.max(block.end());

                #[cfg(feature = "tracing")]
                tracing::trace!(pool = self.name, offset = block.offset, len, "allocate");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(pool = self.name, len, error = %_err, "allocation failed");
            }
        }
        result
    }

    fn allocate_stack(&mut self, len: usize) -> Result<Block, PoolError> {
        let available = self.capacity() - self.top;
        if len > available {
            return Err(PoolError::Exhausted {
                requested: len,
                available,
            });
        }
        let block = self.make_block(self.top, len, len);
        self.top += len;
        Ok(block)
    }

    fn allocate_first_fit(&mut self, len: usize) -> Result<Block, PoolError> {
        let need = len.max(MIN_SPAN);
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        let mut largest = 0;

        while let Some(off) = cursor {
            let (span, next) = self.read_header(off);
            if span >= need {
                let (taken, successor) = if span - need >= MIN_SPAN {
                    let rest = off + need;
                    self.write_header(rest, span - need, next);
                    (need, Some(rest))
                } else {
                    (span, next)
                };
                self.link(prev, successor);
                return Ok(self.make_block(off, taken, len));
            }
            largest = largest.max(span);
            prev = Some(off);
            cursor = next;
        }

        Err(PoolError::Exhausted {
            requested: len,
            available: largest,
        })
    }

    /// Returns a block to the pool.
    ///
    /// On error the pool is untouched and the block comes back inside the
    /// [`FreeError`], still live.
    pub fn free(&mut self, block: Block) -> Result<(), FreeError> {
        let result = self.check_owner(&block).and_then(|()| match self.discipline {
            Discipline::Stack => self.free_stack(&block),
            Discipline::FreeList => self.free_coalescing(&block),
        });

        match result {
            Ok(()) => {
                self.live -= block.span as usize;
                self.live_blocks -= 1;

                #[cfg(feature = "tracing")]
                tracing::trace!(pool = self.name, offset = block.offset, "free");
                Ok(())
            }
            Err(error) => Err(FreeError { error, block }),
        }
    }

    fn check_owner(&self, block: &Block) -> Result<(), PoolError> {
        if block.pool != self.id {
            return Err(PoolError::ForeignBlock);
        }
        if block.span == 0 || block.end() > self.capacity() || block.span as usize > self.live {
            return Err(PoolError::InvalidBlock);
        }
        Ok(())
    }

    fn free_stack(&mut self, block: &Block) -> Result<(), PoolError> {
        if block.end() != self.top {
            return Err(PoolError::OutOfOrder);
        }
        self.top = block.offset();
        Ok(())
    }

    fn free_coalescing(&mut self, block: &Block) -> Result<(), PoolError> {
        let start = block.offset();
        let end = block.end();

        // Find the free spans on either side of the block.
        let mut prev: Option<(usize, usize)> = None;
        let mut cursor = self.head;
        while let Some(off) = cursor {
            if off >= start {
                break;
            }
            let (span, next) = self.read_header(off);
            prev = Some((off, span));
            cursor = next;
        }
        let next = cursor;

        if let Some((off, span)) = prev
            && off + span > start
        {
            return Err(PoolError::InvalidBlock);
        }
        if let Some(off) = next
            && off < end
        {
            return Err(PoolError::InvalidBlock);
        }

        let (mut merged_start, mut merged_len) = (start, end - start);
        let mut successor = next;
        if let Some(off) = next
            && off == end
        {
            let (span, after) = self.read_header(off);
            merged_len += span;
            successor = after;
        }

        match prev {
            Some((off, span)) if off + span == start => {
                merged_start = off;
                merged_len += span;
                self.write_header(merged_start, merged_len, successor);
            }
            Some((off, _)) => {
                self.write_header(merged_start, merged_len, successor);
                let span = self.read_header(off).0;
                self.write_header(off, span, Some(merged_start));
            }
            None => {
                self.write_header(merged_start, merged_len, successor);
                self.head = Some(merged_start);
            }
        }
        Ok(())
    }

    /// Usable words of a block.
    ///
    /// A block from another pool yields an empty slice.
    #[inline]
    pub fn slice(&self, block: &Block) -> &[f32] {
        if block.pool != self.id {
            return &[];
        }
        let start = block.offset();
        self.region.get(start..start + block.len()).unwrap_or(&[])
    }

    /// Mutable usable words of a block.
    ///
    /// A block from another pool yields an empty slice.
    #[inline]
    pub fn slice_mut(&mut self, block: &Block) -> &mut [f32] {
        if block.pool != self.id {
            return &mut [];
        }
        let start = block.offset();
        self.region
            .get_mut(start..start + block.len())
            .unwrap_or(&mut [])
    }

    fn make_block(&self, offset: usize, span: usize, len: usize) -> Block {
        Block {
            pool: self.id,
            offset: offset as u32,
            span: span as u32,
            len: len as u32,
        }
    }

    fn link(&mut self, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(off) => {
                let span = self.read_header(off).0;
                self.write_header(off, span, next);
            }
            None => self.head = next,
        }
    }

    #[inline]
    fn read_header(&self, off: usize) -> (usize, Option<usize>) {
        let span = self.region[off] as usize;
        let next = self.region[off + 1] as usize;
        (span, next.checked_sub(1))
    }

    #[inline]
    fn write_header(&mut self, off: usize, span: usize, next: Option<usize>) {
        self.region[off] = span as f32;
        self.region[off + 1] = next.map_or(0.0, |n| (n + 1) as f32);
    }
}
