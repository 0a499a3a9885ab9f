//! Growable best-fit memory pool.
//!
//! A [`Pool`] serves many small, unevenly-sized allocations out of a small
//! number of large backing blocks and releases everything at once when it
//! is dropped. It provides:
//!
//! - **Least-waste placement**: among all blocks that can hold a request,
//!   the one with the smallest free space wins
//! - **Amortized cheap bookkeeping**: blocks stay sorted by free space via
//!   a single-element reinsertion after each allocation, never a full sort
//! - **Batch teardown**: registered cleanup callbacks run in reverse
//!   registration order before the blocks are released
//!
//! # Architecture
//!
//! The block list is kept sorted ascending by free space so a binary
//! search finds the left-most (least-wasteful) fit. Blocks that have
//! filled up past a small threshold are excluded from the search window
//! by `skip_index`, which only ever moves forward; this keeps search cost
//! bounded as fragmentation accumulates. Each fresh block doubles the
//! nominal block size once the block-slot capacity is exhausted, so
//! capacity grows geometrically with the number of blocks.
//!
//! Allocations are handed out from the tail of a block's free region and
//! are never individually freed. Callers that need destruction semantics
//! register a cleanup pair instead.
//!
//! # Concurrency
//!
//! A `Pool` is strictly single-threaded: every operation takes `&mut self`
//! and completes before returning. Nothing here locks or suspends.
//!
//! # Example
//!
//! ```
//! use ferric_mem::Pool;
//!
//! let mut pool = Pool::new(1024);
//! let a = pool.alloc(48).unwrap();
//! let b = pool.alloc(16).unwrap();
//! assert_ne!(a, b);
//! // Everything is released when `pool` drops.
//! ```

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Granularity of every sub-allocation: pointer width.
const ALIGN: usize = size_of::<*const u8>();

/// Nominal size of the first backing block when no hint is given.
const DEFAULT_START_SIZE: usize = 512;

/// Rounds `size` up to pointer-width granularity.
fn align_size(size: usize) -> Result<usize> {
    size.checked_add(ALIGN - 1)
        .map(|s| s & !(ALIGN - 1))
        .ok_or(Error::SizeOverflow { size })
}

/// Cleanup callback type: receives the argument it was registered with.
///
/// # Safety
///
/// The callback runs during pool teardown, after the owning scope may have
/// ended; it must only touch memory that is still valid at that point
/// (pool-owned memory is).
pub type DtorFn = unsafe fn(*mut u8);

/// One backing block: raw memory plus the free space remaining in it.
///
/// The used region grows downward from the end of the block, so the free
/// region is always the prefix `[0, free)`.
#[derive(Clone, Copy)]
struct Block {
    /// Bytes still unallocated in this block.
    free: usize,
    /// Start of the block's memory.
    mem: NonNull<u8>,
    /// Total size of the block, needed to rebuild the layout on release.
    capacity: usize,
}

/// Node in the intrusive cleanup list. Nodes are allocated from the pool
/// itself, so they are released together with everything else.
struct DtorItem {
    func: DtorFn,
    arg: *mut u8,
    prev: *mut DtorItem,
}

/// Growable best-fit memory pool with LIFO cleanup at teardown.
///
/// See the [module documentation](self) for the allocation strategy.
///
/// # Example
///
/// ```
/// use ferric_mem::Pool;
///
/// unsafe fn note(_arg: *mut u8) {}
///
/// let mut pool = Pool::new(0); // default initial block size
/// let mem = pool.alloc(64).unwrap();
/// pool.register_dtor(note, mem.as_ptr()).unwrap();
/// ```
pub struct Pool {
    /// Backing blocks, sorted ascending by free space.
    blocks: Vec<Block>,
    /// Capacity analog for the block list; exhausting it triggers the
    /// nominal-size doubling, so block sizes double as the block count
    /// passes successive powers of two.
    slots: usize,
    /// First index not guaranteed nearly full; the free-space search is
    /// restricted to `[skip_index, blocks.len())`.
    skip_index: usize,
    /// Nominal size for the next freshly-created block.
    block_size: usize,
    /// Free-space threshold at or under which a block counts as nearly
    /// full and is skipped in searches.
    skip_size: usize,
    /// Most recently registered cleanup, or null.
    last_dtor: *mut DtorItem,
}

impl Pool {
    /// Creates a pool.
    ///
    /// `start_size` is the nominal size of the first backing block; pass 0
    /// for a 512-byte default. The stored nominal size is halved here and
    /// doubled again on the first growth step, so the first block actually
    /// created lands at the hint. The second block will be twice as large,
    /// and the size doubles again each time the block count passes a power
    /// of two.
    ///
    /// A request larger than the current nominal size gets a single block
    /// sized to need while normal sizing continues as if the block had
    /// been normally sized. Occasional outliers are absorbed gracefully;
    /// if they dominate, a larger `start_size` performs better.
    #[must_use]
    pub fn new(start_size: usize) -> Self {
        let block_size = if start_size > 0 {
            // Alignment cannot overflow here unless the hint is within
            // ALIGN of usize::MAX, which no real hint is.
            align_size(start_size).unwrap_or(DEFAULT_START_SIZE)
        } else {
            DEFAULT_START_SIZE
        };
        Pool {
            blocks: Vec::new(),
            slots: 0,
            skip_index: 0,
            block_size: block_size >> 1,
            skip_size: 0,
            last_dtor: std::ptr::null_mut(),
        }
    }

    /// Extends the block-slot capacity and applies the growth heuristics.
    fn upsize(&mut self) {
        let new_slots = if self.slots > 0 { self.slots << 1 } else { 1 };
        self.blocks.reserve_exact(new_slots - self.blocks.len());
        #[cfg(not(feature = "debug-alloc"))]
        {
            self.block_size <<= 1;
            if self.skip_index < (self.slots * 2) / 3 {
                // Less than 2/3 of the blocks are fully used, so the
                // allocation sizes may be too awkward for the old
                // full-usage threshold.
                self.skip_size = if self.skip_size > 0 {
                    self.skip_size << 1
                } else {
                    ALIGN
                };
            }
        }
        self.slots = new_slots;
    }

    /// Allocates a fresh zero-filled backing block with `size_used` bytes
    /// already claimed at its tail, and returns that claimed region.
    #[cfg(not(feature = "debug-alloc"))]
    fn add_block(&mut self, size_used: usize) -> Result<NonNull<u8>> {
        if self.blocks.len() == self.slots {
            self.upsize();
        }
        let capacity = self.block_size.max(size_used);
        let mem = alloc_zeroed_block(capacity)?;
        let free = capacity - size_used;
        self.blocks.push(Block {
            free,
            mem,
            capacity,
        });
        // Skip fully used blocks in binary searches.
        while self.skip_index < self.blocks.len()
            && self.blocks[self.skip_index].free <= self.skip_size
        {
            self.skip_index += 1;
        }
        // SAFETY: free <= capacity, so the offset stays within the block
        // allocation (one past the end at most, for a zero-size claim).
        Ok(unsafe { NonNull::new_unchecked(mem.as_ptr().add(free)) })
    }

    /// Locates the left-most block whose free space fits `size`, searching
    /// only `[skip_index, blocks.len())`. Binary search over the ascending
    /// free-space order.
    #[cfg(not(feature = "debug-alloc"))]
    fn first_smallest(&self, size: usize) -> Option<usize> {
        let mut min = self.skip_index as isize;
        let mut max = self.blocks.len() as isize - 1;
        let mut i;
        loop {
            i = ((min + max) >> 1) as usize;
            if self.blocks[i].free < size {
                min = i as isize + 1;
                if max < min {
                    i += 1;
                    break;
                }
            } else {
                max = i as isize - 1;
                if max < min {
                    break;
                }
            }
        }
        if i < self.blocks.len() && self.blocks[i].free >= size {
            Some(i)
        } else {
            None
        }
    }

    /// Locates the first block with free space strictly greater than
    /// `size`.
    #[cfg(not(feature = "debug-alloc"))]
    fn first_greater(&self, size: usize) -> Option<usize> {
        self.first_smallest(size + 1)
    }

    /// Copies the blocks in `[from, to)` upwards one step.
    ///
    /// Only the first block of each successive free-space run is actually
    /// overwritten, by the previous such block, until finally the last
    /// such block overwrites the block at `to`.
    #[cfg(not(feature = "debug-alloc"))]
    fn copy_up_one(&mut self, to: usize, from: usize) {
        if from == to - 1 || self.blocks[from].free == self.blocks[to - 1].free {
            // Either there are no blocks in-between, or they all share the
            // free space of the first; the last can simply become the
            // first.
            self.blocks[to] = self.blocks[from];
        } else {
            // Find the first block of the next larger size, recurse, then
            // let that block be overwritten by the first block of this
            // call's run.
            let higher_from = self
                .first_greater(self.blocks[from].free)
                .expect("ascending free-space runs out of order");
            self.copy_up_one(to, higher_from);
            self.blocks[higher_from] = self.blocks[from];
        }
    }

    /// Allocates `size` zero-initialized bytes from the pool.
    ///
    /// The size is aligned up to pointer-width granularity. If any block
    /// can hold the request, the one with the least free space wins;
    /// otherwise a fresh block is created. The returned memory belongs to
    /// the pool and is released only when the pool drops.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the system allocator fails,
    /// [`Error::SizeOverflow`] if `size` cannot be aligned.
    #[cfg(not(feature = "debug-alloc"))]
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let size = align_size(size)?;
        let mut i = self.blocks.len();
        // If blocks exist and the most spacious can hold the size, pick
        // the least-free-space fit by binary search. Otherwise use a new
        // block.
        let mem = if i > 0
            && size <= self.blocks[i - 1].free
            && let Some(found) = self.first_smallest(size)
        {
            i = found;
            let block = &mut self.blocks[i];
            block.free -= size;
            // SAFETY: free was just reduced by `size`, so `mem + free`
            // is in bounds and the `size` bytes after it are the claimed
            // region, still zero-filled from block creation.
            unsafe { NonNull::new_unchecked(block.mem.as_ptr().add(block.free)) }
        } else {
            self.add_block(size)?
        };
        // Restore the sort order; only block `i` changed its free space,
        // so a single-element reinsertion suffices.
        if i > 0 {
            // The free space of block `i` is temporarily fudged so the
            // binary search stays reliable over the not-yet-sorted list.
            let i_free = self.blocks[i].free;
            self.blocks[i].free = self.blocks[i - 1].free;
            match self.first_greater(i_free) {
                Some(j) if j < i => {
                    let mut moved = self.blocks[i];
                    moved.free = i_free;
                    self.copy_up_one(i, j);
                    self.blocks[j] = moved;
                }
                _ => self.blocks[i].free = i_free,
            }
        }
        Ok(mem)
    }

    /// Debug-friendly allocation: every request gets its own zero-filled
    /// block. No fitting, no sorting.
    #[cfg(feature = "debug-alloc")]
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        let size = align_size(size)?.max(ALIGN);
        if self.blocks.len() == self.slots {
            self.upsize();
        }
        let mem = alloc_zeroed_block(size)?;
        self.blocks.push(Block {
            free: 0,
            mem,
            capacity: size,
        });
        Ok(mem)
    }

    /// Allocates a copy of `src` inside the pool.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Pool::alloc`].
    pub fn alloc_dup(&mut self, src: &[u8]) -> Result<NonNull<u8>> {
        let mem = self.alloc(src.len())?;
        // SAFETY: `mem` points to at least `src.len()` freshly claimed
        // bytes, and pool memory cannot overlap a live `&[u8]`.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), mem.as_ptr(), src.len());
        }
        Ok(mem)
    }

    /// Registers a cleanup callback to run at pool teardown.
    ///
    /// Cleanups run in reverse order of registration, before any backing
    /// block is released. The list node itself lives in the pool.
    ///
    /// # Errors
    ///
    /// [`Error::NullCleanupArg`] for a null `arg`; allocation errors if
    /// the pool cannot hold the list node. Nothing is registered on
    /// failure.
    pub fn register_dtor(&mut self, func: DtorFn, arg: *mut u8) -> Result<()> {
        if arg.is_null() {
            return Err(Error::NullCleanupArg);
        }
        let node = self.alloc(size_of::<DtorItem>())?.cast::<DtorItem>();
        // SAFETY: `node` is a fresh, properly aligned (pointer-width
        // covers DtorItem's fields) pool allocation of the right size.
        unsafe {
            node.as_ptr().write(DtorItem {
                func,
                arg,
                prev: self.last_dtor,
            });
        }
        self.last_dtor = node.as_ptr();
        Ok(())
    }

    /// Returns a snapshot of the pool's bookkeeping state.
    ///
    /// `free_per_block` lists the blocks in storage order, which is
    /// ascending free space from `skip_index` to the end.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            blocks: self.blocks.len(),
            block_size: self.block_size,
            skip_index: self.skip_index,
            free_per_block: self.blocks.iter().map(|b| b.free).collect(),
        }
    }
}

impl Drop for Pool {
    /// Runs every registered cleanup in reverse registration order, then
    /// releases all backing blocks.
    fn drop(&mut self) {
        let mut node = self.last_dtor;
        while !node.is_null() {
            // SAFETY: nodes live in pool blocks, which are released only
            // below, after the whole list has been walked.
            let item = unsafe { &*node };
            // SAFETY: the registrant guaranteed `func`/`arg` stay valid
            // for the pool's lifetime.
            unsafe { (item.func)(item.arg) };
            node = item.prev;
        }
        for block in &self.blocks {
            // SAFETY: each block was allocated in `alloc_zeroed_block`
            // with exactly this layout.
            unsafe {
                alloc::dealloc(
                    block.mem.as_ptr(),
                    Layout::from_size_align_unchecked(block.capacity, ALIGN),
                );
            }
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("blocks", &self.blocks.len())
            .field("block_size", &self.block_size)
            .field("skip_index", &self.skip_index)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a pool's bookkeeping, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Number of live backing blocks.
    pub blocks: usize,
    /// Nominal size for the next freshly-created block.
    pub block_size: usize,
    /// First block index included in free-space searches.
    pub skip_index: usize,
    /// Free bytes per block, in storage order.
    pub free_per_block: Vec<usize>,
}

/// Allocates one zero-filled backing block from the system allocator.
fn alloc_zeroed_block(capacity: usize) -> Result<NonNull<u8>> {
    let layout = Layout::from_size_align(capacity, ALIGN)
        .map_err(|_| Error::SizeOverflow { size: capacity })?;
    // SAFETY: `capacity` is never zero; the smallest nominal size is
    // ALIGN/2 doubled before first use, and explicit requests are
    // max()-ed in.
    let mem = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(mem).ok_or(Error::OutOfMemory)
}
