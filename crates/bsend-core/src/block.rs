//! Block header: the in-band record embedded at the start of every sub-region.
//!
//! A block is written directly into the caller's donated memory, both while
//! free and while active. Its header carries the bookkeeping the allocator
//! needs (span, capacity, list links, completion handle); the payload begins
//! immediately after it.

use std::mem;
use std::ptr::NonNull;

use crate::collaborators::SendHandle;

/// Widest scalar alignment this arena plans around. Chosen to cover SIMD
/// register stores (16 bytes), which is a stricter requirement than either
/// pointer or `f64` alignment on every platform this crate targets.
pub const MAX_ALIGNMENT: usize = 16;

/// Smallest payload a block may carry. A free-list remainder narrower than
/// `HEADER_SIZE + MIN_BLOCK_PAYLOAD` is absorbed into its neighbor instead of
/// becoming its own block (see `take` in `arena.rs`).
pub const MIN_BLOCK_PAYLOAD: usize = 8;

/// A naturally aligned field placed at the end of [`BlockHeader`] so that
/// `payload_ptr` (block start + `HEADER_SIZE`) is automatically well aligned
/// without a per-allocation fix-up. Its value is never read; it exists purely
/// to pin the header's layout.
#[derive(Debug, Clone, Copy)]
#[repr(align(16))]
struct AlignSentinel(u128);

/// The in-band header of every block, free or active.
///
/// `prev`/`next` are reused by whichever list currently owns the block (see
/// [`crate::free_list`] and [`crate::active_list`]); their meaning is
/// list-relative, not a property of the block itself.
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Bytes from this block's own start to the start of the next block (or
    /// the end of the arena). Always a multiple of [`MAX_ALIGNMENT`].
    pub total_span: usize,
    /// `total_span - HEADER_SIZE`. Recomputed whenever `total_span` changes.
    pub payload_capacity: usize,
    pub prev: Option<NonNull<BlockHeader>>,
    pub next: Option<NonNull<BlockHeader>>,
    /// Meaningful only while the block is active: bytes actually packed.
    pub payload_bytes_used: usize,
    /// Populated while active; `None` while free.
    pub send_handle: Option<SendHandle>,
    _align_sentinel: AlignSentinel,
}

/// Offset of the payload's start within the header record. Computed from the
/// layout rather than hand-maintained, so it cannot drift out of sync with
/// [`BlockHeader`]'s field list.
pub const HEADER_SIZE: usize =
    mem::offset_of!(BlockHeader, _align_sentinel) + mem::size_of::<AlignSentinel>();

/// Minimum byte count `attach` will accept: one block's worth of header plus
/// the smallest allowed payload.
pub const MIN_BUFFER_OVERHEAD: usize = HEADER_SIZE + MIN_BLOCK_PAYLOAD;

/// Rounds `n` up to the next multiple of [`MAX_ALIGNMENT`].
pub(crate) const fn align_up(n: usize) -> usize {
    (n + MAX_ALIGNMENT - 1) & !(MAX_ALIGNMENT - 1)
}

impl BlockHeader {
    /// Writes a fresh header at `addr`, spanning `total_span` bytes, with
    /// empty links and no send handle. `addr` must be valid for
    /// `total_span` writable bytes and aligned to `MAX_ALIGNMENT`.
    ///
    /// # Safety
    /// `addr` must point into memory owned by the arena, writable for
    /// `total_span` bytes, and not aliased by any other live `BlockHeader`.
    pub(crate) unsafe fn init(addr: NonNull<u8>, total_span: usize) -> NonNull<BlockHeader> {
        debug_assert_eq!(total_span % MAX_ALIGNMENT, 0);
        debug_assert!(total_span >= HEADER_SIZE + MIN_BLOCK_PAYLOAD);

        let header_ptr = addr.cast::<BlockHeader>();
        // SAFETY: caller guarantees `addr` is valid for `total_span` bytes,
        // which is at least `size_of::<BlockHeader>()` via HEADER_SIZE.
        unsafe {
            std::ptr::write(
                header_ptr.as_ptr(),
                BlockHeader {
                    total_span,
                    payload_capacity: total_span - HEADER_SIZE,
                    prev: None,
                    next: None,
                    payload_bytes_used: 0,
                    send_handle: None,
                    _align_sentinel: AlignSentinel(0),
                },
            );
        }
        header_ptr
    }

    /// Recomputes `payload_capacity` from `total_span`. Call after any
    /// mutation of `total_span`.
    pub(crate) fn sync_capacity(&mut self) {
        self.payload_capacity = self.total_span - HEADER_SIZE;
    }

    /// Address of this header as a raw byte pointer.
    pub(crate) fn start_addr(this: NonNull<BlockHeader>) -> NonNull<u8> {
        this.cast()
    }

    /// Address immediately past this block's span: the start of the next
    /// block in memory, or the end of the arena.
    pub(crate) fn end_addr(this: NonNull<BlockHeader>) -> *mut u8 {
        // SAFETY: `this` is a valid block header; `total_span` bytes from its
        // start are within the arena by construction.
        unsafe {
            let span = (*this.as_ptr()).total_span;
            this.cast::<u8>().as_ptr().add(span)
        }
    }

    /// Pointer to the first payload byte: always `this + HEADER_SIZE`.
    pub(crate) fn payload_ptr(this: NonNull<BlockHeader>) -> *mut u8 {
        // SAFETY: every block reserves at least HEADER_SIZE bytes for its
        // header before the payload begins.
        unsafe { this.cast::<u8>().as_ptr().add(HEADER_SIZE) }
    }
}
