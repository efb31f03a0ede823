//! The arena itself: attach/detach and the allocator operations (find, take,
//! free-with-merge) that carve and reclaim blocks from it.
//!
//! This is the audited unsafe core the rest of the crate builds on. Every
//! public entry point here takes and releases the arena's single mutual
//! exclusion guard and leaves the free/active lists in a consistent state on
//! every exit path, including error paths.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::active_list;
use crate::block::{self, BlockHeader, HEADER_SIZE, MAX_ALIGNMENT, MIN_BUFFER_OVERHEAD};
use crate::collaborators::SendEngine;
use crate::error::{Error, Result};
use crate::free_list;

struct ArenaLists {
    free_head: Option<NonNull<BlockHeader>>,
    active_head: Option<NonNull<BlockHeader>>,
}

/// One attached buffered-send arena: a caller-donated region, carved into
/// blocks by the free/active list machinery in this module.
pub struct Arena {
    origin_base: NonNull<u8>,
    origin_size: usize,
    base: NonNull<u8>,
    capacity: usize,
    lists: Mutex<ArenaLists>,
    engine: Arc<dyn SendEngine + Send + Sync>,
}

// SAFETY: Arena's raw pointers (`origin_base`, `base`) describe a region the
// caller guarantees is exclusively owned by this arena for its lifetime; all
// mutable access to the blocks within it goes through `lists`, a `Mutex`.
// This mirrors `oxidex_mem::arena::GlobalArena`'s `unsafe impl Send/Sync` on
// a type holding raw chunk pointers behind its own lock.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Attaches a caller-owned byte region, forward-aligning it to
    /// `MAX_ALIGNMENT` first (spec §4.1). `engine` is the send engine this
    /// arena's outstanding blocks will be waited on and reclaimed through.
    pub fn attach(
        ptr: NonNull<u8>,
        size: usize,
        engine: Arc<dyn SendEngine + Send + Sync>,
    ) -> Result<Self> {
        if size < MIN_BUFFER_OVERHEAD {
            return Err(Error::BufferTooSmall {
                size,
                required: MIN_BUFFER_OVERHEAD,
            });
        }

        let raw_addr = ptr.as_ptr() as usize;
        let misalignment = raw_addr % MAX_ALIGNMENT;
        let (base, usable_size) = if misalignment == 0 {
            (ptr, size)
        } else {
            let advance = MAX_ALIGNMENT - misalignment;
            if advance >= size {
                return Err(Error::BufferTooSmall {
                    size,
                    required: MIN_BUFFER_OVERHEAD,
                });
            }
            // SAFETY: advance < size, so this stays within the caller's
            // region; ptr is valid for `size` bytes by the caller's contract.
            let aligned = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(advance)) };
            (aligned, size - advance)
        };

        // The first block's span must itself be a multiple of MAX_ALIGNMENT
        // (invariant §3.6); any trailing slack below that is unusable.
        let first_span = usable_size - (usable_size % MAX_ALIGNMENT);
        if first_span < MIN_BUFFER_OVERHEAD {
            return Err(Error::BufferTooSmall {
                size: first_span,
                required: MIN_BUFFER_OVERHEAD,
            });
        }

        // SAFETY: `base` is valid for `usable_size` bytes (derived above from
        // the caller's region), and `first_span <= usable_size`.
        let first = unsafe { BlockHeader::init(base, first_span) };

        Ok(Arena {
            origin_base: ptr,
            origin_size: size,
            base,
            capacity: first_span,
            lists: Mutex::new(ArenaLists {
                free_head: Some(first),
                active_head: None,
            }),
            engine,
        })
    }

    /// The usable capacity of the arena (the aligned region's total span, not
    /// the caller's original `size`).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Base pointer of the aligned, usable region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// The send engine this arena was attached with. The send driver always
    /// drives a send through the same engine its destination arena was
    /// attached with, never a separately supplied one.
    pub(crate) fn engine(&self) -> &(dyn SendEngine + Send + Sync) {
        self.engine.as_ref()
    }

    /// Detaches the arena, draining every outstanding send first (spec
    /// §4.2). Consumes `self`: once drained, the arena no longer exists.
    /// Returns the caller's original, pre-alignment `(ptr, size)`.
    pub fn detach(self) -> Result<(NonNull<u8>, usize)> {
        // Take the active-list snapshot under the guard, then release it:
        // we own this Arena by value (it has already been removed from its
        // slot by the caller), so nothing can mutate the lists concurrently
        // and there is no need to hold the guard across the waits below.
        let active_head = {
            let lists = self.lists.lock().expect("arena lock poisoned");
            lists.active_head
        };

        for node in active_list::drain_order(active_head) {
            // SAFETY: `node` was reachable from the active list snapshot
            // above and the arena is solely owned by this call.
            let handle = unsafe { node.as_ref().send_handle };
            if let Some(handle) = handle {
                self.engine.wait(handle)?;
                self.engine.release(handle);
            }
        }

        Ok((self.origin_base, self.origin_size))
    }

    /// Find-and-take (spec §4.3): locates the first free block with enough
    /// payload capacity for `n` bytes, splits or consumes it whole, and
    /// moves it onto the active list. Returns `None` with no mutation if no
    /// block fits.
    pub(crate) fn allocate(&self, n: usize) -> Option<NonNull<BlockHeader>> {
        let mut lists = self.lists.lock().expect("arena lock poisoned");
        let found = free_list::find_first_fit(lists.free_head, n)?;
        Some(Self::take(&mut lists, found, n))
    }

    fn take(lists: &mut ArenaLists, mut p: NonNull<BlockHeader>, n: usize) -> NonNull<BlockHeader> {
        let n_aligned = block::align_up(n);

        // SAFETY: `p` is a live free block reachable from `lists.free_head`.
        let (p_span, p_cap) = unsafe { (p.as_ref().total_span, p.as_ref().payload_capacity) };

        if n_aligned + HEADER_SIZE + crate::block::MIN_BLOCK_PAYLOAD <= p_cap {
            // Split: carve a new free remainder `q` immediately after the
            // bytes we're taking, splice it in right after `p`, shrink `p`,
            // then remove `p` from the free list.
            let q_span = p_span - (HEADER_SIZE + n_aligned);
            // SAFETY: `p` spans `p_span` bytes starting at its own address;
            // `HEADER_SIZE + n_aligned < p_span` per the split condition, so
            // this stays within `p`'s span and therefore within the arena.
            let q_addr = unsafe {
                NonNull::new_unchecked(p.cast::<u8>().as_ptr().add(HEADER_SIZE + n_aligned))
            };
            // SAFETY: `q_addr` is within the arena and the `q_span` bytes
            // starting there were, until this instruction, part of `p`'s
            // untouched payload, so they are valid and unaliased.
            let q = unsafe { BlockHeader::init(q_addr, q_span) };
            // SAFETY: `p` is currently linked into the free list.
            unsafe { free_list::insert_after(&mut lists.free_head, p, q) };

            // SAFETY: `p` is a live header we have exclusive access to via
            // the arena's lock.
            unsafe {
                p.as_mut().total_span = HEADER_SIZE + n_aligned;
                p.as_mut().sync_capacity();
            }
            // SAFETY: `p` is still linked into the free list at this point.
            unsafe { free_list::unlink(&mut lists.free_head, p) };
        } else {
            // Consume whole: the remainder would be too small to stand on
            // its own, so it becomes slack inside `p`.
            // SAFETY: `p` is currently linked into the free list.
            unsafe { free_list::unlink(&mut lists.free_head, p) };
        }

        // SAFETY: `p` was just unlinked from the free list and is not linked
        // anywhere else.
        unsafe { active_list::push_front(&mut lists.active_head, p) };
        p
    }

    /// Free-with-merge (spec §4.4): unlinks `p` from the active list, clears
    /// its transient active-only fields, and splices it back into the free
    /// list, merging with whichever address-adjacent neighbors exist.
    pub(crate) fn release_block(&self, mut p: NonNull<BlockHeader>) {
        let mut lists = self.lists.lock().expect("arena lock poisoned");

        // SAFETY: `p` is currently linked into the active list by contract
        // of this method's callers (the completion-reclaim path).
        unsafe { active_list::unlink(&mut lists.active_head, p) };
        // SAFETY: `p` is a live header we have exclusive access to.
        unsafe {
            p.as_mut().send_handle = None;
            p.as_mut().payload_bytes_used = 0;
        }

        let p_addr = p.as_ptr() as usize;
        let (left, right) = free_list::find_neighbors(lists.free_head, p_addr);

        // Merge right into p first if they're adjacent. Whether or not this
        // merge happens, p still needs inserting into the free list exactly
        // once below: if it happened, p has absorbed right's span and takes
        // right's former list position; if not, p is inserted fresh.
        if let Some(right) = right {
            // SAFETY: `p` is a live header.
            let p_end = unsafe { BlockHeader::end_addr(p) } as usize;
            if p_end == right.as_ptr() as usize {
                // SAFETY: `right` is currently linked into the free list.
                unsafe {
                    let right_span = right.as_ref().total_span;
                    free_list::unlink(&mut lists.free_head, right);
                    p.as_mut().total_span += right_span;
                    p.as_mut().sync_capacity();
                }
            }
        }

        // SAFETY: `p` is not currently linked into any list (it was either
        // just unlinked from active, or never linked into free).
        unsafe { free_list::insert_sorted(&mut lists.free_head, p) };

        if let Some(left) = left {
            // SAFETY: `left` is a live header.
            let left_end = unsafe { BlockHeader::end_addr(left) } as usize;
            if left_end == p.as_ptr() as usize {
                // SAFETY: `p` is currently linked into the free list (just
                // inserted above); `left` is a live, distinct header.
                unsafe {
                    let p_span = p.as_ref().total_span;
                    free_list::unlink(&mut lists.free_head, p);
                    let mut left = left;
                    left.as_mut().total_span += p_span;
                    left.as_mut().sync_capacity();
                }
            }
        }
    }

    /// Marks `handle`'s owning block reclaimed: finds it on the active list
    /// by handle identity and frees it. Used by the reclaim pass (spec §4.5)
    /// once the send engine reports the handle complete.
    pub(crate) fn reclaim_if_active(&self, handle: crate::collaborators::SendHandle) -> bool {
        let found = {
            let lists = self.lists.lock().expect("arena lock poisoned");
            active_list::drain_order(lists.active_head)
                .into_iter()
                .find(|&node| {
                    // SAFETY: every node here is live and on the active list.
                    unsafe { node.as_ref().send_handle } == Some(handle)
                })
        };
        match found {
            Some(node) => {
                self.release_block(node);
                true
            }
            None => false,
        }
    }

    /// Handles of every block currently on the active list, for the
    /// reclaim pass (spec §4.5) to poll.
    pub(crate) fn active_handles(&self) -> Vec<crate::collaborators::SendHandle> {
        let lists = self.lists.lock().expect("arena lock poisoned");
        active_list::drain_order(lists.active_head)
            .into_iter()
            .filter_map(|n| {
                // SAFETY: every node here is live and on the active list.
                unsafe { n.as_ref().send_handle }
            })
            .collect()
    }

    /// Walks both lists without mutating anything, for the debug-dump
    /// surface (spec §6). Returns `(free_blocks, active_blocks)` as
    /// `(address, total_span)` pairs in list traversal order.
    pub(crate) fn snapshot(&self) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
        let lists = self.lists.lock().expect("arena lock poisoned");
        let describe = |head: Option<NonNull<BlockHeader>>| {
            active_list::drain_order(head)
                .into_iter()
                .map(|n| {
                    // SAFETY: every node in a snapshot is live.
                    let span = unsafe { n.as_ref().total_span };
                    (n.as_ptr() as usize, span)
                })
                .collect::<Vec<_>>()
        };
        (describe(lists.free_head), describe(lists.active_head))
    }

    /// Scans both lists for a node whose own `next` or `prev` points back to
    /// itself — the corruption spec §6's debug-dump surface is required to
    /// flag. Used by `debug::dump`; never mutates anything.
    pub(crate) fn has_self_referencing_node(&self) -> bool {
        let lists = self.lists.lock().expect("arena lock poisoned");
        Self::chain_has_self_reference(lists.free_head)
            || Self::chain_has_self_reference(lists.active_head)
    }

    fn chain_has_self_reference(head: Option<NonNull<BlockHeader>>) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut cur = head;
        while let Some(c) = cur {
            // SAFETY: `c` is a live list member reached by walking from `head`.
            let (prev, next) = unsafe { (c.as_ref().prev, c.as_ref().next) };
            if prev == Some(c) || next == Some(c) {
                return true;
            }
            if !seen.insert(c.as_ptr() as usize) {
                break;
            }
            cur = next;
        }
        false
    }

    /// Writes `n` bytes already packed at `p.payload_ptr()` into the block's
    /// bookkeeping and stores its completion handle. Called by the send
    /// driver after a successful `isend`.
    pub(crate) fn commit_send(
        &self,
        mut p: NonNull<BlockHeader>,
        bytes_used: usize,
        handle: crate::collaborators::SendHandle,
    ) {
        let _guard = self.lists.lock().expect("arena lock poisoned");
        // SAFETY: `p` is a live header exclusively reachable while we hold
        // the arena's guard.
        unsafe {
            p.as_mut().payload_bytes_used = bytes_used;
            p.as_mut().send_handle = Some(handle);
        }
    }

    pub(crate) fn payload_ptr(p: NonNull<BlockHeader>) -> *mut u8 {
        BlockHeader::payload_ptr(p)
    }

    pub(crate) fn payload_capacity(p: NonNull<BlockHeader>) -> usize {
        // SAFETY: `p` is a live header.
        unsafe { p.as_ref().payload_capacity }
    }
}
