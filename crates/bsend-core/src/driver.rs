//! Send driver: sizing, the reclaim-then-allocate loop, packing, and send
//! initiation (spec §4.5).
//!
//! This module owns none of its own state; it only orchestrates calls
//! against an already-resolved [`Arena`] and its collaborators. Slot
//! resolution (which arena to hand in) lives in [`crate::slots`].

use crate::arena::Arena;
use crate::collaborators::{CommId, DatatypeId, Packer, SendHandle};
use crate::error::{Error, Result};

/// Runs one buffered send against an already-resolved `arena`, driving it
/// through the send engine `arena` was attached with.
///
/// Sizes the payload via `packer.pack_size`, then runs up to two
/// reclaim-then-find passes: each pass polls the engine's progress, reclaims
/// whatever completed, and only then tries to carve a block; the loop fails
/// `NoBufferSpace` if neither pass finds a fit. Packing and send-initiation
/// failures unwind the carved
/// block back onto the free list before propagating (spec §7's invariant:
/// an error from `send` leaves the lists as they were before the call).
///
/// Returns `Some(handle)` referencing the completed send when `share_handle`
/// is set, `None` otherwise. The arena always retains its own reference to
/// the handle regardless of `share_handle`.
///
/// # Safety
/// `src` must be valid for the packer's understanding of `(count, ty)` and
/// must remain valid and unmutated by the caller until the resulting send
/// completes.
#[allow(clippy::too_many_arguments)]
pub unsafe fn send(
    arena: &Arena,
    packer: &dyn Packer,
    src: *const u8,
    count: usize,
    ty: DatatypeId,
    dest: i32,
    tag: i32,
    comm: CommId,
    share_handle: bool,
) -> Result<Option<SendHandle>> {
    let engine = arena.engine();
    let packed_size = packer.pack_size(count, ty)?;

    let mut block = None;
    for _pass in 0..2 {
        reclaim_completed(arena, engine)?;
        block = arena.allocate(packed_size);
        if block.is_some() {
            break;
        }
    }
    let block = block.ok_or(Error::NoBufferSpace {
        requested: packed_size,
        capacity: arena.capacity(),
    })?;

    let dst = Arena::payload_ptr(block);
    let dst_cap = Arena::payload_capacity(block);

    // SAFETY: `src` is valid for `(count, ty)` per this function's own
    // safety contract below; `dst` is the freshly carved block's payload,
    // valid for `dst_cap` writable bytes.
    let written = match unsafe { packer.pack(src, count, ty, dst, dst_cap) } {
        Ok(n) => n,
        Err(e) => {
            arena.release_block(block);
            return Err(e);
        }
    };

    // SAFETY: `dst` remains valid and unmutated by this thread until the
    // handle completes, which callers of this crate's `send` entry point
    // must uphold for `src` in turn.
    let handle = match unsafe { engine.isend(dst, written, dest, tag, comm) } {
        Ok(h) => h,
        Err(e) => {
            arena.release_block(block);
            return Err(e);
        }
    };

    arena.commit_send(block, written, handle);

    Ok(share_handle.then(|| engine.add_reference(handle)))
}

fn reclaim_completed(arena: &Arena, engine: &(dyn crate::collaborators::SendEngine + Send + Sync)) -> Result<()> {
    engine.progress_test()?;
    for handle in arena.active_handles() {
        if engine.is_complete(handle)? && arena.reclaim_if_active(handle) {
            engine.release(handle);
        }
    }
    Ok(())
}

/// Reclaims whatever the engine reports complete for `arena`, without
/// attempting an allocation. Useful for draining completions opportunistically
/// between sends, and for benchmarking the reclaim path in isolation.
pub fn reclaim(arena: &Arena) -> Result<()> {
    reclaim_completed(arena, arena.engine())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SendEngine;
    use crate::testing::{BytesPacker, InMemorySendEngine};
    use std::ptr::NonNull;
    use std::sync::Arc;

    fn attach(size: usize) -> (Vec<u8>, Arena, Arc<InMemorySendEngine>) {
        let mut buf = vec![0u8; size];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        let engine = Arc::new(InMemorySendEngine::new());
        let arena = Arena::attach(ptr, size, engine.clone()).unwrap();
        (buf, arena, engine)
    }

    #[test]
    fn send_then_reclaim_frees_whole_capacity() {
        let (_buf, arena, engine) = attach(4096);
        let packer = BytesPacker;
        let payload = vec![7u8; 100];

        // SAFETY: payload outlives the send and is not mutated afterward.
        let handle = unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                payload.len(),
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                true,
            )
            .unwrap()
        }
        .expect("share_handle was true");

        let (free, active) = arena.snapshot();
        assert_eq!(active.len(), 1);
        assert_eq!(free.len(), 1);

        engine.complete(handle);
        engine.wait(handle).unwrap();
        engine.release(handle);

        // reclaim via a second send that first drains completions
        let _ = unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                1,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                false,
            )
        };

        let (free, _) = arena.snapshot();
        assert!(free.iter().map(|(_, span)| span).sum::<usize>() <= 4096);
    }

    #[test]
    fn exhaust_then_retry_matches_spec_scenario() {
        let (_buf, arena, engine) = attach(1024);
        let packer = BytesPacker;
        let payload = vec![0u8; 400];

        let h1 = unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                400,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                true,
            )
            .unwrap()
        }
        .unwrap();

        unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                400,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                false,
            )
            .unwrap();
        }

        let third = unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                400,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                false,
            )
        };
        assert!(matches!(third, Err(Error::NoBufferSpace { .. })));

        engine.complete(h1);

        let retry = unsafe {
            send(
                &arena,
                &packer,
                payload.as_ptr(),
                400,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                false,
            )
        };
        assert!(retry.is_ok(), "retry should succeed after reclaim");
    }

    #[test]
    fn pack_failure_leaves_lists_unchanged() {
        struct FailingPacker;
        impl Packer for FailingPacker {
            fn pack_size(&self, count: usize, _ty: DatatypeId) -> Result<usize> {
                Ok(count)
            }
            unsafe fn pack(
                &self,
                _src: *const u8,
                _count: usize,
                _ty: DatatypeId,
                _dst: *mut u8,
                _dst_cap: usize,
            ) -> Result<usize> {
                Err(Error::PackFailed("simulated".into()))
            }
        }

        let (_buf, arena, _engine) = attach(4096);
        let packer = FailingPacker;
        let (free_before, _) = arena.snapshot();

        let result = unsafe {
            send(
                &arena,
                &packer,
                std::ptr::null(),
                100,
                DatatypeId::BYTES,
                1,
                0,
                CommId(0),
                false,
            )
        };
        assert!(matches!(result, Err(Error::PackFailed(_))));

        let (free_after, active_after) = arena.snapshot();
        assert!(active_after.is_empty());
        assert_eq!(free_before, free_after);
    }
}
