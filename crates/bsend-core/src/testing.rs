//! In-memory collaborator doubles for exercising the allocator core without
//! a real MPI stack.
//!
//! Used by this crate's own unit and integration tests; exported (rather
//! than `#[cfg(test)]`-gated) so integration tests under `tests/`, which
//! compile as their own crate, can reach the same doubles.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::collaborators::{CommId, DatatypeId, Packer, SendEngine, SendHandle};
use crate::error::Result;

/// A [`Packer`] that treats every datatype as raw bytes: `pack_size` is the
/// identity on `count`, and `pack` is a `memcpy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesPacker;

impl Packer for BytesPacker {
    fn pack_size(&self, count: usize, _ty: DatatypeId) -> Result<usize> {
        Ok(count)
    }

    unsafe fn pack(
        &self,
        src: *const u8,
        count: usize,
        _ty: DatatypeId,
        dst: *mut u8,
        dst_cap: usize,
    ) -> Result<usize> {
        debug_assert!(count <= dst_cap);
        // SAFETY: caller guarantees `src` is valid for `count` bytes and
        // `dst` is valid for `dst_cap >= count` writable bytes.
        unsafe { std::ptr::copy_nonoverlapping(src, dst, count) };
        Ok(count)
    }
}

/// A [`SendEngine`] whose sends complete only when a test explicitly calls
/// [`InMemorySendEngine::complete`]. Every handle this engine hands out
/// owns its own heap box, so `add_reference` can return an independent
/// token for the same logical send without risking a double free on
/// `release`.
#[derive(Default)]
pub struct InMemorySendEngine {
    next_id: AtomicU64,
    completed: Mutex<HashMap<u64, bool>>,
}

impl InMemorySendEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_id(handle: SendHandle) -> u64 {
        let ptr = handle.into_raw().as_ptr() as *const u64;
        // SAFETY: every handle this engine produces boxes a `u64` id via
        // `Box::into_raw`, so the pointer is valid to read.
        unsafe { *ptr }
    }

    fn new_handle(id: u64) -> SendHandle {
        let boxed = Box::new(id);
        let ptr = Box::into_raw(boxed) as *mut ();
        // SAFETY: `Box::into_raw` never returns null.
        SendHandle::from_raw(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Marks the send identified by `handle` as complete, unblocking any
    /// in-progress [`SendEngine::wait`] on it (including calls made through
    /// a different token from [`SendEngine::add_reference`]).
    pub fn complete(&self, handle: SendHandle) {
        let id = Self::handle_id(handle);
        self.completed.lock().unwrap().insert(id, true);
    }
}

impl SendEngine for InMemorySendEngine {
    unsafe fn isend(
        &self,
        _src: *const u8,
        _bytes: usize,
        _dest: i32,
        _tag: i32,
        _comm: CommId,
    ) -> Result<SendHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.completed.lock().unwrap().insert(id, false);
        Ok(Self::new_handle(id))
    }

    fn progress_test(&self) -> Result<()> {
        Ok(())
    }

    fn wait(&self, handle: SendHandle) -> Result<()> {
        // Tests call `complete` before or concurrently with `wait`; there is
        // no real progress engine to drive here, so this just spins.
        while !self.is_complete(handle)? {
            std::thread::yield_now();
        }
        Ok(())
    }

    fn is_complete(&self, handle: SendHandle) -> Result<bool> {
        let id = Self::handle_id(handle);
        Ok(*self.completed.lock().unwrap().get(&id).unwrap_or(&false))
    }

    fn is_persistent(&self, _handle: SendHandle) -> bool {
        false
    }

    fn release(&self, handle: SendHandle) {
        let ptr = handle.into_raw().as_ptr() as *mut u64;
        // SAFETY: `handle` was produced by `new_handle` via `Box::into_raw`
        // and is released at most once per live token.
        unsafe { drop(Box::from_raw(ptr)) };
    }

    fn add_reference(&self, handle: SendHandle) -> SendHandle {
        Self::new_handle(Self::handle_id(handle))
    }
}
