//! Buffered-send arena: the user-supplied memory region backing MPI's
//! buffered-mode send semantics.
//!
//! A caller donates a contiguous byte region to this crate. Buffered sends
//! carve sub-regions from it, pack outgoing payloads in place, hand those
//! payloads to a non-blocking send engine, and free the sub-regions once
//! the underlying send completes. When the caller reclaims the region, the
//! arena drains any in-flight transfers first.
//!
//! This crate is the allocator: an in-band, doubly-linked, address-ordered
//! free list coexisting with an active list of outstanding sends, merging
//! neighbors on free and carving aligned sub-regions on allocate. The
//! packing facility, the non-blocking send engine, and the progress engine
//! are out of scope — modeled as the [`collaborators::Packer`] and
//! [`collaborators::SendEngine`] traits so the allocator core is testable
//! without a real MPI stack.
//!
//! # Modules
//!
//! - [`block`]: the in-band header embedded at the start of every block.
//! - [`free_list`]: the address-ordered free list and its coalescing.
//! - [`active_list`]: the unordered list of in-flight blocks.
//! - [`arena`]: attach/detach and the find-take/free-merge operations.
//! - [`driver`]: the send path — sizing, reclaim-then-allocate, pack, send.
//! - [`slots`]: per-process, per-communicator, per-session arena slots.
//! - [`collaborators`]: the packer/send-engine trait seams.
//! - [`debug`]: a non-mutating list dump for diagnostics.
//! - [`error`]: this crate's error taxonomy.
//! - [`testing`]: in-memory collaborator doubles, also usable by downstream
//!   integration tests.

pub mod active_list;
pub mod arena;
pub mod block;
pub mod collaborators;
pub mod debug;
pub mod driver;
pub mod error;
pub mod free_list;
pub mod slots;
pub mod testing;

use std::ptr::NonNull;
use std::sync::Arc;

pub use arena::Arena;
pub use collaborators::{CommId, DatatypeId, Packer, SendEngine, SendHandle, SessionId};
pub use error::{Error, Result};

/// Attaches `(ptr, size)` to the process-global arena slot.
///
/// # Safety
/// `ptr` must be valid for `size` bytes for as long as the slot remains
/// attached, and the caller must not access that memory concurrently except
/// through this crate's operations.
pub unsafe fn attach_process(
    ptr: NonNull<u8>,
    size: usize,
    engine: Arc<dyn SendEngine + Send + Sync>,
) -> Result<()> {
    slots::registry().process().attach(ptr, size, engine)
}

/// Detaches the process-global arena slot, draining outstanding sends.
pub fn detach_process() -> Result<(NonNull<u8>, usize)> {
    slots::registry().process().detach()
}

/// Detach-if-needed, then clear the process-global slot.
pub fn finalize_process() -> Result<()> {
    slots::registry().process().finalize()
}

/// Polls the process-global slot's send engine and reclaims whatever it
/// reports complete, without attempting a new allocation. A no-op if
/// nothing is attached.
pub fn reclaim_process() -> Result<()> {
    slots::registry().process().reclaim()
}

/// Attaches `(ptr, size)` to the arena slot for communicator `comm`.
///
/// # Safety
/// See [`attach_process`].
pub unsafe fn attach_communicator(
    comm: CommId,
    ptr: NonNull<u8>,
    size: usize,
    engine: Arc<dyn SendEngine + Send + Sync>,
) -> Result<()> {
    slots::registry().communicator(comm).attach(ptr, size, engine)
}

/// Detaches the arena slot for communicator `comm`, draining outstanding
/// sends. Returns `(dangling, 0)` if nothing was attached.
pub fn detach_communicator(comm: CommId) -> Result<(NonNull<u8>, usize)> {
    slots::registry().communicator(comm).detach()
}

/// Detach-if-needed, clear, and drop the registry entry for communicator
/// `comm`. Call when the communicator itself is being freed.
pub fn finalize_communicator(comm: CommId) -> Result<()> {
    slots::registry().forget_communicator(comm)
}

/// Polls communicator `comm`'s send engine and reclaims whatever it reports
/// complete, without attempting a new allocation. A no-op if nothing is
/// attached.
pub fn reclaim_communicator(comm: CommId) -> Result<()> {
    slots::registry().communicator(comm).reclaim()
}

/// Attaches `(ptr, size)` to the arena slot for session `session`.
///
/// # Safety
/// See [`attach_process`].
pub unsafe fn attach_session(
    session: SessionId,
    ptr: NonNull<u8>,
    size: usize,
    engine: Arc<dyn SendEngine + Send + Sync>,
) -> Result<()> {
    slots::registry().session(session).attach(ptr, size, engine)
}

/// Detaches the arena slot for session `session`, draining outstanding
/// sends. Returns `(dangling, 0)` if nothing was attached.
pub fn detach_session(session: SessionId) -> Result<(NonNull<u8>, usize)> {
    slots::registry().session(session).detach()
}

/// Detach-if-needed, clear, and drop the registry entry for session
/// `session`. Call at session finalization.
pub fn finalize_session(session: SessionId) -> Result<()> {
    slots::registry().forget_session(session)
}

/// Polls session `session`'s send engine and reclaims whatever it reports
/// complete, without attempting a new allocation. A no-op if nothing is
/// attached.
pub fn reclaim_session(session: SessionId) -> Result<()> {
    slots::registry().session(session).reclaim()
}

/// Runs a buffered send: resolves the arena from, in order, the
/// communicator's slot, the communicator's owning session's slot (if
/// `session` is given), and the process slot (spec §4.5's resolution
/// order). Fails with [`Error::NoBufferAttached`] if all three are empty.
///
/// # Safety
/// `src` must be valid for the packer's understanding of `(count, ty)` and
/// must remain valid and unmutated by the caller until the resulting send
/// completes.
#[allow(clippy::too_many_arguments)]
pub unsafe fn send(
    packer: &dyn Packer,
    src: *const u8,
    count: usize,
    ty: DatatypeId,
    dest: i32,
    tag: i32,
    comm: CommId,
    session: Option<SessionId>,
    share_handle: bool,
) -> Result<Option<SendHandle>> {
    slots::registry().with_resolved_arena(comm, session, |arena| {
        // SAFETY: forwarded from this function's own contract.
        unsafe { driver::send(arena, packer, src, count, ty, dest, tag, comm, share_handle) }
    })?
}
