//! Interfaces to the components this crate treats as external collaborators:
//! the packing facility, the non-blocking send engine, and (implicitly,
//! through [`SendEngine::progress_test`]) the progress engine.
//!
//! The allocator core never constructs a real MPI datatype, request, or
//! communicator; it only calls through these traits. That keeps `bsend-core`
//! buildable and testable without linking an MPI implementation.

use std::fmt;
use std::ptr::NonNull;

use crate::error::Result;

/// Identifies a datatype as understood by the packing facility. The value
/// `BYTES` is reserved for "already packed bytes", whose packed size equals
/// the byte count directly (spec §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatatypeId(pub u32);

impl DatatypeId {
    /// The opaque "already packed bytes" type used internally by the send
    /// driver when handing a carved block to [`SendEngine::isend`].
    pub const BYTES: DatatypeId = DatatypeId(u32::MAX);
}

/// Opaque identifier for a communicator, used only for resolution and for
/// addressing the per-communicator arena-slot registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommId(pub u64);

/// Opaque identifier for an MPI session, used only for addressing the
/// per-session arena-slot registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Opaque completion token returned by [`SendEngine::isend`] and stored in a
/// block's header while it is active.
///
/// Deliberately not `Clone`-derived beyond the bit-copy a `Copy` type gets:
/// every additional live reference must go through
/// [`SendEngine::add_reference`], so the send engine's own bookkeeping (e.g.
/// a reference count on the underlying request object) stays authoritative.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SendHandle(pub(crate) NonNull<()>);

// SAFETY: SendHandle is an opaque token; the send engine implementation is
// responsible for guaranteeing the underlying object can be queried/waited
// on from whichever thread holds a copy of the handle.
unsafe impl Send for SendHandle {}
unsafe impl Sync for SendHandle {}

impl fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SendHandle({:p})", self.0.as_ptr())
    }
}

impl SendHandle {
    /// Wraps a raw, non-null completion token produced by a send engine.
    #[must_use]
    pub fn from_raw(ptr: NonNull<()>) -> Self {
        Self(ptr)
    }

    /// Returns the raw token for passing back into the send engine that
    /// produced it.
    #[must_use]
    pub fn into_raw(self) -> NonNull<()> {
        self.0
    }
}

/// Serializes typed messages into a contiguous byte payload.
///
/// Out of scope per spec §1; modeled here as a trait so the allocator core
/// can be exercised without a real packing implementation.
pub trait Packer {
    /// Pure, side-effect-free sizing: how many bytes would packing
    /// `(count, type)` produce.
    fn pack_size(&self, count: usize, ty: DatatypeId) -> Result<usize>;

    /// Serializes `count` elements of `ty` from `src` into `dst`, which has
    /// room for `dst_cap` bytes. Returns the number of bytes actually
    /// written.
    ///
    /// # Safety
    /// `src` must be valid for the packer's understanding of `(count, ty)`;
    /// `dst` must be valid for `dst_cap` writable bytes.
    unsafe fn pack(
        &self,
        src: *const u8,
        count: usize,
        ty: DatatypeId,
        dst: *mut u8,
        dst_cap: usize,
    ) -> Result<usize>;
}

/// Non-blocking send initiation and completion-handle operations.
///
/// Out of scope per spec §1 (send engine and progress engine); modeled here
/// as one trait since the spec's progress-engine hooks
/// ([`SendEngine::progress_test`]) are only ever invoked through a handle to
/// the send engine that owns them.
pub trait SendEngine {
    /// Initiates a non-blocking send of `bytes` bytes starting at `src`,
    /// already packed as [`DatatypeId::BYTES`].
    ///
    /// # Safety
    /// `src` must remain valid and must not be mutated by the caller until
    /// the returned handle completes.
    unsafe fn isend(
        &self,
        src: *const u8,
        bytes: usize,
        dest: i32,
        tag: i32,
        comm: CommId,
    ) -> Result<SendHandle>;

    /// Advances the send engine's progress without blocking.
    fn progress_test(&self) -> Result<()>;

    /// Blocks the calling thread until `handle` completes.
    fn wait(&self, handle: SendHandle) -> Result<()>;

    /// Returns whether `handle` has completed, without blocking.
    fn is_complete(&self, handle: SendHandle) -> Result<bool>;

    /// Returns whether `handle` refers to a persistent request.
    fn is_persistent(&self, handle: SendHandle) -> bool;

    /// Releases this crate's reference to `handle`.
    fn release(&self, handle: SendHandle);

    /// Produces an additional live reference to `handle`, for callers that
    /// asked the send driver to hand back a waitable handle of their own.
    fn add_reference(&self, handle: SendHandle) -> SendHandle;
}
