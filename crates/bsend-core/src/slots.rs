//! Lifecycle & scoping (spec §4.6): the three arena-holding slots —
//! process-global, per-communicator, per-session — and their resolution
//! order during `send`.
//!
//! Slot allocation is lazy: a communicator or session registry entry only
//! exists once something has attached to it.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, OnceLock};

use crate::arena::Arena;
use crate::collaborators::{CommId, SendEngine, SessionId};
use crate::error::{Error, Result};

/// One nullable, independently-locked arena slot. Empty means "not
/// attached"; attach populates it, detach/finalize empties it.
#[derive(Default)]
pub struct ArenaSlot(Mutex<Option<Arena>>);

impl ArenaSlot {
    pub const fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Attaches `(ptr, size)` to this slot, driven by `engine`. Fails with
    /// [`Error::BufferAlreadyAttached`] if the slot is already occupied.
    pub fn attach(
        &self,
        ptr: NonNull<u8>,
        size: usize,
        engine: Arc<dyn SendEngine + Send + Sync>,
    ) -> Result<()> {
        let mut slot = self.0.lock().expect("arena slot lock poisoned");
        if slot.is_some() {
            return Err(Error::BufferAlreadyAttached);
        }
        *slot = Some(Arena::attach(ptr, size, engine)?);
        Ok(())
    }

    /// Empties the slot, draining any active sends first. Returns `(ptr, 0)`
    /// with a dangling pointer if the slot was already empty, per spec
    /// §4.2's "empty slot" contract; callers that care should check
    /// [`ArenaSlot::is_attached`] beforehand.
    pub fn detach(&self) -> Result<(NonNull<u8>, usize)> {
        let taken = self.0.lock().expect("arena slot lock poisoned").take();
        match taken {
            Some(arena) => arena.detach(),
            None => Ok((NonNull::dangling(), 0)),
        }
    }

    /// Detach-if-needed, then clear (spec §4.6): idempotent scope teardown.
    pub fn finalize(&self) -> Result<()> {
        self.detach().map(|_| ())
    }

    pub fn is_attached(&self) -> bool {
        self.0.lock().expect("arena slot lock poisoned").is_some()
    }

    /// Polls the send engine and reclaims whatever it reports complete,
    /// without attempting to carve a new block. A no-op on an empty slot.
    pub fn reclaim(&self) -> Result<()> {
        match self.with_arena(crate::driver::reclaim) {
            Some(r) => r,
            None => Ok(()),
        }
    }

    fn with_arena<R>(&self, f: impl Fn(&Arena) -> R) -> Option<R> {
        let slot = self.0.lock().expect("arena slot lock poisoned");
        slot.as_ref().map(f)
    }
}

/// Per-communicator and per-session slot registries, plus the process-wide
/// singleton slot. One instance of this lives behind a process-global
/// [`OnceLock`] (see [`registry`]).
#[derive(Default)]
pub struct SlotRegistry {
    process: ArenaSlot,
    communicators: Mutex<HashMap<CommId, Arc<ArenaSlot>>>,
    sessions: Mutex<HashMap<SessionId, Arc<ArenaSlot>>>,
}

impl SlotRegistry {
    fn new() -> Self {
        Self::default()
    }

    pub fn process(&self) -> &ArenaSlot {
        &self.process
    }

    /// Returns (lazily creating) the slot for `comm`.
    pub fn communicator(&self, comm: CommId) -> Arc<ArenaSlot> {
        let mut map = self.communicators.lock().expect("registry lock poisoned");
        map.entry(comm)
            .or_insert_with(|| Arc::new(ArenaSlot::new()))
            .clone()
    }

    /// Returns (lazily creating) the slot for `session`.
    pub fn session(&self, session: SessionId) -> Arc<ArenaSlot> {
        let mut map = self.sessions.lock().expect("registry lock poisoned");
        map.entry(session)
            .or_insert_with(|| Arc::new(ArenaSlot::new()))
            .clone()
    }

    /// Drops the registry entry for `comm` after finalizing its slot, if one
    /// exists. Matches MPI's practice of tearing down per-communicator state
    /// when the communicator itself is freed.
    pub fn forget_communicator(&self, comm: CommId) -> Result<()> {
        let slot = self
            .communicators
            .lock()
            .expect("registry lock poisoned")
            .remove(&comm);
        match slot {
            Some(slot) => slot.finalize(),
            None => Ok(()),
        }
    }

    /// Drops the registry entry for `session` after finalizing its slot.
    pub fn forget_session(&self, session: SessionId) -> Result<()> {
        let slot = self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(&session);
        match slot {
            Some(slot) => slot.finalize(),
            None => Ok(()),
        }
    }

    /// Resolves the arena a send on `comm` (optionally owned by `session`)
    /// should draw from: communicator slot, then the communicator's owning
    /// session slot, then the process slot (spec §4.5 "Resolution of
    /// arena"). Runs `f` with the resolved arena under that slot's guard.
    pub fn with_resolved_arena<R>(
        &self,
        comm: CommId,
        session: Option<SessionId>,
        f: impl Fn(&Arena) -> R,
    ) -> Result<R> {
        let comm_slot = self
            .communicators
            .lock()
            .expect("registry lock poisoned")
            .get(&comm)
            .cloned();
        if let Some(comm_slot) = comm_slot {
            if let Some(r) = comm_slot.with_arena(&f) {
                return Ok(r);
            }
        }

        if let Some(session) = session {
            let session_slot = self
                .sessions
                .lock()
                .expect("registry lock poisoned")
                .get(&session)
                .cloned();
            if let Some(session_slot) = session_slot {
                if let Some(r) = session_slot.with_arena(&f) {
                    return Ok(r);
                }
            }
        }

        self.process.with_arena(&f).ok_or(Error::NoBufferAttached)
    }
}

static REGISTRY: OnceLock<SlotRegistry> = OnceLock::new();

/// The process-wide slot registry (spec §4.6's "process-wide state with
/// init-on-attach, teardown-on-finalize lifecycle"). Lazily initialized on
/// first use, mirroring this lineage's `global_arena()` pattern.
pub fn registry() -> &'static SlotRegistry {
    REGISTRY.get_or_init(SlotRegistry::new)
}
