//! Debug-dump surface (spec §6): a non-mutating walk of both lists, logged
//! at trace level rather than written to stdout directly, so it composes
//! with whatever the embedding process already does with its logs.

use bsend_log::trace;

use crate::arena::Arena;

/// Walks `arena`'s free and active lists and emits one trace line per block
/// plus a summary, flagging any node whose own `next` or `prev` points back
/// to itself — list corruption, per spec. Never mutates the arena and never
/// panics on a malformed list — it reports what it can and moves on, since
/// this is a diagnostic, not a correctness check.
pub fn dump(arena: &Arena) {
    let (free, active) = arena.snapshot();

    trace!("arena capacity: {}", arena.capacity());
    trace!(
        "arena dump: {} free block(s), {} active block(s)",
        free.len(),
        active.len()
    );

    for (addr, span) in &free {
        trace!("  free   @ {addr:#x} span={span}");
    }
    for (addr, span) in &active {
        trace!("  active @ {addr:#x} span={span}");
    }

    if arena.has_self_referencing_node() {
        trace!("  corruption suspected: a list node's next/prev points back to itself");
    }
}
