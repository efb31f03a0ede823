//! Free list: the address-ordered doubly linked list of unallocated blocks.
//!
//! Every operation here assumes (and preserves) invariant §3.2: the list is
//! sorted strictly by address and no two free blocks are adjacent in memory.
//! Callers outside this module never walk `prev`/`next` directly while a
//! block is free — they go through these functions.

use std::ptr::NonNull;

use crate::block::BlockHeader;

fn addr(node: NonNull<BlockHeader>) -> usize {
    node.as_ptr() as usize
}

/// First-fit search: the first block (in address order) whose
/// `payload_capacity` is at least `n`. `None` means no block fits.
pub(crate) fn find_first_fit(
    head: Option<NonNull<BlockHeader>>,
    n: usize,
) -> Option<NonNull<BlockHeader>> {
    let mut cur = head;
    while let Some(node) = cur {
        // SAFETY: every pointer reachable from `head` is a live free block
        // header owned by this arena.
        let block = unsafe { node.as_ref() };
        if block.payload_capacity >= n {
            return Some(node);
        }
        cur = block.next;
    }
    None
}

/// Removes `node` from the list rooted at `head`. Clears `node`'s own
/// `prev`/`next` so a stale traversal can't walk into the free list through
/// a block that no longer belongs to it.
///
/// # Safety
/// `node` must currently be linked into the list rooted at `head`.
pub(crate) unsafe fn unlink(head: &mut Option<NonNull<BlockHeader>>, mut node: NonNull<BlockHeader>) {
    // SAFETY: caller guarantees `node` is linked into this list.
    let (prev, next) = unsafe {
        let n = node.as_ref();
        (n.prev, n.next)
    };

    match prev {
        // SAFETY: `prev`, if present, is a live list member.
        Some(mut p) => unsafe { p.as_mut().next = next },
        None => *head = next,
    }
    if let Some(mut n) = next {
        // SAFETY: `next`, if present, is a live list member.
        unsafe { n.as_mut().prev = prev };
    }

    // SAFETY: node is still a valid header; we're only touching its own
    // link fields, which no longer describe list membership.
    unsafe {
        let n = node.as_mut();
        n.prev = None;
        n.next = None;
    }
}

/// Inserts `node` immediately after `after` in the list rooted at `head`.
/// Used by split (§4.3): the new remainder block is always the immediate
/// address-order successor of the block being split.
///
/// # Safety
/// `after` must currently be linked into the list rooted at `head`; `node`
/// must not already be linked into any list.
pub(crate) unsafe fn insert_after(
    head: &mut Option<NonNull<BlockHeader>>,
    mut after: NonNull<BlockHeader>,
    mut node: NonNull<BlockHeader>,
) {
    debug_assert!(addr(after) < addr(node));
    // SAFETY: `after` is a live list member per caller's contract.
    let next = unsafe { after.as_ref().next };

    // SAFETY: node is a fresh, unlinked header; we are establishing its
    // links for the first time.
    unsafe {
        let n = node.as_mut();
        n.prev = Some(after);
        n.next = next;
    }
    if let Some(mut nx) = next {
        // SAFETY: `next`, if present, is a live list member.
        unsafe { nx.as_mut().prev = Some(node) };
    }
    // SAFETY: `after` is a live list member.
    unsafe { after.as_mut().next = Some(node) };
    let _ = head; // head pointer itself is unaffected by a non-head insert
}

/// Inserts `node` at its address-sorted position in the list rooted at
/// `head`. Used by free-with-merge (§4.4) to place a newly freed block
/// between its discovered `left`/`right` neighbors.
///
/// # Safety
/// `node` must not already be linked into any list.
pub(crate) unsafe fn insert_sorted(
    head: &mut Option<NonNull<BlockHeader>>,
    mut node: NonNull<BlockHeader>,
) {
    let node_addr = addr(node);

    let mut prev: Option<NonNull<BlockHeader>> = None;
    let mut cur = *head;
    while let Some(c) = cur {
        if addr(c) > node_addr {
            break;
        }
        prev = Some(c);
        // SAFETY: `c` is a live list member reached by walking from `head`.
        cur = unsafe { c.as_ref().next };
    }

    // SAFETY: node is fresh and unlinked; we establish its links here.
    unsafe {
        let n = node.as_mut();
        n.prev = prev;
        n.next = cur;
    }
    if let Some(mut c) = cur {
        // SAFETY: `cur`, if present, is a live list member.
        unsafe { c.as_mut().prev = Some(node) };
    }
    match prev {
        // SAFETY: `prev`, if present, is a live list member.
        Some(mut p) => unsafe { p.as_mut().next = Some(node) },
        None => *head = Some(node),
    }
}

/// Locates the immediate free-list neighbors of the (not-yet-linked) address
/// `target_addr`: the last free block with a lower address (`left`) and the
/// first free block with a higher address (`right`). Used by free-with-merge
/// (§4.4) before the freed block itself is inserted.
pub(crate) fn find_neighbors(
    head: Option<NonNull<BlockHeader>>,
    target_addr: usize,
) -> (Option<NonNull<BlockHeader>>, Option<NonNull<BlockHeader>>) {
    let mut left = None;
    let mut cur = head;
    while let Some(c) = cur {
        if addr(c) > target_addr {
            return (left, Some(c));
        }
        left = Some(c);
        // SAFETY: `c` is a live list member reached by walking from `head`.
        cur = unsafe { c.as_ref().next };
    }
    (left, None)
}

/// Asserts invariant §3.2 (strict address order, no adjacent frees) and §3.4
/// (strictly increasing traversal). Intended for tests and debug assertions,
/// not the allocation hot path.
#[cfg(test)]
pub(crate) fn assert_sorted_no_adjacency(head: Option<NonNull<BlockHeader>>) {
    let mut cur = head;
    let mut last: Option<NonNull<BlockHeader>> = None;
    while let Some(c) = cur {
        if let Some(l) = last {
            assert!(addr(l) < addr(c), "free list not strictly increasing");
            let l_end = BlockHeader::end_addr(l) as usize;
            assert_ne!(l_end, addr(c), "adjacent free blocks were not coalesced");
        }
        last = Some(c);
        // SAFETY: test-only traversal of a list the test itself constructed.
        cur = unsafe { c.as_ref().next };
    }
}
