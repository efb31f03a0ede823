//! Active list: the unordered doubly linked list of blocks whose payload is
//! currently in flight.
//!
//! Unlike the free list, insertion order carries no semantics (spec §5):
//! new blocks go on the head, and any member can be unlinked once its send
//! completes.

use std::collections::HashSet;
use std::ptr::NonNull;

use crate::block::BlockHeader;

/// Pushes `node` onto the head of the list rooted at `head`.
///
/// # Safety
/// `node` must not already be linked into any list.
pub(crate) unsafe fn push_front(head: &mut Option<NonNull<BlockHeader>>, mut node: NonNull<BlockHeader>) {
    // SAFETY: node is fresh and unlinked; we establish its links here.
    unsafe {
        let n = node.as_mut();
        n.prev = None;
        n.next = *head;
    }
    if let Some(mut old_head) = *head {
        // SAFETY: the previous head, if present, is a live list member.
        unsafe { old_head.as_mut().prev = Some(node) };
    }
    *head = Some(node);
}

/// Removes `node` from the list rooted at `head`, wherever it is.
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

    // SAFETY: node is still a valid header; clearing stale link state.
    unsafe {
        let n = node.as_mut();
        n.prev = None;
        n.next = None;
    }
}

/// Iterates the active list head-to-tail, collecting every node. Used by
/// `detach`'s drain (spec §4.2), which needs the full membership up front
/// before it starts tearing blocks down.
///
/// Guards against a corrupt list looping back on itself: a node already seen
/// stops the walk instead of growing `out` forever, since `debug::dump` relies
/// on this same traversal to flag that corruption rather than hang on it.
pub(crate) fn drain_order(head: Option<NonNull<BlockHeader>>) -> Vec<NonNull<BlockHeader>> {
    let mut out = vec![];
    let mut seen = HashSet::new();
    let mut cur = head;
    while let Some(c) = cur {
        if !seen.insert(c.as_ptr() as usize) {
            break;
        }
        out.push(c);
        // SAFETY: `c` is a live list member reached by walking from `head`.
        cur = unsafe { c.as_ref().next };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;

    fn make_block(buf: &mut [u8], span: usize) -> NonNull<BlockHeader> {
        let addr = NonNull::new(buf.as_mut_ptr()).unwrap();
        // SAFETY: buf is `buf.len()` live, owned bytes and span <= buf.len().
        unsafe { BlockHeader::init(addr, span) }
    }

    #[test]
    fn push_front_is_lifo() {
        let mut a = vec![0u8; 128];
        let mut b = vec![0u8; 128];
        let na = make_block(&mut a, 128);
        let nb = make_block(&mut b, 128);

        let mut head = None;
        // SAFETY: na, nb are freshly created and unlinked.
        unsafe {
            push_front(&mut head, na);
            push_front(&mut head, nb);
        }
        assert_eq!(head, Some(nb));
        // SAFETY: nb is linked; reading its next is valid.
        assert_eq!(unsafe { nb.as_ref().next }, Some(na));
    }

    #[test]
    fn unlink_middle_preserves_neighbors() {
        let mut a = vec![0u8; 128];
        let mut b = vec![0u8; 128];
        let mut c = vec![0u8; 128];
        let na = make_block(&mut a, 128);
        let nb = make_block(&mut b, 128);
        let nc = make_block(&mut c, 128);

        let mut head = None;
        // SAFETY: all three nodes are freshly created and unlinked.
        unsafe {
            push_front(&mut head, na);
            push_front(&mut head, nb);
            push_front(&mut head, nc);
        }
        // list is nc -> nb -> na

        // SAFETY: nb is currently linked into `head`.
        unsafe { unlink(&mut head, nb) };

        let order = drain_order(head);
        assert_eq!(order, vec![nc, na]);
    }

    #[test]
    fn drain_order_terminates_on_a_self_referencing_node() {
        let mut a = vec![0u8; 128];
        let na = make_block(&mut a, 128);
        // SAFETY: na is freshly created; corrupting its own link in place to
        // simulate a node pointing back to itself.
        unsafe {
            let mut node = na;
            node.as_mut().next = Some(na);
        }

        let order = drain_order(Some(na));
        assert_eq!(order, vec![na]);
    }
}
