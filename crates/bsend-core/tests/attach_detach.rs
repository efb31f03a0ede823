//! Attach/detach lifecycle across the three arena slots (spec §8 scenario 1
//! and the round-trip law `detach(attach(slot, p, n)) == (p, n)`).

use std::ptr::NonNull;
use std::sync::Arc;

use bsend_core::testing::InMemorySendEngine;
use bsend_core::{CommId, Error, SessionId};

fn engine() -> Arc<dyn bsend_core::SendEngine + Send + Sync> {
    Arc::new(InMemorySendEngine::new())
}

#[test]
fn process_slot_round_trips_through_attach_detach() {
    let mut buf = vec![0u8; 4096];
    let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();

    // SAFETY: buf outlives the slot and nothing else touches it meanwhile.
    unsafe { bsend_core::attach_process(ptr, 4096, engine()).unwrap() };

    let (returned_ptr, returned_size) = bsend_core::detach_process().unwrap();
    assert_eq!(returned_ptr, ptr);
    assert_eq!(returned_size, 4096);
}

#[test]
fn detach_on_an_empty_communicator_slot_is_not_an_error() {
    let (ptr, size) = bsend_core::detach_communicator(CommId(101)).unwrap();
    assert_eq!(size, 0);
    let _ = ptr;
}

#[test]
fn attach_twice_on_the_same_communicator_fails() {
    let comm = CommId(102);
    let mut a = vec![0u8; 4096];
    let ptr_a = NonNull::new(a.as_mut_ptr()).unwrap();
    // SAFETY: `a` outlives the slot.
    unsafe { bsend_core::attach_communicator(comm, ptr_a, 4096, engine()).unwrap() };

    let mut b = vec![0u8; 4096];
    let ptr_b = NonNull::new(b.as_mut_ptr()).unwrap();
    // SAFETY: `b` outlives the slot (the attach is expected to fail before
    // storing anything).
    let err = unsafe { bsend_core::attach_communicator(comm, ptr_b, 4096, engine()) }.unwrap_err();
    assert_eq!(err, Error::BufferAlreadyAttached);

    bsend_core::finalize_communicator(comm).unwrap();
}

#[test]
fn attach_rejects_a_region_smaller_than_the_minimum_overhead() {
    let comm = CommId(103);
    let mut buf = vec![0u8; 4];
    let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
    // SAFETY: buf is 4 live bytes; attach is expected to reject it outright.
    let err = unsafe { bsend_core::attach_communicator(comm, ptr, 4, engine()) }.unwrap_err();
    assert!(matches!(err, Error::BufferTooSmall { .. }));
}

#[test]
fn session_slot_round_trips_independently_of_communicator_slots() {
    let session = SessionId(201);
    let mut buf = vec![0u8; 2048];
    let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();

    // SAFETY: buf outlives the slot.
    unsafe { bsend_core::attach_session(session, ptr, 2048, engine()).unwrap() };
    let (returned_ptr, returned_size) = bsend_core::detach_session(session).unwrap();
    assert_eq!(returned_ptr, ptr);
    assert_eq!(returned_size, 2048);
}

#[test]
fn finalize_is_idempotent_on_an_already_detached_communicator() {
    let comm = CommId(104);
    bsend_core::finalize_communicator(comm).unwrap();
    bsend_core::finalize_communicator(comm).unwrap();
}
