// Common test utilities for integration tests
//
// This module provides shared helper functions and fixtures for use
// across all integration tests.

#![allow(dead_code)]

use ferric::{Descriptor, Hooks, ObjPtr, Runtime, TypeDecl};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Monotonic counter so concurrently-running tests never collide on
/// type names within a shared runtime.
static TYPE_ID: AtomicUsize = AtomicUsize::new(0);

/// Produces a unique type name with the given prefix.
pub fn unique_name(prefix: &str) -> String {
    let id = TYPE_ID.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}_{id}")
}

/// Registers a root type with the given sizes.
pub fn register_root(
    rt: &mut Runtime,
    name: &str,
    instance_size: usize,
    slot_count: usize,
) -> Descriptor {
    rt.register(TypeDecl {
        name,
        super_type: None,
        instance_size,
        slot_count,
        init_hook: None,
    })
    .expect("failed to register root type")
}

/// Registers a subtype with the given sizes.
pub fn register_sub(
    rt: &mut Runtime,
    name: &str,
    super_type: &Descriptor,
    instance_size: usize,
    slot_count: usize,
) -> Descriptor {
    rt.register(TypeDecl {
        name,
        super_type: Some(super_type),
        instance_size,
        slot_count,
        init_hook: None,
    })
    .expect("failed to register subtype")
}

/// No-op slot implementation.
pub unsafe extern "C-unwind" fn noop_imp(
    _receiver: ObjPtr,
    _slot: usize,
    _args: *const *mut u8,
    _ret: *mut u8,
) {
}

/// Slot implementation that writes 42 into the return buffer.
pub unsafe extern "C-unwind" fn return_42_imp(
    _receiver: ObjPtr,
    _slot: usize,
    _args: *const *mut u8,
    ret: *mut u8,
) {
    // SAFETY: the dispatcher hands every implementation a 16-byte
    // return buffer.
    unsafe {
        std::ptr::write_unaligned(ret.cast::<usize>(), 42);
    }
}

fn swallow(_msg: &str) {}

/// Hooks whose warning/error reporters are silent and whose fatal
/// reporter panics, so tests can observe the fatal path with
/// `catch_unwind` instead of losing the process.
pub fn panicking_hooks() -> Hooks {
    fn fatal(msg: &str) -> ! {
        panic!("fatal hook: {msg}");
    }
    Hooks {
        warning: swallow,
        error: swallow,
        fatal,
    }
}
