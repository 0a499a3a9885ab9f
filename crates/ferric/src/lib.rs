//! Ferric: a minimal single-inheritance object runtime over plain memory
//! blocks.
//!
//! Ferric provides the two runtime services a tiny object model needs:
//!
//! - **Type descriptors** with lazily-resolved dispatch tables: each
//!   type's table is filled once, the first time an instance of the type
//!   (or a subtype) is created, inheriting unset slots from the ancestor
//!   chain and backfilling the rest so dispatch never reads an empty slot
//! - **Pooled allocation** via [`ferric_mem::Pool`]: many small,
//!   unevenly-sized instances served best-fit out of large blocks, torn
//!   down together with LIFO cleanup callbacks
//!
//! Plus the glue between them: instance construction on the heap, inside
//! a pool, or into caller-supplied memory; destruction and in-place
//! finalization; and inheritance-aware run-time type checks.
//!
//! Everything is deliberately single-threaded and synchronous; callers
//! that share a [`Runtime`] or a pool across threads of control serialize
//! access themselves.
//!
//! # Example
//!
//! ```
//! use ferric::{Runtime, TypeDecl, SlotArgs, DTOR_SLOT};
//!
//! unsafe extern "C-unwind" fn area(
//!     _receiver: ferric::ObjPtr,
//!     _slot: usize,
//!     _args: *const *mut u8,
//!     ret: *mut u8,
//! ) {
//!     unsafe { std::ptr::write_unaligned(ret.cast::<usize>(), 12) };
//! }
//!
//! let mut rt = Runtime::new();
//! let shape = rt
//!     .register(TypeDecl {
//!         name: "Shape",
//!         super_type: None,
//!         instance_size: 24,
//!         slot_count: 2,
//!         init_hook: None,
//!     })
//!     .unwrap();
//! shape.set_slot(1, area).unwrap();
//!
//! let obj = shape.construct().unwrap();
//! let measured = unsafe { ferric::call(obj, 1, &SlotArgs::None) }.unwrap();
//! assert_eq!(measured, 12);
//! assert!(shape.slot_imp(DTOR_SLOT).is_some()); // blank fill, still callable
//! unsafe { ferric::delete(obj) };
//! ```

pub mod error;
pub mod hooks;
pub mod runtime;

// Re-export commonly used types
pub use error::{Error, Result};
pub use hooks::{FatalFn, Hooks, ReportFn};
pub use runtime::{
    DTOR_SLOT, Descriptor, Imp, InitHook, ObjPtr, Runtime, SlotArgs,
    TypeDecl, TypeRelation, call, delete, finalize,
};
