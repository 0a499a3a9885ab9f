//! Instance allocation and lifecycle.
//!
//! An instance is an opaque memory block whose first word is a reference
//! to its type descriptor. Creation zero-fills a block of the type's
//! instance size, resolves the descriptor if needed, and tags the block;
//! destruction invokes the destructor slot and then either releases the
//! block or clears the tag so the block can be reused.
//!
//! Three creation paths exist:
//!
//! - [`Descriptor::construct`]: a fresh heap block the caller owns and
//!   must release through [`delete`] (or [`finalize`] plus a manual
//!   release)
//! - [`Descriptor::construct_into`]: zero and reuse a caller-supplied
//!   block, e.g. one that was just finalized
//! - [`Descriptor::construct_in`]: a pool-owned block; if the type has a
//!   real destructor it is registered with the pool and runs at pool
//!   teardown, so the caller never releases anything
//!
//! Pool-owned instances must never go through [`delete`]; the pool owns
//! their release. That misuse is undefined by contract and is not
//! checked here.

use crate::error::{Error, Result};
use crate::runtime::descriptor::{Descriptor, DescriptorInner};
use crate::runtime::dispatch::DTOR_SLOT;
use ferric_mem::Pool;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Leading field of every instance block: the type reference. A zeroed
/// header is the "no type" sentinel left behind by [`finalize`].
#[repr(C)]
struct Header {
    desc: Option<NonNull<DescriptorInner>>,
}

/// Instance blocks are pointer-aligned; pool and heap paths both
/// guarantee it, `construct_into` callers must.
const INSTANCE_ALIGN: usize = align_of::<Header>();

/// Handle to an instance block.
///
/// `ObjPtr` is a plain non-null pointer wrapper: copying it copies the
/// handle, never the instance. The handle stays usable after
/// [`finalize`]: the block is then untyped and dispatch on it fails
/// with a checked error until it is re-adopted by `construct_into`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ObjPtr {
    raw: NonNull<u8>,
}

impl ObjPtr {
    /// Wraps a raw instance pointer.
    ///
    /// # Safety
    ///
    /// `raw` must point at a block produced by one of the creation paths
    /// (or a compatible caller-managed block) that is still allocated.
    #[must_use]
    pub unsafe fn from_raw(raw: NonNull<u8>) -> Self {
        ObjPtr { raw }
    }

    /// The raw block pointer.
    #[must_use]
    pub fn as_ptr(self) -> *mut u8 {
        self.raw.as_ptr()
    }

    pub(crate) fn raw(self) -> NonNull<u8> {
        self.raw
    }

    /// Returns the instance's descriptor, or `None` for a finalized
    /// (untyped) block.
    #[must_use]
    pub fn descriptor(self) -> Option<Descriptor> {
        // SAFETY: the handle points at a live block per `from_raw`'s
        // contract, and every block starts with a `Header`.
        let header = unsafe { self.raw.cast::<Header>().as_ptr().read() };
        header.desc.map(|inner| Descriptor { inner })
    }

    /// Whether this instance is of the given type or of a subtype.
    ///
    /// A finalized block is an instance of nothing.
    #[must_use]
    pub fn is_instance_of(self, desc: &Descriptor) -> bool {
        self.descriptor()
            .is_some_and(|own| own.is_subtype_of(desc))
    }

    fn set_descriptor(self, desc: Option<NonNull<DescriptorInner>>) {
        // SAFETY: same block validity argument as `descriptor`; the
        // header is plain data, so an overwrite is all it takes.
        unsafe {
            self.raw.cast::<Header>().as_ptr().write(Header { desc });
        }
    }
}

impl fmt::Debug for ObjPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_name = self.descriptor().map(|d| d.name().to_string());
        f.debug_struct("ObjPtr")
            .field("addr", &self.raw.as_ptr())
            .field("type", &type_name)
            .finish()
    }
}

impl Descriptor {
    /// Creates an instance in a fresh heap block.
    ///
    /// The block is zero-filled, the descriptor is resolved if it was
    /// not yet, and the type reference is set. The caller owns the block
    /// and releases it with [`delete`].
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the system allocator fails.
    pub fn construct(&self) -> Result<ObjPtr> {
        self.resolve();
        let layout = instance_layout(self.instance_size())?;
        // SAFETY: `layout` has non-zero size; registration rejects
        // sizes below the header size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let raw = NonNull::new(raw).ok_or(Error::OutOfMemory)?;
        // SAFETY: freshly allocated block of `instance_size` bytes.
        let obj = unsafe { ObjPtr::from_raw(raw) };
        obj.set_descriptor(Some(self.inner));
        Ok(obj)
    }

    /// Creates an instance by reusing a caller-supplied block.
    ///
    /// The block is zero-filled up to the type's instance size, then
    /// tagged. Useful for re-constructing into a block that was just
    /// finalized, and for caller-managed storage.
    ///
    /// # Safety
    ///
    /// `mem` must be valid for writes of at least
    /// [`Descriptor::instance_size`] bytes, pointer-aligned, and not
    /// currently hold a live instance.
    #[must_use]
    pub unsafe fn construct_into(&self, mem: NonNull<u8>) -> ObjPtr {
        self.resolve();
        debug_assert_eq!(mem.as_ptr().addr() % INSTANCE_ALIGN, 0);
        // SAFETY: caller guarantees the block covers `instance_size`.
        unsafe {
            std::ptr::write_bytes(mem.as_ptr(), 0, self.instance_size());
        }
        // SAFETY: just zeroed, caller-owned block.
        let obj = unsafe { ObjPtr::from_raw(mem) };
        obj.set_descriptor(Some(self.inner));
        obj
    }

    /// Creates an instance inside a pool.
    ///
    /// The pool owns the block; there is nothing to release. If the
    /// type's resolved destructor is a real one (not the blank no-op), a
    /// cleanup pair is registered so it runs automatically at pool
    /// teardown, in LIFO order with every other registered cleanup.
    ///
    /// # Errors
    ///
    /// Pool allocation failures, both for the instance block and for the
    /// cleanup registration.
    pub fn construct_in(&self, pool: &mut Pool) -> Result<ObjPtr> {
        self.resolve();
        let mem = pool.alloc(self.instance_size())?;
        // SAFETY: fresh zero-filled pool block of `instance_size` bytes.
        let obj = unsafe { ObjPtr::from_raw(mem) };
        obj.set_descriptor(Some(self.inner));
        if self.has_destructor() {
            pool.register_dtor(dtor_trampoline, mem.as_ptr())?;
        }
        Ok(obj)
    }
}

/// Heap layout for an instance block of `size` bytes.
fn instance_layout(size: usize) -> Result<Layout> {
    Layout::from_size_align(size, INSTANCE_ALIGN)
        .map_err(|_| Error::SizeOverflow { size })
}

/// Invokes the instance's destructor slot, if it has a type.
unsafe fn run_dtor(obj: ObjPtr) {
    if let Some(desc) = obj.descriptor()
        && let Some(imp) = desc.slot_imp(DTOR_SLOT)
    {
        // SAFETY: destructor implementations take no arguments and
        // produce nothing, so null args/ret are the calling convention.
        unsafe {
            imp(obj, DTOR_SLOT, std::ptr::null(), std::ptr::null_mut());
        }
    }
}

/// Pool-cleanup shim: re-wraps the registered block and runs its
/// destructor slot.
unsafe fn dtor_trampoline(raw: *mut u8) {
    // SAFETY: registered with the instance block's pointer, which the
    // pool keeps alive until after all cleanups ran.
    let obj = unsafe { ObjPtr::from_raw(NonNull::new_unchecked(raw)) };
    unsafe { run_dtor(obj) };
}

/// Destroys a heap instance: destructor slot first, then the block.
///
/// Only for instances made by [`Descriptor::construct`]. Pool-owned
/// instances are torn down by their pool; caller-supplied blocks are
/// released by whoever supplied them (use [`finalize`] for those).
///
/// # Safety
///
/// `obj` must be a live heap instance, and no handle to it may be used
/// afterwards.
pub unsafe fn delete(obj: ObjPtr) {
    let Some(desc) = obj.descriptor() else {
        // Untyped block: size unknown, so the memory cannot be released
        // here. Double-destruction lands here under the misuse contract.
        debug_assert!(false, "delete on an untyped block");
        return;
    };
    let size = desc.instance_size();
    unsafe { run_dtor(obj) };
    match instance_layout(size) {
        Ok(layout) => {
            // SAFETY: the block came from `alloc_zeroed` with this exact
            // layout, per the `construct` contract.
            unsafe { alloc::dealloc(obj.as_ptr(), layout) };
        }
        Err(_) => {
            // Unreachable for a block that was successfully constructed.
            (desc.hooks().error)("instance layout no longer computable");
        }
    }
}

/// Finalizes an instance in place: destructor slot first, then the type
/// reference is cleared to the "no type" sentinel. The block itself
/// stays allocated and can be re-constructed into or released by its
/// owner.
///
/// # Safety
///
/// `obj` must be a live instance that has not already been finalized.
pub unsafe fn finalize(obj: ObjPtr) {
    unsafe { run_dtor(obj) };
    obj.set_descriptor(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatch::Imp;
    use crate::runtime::{Runtime, TypeDecl};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Declares a destructor implementation bound to its own counter, so
    /// parallel tests never observe each other's increments.
    macro_rules! counting_dtor {
        ($counter:ident, $imp:ident) => {
            static $counter: AtomicUsize = AtomicUsize::new(0);

            unsafe extern "C-unwind" fn $imp(
                _receiver: ObjPtr,
                _slot: usize,
                _args: *const *mut u8,
                _ret: *mut u8,
            ) {
                $counter.fetch_add(1, Ordering::SeqCst);
            }
        };
    }

    fn plain_type(rt: &mut Runtime, name: &str) -> Descriptor {
        rt.register(TypeDecl {
            name,
            super_type: None,
            instance_size: 24,
            slot_count: 2,
            init_hook: None,
        })
        .unwrap()
    }

    #[test]
    fn test_construct_resolves_and_tags() {
        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjTag");
        assert!(!desc.is_resolved());

        let obj = desc.construct().unwrap();
        assert!(desc.is_resolved());
        assert_eq!(obj.descriptor().unwrap(), desc);
        unsafe { delete(obj) };
    }

    #[test]
    fn test_construct_zero_fills_payload() {
        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjZero");

        let obj = desc.construct().unwrap();
        // SAFETY: 24-byte instance, payload follows the header word.
        let payload = unsafe {
            std::slice::from_raw_parts(
                obj.as_ptr().add(size_of::<Header>()),
                24 - size_of::<Header>(),
            )
        };
        assert!(payload.iter().all(|&b| b == 0));
        unsafe { delete(obj) };
    }

    #[test]
    fn test_delete_runs_destructor_once() {
        counting_dtor!(DELETE_HITS, delete_probe_dtor);

        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjDelete");
        desc.set_slot(DTOR_SLOT, delete_probe_dtor).unwrap();

        let obj = desc.construct().unwrap();
        unsafe { delete(obj) };
        assert_eq!(DELETE_HITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finalize_clears_type_reference() {
        counting_dtor!(FINALIZE_HITS, finalize_probe_dtor);

        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjFinalize");
        desc.set_slot(DTOR_SLOT, finalize_probe_dtor).unwrap();

        let obj = desc.construct().unwrap();
        unsafe { finalize(obj) };
        assert_eq!(FINALIZE_HITS.load(Ordering::SeqCst), 1);
        assert!(obj.descriptor().is_none());
        assert!(!obj.is_instance_of(&desc));

        // Block is still ours; re-adopt to release it cleanly.
        let obj = unsafe { desc.construct_into(obj.raw()) };
        unsafe { delete(obj) };
    }

    #[test]
    fn test_finalize_then_reconstruct_round_trip() {
        unsafe extern "C-unwind" fn tag_imp(
            receiver: ObjPtr,
            _slot: usize,
            _args: *const *mut u8,
            ret: *mut u8,
        ) {
            // Report the first payload byte.
            // SAFETY: instances of this test type are 24 bytes.
            let byte = unsafe { receiver.as_ptr().add(size_of::<Header>()).read() };
            // SAFETY: caller-provided return buffer.
            unsafe {
                std::ptr::write_unaligned(ret.cast::<usize>(), byte as usize);
            }
        }

        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjRoundTrip");
        desc.set_slot(1, tag_imp).unwrap();

        let fresh = desc.construct().unwrap();
        let fresh_probe =
            unsafe { crate::runtime::dispatch::call(fresh, 1, &crate::SlotArgs::None) }
                .unwrap();

        // Dirty the payload, finalize, re-construct into the same block.
        unsafe { fresh.as_ptr().add(size_of::<Header>()).write(0xAB) };
        unsafe { finalize(fresh) };
        let reused = unsafe { desc.construct_into(fresh.raw()) };

        assert_eq!(reused.descriptor().unwrap(), desc);
        let reused_probe =
            unsafe { crate::runtime::dispatch::call(reused, 1, &crate::SlotArgs::None) }
                .unwrap();
        // Behaves like a fresh instance: payload zeroed again.
        assert_eq!(reused_probe, fresh_probe);
        assert_eq!(reused_probe, 0);

        unsafe { delete(reused) };
    }

    #[test]
    fn test_construct_in_pool_registers_real_dtor() {
        counting_dtor!(POOLED_HITS, pooled_probe_dtor);

        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjPooled");
        desc.set_slot(DTOR_SLOT, pooled_probe_dtor).unwrap();

        {
            let mut pool = Pool::new(1024);
            let obj = desc.construct_in(&mut pool).unwrap();
            assert!(obj.is_instance_of(&desc));
            assert_eq!(POOLED_HITS.load(Ordering::SeqCst), 0);
        }
        // Pool teardown ran the destructor exactly once.
        assert_eq!(POOLED_HITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_construct_in_pool_skips_blank_dtor() {
        let mut rt = Runtime::new();
        let desc = plain_type(&mut rt, "ObjPooledBlank");

        let mut pool = Pool::new(1024);
        let obj = desc.construct_in(&mut pool).unwrap();
        assert!(obj.descriptor().is_some());
        // The blank fill does not count as a destructor, so nothing was
        // registered with the pool.
        assert!(!desc.has_destructor());
    }

    #[test]
    fn test_is_instance_of_subtype() {
        let mut rt = Runtime::new();
        let root = plain_type(&mut rt, "ObjKindRoot");
        let leaf = rt
            .register(TypeDecl {
                name: "ObjKindLeaf",
                super_type: Some(&root),
                instance_size: 24,
                slot_count: 2,
                init_hook: None,
            })
            .unwrap();
        let stranger = plain_type(&mut rt, "ObjKindStranger");

        let obj = leaf.construct().unwrap();
        assert!(obj.is_instance_of(&leaf));
        assert!(obj.is_instance_of(&root));
        assert!(!obj.is_instance_of(&stranger));
        unsafe { delete(obj) };
    }

    #[test]
    fn test_inherited_destructor_is_real() {
        counting_dtor!(INHERIT_HITS, inherit_probe_dtor);

        let mut rt = Runtime::new();
        let root = plain_type(&mut rt, "ObjInheritDtorRoot");
        root.set_slot(DTOR_SLOT, inherit_probe_dtor).unwrap();
        let leaf = rt
            .register(TypeDecl {
                name: "ObjInheritDtorLeaf",
                super_type: Some(&root),
                instance_size: 24,
                slot_count: 2,
                init_hook: None,
            })
            .unwrap();

        leaf.resolve();
        assert!(leaf.has_destructor());
        assert_eq!(leaf.slot_imp(DTOR_SLOT), Some(inherit_probe_dtor as Imp));
    }
}
