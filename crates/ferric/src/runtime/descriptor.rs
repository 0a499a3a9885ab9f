//! Type descriptors and lazy dispatch-table resolution.
//!
//! A descriptor is the runtime metadata node for one type: its instance
//! size, its place in the single-inheritance chain, and its dispatch
//! table. Descriptors live in the owning [`crate::Runtime`]'s metadata
//! pool and never move; [`Descriptor`] is the cheap handle that code
//! passes around.
//!
//! # Resolution
//!
//! A descriptor's dispatch table starts with every slot unset and is
//! resolved lazily, once, the first time an instance of the type (or of a
//! subtype) is created. Resolution inherits unset slots from the
//! supertype, lets the type install its own overrides through its init
//! hook, and then backfills what is still unset: the destructor slot with
//! a blank no-op, everything else with a sentinel that reports through
//! the fatal hook when called. After resolution every slot holds a
//! callable; dispatch never reads an empty slot.
//!
//! # Concurrency
//!
//! Strictly single-threaded, like the rest of the runtime: the resolved
//! latch and the table cells are `Cell`s, not atomics, and nothing locks.

use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::runtime::dispatch::{DTOR_SLOT, Imp, empty_dtor, unimplemented_slot};
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

/// Hook invoked once during resolution so a type can install its own
/// dispatch overrides. It must only set slots, never clear inherited
/// ones. [`Descriptor::set_slot`] offers nothing else.
pub type InitHook = fn(&Descriptor);

/// Descriptor data, allocated in the runtime's metadata pool.
///
/// Pool teardown frees without running drops, so every field is either
/// plain data or points back into the same pool (name bytes, table
/// cells).
#[repr(C)]
pub(crate) struct DescriptorInner {
    /// Immediate supertype, or `None` for a root type. Non-owning: both
    /// ends live in the same metadata pool.
    pub(crate) super_: Option<NonNull<DescriptorInner>>,
    /// Byte size of an instance of this exact type.
    pub(crate) instance_size: usize,
    /// Dispatch slots defined by this type and all ancestors combined.
    pub(crate) slot_count: usize,
    /// Set exactly once, when resolution completes.
    pub(crate) resolved: Cell<bool>,
    /// Diagnostic label, duplicated into the metadata pool.
    pub(crate) name: NonNull<u8>,
    pub(crate) name_len: usize,
    /// Override installer, invoked once during resolution.
    pub(crate) init_hook: Option<InitHook>,
    /// `slot_count` dispatch cells in the metadata pool. Pool memory is
    /// zero-filled and `Option<Imp>` is null-niched, so a fresh table is
    /// already all-unset.
    pub(crate) table: NonNull<Cell<Option<Imp>>>,
    /// Copy of the owning runtime's reporters, so the sentinel path can
    /// reach the fatal hook with nothing but a receiver in hand.
    pub(crate) hooks: Hooks,
}

/// Handle to a type descriptor.
///
/// Handles are cheap to clone and compare by identity; two handles are
/// equal exactly when they name the same registered type. A handle is
/// valid for as long as the [`crate::Runtime`] that registered it.
///
/// # Example
///
/// ```
/// use ferric::{Runtime, TypeDecl, TypeRelation};
///
/// let mut rt = Runtime::new();
/// let root = rt
///     .register(TypeDecl {
///         name: "Shape",
///         super_type: None,
///         instance_size: 24,
///         slot_count: 2,
///         init_hook: None,
///     })
///     .unwrap();
/// let circle = rt
///     .register(TypeDecl {
///         name: "Circle",
///         super_type: Some(&root),
///         instance_size: 32,
///         slot_count: 2,
///         init_hook: None,
///     })
///     .unwrap();
///
/// assert_eq!(circle.relation_to(&root), TypeRelation::Ancestor);
/// assert!(circle.is_strict_subtype_of(&root));
/// ```
pub struct Descriptor {
    /// Pointer into the runtime's metadata pool. Never null; valid while
    /// the runtime lives.
    pub(crate) inner: NonNull<DescriptorInner>,
}

impl Descriptor {
    /// Borrows the descriptor data.
    fn inner(&self) -> &DescriptorInner {
        // SAFETY: `inner` points into the metadata pool, which outlives
        // every handle under the runtime-lifetime contract, and nothing
        // ever moves or frees an individual descriptor.
        unsafe { self.inner.as_ref() }
    }

    /// Borrows the dispatch table as a cell slice.
    fn table(&self) -> &[Cell<Option<Imp>>] {
        let inner = self.inner();
        // SAFETY: `table` points at `slot_count` pool-resident cells,
        // allocated together at registration and never freed or moved.
        unsafe {
            std::slice::from_raw_parts(inner.table.as_ptr(), inner.slot_count)
        }
    }

    /// Returns the type's diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        let inner = self.inner();
        // SAFETY: the bytes were duplicated from a `&str` at registration
        // and are immutable afterwards.
        unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(
                inner.name.as_ptr(),
                inner.name_len,
            ))
        }
    }

    /// Returns the byte size of an instance of this exact type.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.inner().instance_size
    }

    /// Returns the number of dispatch slots, own and inherited combined.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.inner().slot_count
    }

    /// Whether the dispatch table has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner().resolved.get()
    }

    /// Returns the immediate supertype, or `None` for a root type.
    #[must_use]
    pub fn super_type(&self) -> Option<Descriptor> {
        self.inner().super_.map(|inner| Descriptor { inner })
    }

    pub(crate) fn hooks(&self) -> Hooks {
        self.inner().hooks
    }

    /// Reads a dispatch slot. `None` both for an out-of-range index and
    /// for a slot that is still unset (only possible before resolution).
    #[must_use]
    pub fn slot_imp(&self, slot: usize) -> Option<Imp> {
        self.table().get(slot)?.get()
    }

    /// Installs an implementation into a dispatch slot.
    ///
    /// Setting is the only operation offered: inherited entries can be
    /// overridden but never cleared back to unset. Usable both before
    /// resolution (pre-seeding) and from an init hook (overriding).
    ///
    /// # Errors
    ///
    /// [`Error::SlotOutOfRange`] if `slot` is not within the table.
    pub fn set_slot(&self, slot: usize, imp: Imp) -> Result<()> {
        let table = self.table();
        let cell = table.get(slot).ok_or(Error::SlotOutOfRange {
            slot,
            count: table.len(),
        })?;
        cell.set(Some(imp));
        Ok(())
    }

    /// Whether the resolved destructor slot holds a real destructor
    /// rather than the blank no-op fill.
    #[must_use]
    pub fn has_destructor(&self) -> bool {
        self.slot_imp(DTOR_SLOT)
            .is_some_and(|imp| imp != empty_dtor as Imp)
    }

    /// Resolves the dispatch table.
    ///
    /// Safe to call redundantly: once `resolved` is set the call is a
    /// no-op. Otherwise the supertype is resolved first (recursively,
    /// bounded by the chain length), each supertype slot is copied into
    /// this table where this type left it unset, the init hook installs
    /// the type's own overrides, and every slot still unset is backfilled:
    /// the destructor slot with the blank no-op so destruction is always
    /// safe, every other slot with the fatal-reporting sentinel.
    ///
    /// Instance-creation paths call this automatically; calling it
    /// directly is only needed to force eager resolution.
    pub fn resolve(&self) {
        let inner = self.inner();
        if inner.resolved.get() {
            return;
        }
        let table = self.table();
        if let Some(sup) = self.super_type() {
            if !sup.is_resolved() {
                sup.resolve();
            }
            let sup_table = sup.table();
            for (cell, sup_cell) in table.iter().zip(sup_table.iter()) {
                if cell.get().is_none() {
                    cell.set(sup_cell.get());
                }
            }
        }
        if let Some(hook) = inner.init_hook {
            hook(self);
        }
        for (slot, cell) in table.iter().enumerate() {
            if cell.get().is_none() {
                cell.set(Some(if slot == DTOR_SLOT {
                    empty_dtor as Imp
                } else {
                    unimplemented_slot as Imp
                }));
            }
        }
        inner.resolved.set(true);
        ferric_log::debug!("resolved dispatch table for {}", self.name());
    }

    /// Relates this type to `other`.
    ///
    /// [`TypeRelation::Same`] if the handles name one type,
    /// [`TypeRelation::Ancestor`] if `other` appears somewhere in this
    /// type's ancestor chain, [`TypeRelation::Unrelated`] otherwise.
    /// Walks the supertype links; cost is bounded by the chain length.
    #[must_use]
    pub fn relation_to(&self, other: &Descriptor) -> TypeRelation {
        if self == other {
            return TypeRelation::Same;
        }
        let mut current = self.super_type();
        while let Some(ancestor) = current {
            if &ancestor == other {
                return TypeRelation::Ancestor;
            }
            current = ancestor.super_type();
        }
        TypeRelation::Unrelated
    }

    /// Whether this type is `other` or descends from it.
    #[must_use]
    pub fn is_subtype_of(&self, other: &Descriptor) -> bool {
        self.relation_to(other) != TypeRelation::Unrelated
    }

    /// Whether this type strictly descends from `other`.
    #[must_use]
    pub fn is_strict_subtype_of(&self, other: &Descriptor) -> bool {
        self.relation_to(other) == TypeRelation::Ancestor
    }
}

impl Clone for Descriptor {
    fn clone(&self) -> Self {
        Descriptor { inner: self.inner }
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        // Identity: the registry hands out one descriptor per name.
        std::ptr::eq(self.inner.as_ptr(), other.inner.as_ptr())
    }
}

impl Eq for Descriptor {}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let super_name = self.super_type().map(|s| s.name().to_string());
        f.debug_struct("Descriptor")
            .field("name", &self.name())
            .field("super", &super_name)
            .field("instance_size", &self.instance_size())
            .field("slot_count", &self.slot_count())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Outcome of a type relationship query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRelation {
    /// The two handles name the same type.
    Same,
    /// The queried type appears in the subject's ancestor chain.
    Ancestor,
    /// Neither of the above.
    Unrelated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, TypeDecl};

    fn decl<'a>(name: &'a str, super_type: Option<&'a Descriptor>) -> TypeDecl<'a> {
        TypeDecl {
            name,
            super_type,
            instance_size: 32,
            slot_count: 3,
            init_hook: None,
        }
    }

    unsafe extern "C-unwind" fn probe_imp(
        _receiver: crate::runtime::object::ObjPtr,
        _slot: usize,
        _args: *const *mut u8,
        _ret: *mut u8,
    ) {
    }

    #[test]
    fn test_descriptor_accessors() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("Accessors", None)).unwrap();

        assert_eq!(desc.name(), "Accessors");
        assert_eq!(desc.instance_size(), 32);
        assert_eq!(desc.slot_count(), 3);
        assert!(!desc.is_resolved());
        assert!(desc.super_type().is_none());
    }

    #[test]
    fn test_fresh_table_is_unset() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("Unset", None)).unwrap();

        for slot in 0..3 {
            assert_eq!(desc.slot_imp(slot), None);
        }
        assert_eq!(desc.slot_imp(3), None);
    }

    #[test]
    fn test_set_slot_bounds() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("Bounds", None)).unwrap();

        desc.set_slot(2, probe_imp).unwrap();
        assert!(desc.slot_imp(2).is_some());
        assert_eq!(
            desc.set_slot(3, probe_imp),
            Err(Error::SlotOutOfRange { slot: 3, count: 3 })
        );
    }

    #[test]
    fn test_resolution_fills_every_slot() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("FillAll", None)).unwrap();

        desc.resolve();
        assert!(desc.is_resolved());
        for slot in 0..3 {
            assert!(desc.slot_imp(slot).is_some());
        }
        // Slot 0 gets the blank destructor, not the sentinel.
        assert!(!desc.has_destructor());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("Idem", None)).unwrap();

        desc.resolve();
        let first: Vec<_> = (0..3).map(|s| desc.slot_imp(s)).collect();
        desc.resolve();
        let second: Vec<_> = (0..3).map(|s| desc.slot_imp(s)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolution_resolves_supertype_first() {
        let mut rt = Runtime::new();
        let root = rt.register(decl("ChainRoot", None)).unwrap();
        let leaf = rt.register(decl("ChainLeaf", Some(&root))).unwrap();

        leaf.resolve();
        assert!(root.is_resolved());
    }

    #[test]
    fn test_subtype_inherits_unset_slots() {
        let mut rt = Runtime::new();
        let root = rt.register(decl("InheritRoot", None)).unwrap();
        root.set_slot(1, probe_imp).unwrap();
        let leaf = rt.register(decl("InheritLeaf", Some(&root))).unwrap();

        leaf.resolve();
        assert_eq!(leaf.slot_imp(1), Some(probe_imp as Imp));
    }

    #[test]
    fn test_init_hook_overrides_inherited_slot() {
        unsafe extern "C-unwind" fn override_imp(
            _receiver: crate::runtime::object::ObjPtr,
            _slot: usize,
            _args: *const *mut u8,
            _ret: *mut u8,
        ) {
        }

        fn install(desc: &Descriptor) {
            desc.set_slot(1, override_imp).unwrap();
        }

        let mut rt = Runtime::new();
        let root = rt.register(decl("HookRoot", None)).unwrap();
        root.set_slot(1, probe_imp).unwrap();

        let leaf = rt
            .register(TypeDecl {
                init_hook: Some(install),
                ..decl("HookLeaf", Some(&root))
            })
            .unwrap();

        leaf.resolve();
        assert_eq!(leaf.slot_imp(1), Some(override_imp as Imp));
        // The root keeps its own entry.
        root.resolve();
        assert_eq!(root.slot_imp(1), Some(probe_imp as Imp));
    }

    #[test]
    fn test_relation_matrix() {
        let mut rt = Runtime::new();
        let root = rt.register(decl("RelRoot", None)).unwrap();
        let mid = rt.register(decl("RelMid", Some(&root))).unwrap();
        let leaf = rt.register(decl("RelLeaf", Some(&mid))).unwrap();
        let stranger = rt.register(decl("RelStranger", None)).unwrap();

        assert_eq!(leaf.relation_to(&root), TypeRelation::Ancestor);
        assert_eq!(leaf.relation_to(&mid), TypeRelation::Ancestor);
        assert_eq!(root.relation_to(&leaf), TypeRelation::Unrelated);
        assert_eq!(mid.relation_to(&mid), TypeRelation::Same);
        assert_eq!(leaf.relation_to(&stranger), TypeRelation::Unrelated);
    }

    #[test]
    fn test_subtype_predicates() {
        let mut rt = Runtime::new();
        let root = rt.register(decl("PredRoot", None)).unwrap();
        let leaf = rt.register(decl("PredLeaf", Some(&root))).unwrap();

        assert!(leaf.is_subtype_of(&root));
        assert!(leaf.is_subtype_of(&leaf));
        assert!(leaf.is_strict_subtype_of(&root));
        assert!(!leaf.is_strict_subtype_of(&leaf));
        assert!(!root.is_subtype_of(&leaf));
    }

    #[test]
    fn test_descriptor_identity_equality() {
        let mut rt = Runtime::new();
        let a = rt.register(decl("IdentA", None)).unwrap();
        let b = rt.register(decl("IdentB", None)).unwrap();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_descriptor_debug() {
        let mut rt = Runtime::new();
        let root = rt.register(decl("DebugRoot", None)).unwrap();
        let leaf = rt.register(decl("DebugLeaf", Some(&root))).unwrap();

        let rendered = format!("{leaf:?}");
        assert!(rendered.contains("DebugLeaf"));
        assert!(rendered.contains("DebugRoot"));
    }
}
