//! The `ferric` runtime: type registration, dispatch, and instances.
//!
//! The runtime is organized into a few modules:
//!
//! - [`descriptor`]: type metadata nodes, lazy dispatch resolution, and
//!   type relationship queries
//! - [`dispatch`]: the uniform slot-call machinery and its fills
//! - [`object`]: instance allocation, destruction, and in-place reuse
//!
//! [`Runtime`] ties them together: it owns the metadata pool descriptors
//! live in, the name registry, and the injected diagnostic hooks. There
//! is no global runtime; embedders create one and thread it through,
//! which also keeps the reporters swappable per runtime rather than per
//! process.

pub mod descriptor;
pub mod dispatch;
pub mod object;

pub use descriptor::{Descriptor, InitHook, TypeRelation};
pub use dispatch::{DTOR_SLOT, Imp, SlotArgs, call};
pub use object::{ObjPtr, delete, finalize};

use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::runtime::descriptor::DescriptorInner;
use ferric_mem::Pool;
use fxhash::FxHashMap;
use std::cell::Cell;
use std::ptr::NonNull;

/// Initial block hint for the metadata pool. Descriptors and their
/// tables are small; one block covers dozens of types before growing.
const METADATA_POOL_HINT: usize = 4096;

/// Declaration input for [`Runtime::register`].
///
/// The declaration scaffolding that produces these values (macros, code
/// generation, hand-written constructors) is the caller's business; the
/// runtime only checks what it cannot afford to trust.
#[derive(Clone, Copy)]
pub struct TypeDecl<'a> {
    /// Unique type name, used for lookup and diagnostics.
    pub name: &'a str,
    /// Immediate supertype, or `None` for a root type.
    pub super_type: Option<&'a Descriptor>,
    /// Byte size of an instance of this exact type, including the
    /// leading type reference.
    pub instance_size: usize,
    /// Dispatch slots defined by this type and all ancestors combined.
    pub slot_count: usize,
    /// Optional override installer, invoked once during resolution.
    pub init_hook: Option<InitHook>,
}

/// A type registry plus the memory its metadata lives in.
///
/// Descriptors registered here stay valid (and pinned) until the runtime
/// is dropped; handles must not outlive it. Everything is
/// single-threaded; callers that share a runtime across threads of
/// control must serialize access themselves.
///
/// # Example
///
/// ```
/// use ferric::{Runtime, TypeDecl};
///
/// let mut rt = Runtime::new();
/// let desc = rt
///     .register(TypeDecl {
///         name: "Widget",
///         super_type: None,
///         instance_size: 40,
///         slot_count: 4,
///         init_hook: None,
///     })
///     .unwrap();
///
/// let obj = desc.construct().unwrap();
/// assert!(obj.is_instance_of(&desc));
/// unsafe { ferric::delete(obj) };
/// ```
pub struct Runtime {
    /// Backing storage for descriptor nodes, their tables, and their
    /// name bytes. No cleanups are ever registered here; descriptors
    /// are plain data.
    metadata: Pool,
    /// Name-keyed registry; one descriptor per name.
    types: FxHashMap<Box<str>, Descriptor>,
    /// Reporters handed to every descriptor registered here.
    hooks: Hooks,
}

impl Runtime {
    /// Creates a runtime with the default reporters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hooks(Hooks::default())
    }

    /// Creates a runtime with caller-supplied reporters.
    #[must_use]
    pub fn with_hooks(hooks: Hooks) -> Self {
        Runtime {
            metadata: Pool::new(METADATA_POOL_HINT),
            types: FxHashMap::default(),
            hooks,
        }
    }

    /// Registers a type and returns its descriptor.
    ///
    /// The descriptor starts unresolved; its dispatch table is resolved
    /// lazily by the first instance creation (or an explicit
    /// [`Descriptor::resolve`]). The ancestor chain is acyclic by
    /// construction: a supertype handle can only come from an earlier
    /// registration.
    ///
    /// # Errors
    ///
    /// [`Error::TypeExists`] for a duplicate name,
    /// [`Error::InstanceSizeTooSmall`] if the declared size cannot hold
    /// the type tag, [`Error::SlotCountTooSmall`] if a subtype declares
    /// fewer slots than it inherits, plus pool allocation failures.
    pub fn register(&mut self, decl: TypeDecl<'_>) -> Result<Descriptor> {
        if self.types.contains_key(decl.name) {
            return Err(Error::TypeExists);
        }
        let min_size = size_of::<Option<NonNull<DescriptorInner>>>();
        if decl.instance_size < min_size {
            return Err(Error::InstanceSizeTooSmall {
                size: decl.instance_size,
                min: min_size,
            });
        }
        if let Some(sup) = decl.super_type
            && decl.slot_count < sup.slot_count()
        {
            return Err(Error::SlotCountTooSmall {
                declared: decl.slot_count,
                inherited: sup.slot_count(),
            });
        }

        let name = self.metadata.alloc_dup(decl.name.as_bytes())?;
        let table_bytes = decl
            .slot_count
            .checked_mul(size_of::<Cell<Option<Imp>>>())
            .ok_or(Error::SizeOverflow {
                size: decl.slot_count,
            })?;
        // Pool memory is zero-filled, which for a table of null-niched
        // cells means every slot starts unset.
        let table = self.metadata.alloc(table_bytes)?.cast::<Cell<Option<Imp>>>();

        let inner = DescriptorInner {
            super_: decl.super_type.map(|sup| sup.inner),
            instance_size: decl.instance_size,
            slot_count: decl.slot_count,
            resolved: Cell::new(false),
            name,
            name_len: decl.name.len(),
            init_hook: decl.init_hook,
            table,
            hooks: self.hooks,
        };
        let inner_ptr = self
            .metadata
            .alloc(size_of::<DescriptorInner>())?
            .cast::<DescriptorInner>();
        // SAFETY: fresh pool allocation of the right size; pointer-width
        // pool alignment covers every field.
        unsafe {
            inner_ptr.as_ptr().write(inner);
        }

        let desc = Descriptor { inner: inner_ptr };
        self.types.insert(decl.name.into(), desc.clone());
        ferric_log::debug!(
            "registered type {} ({} bytes, {} slots)",
            decl.name,
            decl.instance_size,
            decl.slot_count
        );
        Ok(desc)
    }

    /// Looks up a registered type by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Descriptor> {
        self.types.get(name).cloned()
    }

    /// Number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// The reporters this runtime injects into descriptors.
    #[must_use]
    pub fn hooks(&self) -> Hooks {
        self.hooks
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.types.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str) -> TypeDecl<'_> {
        TypeDecl {
            name,
            super_type: None,
            instance_size: 16,
            slot_count: 1,
            init_hook: None,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut rt = Runtime::new();
        let desc = rt.register(decl("RegLookup")).unwrap();

        assert_eq!(rt.lookup("RegLookup"), Some(desc));
        assert_eq!(rt.lookup("Missing"), None);
        assert_eq!(rt.type_count(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut rt = Runtime::new();
        rt.register(decl("RegDup")).unwrap();

        assert_eq!(rt.register(decl("RegDup")), Err(Error::TypeExists));
        assert_eq!(rt.type_count(), 1);
    }

    #[test]
    fn test_undersized_instance_rejected() {
        let mut rt = Runtime::new();
        let result = rt.register(TypeDecl {
            instance_size: 4,
            ..decl("RegTiny")
        });

        assert!(matches!(
            result,
            Err(Error::InstanceSizeTooSmall { size: 4, .. })
        ));
    }

    #[test]
    fn test_shrinking_slot_count_rejected() {
        let mut rt = Runtime::new();
        let root = rt
            .register(TypeDecl {
                slot_count: 4,
                ..decl("RegWideRoot")
            })
            .unwrap();

        let result = rt.register(TypeDecl {
            super_type: Some(&root),
            slot_count: 2,
            ..decl("RegNarrowLeaf")
        });
        assert_eq!(
            result,
            Err(Error::SlotCountTooSmall {
                declared: 2,
                inherited: 4
            })
        );
    }

    #[test]
    fn test_zero_slot_root_type() {
        let mut rt = Runtime::new();
        let desc = rt
            .register(TypeDecl {
                slot_count: 0,
                ..decl("RegZeroSlots")
            })
            .unwrap();

        desc.resolve();
        assert!(desc.is_resolved());
        assert!(!desc.has_destructor());
    }

    #[test]
    fn test_many_types_share_the_metadata_pool() {
        let mut rt = Runtime::new();
        let names: Vec<String> =
            (0..100).map(|i| format!("RegBulk{i}")).collect();
        for name in &names {
            rt.register(decl(name)).unwrap();
        }

        assert_eq!(rt.type_count(), 100);
        for name in &names {
            let desc = rt.lookup(name).unwrap();
            assert_eq!(desc.name(), name);
        }
    }

    #[test]
    fn test_independent_runtimes_do_not_share_names() {
        let mut a = Runtime::new();
        let mut b = Runtime::new();

        let in_a = a.register(decl("RegSplit")).unwrap();
        let in_b = b.register(decl("RegSplit")).unwrap();
        assert_ne!(in_a, in_b);
    }
}
