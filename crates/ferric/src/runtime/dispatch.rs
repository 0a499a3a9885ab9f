//! Virtual slot dispatch.
//!
//! Every dispatch-table entry shares one marshalled signature, [`Imp`]:
//! the receiver, the slot index being invoked, a packed argument array,
//! and a return-value buffer. [`call`] reads the receiver's descriptor,
//! bounds-checks the slot, and invokes the entry; after resolution every
//! entry is callable, so the only failure modes are a cleared type
//! reference and a bad slot index, both reported as checked errors.
//!
//! Calling a slot that no type in the chain ever implemented lands in the
//! sentinel installed at resolution time, which funnels into the
//! descriptor's fatal hook instead of limping on without the operation.

use crate::error::{Error, Result};
use crate::runtime::object::ObjPtr;

/// Dispatch-table entry: the uniform shape of every virtual operation.
///
/// - `receiver`: the instance being operated on
/// - `slot`: the table index this entry was invoked through
/// - `args`: pointer to an array of word-sized argument slots (may be
///   null when the operation takes none, as destructor calls are)
/// - `ret`: pointer to a 16-byte return buffer (may be null when the
///   caller discards the result)
///
/// # Safety
///
/// Implementations must only read as many `args` entries as their
/// operation defines and must not retain `args`/`ret` past the call.
pub type Imp = unsafe extern "C-unwind" fn(
    receiver: ObjPtr,
    slot: usize,
    args: *const *mut u8,
    ret: *mut u8,
);

/// The destructor's reserved table index.
pub const DTOR_SLOT: usize = 0;

// Zeroed pool memory doubles as an all-unset table, which only holds if
// the niche keeps Option<Imp> word-sized with None as the null pattern.
const _: () = assert!(size_of::<Option<Imp>>() == size_of::<usize>());

/// Packed arguments for a slot invocation: zero, one, two, or an
/// arbitrary number of word-sized values.
#[derive(Debug, Clone, Copy)]
pub enum SlotArgs<'a> {
    /// No arguments.
    None,
    /// One word-sized argument.
    One([usize; 1]),
    /// Two word-sized arguments.
    Two([usize; 2]),
    /// Caller-owned argument array.
    Many(&'a [usize]),
}

impl<'a> SlotArgs<'a> {
    /// Packs one argument.
    #[must_use]
    pub fn one(a: usize) -> Self {
        SlotArgs::One([a])
    }

    /// Packs two arguments.
    #[must_use]
    pub fn two(a: usize, b: usize) -> Self {
        SlotArgs::Two([a, b])
    }

    /// Borrows a caller-owned argument array.
    #[must_use]
    pub fn many(args: &'a [usize]) -> Self {
        SlotArgs::Many(args)
    }

    /// The packed arguments as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        match self {
            SlotArgs::None => &[],
            SlotArgs::One(a) => a,
            SlotArgs::Two(a) => a,
            SlotArgs::Many(a) => a,
        }
    }

    /// Number of packed arguments.
    #[must_use]
    pub fn count(&self) -> usize {
        self.as_slice().len()
    }
}

/// Invokes a virtual slot on an instance.
///
/// Returns the word the implementation wrote into the return buffer
/// (zero for void-like operations, which simply leave the buffer
/// untouched).
///
/// # Errors
///
/// [`Error::MissingType`] if the instance's type reference was cleared
/// (a finalized block), [`Error::SlotOutOfRange`] for an index outside
/// the table, [`Error::Unresolved`] if the table was never resolved
/// (not reachable for instances made through the creation paths).
///
/// # Safety
///
/// `receiver` must point at a live instance block, and the arguments
/// must match what the slot's implementation expects.
pub unsafe fn call(
    receiver: ObjPtr,
    slot: usize,
    args: &SlotArgs<'_>,
) -> Result<usize> {
    let desc = receiver.descriptor().ok_or(Error::MissingType)?;
    if slot >= desc.slot_count() {
        return Err(Error::SlotOutOfRange {
            slot,
            count: desc.slot_count(),
        });
    }
    let imp = desc.slot_imp(slot).ok_or(Error::Unresolved)?;

    let arg_slice = args.as_slice();
    // A word-sized argument reinterpreted as a pointer-sized one: same
    // representation, only the type changes.
    let args_ptr = arg_slice.as_ptr().cast::<*mut u8>();

    let mut ret = [0u8; 16];
    // SAFETY: `imp` came out of a resolved table, the receiver is live
    // per the caller's contract, `args_ptr` covers `arg_slice`, and the
    // return buffer is writable for the whole call.
    unsafe {
        imp(receiver, slot, args_ptr, ret.as_mut_ptr());
    }
    // SAFETY: the buffer is 16 bytes on the stack; reading the leading
    // word is in bounds whether or not the implementation wrote to it.
    Ok(unsafe { std::ptr::read_unaligned(ret.as_ptr().cast::<usize>()) })
}

/// Blank destructor installed wherever no type in the chain defines one,
/// so that destruction is always safe to invoke.
pub(crate) unsafe extern "C-unwind" fn empty_dtor(
    _receiver: ObjPtr,
    _slot: usize,
    _args: *const *mut u8,
    _ret: *mut u8,
) {
}

/// Sentinel installed in every slot that no type in the chain ever
/// implemented. Reports through the receiver's fatal hook and does not
/// return.
pub(crate) unsafe extern "C-unwind" fn unimplemented_slot(
    receiver: ObjPtr,
    slot: usize,
    _args: *const *mut u8,
    _ret: *mut u8,
) {
    match receiver.descriptor() {
        Some(desc) => {
            let hooks = desc.hooks();
            (hooks.fatal)(&format!(
                "unimplemented virtual slot {slot} called on type {}",
                desc.name()
            ));
        }
        None => {
            let hooks = crate::hooks::Hooks::default();
            (hooks.fatal)(&format!(
                "unimplemented virtual slot {slot} called on untyped block"
            ));
        }
    }
}
