//! Error types for the `ferric` runtime.
//!
//! Allocation failures surface as plain `Err` values and never escalate on
//! their own; logic errors (calling a slot no type in the chain defines)
//! go through the fatal hook instead, see [`crate::hooks`].

use std::fmt;

/// Errors that can occur in the `ferric` runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The backing system allocator returned no memory.
    OutOfMemory,

    /// A requested size cannot be aligned without overflowing.
    SizeOverflow {
        /// The requested size.
        size: usize,
    },

    /// A cleanup registration carried a null argument.
    NullCleanupArg,

    /// A type with this name is already registered.
    TypeExists,

    /// The declared instance size cannot even hold the type tag.
    InstanceSizeTooSmall {
        /// The declared instance size.
        size: usize,
        /// The minimum size an instance needs.
        min: usize,
    },

    /// A subtype declared fewer dispatch slots than it inherits.
    SlotCountTooSmall {
        /// The declared slot count.
        declared: usize,
        /// The slot count of the supertype.
        inherited: usize,
    },

    /// A dispatch slot index is outside the descriptor's table.
    SlotOutOfRange {
        /// The requested slot.
        slot: usize,
        /// The number of slots the table has.
        count: usize,
    },

    /// The instance's type reference has been cleared.
    MissingType,

    /// The descriptor's dispatch table has not been resolved.
    Unresolved,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::SizeOverflow { size } => {
                write!(f, "allocation size {size} overflows alignment")
            }
            Error::NullCleanupArg => {
                write!(f, "cleanup registration requires a non-null argument")
            }
            Error::TypeExists => write!(f, "type name already registered"),
            Error::InstanceSizeTooSmall { size, min } => {
                write!(f, "instance size {size} below minimum {min}")
            }
            Error::SlotCountTooSmall {
                declared,
                inherited,
            } => {
                write!(
                    f,
                    "slot count {declared} below inherited count {inherited}"
                )
            }
            Error::SlotOutOfRange { slot, count } => {
                write!(f, "slot {slot} out of range for table of {count}")
            }
            Error::MissingType => {
                write!(f, "instance carries no type reference")
            }
            Error::Unresolved => {
                write!(f, "dispatch table has not been resolved")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ferric_mem::Error> for Error {
    fn from(e: ferric_mem::Error) -> Self {
        match e {
            ferric_mem::Error::OutOfMemory => Error::OutOfMemory,
            ferric_mem::Error::SizeOverflow { size } => {
                Error::SizeOverflow { size }
            }
            ferric_mem::Error::NullCleanupArg => Error::NullCleanupArg,
        }
    }
}

/// Result type for ferric runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
