//! Error types for pool allocation.

use std::fmt;

/// Errors that can occur while allocating from a [`crate::Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The backing system allocator returned no memory.
    OutOfMemory,

    /// The requested size cannot be aligned without overflowing.
    SizeOverflow {
        /// The requested allocation size.
        size: usize,
    },

    /// A cleanup registration carried a null argument.
    NullCleanupArg,
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
        }
    }
}

impl std::error::Error for Error {}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
