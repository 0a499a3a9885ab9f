//! Memory management infrastructure for the `ferric` runtime.
//!
//! This crate provides the growable best-fit memory pool backing the
//! runtime's instance and metadata allocation:
//!
//! - **`Pool`**: variable-size sub-allocation from large backing blocks,
//!   least-waste-fit placement, batch teardown
//! - **Cleanup registration**: callbacks run in reverse registration
//!   order when a pool is dropped
//!

pub mod error;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{DtorFn, Pool, PoolStats};
