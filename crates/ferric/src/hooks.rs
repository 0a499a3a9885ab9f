//! Replaceable diagnostic reporters.
//!
//! The runtime reports abnormal conditions through three hooks: a warning
//! reporter, a non-fatal error reporter, and a fatal reporter that must
//! not return. The hooks are plain function pointers carried by value,
//! injected at [`crate::Runtime`] construction and copied into
//! every descriptor, so there is no process-wide mutable state to swap.
//!
//! The defaults log through `ferric-log`; the default fatal reporter
//! additionally aborts the process. An override may exit non-locally
//! (panic, longjmp-equivalent) but must never return normally, which the
//! `!` return type enforces at the type level.
//!
//! # Example
//!
//! ```
//! use ferric::{Hooks, Runtime};
//!
//! fn quiet(_msg: &str) {}
//! fn fail(msg: &str) -> ! {
//!     panic!("runtime fault: {msg}");
//! }
//!
//! let rt = Runtime::with_hooks(Hooks {
//!     warning: quiet,
//!     error: quiet,
//!     fatal: fail,
//! });
//! # let _ = rt;
//! ```

/// Reporter for conditions the caller may want to know about.
pub type ReportFn = fn(&str);

/// Reporter for conditions the runtime cannot continue past.
pub type FatalFn = fn(&str) -> !;

/// The three diagnostic reporters consumed by the runtime.
#[derive(Clone, Copy, Debug)]
pub struct Hooks {
    /// Called for suspicious but recoverable conditions.
    pub warning: ReportFn,
    /// Called for failed operations the caller will also see as `Err`.
    pub error: ReportFn,
    /// Called for programming errors; must not return.
    pub fatal: FatalFn,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            warning: default_warning,
            error: default_error,
            fatal: default_fatal,
        }
    }
}

fn default_warning(msg: &str) {
    ferric_log::warn!("{msg}");
}

fn default_error(msg: &str) {
    ferric_log::error!("{msg}");
}

fn default_fatal(msg: &str) -> ! {
    ferric_log::error!("{msg}");
    std::process::abort();
}
