//! A minimal, zero-dependency logging crate for the `ferric` runtime.
//!
//! Log lines go to **stderr** so they interleave correctly with the
//! runtime's diagnostic reporters, which also write there. Color is only
//! emitted when stderr is a terminal. The minimum level can be set
//! programmatically or picked up from the `FERRIC_LOG` environment
//! variable on first use.
//!
//! # Example
//!
//! ```
//! use ferric_log::{error, warn, info, debug, Level};
//!
//! // Set the minimum log level
//! ferric_log::set_level(Level::Debug);
//!
//! let blocks = 3;
//! info!("pool grew to {} blocks", blocks);
//! debug!("free list: {:?}", vec![64, 128, 512]);
//! warn!("skip threshold doubled");
//! error!("allocation failed");
//! ```

use std::fmt::Arguments;
use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log levels, ordered from most severe (`Error`) to least severe
/// (`Trace`). Lower numeric values indicate higher severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Critical failures and errors
    Error = 0,
    /// Potentially harmful situations
    Warn = 1,
    /// Informational messages
    Info = 2,
    /// Detailed diagnostic information
    Debug = 3,
    /// Most detailed tracing information
    Trace = 4,
}

impl Level {
    /// Returns the ANSI color code for this log level.
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the string representation of this log level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    /// Parses a level name, case-insensitively.
    ///
    /// ```
    /// use ferric_log::Level;
    ///
    /// assert_eq!("error".parse(), Ok(Level::Error));
    /// assert_eq!("INFO".parse(), Ok(Level::Info));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(format!("invalid log level: {s}")),
        }
    }
}

/// The global logger.
///
/// Holds the minimum level in an atomic so filtering needs no locking.
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the minimum log level. Messages below it are discarded.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum log level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Checks whether a message at `level` would be emitted.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

/// Global logger singleton.
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, initializing it on first call.
///
/// The initial level comes from the `FERRIC_LOG` environment variable if
/// set to a valid level name, otherwise `Level::Warn`.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| {
        let level = std::env::var("FERRIC_LOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Level::Warn);
        Logger::new(level)
    })
}

/// Sets the minimum log level for the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Internal function that performs the actual logging.
///
/// Called by the log macros after the level check has already passed.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    static RESET: &str = "\x1b[0m";

    if std::io::stderr().is_terminal() {
        let color = level.color_code();
        eprintln!("{color}[{}]{RESET} {target}: {args}", level.as_str());
    } else {
        eprintln!("[{}] {target}: {args}", level.as_str());
    }
}

/// The primary logging macro. Captures the calling module path as the
/// log target.
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
