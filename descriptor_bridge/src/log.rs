//! Logging for the descriptor bridge
//!
//! Diagnostics (view map pressure, rejected descriptions, pool growth) go
//! through a replaceable global logger:
//! - `Logger` trait for custom sinks
//! - severity levels from Trace to Error
//! - colored console output by default
//! - file and line attached to Error entries

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Sink for bridge diagnostics
///
/// # Example
///
/// ```no_run
/// use descriptor_bridge::bridge::log::{Logger, LogEntry};
///
/// struct CountingLogger(std::sync::atomic::AtomicUsize);
///
/// impl Logger for CountingLogger {
///     fn log(&self, _entry: &LogEntry) {
///         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One diagnostic record
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,

    pub timestamp: SystemTime,

    /// Emitting component (e.g. "bridge::ViewCache", "bridge::vulkan")
    pub source: String,

    pub message: String,

    /// Source file, only set by `bridge_error!`
    pub file: Option<&'static str>,

    /// Source line, only set by `bridge_error!`
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    /// Hot-path detail (race losers, template skips)
    Trace,
    Debug,
    /// Lifecycle events (heap creation, pool growth)
    Info,
    /// Degraded results (border color fallback, clamped ranges)
    Warn,
    /// Rejected requests and failed device calls
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by the console logger
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }
}

/// Console logger
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let label = entry.severity.label();
        let severity_str = match entry.severity {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        };

        let source = entry.source.bright_blue();

        match (entry.file, entry.line) {
            (Some(file), Some(line)) => eprintln!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            ),
            _ => eprintln!(
                "[{}] [{}] [{}] {}",
                timestamp, severity_str, source, entry.message
            ),
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
///
/// ```no_run
/// # use descriptor_bridge::bridge_trace;
/// bridge_trace!("bridge::ViewCache", "Discarding duplicate view {}", 7);
/// ```
#[macro_export]
macro_rules! bridge_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::bridge::Bridge::log(
            $crate::bridge::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! bridge_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::bridge::Bridge::log(
            $crate::bridge::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
#[macro_export]
macro_rules! bridge_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::bridge::Bridge::log(
            $crate::bridge::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! bridge_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::bridge::Bridge::log(
            $crate::bridge::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
///
/// ```no_run
/// # use descriptor_bridge::bridge_error;
/// bridge_error!("bridge::descriptor", "Unaligned CBV size {:#x}", 255);
/// ```
#[macro_export]
macro_rules! bridge_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::bridge::Bridge::log_detailed(
            $crate::bridge::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
