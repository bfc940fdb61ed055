// src/core/logging.rs

//! The diagnostic engine.
//!
//! Every component reports through here, including this module's own
//! failure paths. Messages go to standard error only, and an explicit
//! recursion counter turns a runaway diagnostic loop into a fatal error
//! value instead of a stack overflow.

use crate::core::settings::Settings;
use crate::models::LogLevel;
use colored::Colorize;
use scopeguard::ScopeGuard;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log recursion depth {depth} exceeded the limit of {limit}.")]
    RecursionLimit { depth: u32, limit: u32 },
    #[error("Unknown log level {0}; known levels are 0 (error) through 3 (debug).")]
    UnknownLevel(i64),
    #[error("Could not write to the diagnostic stream: {0}")]
    StreamWrite(#[source] std::io::Error),
}

impl LogError {
    /// Whether this failure is the fatal class callers must not ignore.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RecursionLimit { .. })
    }
}

/// Leveled, timestamped diagnostics on standard error.
pub struct Logger {
    settings: Arc<Settings>,
    depth: AtomicU32,
    /// Captured once at construction: stderr is a terminal and the global
    /// color control (which honors `NO_COLOR`) permits color.
    use_color: bool,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("depth", &self.depth.load(Ordering::SeqCst))
            .field("use_color", &self.use_color)
            .finish_non_exhaustive()
    }
}

type DepthSlot<'a> = ScopeGuard<&'a AtomicU32, fn(&AtomicU32)>;

impl Logger {
    pub fn new(settings: Arc<Settings>) -> Self {
        let use_color = std::io::stderr().is_terminal()
            && colored::control::SHOULD_COLORIZE.should_colorize();
        Self {
            settings,
            depth: AtomicU32::new(0),
            use_color,
        }
    }

    /// Emits one line at `level` if the current verbosity admits it.
    ///
    /// The only fatal failure is `RecursionLimit`; everything else (an
    /// unwritable stream) is a failure the caller may shrug off.
    pub fn log(&self, level: LogLevel, message: &str) -> Result<(), LogError> {
        let _slot = self.depth_slot()?;

        if level > self.settings.verbosity() {
            return Ok(());
        }

        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let line = format!("{timestamp} {} {message}", self.painted_tag(level));
        writeln!(std::io::stderr(), "{line}").map_err(LogError::StreamWrite)
    }

    /// Emits at a raw numeric level, the form scripted callers use. An
    /// unknown number reports the bad call itself and returns failure
    /// without unwinding anything.
    pub fn log_numeric(&self, raw_level: i64, message: &str) -> Result<(), LogError> {
        match LogLevel::from_value(raw_level) {
            Some(level) => self.log(level, message),
            None => {
                let _ = self.log(
                    LogLevel::Error,
                    &format!("Invalid log level {raw_level} requested (message was: {message})"),
                );
                Err(LogError::UnknownLevel(raw_level))
            }
        }
    }

    pub fn error(&self, message: &str) -> Result<(), LogError> {
        self.log(LogLevel::Error, message)
    }

    pub fn warn(&self, message: &str) -> Result<(), LogError> {
        self.log(LogLevel::Warn, message)
    }

    pub fn info(&self, message: &str) -> Result<(), LogError> {
        self.log(LogLevel::Info, message)
    }

    pub fn debug(&self, message: &str) -> Result<(), LogError> {
        self.log(LogLevel::Debug, message)
    }

    pub fn verbosity(&self) -> LogLevel {
        self.settings.verbosity()
    }

    /// Claims one recursion slot. The returned guard gives the slot back on
    /// every exit path, error paths included.
    fn depth_slot(&self) -> Result<DepthSlot<'_>, LogError> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let slot: DepthSlot<'_> = scopeguard::guard(&self.depth, |d| {
            d.fetch_sub(1, Ordering::SeqCst);
        });
        let limit = self.settings.log_max_depth();
        if depth > limit {
            // Reported raw; routing this through the engine is exactly the
            // recursion being guarded against.
            let _ = writeln!(
                std::io::stderr(),
                "rckit: log recursion depth {depth} exceeded limit {limit}; message dropped"
            );
            return Err(LogError::RecursionLimit { depth, limit });
        }
        Ok(slot)
    }

    fn painted_tag(&self, level: LogLevel) -> String {
        let tag = level.tag();
        if !self.use_color {
            return format!("[{tag}]");
        }
        let painted = match level {
            LogLevel::Error => tag.red().bold(),
            LogLevel::Warn => tag.yellow(),
            LogLevel::Info => tag.green(),
            LogLevel::Debug => tag.cyan(),
        };
        format!("[{painted}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_logger() -> Logger {
        // Error-only verbosity keeps test output clean.
        let settings = Arc::new(Settings::defaults());
        settings.set_verbosity(LogLevel::Error);
        Logger::new(settings)
    }

    #[test]
    fn level_ordering_matches_the_numeric_contract() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert_eq!(LogLevel::from_value(2), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_value(7), None);
    }

    #[test]
    fn suppressed_levels_still_succeed() {
        let logger = quiet_logger();
        assert!(logger.debug("not emitted").is_ok());
        assert!(logger.info("not emitted").is_ok());
    }

    #[test]
    fn numeric_entry_point_validates_the_level() {
        let logger = quiet_logger();
        assert!(logger.log_numeric(0, "fine").is_ok());
        let result = logger.log_numeric(42, "bogus");
        assert!(matches!(&result, Err(LogError::UnknownLevel(42))));
        assert!(!result.unwrap_err().is_fatal());
    }

    #[test]
    fn depth_returns_to_zero_after_each_call() {
        let logger = quiet_logger();
        logger.warn("one").unwrap();
        logger.error("two").unwrap();
        assert_eq!(logger.depth.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn recursion_limit_is_fatal_and_recoverable() {
        let logger = quiet_logger();
        let limit = logger.settings.log_max_depth();

        // Hold the maximum number of slots, simulating nested engine calls.
        let mut slots = Vec::new();
        for _ in 0..limit {
            slots.push(logger.depth_slot().unwrap());
        }

        let result = logger.error("one too deep");
        match &result {
            Err(LogError::RecursionLimit { depth, limit: l }) => {
                assert_eq!(*depth, limit + 1);
                assert_eq!(*l, limit);
            }
            other => panic!("expected RecursionLimit, got {other:?}"),
        }
        assert!(result.unwrap_err().is_fatal());

        // Releasing the slots restores normal operation.
        drop(slots);
        assert_eq!(logger.depth.load(Ordering::SeqCst), 0);
        assert!(logger.error("back to normal").is_ok());
    }
}
