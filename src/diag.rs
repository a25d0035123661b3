//! Diagnostics channel: every parse and prepare step reports through a [`Logger`].
//!
//! ## Levels
//!
//! - **Debug** / **Info**: progress notes, filtered by the configured minimum level.
//! - **Warning**: value representable but not serializable, ignored property, etc.
//!   Fatal for validation when `warn_as_err` is set.
//! - **Error**: structural or semantic failure.
//!
//! Without a callback, messages go to `tracing` under the `commsdsl` target so the
//! binaries (or any embedding application) decide how they are rendered.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Caller-supplied policy, fixed for the lifetime of the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    pub min_level: Severity,
    pub warn_as_err: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            min_level: Severity::Info,
            warn_as_err: false,
        }
    }
}

pub type DiagCallback = Box<dyn Fn(Severity, &str)>;

/// Shared diagnostics sink.
pub struct Logger {
    config: LoggerConfig,
    callback: Option<DiagCallback>,
    warnings: Cell<usize>,
    errors: Cell<usize>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.config)
            .field("has_callback", &self.callback.is_some())
            .field("warnings", &self.warnings.get())
            .field("errors", &self.errors.get())
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new(LoggerConfig::default())
    }
}

impl Logger {
    /// Logger forwarding to `tracing`.
    pub fn new(config: LoggerConfig) -> Self {
        Logger {
            config,
            callback: None,
            warnings: Cell::new(0),
            errors: Cell::new(0),
        }
    }

    pub fn with_callback(config: LoggerConfig, callback: DiagCallback) -> Self {
        Logger {
            callback: Some(callback),
            ..Logger::new(config)
        }
    }

    /// Logger that records every message (at or above the minimum level) into a
    /// shared list, handy for tools printing a report at the end and for tests.
    pub fn capturing(config: LoggerConfig) -> (Self, Rc<RefCell<Vec<Diagnostic>>>) {
        let store: Rc<RefCell<Vec<Diagnostic>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = store.clone();
        let logger = Logger::with_callback(
            config,
            Box::new(move |severity, msg| {
                sink.borrow_mut().push(Diagnostic {
                    severity,
                    message: msg.to_string(),
                })
            }),
        );
        (logger, store)
    }

    pub fn config(&self) -> LoggerConfig {
        self.config
    }

    pub fn report(&self, severity: Severity, msg: &str) {
        let mut severity = severity;
        match severity {
            Severity::Warning => {
                self.warnings.set(self.warnings.get() + 1);
                if self.config.warn_as_err {
                    severity = Severity::Error;
                }
            }
            Severity::Error => self.errors.set(self.errors.get() + 1),
            _ => {}
        }

        if severity < self.config.min_level {
            return;
        }

        if let Some(cb) = &self.callback {
            cb(severity, msg);
            return;
        }

        match severity {
            Severity::Debug => tracing::debug!(target: "commsdsl", "{}", msg),
            Severity::Info => tracing::info!(target: "commsdsl", "{}", msg),
            Severity::Warning => tracing::warn!(target: "commsdsl", "{}", msg),
            Severity::Error => tracing::error!(target: "commsdsl", "{}", msg),
        }
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.report(Severity::Error, msg.as_ref());
    }

    pub fn warning(&self, msg: impl AsRef<str>) {
        self.report(Severity::Warning, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.report(Severity::Info, msg.as_ref());
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.report(Severity::Debug, msg.as_ref());
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }

    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    /// True when warnings were emitted and the policy makes them fatal.
    pub fn warnings_are_fatal(&self) -> bool {
        self.config.warn_as_err && self.warnings.get() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_filters() {
        let (logger, store) = Logger::capturing(LoggerConfig {
            min_level: Severity::Warning,
            warn_as_err: false,
        });
        logger.debug("hidden");
        logger.info("hidden too");
        logger.warning("w");
        logger.error("e");
        assert_eq!(logger.warning_count(), 1);
        assert_eq!(logger.error_count(), 1);
        let got = store.borrow();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].severity, Severity::Warning);
        assert_eq!(got[1].message, "e");
        assert!(!logger.warnings_are_fatal());
    }

    #[test]
    fn warnings_promoted_when_configured() {
        let (logger, store) = Logger::capturing(LoggerConfig {
            min_level: Severity::Info,
            warn_as_err: true,
        });
        logger.warning("careful");
        assert_eq!(store.borrow()[0].severity, Severity::Error);
        assert!(logger.warnings_are_fatal());
    }
}
