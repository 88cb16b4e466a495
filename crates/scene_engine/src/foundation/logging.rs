//! Logging utilities and structured logging support

use std::collections::HashSet;

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// Initialize logging with an explicit filter string (`RUST_LOG` syntax)
///
/// Returns `false` when a logger was already installed.
pub fn init_with_filter(filter: &str) -> bool {
    env_logger::Builder::new()
        .parse_filters(filter)
        .try_init()
        .is_ok()
}

/// Remembers which diagnostics were already emitted
///
/// Data-integrity and resource problems show up every frame until the data
/// is fixed; this keeps each one to a single log line.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    reported: HashSet<String>,
}

impl DiagnosticLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a warning the first time `key` is seen; returns whether it was logged
    pub fn warn_once(&mut self, key: impl Into<String>, message: impl AsRef<str>) -> bool {
        if self.reported.insert(key.into()) {
            warn!("{}", message.as_ref());
            true
        } else {
            false
        }
    }

    /// Log an error the first time `key` is seen; returns whether it was logged
    pub fn error_once(&mut self, key: impl Into<String>, message: impl AsRef<str>) -> bool {
        if self.reported.insert(key.into()) {
            error!("{}", message.as_ref());
            true
        } else {
            false
        }
    }

    /// Whether `key` has already been reported
    pub fn was_reported(&self, key: &str) -> bool {
        self.reported.contains(key)
    }

    /// Forget a single key so it can be reported again
    pub fn forget(&mut self, key: &str) {
        self.reported.remove(key);
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.reported.clear();
    }

    /// Number of distinct diagnostics reported so far
    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_report_once() {
        let mut log = DiagnosticLog::new();

        assert!(log.warn_once("geometry:nan", "NaN in position"));
        assert!(!log.warn_once("geometry:nan", "NaN in position"));
        assert!(log.error_once("program:7", "compile failed"));
        assert_eq!(log.reported_count(), 2);

        log.forget("geometry:nan");
        assert!(!log.was_reported("geometry:nan"));

        log.reset();
        assert_eq!(log.reported_count(), 0);
    }
}
