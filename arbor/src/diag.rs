//! Caller-owned diagnostics accumulator.
//!
//! Every mutating or algorithmic entry point takes a `&mut Diagnostics`; the
//! engine never keeps a global or per-thread sink of its own.

use core::fmt;

use crate::error::Error;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Recoverable oddity; the operation went ahead.
    Warning,
    /// The reason an operation was aborted.
    Error,
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    /// Data path of the node concerned, when there is one.
    pub path: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        match &self.path {
            Some(path) => write!(f, "{level}: {} ({path})", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Accumulates warnings and errors across calls.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>, path: Option<String>) {
        self.entries.push(Diagnostic {
            level: Level::Warning,
            message: message.into(),
            path,
        });
    }

    /// Record `err` and hand it back, so call sites can `return Err(diag.fail(e))`.
    pub fn fail(&mut self, err: Error) -> Error {
        let path = err.as_validation().map(|v| v.path.clone());
        self.entries.push(Diagnostic {
            level: Level::Error,
            message: err.to_string(),
            path,
        });
        err
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_records_and_returns() {
        let mut diag = Diagnostics::new();
        diag.warn("keys reordered", Some("/m:l".into()));
        let err = diag.fail(Error::Conflict("x".into()));
        assert_eq!(err, Error::Conflict("x".into()));
        assert_eq!(diag.warnings().count(), 1);
        assert!(diag.has_errors());
        assert_eq!(
            diag.entries()[0].to_string(),
            "warning: keys reordered (/m:l)"
        );
    }
}
