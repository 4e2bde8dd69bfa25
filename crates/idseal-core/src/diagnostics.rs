//! Diagnostic sink for errors that must not reach the caller.
//!
//! Cleanup paths (`identifier::free`, `key::free`) never return errors.
//! What goes wrong there is reported to the context's [`DiagnosticSink`]
//! instead, so failures stay observable without breaking shutdown sequences.

use std::fmt;
use std::sync::Mutex;

use crate::error::{ErrorKind, IdentityError};

/// One swallowed error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Operation that failed, e.g. `"identifier::free"`.
    pub operation: &'static str,
    /// Kind of the underlying error.
    pub kind: ErrorKind,
    /// Rendered error message. Never contains secret bytes.
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic from an error.
    #[must_use]
    pub fn new(operation: &'static str, error: &IdentityError) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

/// Receiver for swallowed errors.
pub trait DiagnosticSink: Send + Sync {
    /// Record one diagnostic. Must not panic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: forwards every diagnostic to `tracing::warn!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            operation = diagnostic.operation,
            kind = ?diagnostic.kind,
            "{}",
            diagnostic.message
        );
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded diagnostics, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(diagnostic);
    }
}
