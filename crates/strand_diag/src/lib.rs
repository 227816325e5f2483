//! Thread-safe diagnostic accumulation for parallel PnR stages.
//!
//! Worker threads must never print; instead they push [`Diagnostic`]s into
//! a shared [`DiagnosticSink`] which the coordinator drains at phase
//! boundaries. Severity counters are tracked atomically so hot paths can
//! check `has_errors` without taking the lock.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational; no action needed.
    Note,
    /// Suspicious but the run can complete.
    Warning,
    /// The run cannot produce a valid result.
    Error,
}

/// Which stage of the flow produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Device model construction or queries.
    Device,
    /// The placement refiner.
    Placer,
    /// The routing engine.
    Router,
    /// Timing oracle interactions.
    Timing,
}

/// A single diagnostic message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Originating stage.
    pub stage: Stage,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            stage,
            message: message.into(),
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            stage,
            message: message.into(),
        }
    }

    /// Creates a note diagnostic.
    pub fn note(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            stage,
            message: message.into(),
        }
    }
}

/// A thread-safe accumulator for diagnostics.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Mutex<Vec<Diagnostic>>,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl DiagnosticSink {
    /// Creates a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a diagnostic into the sink.
    pub fn emit(&self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            Severity::Warning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Severity::Note => {}
        }
        self.entries.lock().unwrap().push(diag);
    }

    /// Returns `true` if any error-severity diagnostics were emitted.
    pub fn has_errors(&self) -> bool {
        self.errors.load(Ordering::Relaxed) > 0
    }

    /// Number of error diagnostics emitted so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of warning diagnostics emitted so far.
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Takes all accumulated diagnostics, leaving the sink empty. The
    /// severity counters are reset together with the entries.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        let mut entries = self.entries.lock().unwrap();
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        std::mem::take(&mut *entries)
    }

    /// Returns a snapshot of accumulated diagnostics without draining.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().unwrap().clone()
    }
}
