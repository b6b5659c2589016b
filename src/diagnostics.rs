//! Runtime anomaly reporting.
//!
//! Lifecycle callbacks have no error channel back to the transport, so
//! anything unexpected is handed to a [`DiagnosticSink`]. The default,
//! [`TracingSink`], logs a warning. Tests can install a [`CollectingSink`]
//! and assert on what was reported.

use std::sync::{Arc, Mutex};

use tracing::warn;

/// Something went wrong while observing an attempt. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    /// A second `End` arrived for an attempt that already completed.
    #[error("duplicate end event for {method}")]
    DuplicateEnd { method: String },

    /// A body did not follow gRPC length-prefixed framing.
    #[error("malformed grpc frame in {method}: {reason}")]
    MalformedFrame { method: String, reason: String },

    /// The `grpc-status` header or trailer could not be parsed.
    #[error("invalid grpc-status in {method}: {value}")]
    InvalidStatus { method: String, value: String },

    /// A request or response body yielded an error.
    #[error("body error in {method}: {message}")]
    BodyError { method: String, message: String },
}

/// Receives runtime diagnostics from a [`Handler`](crate::Handler).
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs diagnostics at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!(error = %diagnostic, "grpc metrics diagnostic");
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything reported so far, oldest first.
    pub fn reports(&self) -> Vec<Diagnostic> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.reports.lock() {
            Ok(mut reports) => reports.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
