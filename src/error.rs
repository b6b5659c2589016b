//! grpcmetrics error types

use crate::backend::InstrumentKind;

/// Errors surfaced while building a [`Handler`](crate::Handler).
///
/// Only construction can fail. Once a handler exists, every lifecycle
/// callback is infallible and anomalies go to the
/// [`DiagnosticSink`](crate::diagnostics::DiagnosticSink) instead.
#[derive(Debug, thiserror::Error)]
pub enum GrpcMetricsError {
    /// The backend already holds an instrument with this name but a
    /// different kind or unit.
    #[error("instrument '{name}' already registered as {existing}, cannot register as {requested}")]
    InstrumentConflict {
        name: String,
        existing: InstrumentKind,
        requested: InstrumentKind,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for grpcmetrics operations
pub type Result<T> = std::result::Result<T, GrpcMetricsError>;
