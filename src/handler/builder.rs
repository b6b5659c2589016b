//! Builder for configuring handlers

use std::sync::Arc;

use metrics::{Recorder, Unit};
use tracing::debug;

use super::{Handler, Instruments};
use crate::Result;
use crate::backend::MetricsBackend;
use crate::config::MetricsOptions;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::stats::Role;
use crate::telemetry::{self, metric_name};

/// Builder for [`Handler`].
///
/// ```rust
/// # use grpcmetrics::{Handler, Role};
/// let handler = Handler::builder(Role::Server)
///     .instrumentation_name("orders")
///     .instrument_latency(true)
///     .instrument_sizes(true)
///     .build()
///     .unwrap();
/// assert!(handler.instruments().duration.is_some());
/// ```
pub struct HandlerBuilder {
    role: Role,
    backend: Option<MetricsBackend>,
    options: MetricsOptions,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl HandlerBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            backend: None,
            options: MetricsOptions::default(),
            diagnostics: None,
        }
    }

    /// Record into this backend instead of the process-wide one.
    pub fn meter_provider(mut self, backend: MetricsBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Record into this recorder instead of the process-wide one.
    pub fn recorder<R>(self, recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        self.meter_provider(MetricsBackend::new(recorder))
    }

    /// Set the naming scope. An empty name keeps the default.
    pub fn instrumentation_name(mut self, name: impl Into<String>) -> Self {
        self.options.instrumentation_name = name.into();
        self
    }

    /// Enable the `request.size` and `response.size` histograms.
    pub fn instrument_sizes(mut self, enabled: bool) -> Self {
        self.options.instrument_sizes = enabled;
        self
    }

    /// Enable the `duration` histogram.
    pub fn instrument_latency(mut self, enabled: bool) -> Self {
        self.options.instrument_latency = enabled;
        self
    }

    /// Replace all options at once, e.g. with ones loaded from a file.
    pub fn options(mut self, options: MetricsOptions) -> Self {
        self.options = options;
        self
    }

    /// Where runtime anomalies are reported (default: [`TracingSink`]).
    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Create the instruments and the handler.
    ///
    /// Fails if the backend already holds one of the metric names with a
    /// different kind or unit.
    pub fn build(self) -> Result<Handler> {
        let options = self.options.normalized();
        let backend = self.backend.unwrap_or_else(MetricsBackend::global);
        let scope = options.instrumentation_name.as_str();
        let prefix = match self.role {
            Role::Client => telemetry::CLIENT_PREFIX,
            Role::Server => telemetry::SERVER_PREFIX,
        };

        // Counters rather than histograms for message counts: histograms
        // per method multiply label cardinality.
        let requests_per_rpc = backend.counter(
            scope,
            metric_name(prefix, telemetry::REQUESTS_PER_RPC),
            Unit::Count,
            "Number of messages counted as requests per RPC.",
        )?;
        let responses_per_rpc = backend.counter(
            scope,
            metric_name(prefix, telemetry::RESPONSES_PER_RPC),
            Unit::Count,
            "Number of messages counted as responses per RPC.",
        )?;

        let duration = if options.instrument_latency {
            Some(backend.histogram(
                scope,
                metric_name(prefix, telemetry::DURATION),
                Unit::Milliseconds,
                "Duration of the RPC attempt.",
            )?)
        } else {
            None
        };

        let (request_size, response_size) = if options.instrument_sizes {
            let request_size = backend.histogram(
                scope,
                metric_name(prefix, telemetry::REQUEST_SIZE),
                Unit::Bytes,
                "Total size of request messages per RPC.",
            )?;
            let response_size = backend.histogram(
                scope,
                metric_name(prefix, telemetry::RESPONSE_SIZE),
                Unit::Bytes,
                "Total size of response messages per RPC.",
            )?;
            (Some(request_size), Some(response_size))
        } else {
            (None, None)
        };

        debug!(
            role = %self.role,
            scope,
            global = backend.is_global(),
            sizes = options.instrument_sizes,
            latency = options.instrument_latency,
            "grpc metrics handler created"
        );

        Ok(Handler {
            role: self.role,
            instruments: Instruments {
                requests_per_rpc,
                responses_per_rpc,
                duration,
                request_size,
                response_size,
            },
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>),
        })
    }
}
