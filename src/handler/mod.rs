//! Lifecycle dispatcher.
//!
//! [`Handler`] implements [`StatsHandler`]: it tags each attempt with a
//! fresh [`RpcInfo`], counts payloads as they pass and records the final
//! measurements when the attempt ends.

mod builder;

pub use builder::HandlerBuilder;

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use http::Extensions;
use tracing::trace;

use crate::attributes;
use crate::backend::{Counter, Histogram};
use crate::context::{self, RpcInfo};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::stats::{BoxError, ConnStats, ConnTagInfo, Role, RpcStats, RpcTagInfo};
use crate::Result;

/// Callbacks a transport invokes over the life of connections and RPCs.
///
/// None of the callbacks can fail; they observe and never alter the RPC.
pub trait StatsHandler: Send + Sync {
    /// Prepare the context of a new attempt.
    fn tag_rpc(&self, extensions: &mut Extensions, info: &RpcTagInfo);

    /// Observe one lifecycle event of the attempt tagged into `extensions`.
    fn handle_rpc(&self, extensions: &Extensions, stats: &RpcStats);

    fn tag_conn(&self, _extensions: &mut Extensions, _info: &ConnTagInfo) {}

    fn handle_conn(&self, _extensions: &Extensions, _stats: &ConnStats) {}
}

/// Instruments created for a handler.
#[derive(Debug, Clone)]
pub struct Instruments {
    pub requests_per_rpc: Counter,
    pub responses_per_rpc: Counter,
    pub duration: Option<Histogram>,
    pub request_size: Option<Histogram>,
    pub response_size: Option<Histogram>,
}

impl Instruments {
    fn tracks_bytes(&self) -> bool {
        self.request_size.is_some() || self.response_size.is_some()
    }
}

/// RPC metrics handler for one side of a connection.
pub struct Handler {
    role: Role,
    instruments: Instruments,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("role", &self.role)
            .field("instruments", &self.instruments)
            .finish_non_exhaustive()
    }
}

impl Handler {
    pub fn builder(role: Role) -> HandlerBuilder {
        HandlerBuilder::new(role)
    }

    /// Server handler with default options on the global backend.
    pub fn server() -> Result<Self> {
        Self::builder(Role::Server).build()
    }

    /// Client handler with default options on the global backend.
    pub fn client() -> Result<Self> {
        Self::builder(Role::Client).build()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    pub fn diagnostics(&self) -> &dyn DiagnosticSink {
        self.diagnostics.as_ref()
    }

    fn finish(
        &self,
        info: &RpcInfo,
        begin_time: Instant,
        end_time: Instant,
        error: Option<&BoxError>,
    ) {
        if !info.complete() {
            self.diagnostics.report(Diagnostic::DuplicateEnd {
                method: info.full_method_name().to_owned(),
            });
            return;
        }

        let error = error.map(|e| &**e as &(dyn Error + 'static));
        let attrs = attributes::attributes(info.full_method_name(), error);

        // Roles mirror each other: what a client sends, a server receives.
        let (requests, responses, request_bytes, response_bytes) = match self.role {
            Role::Client => (
                info.sent_messages(),
                info.received_messages(),
                info.sent_bytes(),
                info.received_bytes(),
            ),
            Role::Server => (
                info.received_messages(),
                info.sent_messages(),
                info.received_bytes(),
                info.sent_bytes(),
            ),
        };

        let instruments = &self.instruments;
        instruments.requests_per_rpc.add(requests, &attrs);
        instruments.responses_per_rpc.add(responses, &attrs);

        if let Some(duration) = &instruments.duration {
            let elapsed = end_time.saturating_duration_since(begin_time);
            duration.record(elapsed.as_millis() as f64, &attrs);
        }
        if let Some(request_size) = &instruments.request_size {
            request_size.record(request_bytes as f64, &attrs);
        }
        if let Some(response_size) = &instruments.response_size {
            response_size.record(response_bytes as f64, &attrs);
        }
    }
}

impl StatsHandler for Handler {
    fn tag_rpc(&self, extensions: &mut Extensions, info: &RpcTagInfo) {
        context::set_rpc_info(
            extensions,
            Arc::new(RpcInfo::new(info.full_method_name.clone())),
        );
    }

    fn handle_rpc(&self, extensions: &Extensions, stats: &RpcStats) {
        let Some(info) = context::rpc_info(extensions) else {
            trace!(event = stats.kind(), "no rpc info in context, event discarded");
            return;
        };

        let track_bytes = self.instruments.tracks_bytes();
        match stats {
            RpcStats::InHeader | RpcStats::OutHeader | RpcStats::InTrailer | RpcStats::OutTrailer => {}
            RpcStats::Begin { .. } => {}
            RpcStats::InPayload { length, .. } => {
                info.record_received(track_bytes.then_some(*length as u64));
            }
            RpcStats::OutPayload { length, .. } => {
                info.record_sent(track_bytes.then_some(*length as u64));
            }
            RpcStats::End {
                begin_time,
                end_time,
                error,
            } => self.finish(info, *begin_time, *end_time, error.as_ref()),
        }
    }
}
