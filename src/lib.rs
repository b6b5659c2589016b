//! grpcmetrics - RPC metrics for gRPC clients and servers
//!
//! This crate turns gRPC lifecycle events into counters and histograms that
//! follow the OpenTelemetry RPC metrics conventions. The same [`Handler`]
//! serves both sides of a connection; its [`Role`] decides whether sent or
//! received messages count as requests.
//!
//! Metrics go through the [`metrics`] facade. Without an injected recorder
//! a handler records into whatever recorder is installed process-wide.
//!
//! # Emitted metrics
//!
//! With prefix `rpc.server` or `rpc.client`:
//!
//! | name                | kind      | unit | enabled by           |
//! |---------------------|-----------|------|----------------------|
//! | `requests_per_rpc`  | counter   | 1    | always               |
//! | `responses_per_rpc` | counter   | 1    | always               |
//! | `duration`          | histogram | ms   | `instrument_latency` |
//! | `request.size`      | histogram | By   | `instrument_sizes`   |
//! | `response.size`     | histogram | By   | `instrument_sizes`   |
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//!
//! use grpcmetrics::{Handler, Role, RpcStats, RpcTagInfo, StatsHandler};
//! use http::Extensions;
//!
//! let handler = Handler::builder(Role::Server)
//!     .instrument_sizes(true)
//!     .build()?;
//!
//! let mut ctx = Extensions::new();
//! handler.tag_rpc(&mut ctx, &RpcTagInfo::new("/shop.Cart/AddItem"));
//!
//! let begin_time = Instant::now();
//! handler.handle_rpc(&ctx, &RpcStats::Begin { begin_time });
//! handler.handle_rpc(&ctx, &RpcStats::InPayload { length: 12, wire_length: 17 });
//! handler.handle_rpc(&ctx, &RpcStats::OutPayload { length: 3, wire_length: 8 });
//! handler.handle_rpc(
//!     &ctx,
//!     &RpcStats::End {
//!         begin_time,
//!         end_time: begin_time + Duration::from_millis(5),
//!         error: None,
//!     },
//! );
//! # Ok::<(), grpcmetrics::GrpcMetricsError>(())
//! ```
//!
//! For tonic servers and channels, [`MetricsLayer`] drives a handler from
//! the HTTP/2 traffic directly.

pub mod attributes;
pub mod backend;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod layer;
pub mod stats;
pub mod telemetry;

pub use attributes::{Attributes, KeyValue, Value};
pub use backend::MetricsBackend;
pub use config::MetricsOptions;
pub use context::RpcInfo;
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use error::{GrpcMetricsError, Result};
pub use handler::{Handler, HandlerBuilder, Instruments, StatsHandler};
pub use layer::{InstrumentedBody, MetricsLayer, MetricsService};
pub use stats::{BoxError, ConnStats, ConnTagInfo, Role, RpcStats, RpcTagInfo};
pub use telemetry::DEFAULT_INSTRUMENTATION_NAME;
