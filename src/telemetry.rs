//! Metric and attribute name constants.
//!
//! Names follow the OpenTelemetry RPC metrics semantic conventions
//! (<https://opentelemetry.io/docs/specs/semconv/rpc/rpc-metrics/>). Every
//! metric is prefixed with [`SERVER_PREFIX`] or [`CLIENT_PREFIX`] depending
//! on the handler's [`Role`](crate::Role).
//!
//! # Common labels
//!
//! - `rpc.system`: always `"grpc"`
//! - `rpc.grpc.status_code`: numeric gRPC status code
//! - `rpc.grpc.status`: canonical status name (e.g. `"OK"`, `"NotFound"`)
//! - `rpc.service`: service part of `/<service>/<method>`, when parseable
//! - `rpc.method`: method part of `/<service>/<method>`, when parseable

/// Default naming scope passed to the recorder as metric metadata target.
pub const DEFAULT_INSTRUMENTATION_NAME: &str = "grpcmetrics";

pub const SERVER_PREFIX: &str = "rpc.server";
pub const CLIENT_PREFIX: &str = "rpc.client";

/// Messages counted as requests per attempt. Unit: `1`.
pub const REQUESTS_PER_RPC: &str = "requests_per_rpc";

/// Messages counted as responses per attempt. Unit: `1`.
pub const RESPONSES_PER_RPC: &str = "responses_per_rpc";

/// Attempt duration in milliseconds.
pub const DURATION: &str = "duration";

/// Total request payload bytes per attempt.
pub const REQUEST_SIZE: &str = "request.size";

/// Total response payload bytes per attempt.
pub const RESPONSE_SIZE: &str = "response.size";

pub const RPC_SYSTEM: &str = "rpc.system";
pub const RPC_SYSTEM_GRPC: &str = "grpc";
pub const RPC_GRPC_STATUS_CODE: &str = "rpc.grpc.status_code";
pub const RPC_GRPC_STATUS: &str = "rpc.grpc.status";
pub const RPC_SERVICE: &str = "rpc.service";
pub const RPC_METHOD: &str = "rpc.method";

/// Join a role prefix and a metric suffix, e.g. `rpc.server.duration`.
pub fn metric_name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}.{suffix}")
}
