//! Tower middleware driving a [`Handler`] from HTTP/2 gRPC traffic.
//!
//! [`MetricsLayer`] wraps anything that speaks `http::Request` /
//! `http::Response` with gRPC framing: tonic server routes on the server
//! side, a channel on the client side. The handler's role decides which body
//! counts as inbound.
//!
//! ```rust,ignore
//! let handler = Arc::new(Handler::builder(Role::Server).instrument_latency(true).build()?);
//! Server::builder()
//!     .layer(MetricsLayer::new(handler))
//!     .add_service(my_service)
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! Requests whose content type is not `application/grpc` pass through
//! untouched.

mod body;
mod frame;

pub use body::InstrumentedBody;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::ready;
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, Request, Response};
use http_body::Body;
use percent_encoding::percent_decode;
use pin_project_lite::pin_project;
use tonic::{Code, Status};
use tower::{Layer, Service};

use crate::diagnostics::Diagnostic;
use crate::handler::{Handler, StatsHandler};
use crate::stats::{BoxError, Role, RpcStats, RpcTagInfo};

const GRPC_STATUS: &str = "grpc-status";
const GRPC_MESSAGE: &str = "grpc-message";

/// Direction of a body relative to the instrumented side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn of_request(role: Role) -> Self {
        match role {
            Role::Server => Direction::Inbound,
            Role::Client => Direction::Outbound,
        }
    }

    fn of_response(role: Role) -> Self {
        match role {
            Role::Server => Direction::Outbound,
            Role::Client => Direction::Inbound,
        }
    }

    fn header_event(self) -> RpcStats {
        match self {
            Direction::Inbound => RpcStats::InHeader,
            Direction::Outbound => RpcStats::OutHeader,
        }
    }

    pub(crate) fn trailer_event(self) -> RpcStats {
        match self {
            Direction::Inbound => RpcStats::InTrailer,
            Direction::Outbound => RpcStats::OutTrailer,
        }
    }

    pub(crate) fn payload_event(self, length: usize) -> RpcStats {
        let wire_length = length.saturating_add(frame::HEADER_LEN);
        match self {
            Direction::Inbound => RpcStats::InPayload {
                length,
                wire_length,
            },
            Direction::Outbound => RpcStats::OutPayload {
                length,
                wire_length,
            },
        }
    }
}

/// One tracked attempt, shared by the response future and both bodies.
///
/// If every holder goes away before a terminal status was seen, the attempt
/// ends as cancelled.
pub(crate) struct Attempt {
    handler: Arc<Handler>,
    extensions: Extensions,
    method: String,
    begin_time: Instant,
    ended: AtomicBool,
}

impl Attempt {
    fn start(handler: Arc<Handler>, method: &str) -> Arc<Self> {
        let mut extensions = Extensions::new();
        handler.tag_rpc(&mut extensions, &RpcTagInfo::new(method));

        let begin_time = Instant::now();
        let attempt = Arc::new(Self {
            handler,
            extensions,
            method: method.to_owned(),
            begin_time,
            ended: AtomicBool::new(false),
        });
        attempt.emit(&RpcStats::Begin { begin_time });
        attempt
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn emit(&self, stats: &RpcStats) {
        self.handler.handle_rpc(&self.extensions, stats);
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.handler.diagnostics().report(diagnostic);
    }

    /// Deliver `End` unless it was already delivered.
    pub(crate) fn end(&self, error: Option<BoxError>) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.emit(&RpcStats::End {
            begin_time: self.begin_time,
            end_time: Instant::now(),
            error,
        });
    }

    pub(crate) fn end_with_status(&self, status: Status) {
        if status.code() == Code::Ok {
            self.end(None);
        } else {
            self.end(Some(Box::new(status)));
        }
    }

    /// Parse `grpc-status` from headers or trailers. `None` if absent.
    ///
    /// Only `grpc-status` and `grpc-message` are read; the maps come from the
    /// peer and `grpc-status-details-bin` plays no part in the metrics.
    pub(crate) fn status_from(&self, headers: &HeaderMap) -> Option<Status> {
        let value = headers.get(GRPC_STATUS)?;
        let code = value
            .to_str()
            .ok()
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|code| (0..=16).contains(code));
        let Some(code) = code else {
            self.report(Diagnostic::InvalidStatus {
                method: self.method.clone(),
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            });
            return Some(Status::unknown("invalid grpc-status"));
        };

        let message = headers
            .get(GRPC_MESSAGE)
            .map(|m| percent_decode(m.as_bytes()).decode_utf8_lossy().into_owned())
            .unwrap_or_default();
        Some(Status::new(Code::from_i32(code), message))
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if !self.ended.load(Ordering::Acquire) {
            self.end(Some(Box::new(Status::cancelled(
                "rpc dropped before completion",
            ))));
        }
    }
}

fn is_grpc(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct == "application/grpc"
                || ct.starts_with("application/grpc+")
                || ct.starts_with("application/grpc;")
        })
}

/// Layer that applies [`MetricsService`].
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    handler: Arc<Handler>,
}

impl MetricsLayer {
    pub fn new(handler: Arc<Handler>) -> Self {
        Self { handler }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            handler: self.handler.clone(),
        }
    }
}

/// Service produced by [`MetricsLayer`].
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    handler: Arc<Handler>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<InstrumentedBody<ReqBody>>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
    ReqBody: Body<Data = Bytes>,
    ReqBody::Error: fmt::Display,
    ResBody: Body<Data = Bytes>,
    ResBody::Error: fmt::Display,
{
    type Response = Response<InstrumentedBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !is_grpc(req.headers()) {
            return ResponseFuture {
                inner: self.inner.call(req.map(InstrumentedBody::passthrough)),
                attempt: None,
            };
        }

        let role = self.handler.role();
        let attempt = Attempt::start(self.handler.clone(), req.uri().path());
        let (mut parts, body) = req.into_parts();
        parts.extensions.extend(attempt.extensions.clone());

        let direction = Direction::of_request(role);
        attempt.emit(&direction.header_event());
        let body = InstrumentedBody::request(body, attempt.clone(), direction);

        ResponseFuture {
            inner: self.inner.call(Request::from_parts(parts, body)),
            attempt: Some(attempt),
        }
    }
}

pin_project! {
    /// Response future of [`MetricsService`].
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        attempt: Option<Arc<Attempt>>,
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: fmt::Display,
    B: Body<Data = Bytes>,
{
    type Output = Result<Response<InstrumentedBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        let Some(attempt) = this.attempt.take() else {
            return Poll::Ready(result.map(|res| res.map(InstrumentedBody::passthrough)));
        };

        Poll::Ready(match result {
            Ok(response) => {
                let direction = Direction::of_response(attempt.handler.role());
                attempt.emit(&direction.header_event());
                let header_status = attempt.status_from(response.headers());
                Ok(response
                    .map(|body| InstrumentedBody::response(body, attempt, direction, header_status)))
            }
            Err(err) => {
                attempt.end(Some(err.to_string().into()));
                Err(err)
            }
        })
    }
}
