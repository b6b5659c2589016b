//! Body wrapper that turns gRPC frames into payload events.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::ready;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tonic::Status;

use super::frame::FrameDecoder;
use super::{Attempt, Direction};
use crate::diagnostics::Diagnostic;

pin_project! {
    /// A request or response body observed by [`MetricsLayer`](super::MetricsLayer).
    ///
    /// Data and trailers are forwarded unchanged.
    pub struct InstrumentedBody<B> {
        #[pin]
        inner: B,
        tracker: Option<Tracker>,
    }
}

impl<B> InstrumentedBody<B> {
    pub(crate) fn passthrough(inner: B) -> Self {
        Self {
            inner,
            tracker: None,
        }
    }

    pub(crate) fn request(inner: B, attempt: Arc<Attempt>, direction: Direction) -> Self {
        Self {
            inner,
            tracker: Some(Tracker::new(attempt, direction, BodyKind::Request)),
        }
    }

    pub(crate) fn response(
        inner: B,
        attempt: Arc<Attempt>,
        direction: Direction,
        header_status: Option<Status>,
    ) -> Self {
        Self {
            inner,
            tracker: Some(Tracker::new(
                attempt,
                direction,
                BodyKind::Response { header_status },
            )),
        }
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: fmt::Debug> fmt::Debug for InstrumentedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedBody")
            .field("inner", &self.inner)
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}

impl<B> Body for InstrumentedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = ready!(this.inner.poll_frame(cx));

        if let Some(tracker) = this.tracker.as_mut() {
            match &polled {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        tracker.on_data(data);
                    } else if let Some(trailers) = frame.trailers_ref() {
                        tracker.on_trailers(trailers);
                    }
                }
                Some(Err(err)) => tracker.on_error(err.to_string()),
                None => tracker.on_end(),
            }
        }

        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

enum BodyKind {
    Request,
    /// `header_status` is set for trailers-only responses.
    Response { header_status: Option<Status> },
}

pub(crate) struct Tracker {
    attempt: Arc<Attempt>,
    direction: Direction,
    decoder: FrameDecoder,
    kind: BodyKind,
}

impl Tracker {
    fn new(attempt: Arc<Attempt>, direction: Direction, kind: BodyKind) -> Self {
        Self {
            attempt,
            direction,
            decoder: FrameDecoder::new(),
            kind,
        }
    }

    fn on_data(&mut self, data: &Bytes) {
        let attempt = &self.attempt;
        let direction = self.direction;
        let decoded = self
            .decoder
            .decode(data, |length| attempt.emit(&direction.payload_event(length)));
        if let Err(err) = decoded {
            attempt.report(Diagnostic::MalformedFrame {
                method: attempt.method().to_owned(),
                reason: err.to_string(),
            });
        }
    }

    fn on_trailers(&mut self, trailers: &HeaderMap) {
        // gRPC requests carry no trailers.
        if let BodyKind::Response { .. } = self.kind {
            self.check_complete();
            self.attempt.emit(&self.direction.trailer_event());
            let status = self
                .attempt
                .status_from(trailers)
                .unwrap_or_else(|| Status::unknown("missing grpc-status trailer"));
            self.attempt.end_with_status(status);
        }
    }

    fn on_error(&mut self, message: String) {
        self.attempt.report(Diagnostic::BodyError {
            method: self.attempt.method().to_owned(),
            message: message.clone(),
        });
        if let BodyKind::Response { .. } = self.kind {
            self.attempt.end(Some(message.into()));
        }
    }

    fn on_end(&mut self) {
        self.check_complete();
        if let BodyKind::Response { header_status } = &mut self.kind {
            let status = header_status
                .take()
                .unwrap_or_else(|| Status::unknown("response ended without grpc-status"));
            self.attempt.end_with_status(status);
        }
    }

    fn check_complete(&self) {
        if let Err(err) = self.decoder.finish() {
            self.attempt.report(Diagnostic::MalformedFrame {
                method: self.attempt.method().to_owned(),
                reason: err.to_string(),
            });
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // Trailers-only responses may be dropped without ever being polled
        // to the end; their status is already known from the headers.
        if let BodyKind::Response { header_status } = &mut self.kind
            && let Some(status) = header_status.take()
        {
            self.attempt.end_with_status(status);
        }
    }
}
