//! Lifecycle events delivered to a [`StatsHandler`](crate::StatsHandler).

use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Boxed, type-erased error carried by [`RpcStats::End`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Which side of the connection a handler instruments.
///
/// The role decides which direction counts as "requests": a client's sent
/// messages are its requests, a server's received messages are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_client(self) -> bool {
        matches!(self, Role::Client)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Information available when a new attempt is tagged.
#[derive(Debug, Clone)]
pub struct RpcTagInfo {
    /// Fully-qualified method name, `/<service>/<method>`.
    pub full_method_name: String,
}

impl RpcTagInfo {
    pub fn new(full_method_name: impl Into<String>) -> Self {
        Self {
            full_method_name: full_method_name.into(),
        }
    }
}

/// Information available when a connection is tagged.
#[derive(Debug, Clone, Default)]
pub struct ConnTagInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
}

/// Connection-level events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStats {
    Begin,
    End,
}

/// One event in the life of an RPC attempt.
#[derive(Debug)]
pub enum RpcStats {
    /// The attempt started.
    Begin { begin_time: Instant },
    InHeader,
    OutHeader,
    InTrailer,
    OutTrailer,
    /// A complete message was received.
    InPayload {
        /// Message length in bytes, excluding framing.
        length: usize,
        /// Bytes on the wire including the 5-byte frame prefix.
        wire_length: usize,
    },
    /// A complete message was sent.
    OutPayload { length: usize, wire_length: usize },
    /// The attempt finished. Delivered exactly once, after every payload
    /// event of the attempt.
    End {
        begin_time: Instant,
        end_time: Instant,
        /// `None` on success.
        error: Option<BoxError>,
    },
}

impl RpcStats {
    /// Build an [`RpcStats::End`] event.
    pub fn end<E>(begin_time: Instant, end_time: Instant, error: Option<E>) -> Self
    where
        E: Into<BoxError>,
    {
        RpcStats::End {
            begin_time,
            end_time,
            error: error.map(Into::into),
        }
    }

    /// Short event name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcStats::Begin { .. } => "begin",
            RpcStats::InHeader => "in_header",
            RpcStats::OutHeader => "out_header",
            RpcStats::InTrailer => "in_trailer",
            RpcStats::OutTrailer => "out_trailer",
            RpcStats::InPayload { .. } => "in_payload",
            RpcStats::OutPayload { .. } => "out_payload",
            RpcStats::End { .. } => "end",
        }
    }
}
