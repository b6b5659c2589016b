//! Attribute derivation for completed attempts.
//!
//! Maps a completion error and a fully-qualified method name onto the
//! ordered label set attached to every measurement. Derivation is pure: the
//! same inputs always produce the same [`Attributes`].

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use metrics::Label;
use tonic::{Code, Status};

use crate::telemetry;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(Cow<'static, str>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
        }
    }
}

/// A key/value attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: &'static str,
    pub value: Value,
}

impl KeyValue {
    pub fn int(key: &'static str, value: i64) -> Self {
        Self {
            key,
            value: Value::Int(value),
        }
    }

    pub fn string(key: &'static str, value: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key,
            value: Value::Str(value.into()),
        }
    }
}

/// Ordered attribute set for one completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes(Vec<KeyValue>);

impl Attributes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up an attribute value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|kv| kv.key == key).map(|kv| &kv.value)
    }

    /// Convert to `metrics` labels, stringifying numeric values.
    pub fn to_labels(&self) -> Vec<Label> {
        self.0
            .iter()
            .map(|kv| Label::new(kv.key, kv.value.to_string()))
            .collect()
    }
}

impl From<Vec<KeyValue>> for Attributes {
    fn from(values: Vec<KeyValue>) -> Self {
        Self(values)
    }
}

/// Resolve the gRPC status of a completed attempt.
///
/// `None` is OK. A [`Status`] anywhere in the error's source chain is used
/// as-is; any other error becomes `Internal` carrying the error's text.
pub fn rpc_status(error: Option<&(dyn Error + 'static)>) -> Status {
    let Some(error) = error else {
        return Status::new(Code::Ok, "OK");
    };

    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(status) = err.downcast_ref::<Status>() {
            return status.clone();
        }
        current = err.source();
    }

    Status::new(Code::Internal, error.to_string())
}

/// Canonical gRPC name of a status code.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Split `/<service>/<method>` into its parts.
///
/// Both parts must be non-empty and the method part must not contain a
/// further `/`.
pub fn split_method_name(full_method_name: &str) -> Option<(&str, &str)> {
    let rest = full_method_name.strip_prefix('/')?;
    let (service, method) = rest.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

/// Derive the attribute set for a completed attempt.
pub fn attributes(full_method_name: &str, error: Option<&(dyn Error + 'static)>) -> Attributes {
    let status = rpc_status(error);
    let code = status.code();

    let mut attrs = Vec::with_capacity(5);
    attrs.push(KeyValue::string(
        telemetry::RPC_SYSTEM,
        telemetry::RPC_SYSTEM_GRPC,
    ));
    attrs.push(KeyValue::int(telemetry::RPC_GRPC_STATUS_CODE, code as i64));
    attrs.push(KeyValue::string(telemetry::RPC_GRPC_STATUS, code_name(code)));

    if let Some((service, method)) = split_method_name(full_method_name) {
        attrs.push(KeyValue::string(telemetry::RPC_SERVICE, service.to_owned()));
        attrs.push(KeyValue::string(telemetry::RPC_METHOD, method.to_owned()));
    }

    Attributes(attrs)
}
