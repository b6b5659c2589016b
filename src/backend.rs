//! Metrics backend built on the `metrics` facade.
//!
//! A [`MetricsBackend`] either wraps an injected [`Recorder`] or, via
//! [`MetricsBackend::global`], resolves the process-wide recorder at record
//! time (`metrics::with_recorder`: thread-local recorder if one is
//! installed, else the global one, else a no-op).
//!
//! The facade itself never rejects a registration, so the backend keeps a
//! small table of instruments it has created per naming scope and refuses a
//! name that is reused with a different kind or unit.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use metrics::{Key, KeyName, Level, Metadata, Recorder, SharedString, Unit};

use crate::attributes::Attributes;
use crate::{GrpcMetricsError, Result};

/// Kind and unit of a registered instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter(Unit),
    Histogram(Unit),
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Counter(unit) => write!(f, "counter ({})", unit.as_str()),
            InstrumentKind::Histogram(unit) => write!(f, "histogram ({})", unit.as_str()),
        }
    }
}

struct Inner {
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
    instruments: Mutex<HashMap<(String, String), InstrumentKind>>,
}

/// Handle to a metrics recorder. Cheap to clone.
#[derive(Clone)]
pub struct MetricsBackend {
    inner: Arc<Inner>,
}

impl fmt::Debug for MetricsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsBackend")
            .field("global", &self.inner.recorder.is_none())
            .finish_non_exhaustive()
    }
}

impl MetricsBackend {
    /// Backend that records into the given recorder.
    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(recorder))
    }

    /// Backend sharing an already reference-counted recorder.
    pub fn from_arc(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self::with_inner(Some(recorder))
    }

    /// The process-wide backend.
    ///
    /// Every call returns a handle to the same backend, so instrument
    /// conflicts are detected across all handlers that use it.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<MetricsBackend> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::with_inner(None)).clone()
    }

    fn with_inner(recorder: Option<Arc<dyn Recorder + Send + Sync>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                recorder,
                instruments: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn is_global(&self) -> bool {
        self.inner.recorder.is_none()
    }

    fn with_recorder<T>(&self, f: impl FnOnce(&dyn Recorder) -> T) -> T {
        match &self.inner.recorder {
            Some(recorder) => f(recorder.as_ref()),
            None => metrics::with_recorder(f),
        }
    }

    fn register(&self, scope: &str, name: &str, requested: InstrumentKind) -> Result<()> {
        let mut instruments = self
            .inner
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let key = (scope.to_owned(), name.to_owned());
        match instruments.get(&key) {
            Some(&existing) if existing != requested => Err(GrpcMetricsError::InstrumentConflict {
                name: name.to_owned(),
                existing,
                requested,
            }),
            Some(_) => Ok(()),
            None => {
                instruments.insert(key, requested);
                Ok(())
            }
        }
    }

    /// Create a monotonic counter.
    pub fn counter(
        &self,
        scope: &str,
        name: impl Into<String>,
        unit: Unit,
        description: &'static str,
    ) -> Result<Counter> {
        let name = name.into();
        self.register(scope, &name, InstrumentKind::Counter(unit))?;
        self.with_recorder(|recorder| {
            recorder.describe_counter(
                KeyName::from(name.clone()),
                Some(unit),
                SharedString::const_str(description),
            )
        });
        Ok(Counter {
            name: KeyName::from(name),
            scope: scope.into(),
            backend: self.clone(),
        })
    }

    /// Create a histogram.
    pub fn histogram(
        &self,
        scope: &str,
        name: impl Into<String>,
        unit: Unit,
        description: &'static str,
    ) -> Result<Histogram> {
        let name = name.into();
        self.register(scope, &name, InstrumentKind::Histogram(unit))?;
        self.with_recorder(|recorder| {
            recorder.describe_histogram(
                KeyName::from(name.clone()),
                Some(unit),
                SharedString::const_str(description),
            )
        });
        Ok(Histogram {
            name: KeyName::from(name),
            scope: scope.into(),
            backend: self.clone(),
        })
    }
}

/// A monotonic counter created by [`MetricsBackend::counter`].
#[derive(Clone)]
pub struct Counter {
    name: KeyName,
    scope: Arc<str>,
    backend: MetricsBackend,
}

impl Counter {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Add `value` under the given attributes.
    pub fn add(&self, value: u64, attributes: &Attributes) {
        let key = Key::from_parts(self.name.clone(), attributes.to_labels());
        let metadata = Metadata::new(&self.scope, Level::INFO, Some(module_path!()));
        self.backend
            .with_recorder(|recorder| recorder.register_counter(&key, &metadata).increment(value));
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.name.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

/// A histogram created by [`MetricsBackend::histogram`].
#[derive(Clone)]
pub struct Histogram {
    name: KeyName,
    scope: Arc<str>,
    backend: MetricsBackend,
}

impl Histogram {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Record one sample under the given attributes.
    pub fn record(&self, value: f64, attributes: &Attributes) {
        let key = Key::from_parts(self.name.clone(), attributes.to_labels());
        let metadata = Metadata::new(&self.scope, Level::INFO, Some(module_path!()));
        self.backend
            .with_recorder(|recorder| recorder.register_histogram(&key, &metadata).record(value));
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("name", &self.name.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}
