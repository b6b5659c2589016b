//! Handler options.
//!
//! Options can be set in code through [`HandlerBuilder`](crate::HandlerBuilder)
//! or loaded from TOML:
//!
//! ```toml
//! instrumentation_name = "my-service"
//! instrument_sizes = true
//! instrument_latency = true
//! ```
//!
//! Every field is optional; unset fields keep their defaults.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::telemetry::DEFAULT_INSTRUMENTATION_NAME;
use crate::{GrpcMetricsError, Result};

/// Serializable handler options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsOptions {
    /// Naming scope for created instruments (default: `grpcmetrics`).
    pub instrumentation_name: String,
    /// Record `request.size` and `response.size` histograms (default: off).
    ///
    /// Histograms are comparatively costly for the backend.
    pub instrument_sizes: bool,
    /// Record the `duration` histogram (default: off).
    pub instrument_latency: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            instrumentation_name: DEFAULT_INSTRUMENTATION_NAME.to_string(),
            instrument_sizes: false,
            instrument_latency: false,
        }
    }
}

impl MetricsOptions {
    /// Parse options from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content).map_err(|e| {
            GrpcMetricsError::Configuration(format!("Failed to parse metrics options: {e}"))
        })?;
        Ok(options.normalized())
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GrpcMetricsError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let options: Self = toml::from_str(&content).map_err(|e| {
            GrpcMetricsError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        Ok(options.normalized())
    }

    /// Replace an empty naming scope with the default.
    pub(crate) fn normalized(mut self) -> Self {
        if self.instrumentation_name.is_empty() {
            self.instrumentation_name = DEFAULT_INSTRUMENTATION_NAME.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = MetricsOptions::default();
        assert_eq!(options.instrumentation_name, "grpcmetrics");
        assert!(!options.instrument_sizes);
        assert!(!options.instrument_latency);
    }

    #[test]
    fn parse_empty() {
        assert_eq!(
            MetricsOptions::from_toml("").unwrap(),
            MetricsOptions::default()
        );
    }

    #[test]
    fn parse_full() {
        let toml = r#"
            instrumentation_name = "orders"
            instrument_sizes = true
            instrument_latency = true
        "#;
        let options = MetricsOptions::from_toml(toml).unwrap();
        assert_eq!(options.instrumentation_name, "orders");
        assert!(options.instrument_sizes);
        assert!(options.instrument_latency);
    }

    #[test]
    fn empty_name_falls_back_to_default() {
        let options = MetricsOptions::from_toml(r#"instrumentation_name = """#).unwrap();
        assert_eq!(options.instrumentation_name, DEFAULT_INSTRUMENTATION_NAME);
    }

    #[test]
    fn wrong_type_is_a_configuration_error() {
        let err = MetricsOptions::from_toml("instrument_sizes = \"yes\"").unwrap_err();
        assert!(matches!(err, GrpcMetricsError::Configuration(_)));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = MetricsOptions::load(Path::new("/nonexistent/metrics.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
