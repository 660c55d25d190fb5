//! Analyzer configuration.
//!
//! Configuration can be built in code with [`AnalyzerConfig::builder`] or
//! loaded from YAML/JSON. Missing fields take their defaults, and
//! `QFOLD_*` environment variables can override a loaded configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostic::Severity;

/// What to do after a fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Keep going and report every diagnostic.
    #[default]
    CollectAll,
    /// Stop at the first diagnostic at or above `fatal_severity`.
    FailFast,
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Collect-all or fail-fast.
    pub error_mode: ErrorMode,
    /// Severity from which a diagnostic counts as fatal.
    pub fatal_severity: Severity,
    /// Cap on iterations of a single loop.
    pub max_loop_iterations: usize,
    /// Tolerance of the unitary check.
    pub unitary_tolerance: f64,
    /// Gates that are validated but kept as calls instead of expanded.
    pub external_gates: Vec<String>,
    /// Number of qubits the target device provides.
    pub device_qubits: Option<u32>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::CollectAll,
            fatal_severity: Severity::Error,
            max_loop_iterations: 1_000_000,
            unitary_tolerance: 1e-8,
            external_gates: Vec::new(),
            device_qubits: None,
        }
    }
}

impl AnalyzerConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::new()
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(source: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_yaml_ng::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML or JSON file, chosen by extension.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Apply `QFOLD_MAX_LOOP_ITERATIONS`, `QFOLD_UNITARY_TOLERANCE`,
    /// `QFOLD_DEVICE_QUBITS` and `QFOLD_FAIL_FAST` when set.
    #[must_use]
    pub fn merge_env(mut self) -> Self {
        if let Some(v) = env_parse("QFOLD_MAX_LOOP_ITERATIONS") {
            self.max_loop_iterations = v;
        }
        if let Some(v) = env_parse("QFOLD_UNITARY_TOLERANCE") {
            self.unitary_tolerance = v;
        }
        if let Some(v) = env_parse("QFOLD_DEVICE_QUBITS") {
            self.device_qubits = Some(v);
        }
        if let Some(fail_fast) = env_parse::<bool>("QFOLD_FAIL_FAST") {
            self.error_mode = if fail_fast {
                ErrorMode::FailFast
            } else {
                ErrorMode::CollectAll
            };
        }
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_loop_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_loop_iterations must be at least 1".into(),
            ));
        }
        if !(self.unitary_tolerance.is_finite() && self.unitary_tolerance > 0.0) {
            return Err(ConfigError::Validation(format!(
                "unitary_tolerance must be a positive number, got {}",
                self.unitary_tolerance
            )));
        }
        if self.device_qubits == Some(0) {
            return Err(ConfigError::Validation(
                "device_qubits must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether `name` is listed as an external gate.
    pub fn is_external(&self, name: &str) -> bool {
        self.external_gates.iter().any(|g| g == name)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Fluent builder for [`AnalyzerConfig`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error mode.
    #[must_use]
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.config.error_mode = mode;
        self
    }

    /// Set the fatal severity threshold.
    #[must_use]
    pub fn with_fatal_severity(mut self, severity: Severity) -> Self {
        self.config.fatal_severity = severity;
        self
    }

    /// Set the loop iteration cap (at least 1).
    #[must_use]
    pub fn with_max_loop_iterations(mut self, max: usize) -> Self {
        self.config.max_loop_iterations = max.max(1);
        self
    }

    /// Set the unitary-check tolerance.
    #[must_use]
    pub fn with_unitary_tolerance(mut self, tolerance: f64) -> Self {
        self.config.unitary_tolerance = tolerance;
        self
    }

    /// Keep these gates unexpanded.
    #[must_use]
    pub fn with_external_gates<I, S>(mut self, gates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.external_gates = gates.into_iter().map(Into::into).collect();
        self
    }

    /// Limit the total number of declared qubits.
    #[must_use]
    pub fn with_device_qubits(mut self, qubits: u32) -> Self {
        self.config.device_qubits = Some(qubits);
        self
    }

    /// Finish, validating the result.
    pub fn build(self) -> ConfigResult<AnalyzerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.error_mode, ErrorMode::CollectAll);
        assert_eq!(config.fatal_severity, Severity::Error);
        assert_eq!(config.max_loop_iterations, 1_000_000);
        assert!((config.unitary_tolerance - 1e-8).abs() < f64::EPSILON);
        assert!(config.device_qubits.is_none());
    }

    #[test]
    fn test_builder() {
        let config = AnalyzerConfig::builder()
            .with_error_mode(ErrorMode::FailFast)
            .with_max_loop_iterations(10)
            .with_external_gates(["my_gate"])
            .with_device_qubits(5)
            .build()
            .unwrap();
        assert_eq!(config.error_mode, ErrorMode::FailFast);
        assert_eq!(config.max_loop_iterations, 10);
        assert!(config.is_external("my_gate"));
        assert_eq!(config.device_qubits, Some(5));
    }

    #[test]
    fn test_yaml_partial() {
        let config = AnalyzerConfig::from_yaml_str(
            "error_mode: fail-fast\nfatal_severity: warning\nexternal_gates: [rzz_custom]\n",
        )
        .unwrap();
        assert_eq!(config.error_mode, ErrorMode::FailFast);
        assert_eq!(config.fatal_severity, Severity::Warning);
        assert_eq!(config.max_loop_iterations, 1_000_000);
        assert_eq!(config.external_gates, vec!["rzz_custom"]);
    }

    #[test]
    fn test_json() {
        let config =
            AnalyzerConfig::from_json_str(r#"{"max_loop_iterations": 5, "device_qubits": 3}"#)
                .unwrap();
        assert_eq!(config.max_loop_iterations, 5);
        assert_eq!(config.device_qubits, Some(3));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            AnalyzerConfig::from_json_str(r#"{"unitary_tolerance": -1.0}"#),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_yaml_str("max_loop_iterations: [1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
