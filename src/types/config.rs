//! Configuration structures.
//!
//! Configuration is loaded once at startup from a JSON file and environment
//! variables, then shared read-only with every worker.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, FailureKind, Result};

/// Global router configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logical destination names.
    #[serde(default)]
    pub destinations: Destinations,

    /// Compute function client configuration.
    #[serde(default)]
    pub function: FunctionConfig,

    /// Dispatch engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Named destinations the engine refers to by role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Destinations {
    /// Where inbound envelopes are consumed from.
    pub default_input: String,

    /// Where envelopes with an empty routing slip go.
    pub default_output: String,

    /// Sink for invocation and runtime failures.
    pub dead_letter: String,

    /// Sink for function results that cannot be decoded.
    pub invalid_message: String,

    /// Diagnostic sink for suppressed test traffic.
    pub filtered_test_messages: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            default_input: "input".to_string(),
            default_output: "output".to_string(),
            dead_letter: "dead-letter".to_string(),
            invalid_message: "invalid-message".to_string(),
            filtered_test_messages: "filtered-test-messages".to_string(),
        }
    }
}

impl Destinations {
    /// Error destination for a failure kind.
    pub fn for_failure(&self, kind: FailureKind) -> &str {
        match kind {
            FailureKind::InvalidMessage => &self.invalid_message,
            FailureKind::DeadLetter => &self.dead_letter,
        }
    }
}

/// Compute function client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    /// Endpoint the HTTP function client posts envelopes to.
    pub url: Option<String>,

    /// Per-invocation timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Dispatch engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum inbound envelopes processed concurrently.
    pub max_in_flight: usize,

    /// `source` attribute stamped on error envelopes.
    pub source_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            source_name: "slip-router".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Apply `SLIP_*` environment variable overrides.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let names = &mut self.destinations;
        for (key, slot) in [
            ("SLIP_DEFAULT_INPUT", &mut names.default_input),
            ("SLIP_DEFAULT_OUTPUT", &mut names.default_output),
            ("SLIP_DEAD_LETTER", &mut names.dead_letter),
            ("SLIP_INVALID_MESSAGE", &mut names.invalid_message),
            ("SLIP_FILTERED_TEST_MESSAGES", &mut names.filtered_test_messages),
        ] {
            if let Some(value) = var(key) {
                *slot = value;
            }
        }

        if let Some(url) = var("SLIP_FUNCTION_URL") {
            self.function.url = Some(url);
        }

        if let Some(raw) = var("SLIP_MAX_IN_FLIGHT") {
            self.engine.max_in_flight = raw
                .parse()
                .map_err(|_| Error::config(format!("SLIP_MAX_IN_FLIGHT is not a number: {}", raw)))?;
        }

        Ok(self)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let names = &self.destinations;
        for (field, value) in [
            ("destinations.default_input", &names.default_input),
            ("destinations.default_output", &names.default_output),
            ("destinations.dead_letter", &names.dead_letter),
            ("destinations.invalid_message", &names.invalid_message),
            ("destinations.filtered_test_messages", &names.filtered_test_messages),
            ("engine.source_name", &self.engine.source_name),
        ] {
            if value.is_empty() {
                return Err(Error::config(format!("{} cannot be empty", field)));
            }
        }

        if self.engine.max_in_flight == 0 {
            return Err(Error::config("engine.max_in_flight must be positive"));
        }

        Ok(())
    }
}
