//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for harness logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive string
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to use ANSI colors in pretty output
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "bus-probe".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: bus-probe)
    /// - `PROBE_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `PROBE_JSON_LOGS`: Enable JSON logs (default: false, true in CI)
    /// - `NO_COLOR`: Disable ANSI colors when set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let in_ci = lookup("CI").is_some();

        Self {
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| "bus-probe".to_string()),

            log_level: lookup("PROBE_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            json_logs: lookup("PROBE_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(in_ci),

            ansi: lookup("NO_COLOR").is_none(),
        }
    }

    /// Configuration for test binaries: quiet unless asked otherwise.
    pub fn for_tests() -> Self {
        let mut config = Self::from_env();
        if env::var("PROBE_LOG_LEVEL").is_err() && env::var("RUST_LOG").is_err() {
            config.log_level = "warn".to_string();
        }
        config.service_name = "bus-probe-tests".to_string();
        config
    }
}
