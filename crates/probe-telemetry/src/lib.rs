//! # Probe Telemetry
//!
//! Structured logging for harness runs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use probe_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//!     // Harness calls now log bootstrap attempts, matches and timeouts
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PROBE_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `PROBE_JSON_LOGS` | `false` (`true` when `CI` is set) | JSON output |
//! | `OTEL_SERVICE_NAME` | `bus-probe` | Service name |
//! | `NO_COLOR` | unset | Disable ANSI colors |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Best-effort logging for test binaries.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = init_logging(&TelemetryConfig::for_tests());
}
