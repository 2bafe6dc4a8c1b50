//! # Bus Probe Test Suite
//!
//! Unified test crate exercising the harness end to end against the
//! in-memory broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs      # Identity flows observed through the harness
//!     └── races.rs      # Match/deadline/trigger races and resource release
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p probe-tests
//! cargo test -p probe-tests integration::races
//! ```

pub mod integration;
