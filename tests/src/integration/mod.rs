//! Cross-crate harness scenarios.

pub mod fixtures;
pub mod flows;
pub mod races;
