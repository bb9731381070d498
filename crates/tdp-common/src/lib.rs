//! TDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the TDP workspace. Currently this is the
//! logging layer: every binary and test harness in the workspace initializes
//! `tracing` through [`logging::init_logging`] so that output targets,
//! formats, and filter directives are configured in one place.

pub mod logging;

// Re-export commonly used types
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
