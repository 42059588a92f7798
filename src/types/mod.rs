//! Core types for the router.
//!
//! This module provides foundational types used throughout the system:
//! - **Errors**: Application error types with thiserror derives, plus the
//!   `Failure` carrier that keeps the triggering envelope
//! - **Config**: Destination names, function client, engine and logging settings

mod config;
mod errors;

pub use config::{Config, Destinations, EngineConfig, FunctionConfig, ObservabilityConfig};
pub use errors::{Error, Failure, FailureKind, Result};
