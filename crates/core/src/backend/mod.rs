//! Step backend abstraction.
//!
//! This module provides a `JobBackend` trait for the three remote calls the
//! orchestrator consumes (start, status, cancel), with an HTTP
//! implementation for the real enrichment service.

mod http;
mod types;

pub use http::HttpBackend;
pub use types::*;
