//! Metrics module
//!
//! Provides Prometheus instrumentation for the ranking service.

mod registry;

pub use registry::ServiceMetrics;
