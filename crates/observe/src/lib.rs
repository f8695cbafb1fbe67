//! Observability bootstrap shared by every component of the ad selection
//! service: logging initialization, the global metrics registry and helpers
//! for timing futures.
pub mod config;
pub mod future;
pub mod metrics;
pub mod tracing;

pub use config::Config;
