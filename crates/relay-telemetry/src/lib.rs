//! # Relay Telemetry
//!
//! Logging setup and cost accounting for the Model Relay Gateway.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod tracing_setup;

pub use cost::{ModelPricing, PricingTable};
pub use tracing_setup::{init_logging, LoggingConfig, TelemetryError};
