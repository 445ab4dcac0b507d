//! # Relay Providers
//!
//! Upstream provider adapters for the Model Relay Gateway.
//!
//! Every provider in the fleet speaks an OpenAI-compatible chat API, so a
//! single HTTP adapter parameterized by endpoint, credentials and timeout
//! covers all of them. The registry maps provider names to adapters; the
//! orchestrator looks adapters up there and nowhere else.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod http;
pub mod registry;

pub use http::{HttpProvider, HttpProviderConfig};
pub use registry::ProviderRegistry;
