//! # Relay Server
//!
//! HTTP server and request orchestration for the Model Relay Gateway.
//!
//! This crate provides:
//! - Axum routes for the three inbound dialects
//!   (`/v1/chat/completions`, `/v1/responses`, `/v1/messages`)
//! - The request orchestrator: admission, failover-chain iteration,
//!   and exactly-once usage finalization
//! - The per-stream `StreamSession` accumulator and SSE assembly
//! - Graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod stream;

pub use dispatch::{admit, dispatch, Admitted, DispatchOutcome, FinalizeEnv};
pub use error::ApiError;
pub use routes::create_router;
pub use server::{Server, ServerConfig};
pub use state::{AppState, AppStateBuilder};
pub use stream::{sse_response, StreamSession};
