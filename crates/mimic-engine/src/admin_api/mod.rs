//! Admin REST API for the mock server.
//!
//! This module provides:
//! - Health, state and Prometheus metrics endpoints
//! - Start, stop and restart of the mock server
//! - The `/liveLogging` WebSocket feed of live traffic events
//!
//! The API listens on a configurable port (default: 8000).

mod handlers;
mod router;
mod server;
mod types;

pub use server::{AdminApiServer, AdminState};
