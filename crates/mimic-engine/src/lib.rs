// Library exports for the binary and integration tests

// ===== Engine core =====
pub mod config;
pub mod engine;
pub mod listener;
pub mod pipeline;
pub mod services;

// ===== Operator surfaces =====
pub mod admin_api;
pub mod metrics;

pub use engine::{MockServerEngine, ServerShutdownError, ServerStartError, ServerState};
