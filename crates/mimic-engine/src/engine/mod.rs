//! Mock serving engine.
//!
//! # Module Structure
//!
//! - `lifecycle` - `MockServerEngine`: start, shutdown and state reset
//! - `state` - Lock-guarded `{running, port}` state
//! - `types` - State snapshot and lifecycle error types

mod lifecycle;
mod state;
mod types;


pub use lifecycle::{MockServerEngine, MockServerEngineBuilder, READINESS_TIMEOUT, TEARDOWN_GRACE};
pub use state::SharedServerState;
pub use types::{ServerShutdownError, ServerStartError, ServerState};
