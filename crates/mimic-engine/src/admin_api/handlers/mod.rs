//! Admin API request handlers.

pub mod lifecycle;
pub mod live_logging;
pub mod system;
