//! Lock-guarded engine state.

use super::types::ServerState;
use crate::metrics;
use parking_lot::Mutex;

/// The engine's only owned mutable resource.
///
/// Every transition replaces the whole value under the lock, so readers
/// always see a consistent `{running, port}` pair.
#[derive(Debug, Default)]
pub struct SharedServerState {
    inner: Mutex<ServerState>,
}

impl SharedServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ServerState {
        *self.inner.lock()
    }

    pub fn mark_running(&self, port: u16) {
        *self.inner.lock() = ServerState {
            running: true,
            port,
        };
        metrics::set_server_running(true);
    }

    /// Keeps the last port for reporting.
    pub fn mark_stopped(&self) {
        let mut state = self.inner.lock();
        *state = ServerState {
            running: false,
            port: state.port,
        };
        metrics::set_server_running(false);
    }
}
