//! Live session bookkeeping for raw mode.
//!
//! The running flag and the session map sit behind one mutex, so an insert
//! from the accept loop can never interleave with the bulk close on stop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use super::session::{SessionContext, SessionId};
use crate::observability::metrics;

#[derive(Default)]
struct RegistryState {
    running: bool,
    sessions: HashMap<SessionId, oneshot::Sender<()>>,
}

/// Sessions currently accepted by a raw-mode server.
#[derive(Default)]
pub struct LiveSessionRegistry {
    state: Mutex<RegistryState>,
}

impl LiveSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn open(&self) {
        self.lock().running = true;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add an accepted session. Refused once the registry is closed.
    ///
    /// The guard unregisters on drop; the receiver fires when the server
    /// closes the session.
    pub(crate) fn register(
        self: &Arc<Self>,
        context: &SessionContext,
    ) -> Option<(SessionGuard, oneshot::Receiver<()>)> {
        let (close_tx, close_rx) = oneshot::channel();
        {
            let mut state = self.lock();
            if !state.running {
                return None;
            }
            state.sessions.insert(context.id(), close_tx);
        }
        metrics::record_session_opened();
        debug!(session_id = %context.id(), remote = %context.remote_addr(), "Session registered");

        let guard = SessionGuard {
            registry: Arc::clone(self),
            id: context.id(),
        };
        Some((guard, close_rx))
    }

    fn remove(&self, id: SessionId) {
        if self.lock().sessions.remove(&id).is_some() {
            metrics::record_session_closed();
            debug!(session_id = %id, "Session unregistered");
        }
    }

    /// Stop admitting sessions and signal every live one to close.
    pub(crate) fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.running = false;
            state.sessions.drain().collect()
        };
        let closed = drained.len();
        for (_, close_tx) in drained {
            let _ = close_tx.send(());
            metrics::record_session_closed();
        }
        closed
    }
}

/// Unregisters its session when dropped, panics included.
pub(crate) struct SessionGuard {
    registry: Arc<LiveSessionRegistry>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn context() -> SessionContext {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        SessionContext::new(addr)
    }

    #[test]
    fn test_closed_registry_refuses() {
        let registry = Arc::new(LiveSessionRegistry::new());
        assert!(registry.register(&context()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_unregisters() {
        let registry = Arc::new(LiveSessionRegistry::new());
        registry.open();

        let (guard, _close_rx) = registry.register(&context()).unwrap();
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_runs_on_panic() {
        let registry = Arc::new(LiveSessionRegistry::new());
        registry.open();
        let (guard, _close_rx) = registry.register(&context()).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_signals_sessions() {
        let registry = Arc::new(LiveSessionRegistry::new());
        registry.open();
        let (_first, first_rx) = registry.register(&context()).unwrap();
        let (_second, second_rx) = registry.register(&context()).unwrap();

        assert_eq!(registry.close_all(), 2);
        assert!(!registry.is_running());
        assert!(registry.is_empty());
        assert!(first_rx.await.is_ok());
        assert!(second_rx.await.is_ok());
        assert!(registry.register(&context()).is_none());
    }
}
