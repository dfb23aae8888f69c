//! Raw-mode accept loop.
//!
//! # Responsibilities
//! - Accept TCP connections while the registry is running
//! - Register each session before its task starts
//! - Run handshake, user handler and stream shutdown per session
//! - Keep accepting after transient accept errors
//!
//! # Design Decisions
//! - The per-session task races the handler against the close signal, so
//!   a stop drops the stream even when the handler never returns
//! - Handler panics are caught at the session boundary and logged

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

use super::registry::{LiveSessionRegistry, SessionGuard};
use super::session::{RawSession, SessionContext, SessionHandler, SessionStream};
use crate::http::dispatcher::panic_message;

/// Upper bound on a raw-mode TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) struct RawListener {
    inner: TcpListener,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<LiveSessionRegistry>,
    handler: Arc<dyn SessionHandler>,
}

impl RawListener {
    pub(crate) fn new(
        inner: TcpListener,
        acceptor: Option<TlsAcceptor>,
        registry: Arc<LiveSessionRegistry>,
        handler: Arc<dyn SessionHandler>,
    ) -> Self {
        Self {
            inner,
            acceptor,
            registry,
            handler,
        }
    }

    /// Accept until shutdown fires or the registry closes. The listener
    /// socket is released when this returns.
    pub(crate) async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let local_addr = self.inner.local_addr().ok();
        info!(address = ?local_addr, tls = self.acceptor.is_some(), "Raw accept loop started");

        while self.registry.is_running() {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, remote)) => self.spawn_session(stream, remote),
                    Err(err) => {
                        warn!(error = %err, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        info!(address = ?local_addr, "Raw accept loop stopped");
    }

    fn spawn_session(&self, stream: TcpStream, remote: SocketAddr) {
        let context = SessionContext::new(remote);
        let Some((guard, close_rx)) = self.registry.register(&context) else {
            debug!(remote = %remote, "Registry closed, dropping connection");
            return;
        };

        tokio::spawn(serve_session(
            stream,
            context,
            self.acceptor.clone(),
            Arc::clone(&self.handler),
            guard,
            close_rx,
        ));
    }
}

async fn serve_session(
    stream: TcpStream,
    context: SessionContext,
    acceptor: Option<TlsAcceptor>,
    handler: Arc<dyn SessionHandler>,
    guard: SessionGuard,
    close_rx: oneshot::Receiver<()>,
) {
    let _guard = guard;
    let session_id = context.id();

    tokio::select! {
        _ = run_session(stream, context, acceptor, handler) => {}
        _ = close_rx => debug!(session_id = %session_id, "Session closed by server"),
    }
}

async fn run_session(
    stream: TcpStream,
    context: SessionContext,
    acceptor: Option<TlsAcceptor>,
    handler: Arc<dyn SessionHandler>,
) {
    let session_id = context.id();
    let stream = match handshake(stream, acceptor).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(session_id = %session_id, remote = %context.remote_addr(), error = %err, "TLS handshake failed");
            return;
        }
    };

    for (index, cert) in stream.peer_certificates().iter().enumerate() {
        trace!(session_id = %session_id, index, der_len = cert.len(), "Peer certificate");
    }

    let mut session = RawSession { context, stream };
    match std::panic::AssertUnwindSafe(handler.handle(&mut session))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => debug!(session_id = %session_id, "Session handler finished"),
        Ok(Err(err)) => warn!(session_id = %session_id, error = %err, "Session handler failed"),
        Err(panic) => error!(
            session_id = %session_id,
            panic = %panic_message(panic.as_ref()),
            "Session handler panicked"
        ),
    }

    let _ = session.stream.shutdown().await;
}

async fn handshake(stream: TcpStream, acceptor: Option<TlsAcceptor>) -> io::Result<SessionStream> {
    let Some(acceptor) = acceptor else {
        return Ok(SessionStream::Plain(stream));
    };

    let tls = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))??;
    Ok(SessionStream::Tls(Box::new(tls)))
}
