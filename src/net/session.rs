//! Per-connection session context and raw session streams.

use std::fmt::{self, Write as _};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::connect_info::Connected;
use futures_util::future::BoxFuture;
use rand::RngCore;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use uuid::Uuid;

/// Random bytes behind every session auth token.
pub const AUTH_TOKEN_BYTES: usize = 64;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity stamped once on an accepted connection.
#[derive(Clone)]
pub struct SessionContext {
    id: SessionId,
    remote_addr: SocketAddr,
    auth_token: Arc<str>,
}

impl SessionContext {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            remote_addr,
            auth_token: generate_secure_token(AUTH_TOKEN_BYTES).into(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl Connected<SocketAddr> for SessionContext {
    fn connect_info(remote_addr: SocketAddr) -> Self {
        Self::new(remote_addr)
    }
}

/// `len` random bytes, hex encoded.
pub fn generate_secure_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(len * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// An accepted byte stream, TLS or plain.
pub enum SessionStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SessionStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Certificates the peer presented during the handshake.
    pub fn peer_certificates(&self) -> &[CertificateDer<'static>] {
        match self {
            Self::Plain(_) => &[],
            Self::Tls(stream) => stream.get_ref().1.peer_certificates().unwrap_or_default(),
        }
    }
}

impl AsyncRead for SessionStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SessionStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A raw-mode session handed to user code.
pub struct RawSession {
    pub context: SessionContext,
    pub stream: SessionStream,
}

/// User code that owns the bytes of a raw-mode session.
///
/// The stream is shut down after `handle` returns; the server may also
/// drop it early when it stops.
pub trait SessionHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, session: &'a mut RawSession) -> BoxFuture<'a, io::Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_hex() {
        let token = generate_secure_token(AUTH_TOKEN_BYTES);
        assert_eq!(token.len(), 128);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_secure_token(AUTH_TOKEN_BYTES));
    }

    #[test]
    fn test_contexts_are_unique() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let a = SessionContext::new(addr);
        let b = <SessionContext as Connected<SocketAddr>>::connect_info(addr);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.auth_token(), b.auth_token());
        assert_eq!(b.remote_addr(), addr);
    }

    #[test]
    fn test_debug_hides_token() {
        let context = SessionContext::new("127.0.0.1:4000".parse().unwrap());
        let debug = format!("{context:?}");
        assert!(!debug.contains(context.auth_token()));
    }
}
