//! Raw-mode sessions: TLS handshake, user handler, registry bookkeeping.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tls_rest::config::TransportMode;
use tls_rest::{RawSession, RestServer, SessionHandler, TlsFactory};

mod common;

/// Echoes one read, then tags the session with its auth token length.
struct EchoOnce;

impl SessionHandler for EchoOnce {
    fn handle<'a>(&'a self, session: &'a mut RawSession) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let mut buf = [0u8; 64];
            let n = session.stream.read(&mut buf).await?;
            session.stream.write_all(&buf[..n]).await?;
            let tag = format!(" tls={} token={}", session.stream.is_tls(), session.context.auth_token().len());
            session.stream.write_all(tag.as_bytes()).await?;
            Ok(())
        })
    }
}

/// Holds the session open until the server closes it.
struct Park;

impl SessionHandler for Park {
    fn handle<'a>(&'a self, _session: &'a mut RawSession) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(std::future::pending())
    }
}

struct Explode;

impl SessionHandler for Explode {
    fn handle<'a>(&'a self, _session: &'a mut RawSession) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async {
            if true {
                panic!("session handler exploded");
            }
            Ok(())
        })
    }
}

async fn tls_connect(addr: SocketAddr) -> TlsStream<TcpStream> {
    let config = TlsFactory::default()
        .client_config(&common::client_material())
        .unwrap();
    let tcp = TcpStream::connect(addr).await.unwrap();
    TlsConnector::from(config)
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap()
}

async fn wait_for_sessions(server: &RestServer, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.live_sessions() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} live sessions, have {}", server.live_sessions()));
}

#[tokio::test]
async fn test_tls_echo_and_registry_drains() {
    let server = RestServer::raw(EchoOnce);
    let addr = common::start_tls(&server);
    let mode = server.mode().unwrap();
    assert_eq!(mode.transport, TransportMode::Raw);
    assert!(mode.tls);

    let mut stream = tls_connect(addr).await;
    stream.write_all(b"ping").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "ping tls=true token=128");

    wait_for_sessions(&server, 0).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_plain_echo() {
    let server = RestServer::raw(EchoOnce);
    let addr = common::start_plain(&server);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"hi").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "hi tls=false token=128");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_live_sessions() {
    let server = RestServer::raw(Park);
    let addr = common::start_tls(&server);

    let mut first = tls_connect(addr).await;
    let mut second = tls_connect(addr).await;
    wait_for_sessions(&server, 2).await;

    server.stop().await.unwrap();
    assert_eq!(server.live_sessions(), 0);
    assert!(!server.is_running());

    let mut buf = [0u8; 8];
    for stream in [&mut first, &mut second] {
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_panicking_handler_unregisters() {
    let server = Arc::new(RestServer::raw(Explode));
    let addr = common::start_plain(&server);

    for _ in 0..3 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
    }

    wait_for_sessions(&server, 0).await;
    assert!(server.is_running());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_handshake_does_not_leak() {
    let server = RestServer::raw(EchoOnce);
    let addr = common::start_tls(&server);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;

    wait_for_sessions(&server, 0).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_raw_restart() {
    let server = RestServer::raw(EchoOnce);
    common::start_plain(&server);
    server.stop().await.unwrap();

    let addr = common::start_plain(&server);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"again").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert!(reply.starts_with("again"));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_during_pending_stop_keeps_new_run() {
    let server = RestServer::raw(EchoOnce);
    common::start_plain(&server);

    let stop = server.stop();
    tokio::pin!(stop);
    let _ = futures_util::poll!(&mut stop);

    let addr = common::start_plain(&server);
    stop.await.unwrap();

    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(addr));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "ping tls=false token=128");

    wait_for_sessions(&server, 0).await;
    server.stop().await.unwrap();
    assert!(!server.is_running());
}
