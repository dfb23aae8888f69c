//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Own the route table and codec registry shared with the dispatcher
//! - Bind synchronously, then serve in background tasks
//! - Managed mode: axum router on axum-server (hyper), TLS via rustls
//! - Raw mode: own accept loop handing sessions to a `SessionHandler`
//! - Stop / graceful shutdown, both idempotent
//!
//! # Design Decisions
//! - The mode (managed or raw, TLS or plain) is fixed at start
//! - A failed start leaves the server stopped, nothing is retried
//! - Session context is built once per connection and stamped on
//!   every request of that connection

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Request};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use super::request::with_request_ids;
use crate::codec::{CodecRegistry, MediaType};
use crate::config::{ServiceConfig, TimeoutConfig, TransportMode};
use crate::handler::{Action, DataStream, Handler};
use crate::lifecycle::Shutdown;
use crate::net::connection::TimeoutAcceptor;
use crate::net::listener::{RawListener, TLS_HANDSHAKE_TIMEOUT};
use crate::net::registry::LiveSessionRegistry;
use crate::net::session::{SessionContext, SessionHandler};
use crate::net::tls::{ConfigurationError, TlsFactory, TlsMaterial};
use crate::routing::RouteTable;

/// Sent on every TLS response.
pub const HSTS_VALUE: &str = "max-age=63072000; includeSubDomains";

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Managed-mode connection timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    pub header_read: Duration,
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for ServerTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            header_read: Duration::from_secs(config.header_read_secs),
            read: Duration::from_secs(config.read_secs),
            write: Duration::from_secs(config.write_secs),
            idle: Duration::from_secs(config.idle_secs),
        }
    }
}

/// Transport and security fixed by the start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerMode {
    pub transport: TransportMode,
    pub tls: bool,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = match self.transport {
            TransportMode::Managed => "managed",
            TransportMode::Raw => "raw",
        };
        let security = if self.tls { "TLS" } else { "plain" };
        write!(f, "{transport}/{security}")
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already running in {mode} mode")]
    AlreadyRunning { mode: ServerMode },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] ConfigurationError),

    #[error("no Tokio runtime available to run the server")]
    NoRuntime,

    #[error("server task failed: {0}")]
    Task(String),

    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

enum Running {
    Managed {
        handle: Handle,
        task: JoinHandle<io::Result<()>>,
    },
    Raw {
        shutdown: Shutdown,
        task: JoinHandle<()>,
        sessions: Arc<LiveSessionRegistry>,
    },
}

impl Running {
    /// Signal the run to stop without waiting for it.
    fn abandon(self) {
        match self {
            Running::Managed { handle, .. } => handle.shutdown(),
            Running::Raw { shutdown, sessions, .. } => {
                shutdown.trigger();
                sessions.close_all();
            }
        }
    }
}

struct Active {
    mode: ServerMode,
    local_addr: SocketAddr,
    generation: u64,
    running: Running,
}

/// Generation of the live run, `None` when stopped.
type RunState = watch::Sender<Option<u64>>;

/// A path-routed REST server, managed or raw.
pub struct RestServer {
    routes: Arc<RouteTable>,
    codecs: Arc<CodecRegistry>,
    tls: TlsFactory,
    timeouts: ServerTimeouts,
    max_body_bytes: usize,
    session_handler: Option<Arc<dyn SessionHandler>>,
    active: Mutex<Option<Active>>,
    running: Arc<RunState>,
    generations: AtomicU64,
}

impl Default for RestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RestServer {
    /// A managed-mode server with the built-in codecs.
    pub fn new() -> Self {
        let (running, _) = watch::channel(None);
        Self {
            routes: Arc::new(RouteTable::new()),
            codecs: Arc::new(CodecRegistry::new()),
            tls: TlsFactory::default(),
            timeouts: ServerTimeouts::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            session_handler: None,
            active: Mutex::new(None),
            running: Arc::new(running),
            generations: AtomicU64::new(0),
        }
    }

    /// A raw-mode server handing every session to `handler`.
    pub fn raw(handler: impl SessionHandler) -> Self {
        Self::new().with_session_handler(handler)
    }

    /// Timeouts and limits from a service configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new()
            .with_timeouts(ServerTimeouts::from(&config.timeouts))
            .with_max_body_bytes(config.limits.max_body_bytes)
    }

    pub fn with_session_handler(mut self, handler: impl SessionHandler) -> Self {
        self.session_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_tls_factory(mut self, factory: TlsFactory) -> Self {
        self.tls = factory;
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Register a route. False when the path is taken or `methods` is empty.
    pub fn register(
        &self,
        path: &str,
        methods: impl IntoIterator<Item = axum::http::Method>,
        consumes: MediaType,
        produces: MediaType,
        handler: Handler,
    ) -> bool {
        self.routes.register(path, methods, consumes, produces, handler)
    }

    pub fn add_action(
        &self,
        path: &str,
        methods: impl IntoIterator<Item = axum::http::Method>,
        consumes: MediaType,
        produces: MediaType,
        action: impl Action,
        self_answered: bool,
    ) -> bool {
        self.register(path, methods, consumes, produces, Handler::action(action, self_answered))
    }

    pub fn add_stream(
        &self,
        path: &str,
        methods: impl IntoIterator<Item = axum::http::Method>,
        consumes: MediaType,
        produces: MediaType,
        stream: impl DataStream,
    ) -> bool {
        self.register(path, methods, consumes, produces, Handler::stream(stream))
    }

    /// Register `/`.
    pub fn add_root_path(
        &self,
        methods: impl IntoIterator<Item = axum::http::Method>,
        consumes: MediaType,
        produces: MediaType,
        handler: Handler,
    ) -> bool {
        self.register("/", methods, consumes, produces, handler)
    }

    /// Start without TLS. Returns the bound address.
    pub fn start(&self, address: &str) -> Result<SocketAddr, ServerError> {
        self.launch(address, None)
    }

    /// Start with TLS material loaded through the server's TLS factory.
    pub fn start_tls(&self, address: &str, material: &TlsMaterial) -> Result<SocketAddr, ServerError> {
        self.launch(address, Some(material))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live run, if its serve task has not ended on its own.
    fn is_current(&self, active: &Active) -> bool {
        *self.running.borrow() == Some(active.generation)
    }

    fn launch(&self, address: &str, material: Option<&TlsMaterial>) -> Result<SocketAddr, ServerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServerError::NoRuntime)?;

        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            if self.is_current(current) {
                return Err(ServerError::AlreadyRunning { mode: current.mode });
            }
        }
        if let Some(ended) = active.take() {
            debug!(address = %ended.local_addr, "Discarding run whose serve task ended");
            ended.running.abandon();
        }

        let tls = material.map(|m| self.tls.server_config(m)).transpose()?;
        let mode = ServerMode {
            transport: if self.session_handler.is_some() {
                TransportMode::Raw
            } else {
                TransportMode::Managed
            },
            tls: tls.is_some(),
        };

        let listener = bind(address)?;
        let local_addr = listener.local_addr()?;

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.running.send_replace(Some(generation));

        let _entered = runtime.enter();
        let launched = match &self.session_handler {
            Some(handler) => self.launch_raw(listener, tls, Arc::clone(handler), generation),
            None => Ok(self.launch_managed(listener, tls, generation)),
        };
        let running = match launched {
            Ok(running) => running,
            Err(err) => {
                self.running.send_replace(None);
                return Err(err);
            }
        };

        *active = Some(Active {
            mode,
            local_addr,
            generation,
            running,
        });
        info!(address = %local_addr, mode = %mode, "Server started");
        Ok(local_addr)
    }

    fn launch_managed(
        &self,
        listener: std::net::TcpListener,
        tls: Option<Arc<ServerConfig>>,
        generation: u64,
    ) -> Running {
        let dispatcher = Dispatcher::new(Arc::clone(&self.routes), Arc::clone(&self.codecs));
        let app = build_router(dispatcher, &self.timeouts, self.max_body_bytes, tls.is_some())
            .into_make_service_with_connect_info::<SessionContext>();

        let handle = Handle::new();
        let deadlines = TimeoutAcceptor::new(self.timeouts.idle, self.timeouts.write);

        let task = match tls {
            Some(config) => {
                let mut config = (*config).clone();
                config.alpn_protocols = vec![b"http/1.1".to_vec()];
                let acceptor = RustlsAcceptor::new(RustlsConfig::from_config(Arc::new(config)))
                    .handshake_timeout(TLS_HANDSHAKE_TIMEOUT)
                    .acceptor(deadlines);
                let mut server = axum_server::from_tcp(listener)
                    .acceptor(acceptor)
                    .handle(handle.clone());
                configure_http(server.http_builder(), &self.timeouts);
                tokio::spawn(clear_on_exit(Arc::clone(&self.running), generation, server.serve(app)))
            }
            None => {
                let mut server = axum_server::from_tcp(listener)
                    .acceptor(deadlines)
                    .handle(handle.clone());
                configure_http(server.http_builder(), &self.timeouts);
                tokio::spawn(clear_on_exit(Arc::clone(&self.running), generation, server.serve(app)))
            }
        };

        Running::Managed { handle, task }
    }

    fn launch_raw(
        &self,
        listener: std::net::TcpListener,
        tls: Option<Arc<ServerConfig>>,
        handler: Arc<dyn SessionHandler>,
        generation: u64,
    ) -> Result<Running, ServerError> {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let acceptor = tls.map(TlsAcceptor::from);
        let shutdown = Shutdown::new();

        // Each run owns its registry, a late stop of an earlier run cannot close it.
        let sessions = Arc::new(LiveSessionRegistry::new());
        sessions.open();
        let accept_loop = RawListener::new(listener, acceptor, Arc::clone(&sessions), handler);
        let task = tokio::spawn(clear_on_exit(
            Arc::clone(&self.running),
            generation,
            accept_loop.run(shutdown.subscribe()),
        ));
        Ok(Running::Raw {
            shutdown,
            task,
            sessions,
        })
    }

    /// Stop immediately: close the listener and drop open connections.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.halt(false).await
    }

    /// Stop accepting and let in-flight requests finish.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.halt(true).await
    }

    async fn halt(&self, graceful: bool) -> Result<(), ServerError> {
        let taken = {
            let mut active = self.lock_active();
            active.take()
        };
        let Some(active) = taken else {
            return Ok(());
        };

        let result = match active.running {
            Running::Managed { handle, task } => {
                if graceful {
                    handle.graceful_shutdown(None);
                } else {
                    handle.shutdown();
                }
                match task.await {
                    Ok(served) => served.map_err(ServerError::Io),
                    Err(err) => Err(ServerError::Task(err.to_string())),
                }
            }
            Running::Raw {
                shutdown,
                task,
                sessions,
            } => {
                shutdown.trigger();
                let joined = task.await.map_err(|err| ServerError::Task(err.to_string()));
                let closed = sessions.close_all();
                debug!(closed, "Closed raw sessions");
                joined
            }
        };

        clear_generation(&self.running, active.generation);
        match &result {
            Ok(()) => info!(address = %active.local_addr, mode = %active.mode, graceful, "Server stopped"),
            Err(err) => warn!(address = %active.local_addr, error = %err, "Server stopped with error"),
        }
        result
    }

    /// Resolves once the server is not running.
    pub async fn wait_for(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(Option::is_none).await;
    }

    fn current<T>(&self, read: impl FnOnce(&Active) -> T) -> Option<T> {
        let active = self.lock_active();
        active
            .as_ref()
            .filter(|active| self.is_current(active))
            .map(read)
    }

    pub fn is_running(&self) -> bool {
        self.current(|_| ()).is_some()
    }

    pub fn mode(&self) -> Option<ServerMode> {
        self.current(|active| active.mode)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current(|active| active.local_addr)
    }

    /// Raw-mode sessions currently open.
    pub fn live_sessions(&self) -> usize {
        let active = self.lock_active();
        match active.as_ref().map(|active| &active.running) {
            Some(Running::Raw { sessions, .. }) => sessions.len(),
            _ => 0,
        }
    }
}

impl Drop for RestServer {
    fn drop(&mut self) {
        let taken = self.lock_active().take();
        if let Some(active) = taken {
            active.running.abandon();
        }
    }
}

/// Mark `generation` stopped, unless a newer run has replaced it.
fn clear_generation(running: &RunState, generation: u64) {
    running.send_if_modified(|state| {
        if *state == Some(generation) {
            *state = None;
            true
        } else {
            false
        }
    });
}

/// Run a serve task, then mark its run stopped however it ended.
async fn clear_on_exit<F: Future>(running: Arc<RunState>, generation: u64, serve: F) -> F::Output {
    let output = serve.await;
    clear_generation(&running, generation);
    output
}

fn bind(address: &str) -> Result<std::net::TcpListener, ServerError> {
    let bind_error = |source| ServerError::Bind {
        address: address.to_string(),
        source,
    };
    let listener = std::net::TcpListener::bind(address).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    Ok(listener)
}

fn configure_http(builder: &mut auto::Builder<TokioExecutor>, timeouts: &ServerTimeouts) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.header_read);
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(dispatcher: Dispatcher, timeouts: &ServerTimeouts, max_body_bytes: usize, hsts: bool) -> Router {
    let router = Router::new()
        .route("/{*path}", any(dispatch_request))
        .route("/", any(dispatch_request))
        .with_state(dispatcher)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(timeouts.read));
    let router = with_request_ids(router).layer(TraceLayer::new_for_http());

    if hsts {
        router.layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_VALUE),
        ))
    } else {
        router
    }
}

async fn dispatch_request(State(dispatcher): State<Dispatcher>, request: Request<Body>) -> Response {
    let session = request
        .extensions()
        .get::<ConnectInfo<SessionContext>>()
        .map(|ConnectInfo(session)| session.clone());
    dispatcher.dispatch(request, session).await
}
