//! TLS REST protocol layer.
//!
//! Path-routed request/response services over TLS and the matching client:
//! route dispatch with method enforcement, a managed (axum/hyper) or raw
//! (owned TLS listener) transport, and JSON/YAML/XML content translation.

pub mod client;
pub mod codec;
pub mod config;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use client::{ClientError, ClientResponse, RestClient, RestMethod, RestProtocol};
pub use codec::{CodecError, CodecRegistry, MediaType, Record};
pub use config::ServiceConfig;
pub use handler::{Action, ActionCall, ActionError, BufferedStream, DataStream, Handler, ResponseSink};
pub use http::{RestServer, ServerError, ServerMode};
pub use lifecycle::Shutdown;
pub use net::session::{RawSession, SessionContext, SessionHandler};
pub use net::tls::{CertificateKeyPair, ConfigurationError, TlsFactory, TlsMaterial};
pub use routing::{RouteEntry, RouteTable};
