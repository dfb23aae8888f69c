//! REST client subsystem.
//!
//! # Data Flow
//! ```text
//! RestClient::open
//!     → TlsFactory::client_config (CA pool or web PKI roots)
//!     → diagnostic handshake (peer chain recorded, then closed)
//!     → pooled reqwest transport
//! RestClient::request
//!     → method / protocol check (no I/O on failure)
//!     → protocol://host:port/path
//!     → non-200 ⇒ ClientError::Status
//! ```

pub mod method;
pub mod rest;

pub use method::{RestMethod, RestProtocol};
pub use rest::{ClientError, ClientResponse, RestClient};
