//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (managed mode)
//!     → server.rs (axum-server, rustls, connection deadlines)
//!     → request.rs (request id)
//!     → dispatcher.rs (route lookup, method check, handler)
//!     → response.rs (status, content type, body)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - One catch-all axum route, path matching lives in `RouteTable`
//! - Routes can be added while the server runs

pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchError, Dispatcher};
pub use request::X_REQUEST_ID;
pub use server::{RestServer, ServerError, ServerMode, ServerTimeouts};
