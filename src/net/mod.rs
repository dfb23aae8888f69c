//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Managed mode:
//!     axum-server accept
//!         → connection.rs (idle/write deadlines)
//!         → rustls acceptor (tls.rs configuration)
//!         → session.rs (SessionContext via Connected<SocketAddr>)
//!         → HTTP layer
//!
//! Raw mode:
//!     listener.rs accept loop
//!         → registry.rs (register, close signal, drop guard)
//!         → tls.rs handshake (10 s bound)
//!         → SessionHandler (user code owns the bytes)
//!         → stream shutdown → unregister
//! ```
//!
//! # Design Decisions
//! - One TLS factory builds both server and client configurations
//! - Every accepted connection gets a fresh session context
//! - Raw sessions are tracked so a stop can close all of them

pub mod connection;
pub mod listener;
pub mod registry;
pub mod session;
pub mod tls;
