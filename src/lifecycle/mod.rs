//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     RestServer::stop → trigger → raw accept loop exits → listener closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls RestServer::shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, then close sessions
//! - A trigger is remembered, late subscribers still observe it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
