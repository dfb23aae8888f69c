//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured events, request/session ids as fields)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus exporter (optional, started by the binary)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder itself
//! - Without a subscriber or recorder every call is a no-op

pub mod logging;
pub mod metrics;
