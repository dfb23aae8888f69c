//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ServiceConfig (validated, immutable)
//!     → RestServer::from_config, observability init
//! ```
//!
//! # Design Decisions
//! - Every field has a default, an empty file is a valid config
//! - TLS material reuses the `TlsMaterial` shape from the net layer
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    LimitsConfig, ListenerConfig, ObservabilityConfig, ServiceConfig, TimeoutConfig, TransportMode,
};
pub use validation::{validate_config, ValidationError};
