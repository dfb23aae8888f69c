//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (any time, server running or not):
//!     path + methods + consumes/produces + Handler
//!     → router.rs (reject duplicates, insert under write lock)
//!
//! Incoming Request (path, method)
//!     → router.rs (exact path lookup under read lock)
//!     → Return: RouteEntry or no match
//! ```
//!
//! # Design Decisions
//! - Exact path match, no prefixes or patterns
//! - First registration of a path is authoritative
//! - Entries are shared as `Arc` so dispatch never holds the lock

pub mod router;

pub use router::{RouteEntry, RouteTable};
