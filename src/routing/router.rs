//! Route table.
//!
//! # Responsibilities
//! - Store one entry per path
//! - Look up the entry for a request path
//! - Report which methods an entry allows
//!
//! # Design Decisions
//! - `RwLock` so registration can happen while requests are dispatched
//! - Duplicate or method-less registrations return false and change nothing

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::Method;
use tracing::{debug, warn};

use crate::codec::MediaType;
use crate::handler::Handler;

/// A registered path and everything needed to serve it.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub path: String,
    pub methods: Vec<Method>,
    pub consumes: MediaType,
    pub produces: MediaType,
    pub handler: Handler,
}

impl RouteEntry {
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Allowed methods as an `Allow` header value.
    pub fn allowed_methods(&self) -> String {
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Path-keyed routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<String, Arc<RouteEntry>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. Returns false, leaving the table untouched, when the
    /// path is taken, does not start with `/`, or no method is given.
    pub fn register(
        &self,
        path: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        consumes: MediaType,
        produces: MediaType,
        handler: Handler,
    ) -> bool {
        let path = path.into();
        let mut allowed: Vec<Method> = Vec::new();
        for method in methods {
            if !allowed.contains(&method) {
                allowed.push(method);
            }
        }

        if allowed.is_empty() || !path.starts_with('/') {
            warn!(path = %path, "Rejected route without methods or leading slash");
            return false;
        }

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(&path) {
            warn!(path = %path, "Path already registered");
            return false;
        }

        debug!(
            path = %path,
            methods = ?allowed,
            consumes = %consumes,
            produces = %produces,
            handler = handler.kind(),
            "Route registered"
        );
        let entry = RouteEntry {
            path: path.clone(),
            methods: allowed,
            consumes,
            produces,
            handler,
        };
        routes.insert(path, Arc::new(entry));
        true
    }

    pub fn resolve(&self, path: &str) -> Option<Arc<RouteEntry>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ActionCall, ActionError};

    fn noop() -> Handler {
        Handler::action(|_call: ActionCall| async { Ok::<(), ActionError>(()) }, false)
    }

    #[test]
    fn test_register_and_resolve() {
        let table = RouteTable::new();
        assert!(table.register("/hello", [Method::GET], MediaType::Json, MediaType::Json, noop()));

        let entry = table.resolve("/hello").unwrap();
        assert!(entry.allows(&Method::GET));
        assert!(!entry.allows(&Method::POST));
        assert!(table.resolve("/hello/").is_none());
        assert!(table.resolve("/missing").is_none());
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let table = RouteTable::new();
        assert!(table.register("/p", [Method::GET], MediaType::Json, MediaType::Json, noop()));
        assert!(!table.register("/p", [Method::POST], MediaType::Xml, MediaType::Xml, noop()));

        let entry = table.resolve("/p").unwrap();
        assert_eq!(entry.methods, vec![Method::GET]);
        assert_eq!(entry.produces, MediaType::Json);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rejects_empty_methods_and_relative_paths() {
        let table = RouteTable::new();
        assert!(!table.register("/p", Vec::<Method>::new(), MediaType::Json, MediaType::Json, noop()));
        assert!(!table.register("p", [Method::GET], MediaType::Json, MediaType::Json, noop()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_allowed_methods_dedup() {
        let table = RouteTable::new();
        table.register(
            "/p",
            [Method::GET, Method::POST, Method::GET],
            MediaType::Json,
            MediaType::Json,
            noop(),
        );
        assert_eq!(table.resolve("/p").unwrap().allowed_methods(), "GET, POST");
    }
}
