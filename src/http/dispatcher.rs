//! Request dispatch against the route table.
//!
//! # Responsibilities
//! - Resolve the request path (404 when unknown)
//! - Enforce the route's method set (405 before any handler runs)
//! - Run the action or render the stream
//! - Turn handler failures and panics into 500 responses
//!
//! # Design Decisions
//! - A panic never leaves the request that caused it
//! - The route's declared types drive the response content type

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::request::request_id;
use super::response::{method_not_allowed, not_found, reply};
use crate::codec::{CodecRegistry, MediaType};
use crate::handler::envelope::{self, Status};
use crate::handler::stream::{self, RenderError, Rendered};
use crate::handler::{ActionCall, Handler, ResponseSink};
use crate::net::session::SessionContext;
use crate::observability::metrics;
use crate::routing::{RouteEntry, RouteTable};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("NOT_FOUND")]
    NotFound,

    #[error("method {method} not allowed on path {path}, allowed methods: [{allowed}]")]
    MethodNotAllowed {
        path: String,
        method: String,
        allowed: String,
    },

    #[error("request body unreadable: {0}")]
    Body(String),

    #[error("{details}")]
    Handler { details: String },

    #[error(transparent)]
    Codec(#[from] RenderError),

    #[error("handler panicked: {0}")]
    Fault(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NotFound => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Body(_) => StatusCode::BAD_REQUEST,
            DispatchError::Handler { .. } | DispatchError::Codec(_) | DispatchError::Fault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Text carried by a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Serves requests from a shared route table and codec registry.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    codecs: Arc<CodecRegistry>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>, codecs: Arc<CodecRegistry>) -> Self {
        Self { routes, codecs }
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub async fn dispatch(&self, request: Request<Body>, session: Option<SessionContext>) -> Response {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request_id(request.headers()).to_string();

        debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            accept = ?request.headers().get(header::ACCEPT),
            content_type = ?request.headers().get(header::CONTENT_TYPE),
            session_id = ?session.as_ref().map(SessionContext::id),
            "Dispatching request"
        );

        let Some(entry) = self.routes.resolve(&path) else {
            warn!(request_id = %request_id, path = %path, "No route for path");
            let response = not_found();
            metrics::record_request(method.as_str(), response.status().as_u16(), "unmatched", started);
            return response;
        };

        let response = self.serve(&entry, request, session, &request_id).await;
        metrics::record_request(method.as_str(), response.status().as_u16(), &entry.path, started);
        response
    }

    async fn serve(
        &self,
        entry: &RouteEntry,
        request: Request<Body>,
        session: Option<SessionContext>,
        request_id: &str,
    ) -> Response {
        if !entry.allows(request.method()) {
            let err = DispatchError::MethodNotAllowed {
                path: entry.path.clone(),
                method: request.method().to_string(),
                allowed: entry.allowed_methods(),
            };
            warn!(request_id = %request_id, error = %err, "Method not allowed");
            return method_not_allowed(err.to_string(), &entry.allowed_methods());
        }

        let outcome = AssertUnwindSafe(self.run(entry, request, session))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::Fault(panic_message(panic.as_ref()))));

        match outcome {
            Ok(response) => response,
            Err(err) => {
                error!(request_id = %request_id, path = %entry.path, error = %err, "Request failed");
                failure(entry, &err)
            }
        }
    }

    async fn run(
        &self,
        entry: &RouteEntry,
        request: Request<Body>,
        session: Option<SessionContext>,
    ) -> Result<Response, DispatchError> {
        match &entry.handler {
            Handler::Action {
                action,
                self_answered,
            } => {
                let (parts, body) = request.into_parts();
                let body = axum::body::to_bytes(body, usize::MAX)
                    .await
                    .map_err(|e| DispatchError::Body(e.to_string()))?;

                let sink = ResponseSink::new();
                let call = ActionCall {
                    method: parts.method.clone(),
                    parts,
                    body,
                    consumes: entry.consumes.clone(),
                    produces: entry.produces.clone(),
                    session,
                    sink: sink.clone(),
                };
                action
                    .run(call)
                    .await
                    .map_err(|err| DispatchError::Handler {
                        details: err.to_string(),
                    })?;

                if *self_answered {
                    return Ok(match sink.take() {
                        Some(written) => reply(
                            written.status,
                            written.content_type.as_ref().unwrap_or(&entry.produces),
                            written.body,
                        ),
                        None => reply(StatusCode::OK, &entry.produces, Bytes::new()),
                    });
                }

                let body = envelope::render(
                    Status::Ok,
                    &envelope::success_message(&entry.path),
                    &entry.produces,
                );
                Ok(reply(StatusCode::OK, &envelope::content_type(&entry.produces), body))
            }
            Handler::Stream { stream, filter } => {
                let rendered = stream::render(
                    stream.as_ref(),
                    filter.as_ref(),
                    &self.codecs,
                    &entry.consumes,
                    &entry.produces,
                )
                .await?;
                let body = match rendered {
                    Rendered::Translated(bytes) => Bytes::from(bytes),
                    Rendered::Verbatim(bytes) => bytes,
                };
                Ok(reply(StatusCode::OK, &entry.produces, body))
            }
        }
    }
}

/// KO envelope in the route's produced format.
fn failure(entry: &RouteEntry, err: &DispatchError) -> Response {
    if let DispatchError::Body(message) = err {
        return reply(err.status(), &MediaType::PlainText, message.clone());
    }
    let body = envelope::render(
        Status::Ko,
        &envelope::failure_message(&entry.path, &err.to_string()),
        &entry.produces,
    );
    reply(err.status(), &envelope::content_type(&entry.produces), body)
}
