//! Action handlers and the response sink they may answer through.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use futures_util::future::BoxFuture;

use crate::codec::MediaType;
use crate::net::session::SessionContext;

/// Failure returned by an action; its message lands in the KO envelope.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Everything an action sees about one request.
pub struct ActionCall {
    pub parts: Parts,
    pub body: Bytes,
    pub method: Method,
    pub consumes: MediaType,
    pub produces: MediaType,
    /// Present when the request arrived over a server connection.
    pub session: Option<SessionContext>,
    pub sink: ResponseSink,
}

impl ActionCall {
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Executable unit behind an action route.
pub trait Action: Send + Sync + 'static {
    fn run(&self, call: ActionCall) -> BoxFuture<'static, Result<(), ActionError>>;
}

impl<F, Fut> Action for F
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    fn run(&self, call: ActionCall) -> BoxFuture<'static, Result<(), ActionError>> {
        Box::pin(self(call))
    }
}

/// A response written by an action itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResponse {
    pub status: StatusCode,
    pub content_type: Option<MediaType>,
    pub body: Bytes,
}

/// Where self-answering actions write their response. The last write wins.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    slot: Arc<Mutex<Option<SinkResponse>>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.store(SinkResponse {
            status,
            content_type: None,
            body: body.into(),
        });
    }

    pub fn send_typed(&self, status: StatusCode, content_type: MediaType, body: impl Into<Bytes>) {
        self.store(SinkResponse {
            status,
            content_type: Some(content_type),
            body: body.into(),
        });
    }

    /// 200 with the given body.
    pub fn success(&self, body: impl Into<Bytes>) {
        self.send(StatusCode::OK, body);
    }

    pub fn failure(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.send(status, body);
    }

    pub fn is_answered(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub(crate) fn take(&self) -> Option<SinkResponse> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn store(&self, response: SinkResponse) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_last_write_wins() {
        let sink = ResponseSink::new();
        assert!(!sink.is_answered());

        let writer = sink.clone();
        writer.failure(StatusCode::BAD_REQUEST, "nope");
        writer.success("fine");
        assert!(sink.is_answered());

        let response = sink.take().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"fine"));
        assert!(!sink.is_answered());
    }

    #[tokio::test]
    async fn test_closure_is_action() {
        let action = |call: ActionCall| async move {
            call.sink.success(call.body.clone());
            Ok::<(), ActionError>(())
        };

        let (parts, _) = axum::http::Request::builder()
            .uri("/echo?x=1")
            .body(())
            .unwrap()
            .into_parts();
        let sink = ResponseSink::new();
        let call = ActionCall {
            parts,
            body: Bytes::from_static(b"payload"),
            method: Method::POST,
            consumes: MediaType::PlainText,
            produces: MediaType::PlainText,
            session: None,
            sink: sink.clone(),
        };
        assert_eq!(call.path(), "/echo");
        assert_eq!(call.query(), Some("x=1"));

        action.run(call).await.unwrap();
        assert_eq!(sink.take().unwrap().body, Bytes::from_static(b"payload"));
    }
}
