//! Response construction.
//!
//! # Responsibilities
//! - Build responses with an explicit status and content type
//! - Map dispatch errors to their status codes and bodies
//!
//! # Design Decisions
//! - Content type always comes from the route's declared types, never from
//!   the request's `Accept` header

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::codec::MediaType;

pub const NOT_FOUND_BODY: &str = "NOT_FOUND";

/// A response with a body and content type.
pub fn reply(status: StatusCode, content_type: &MediaType, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

pub fn not_found() -> Response {
    reply(StatusCode::NOT_FOUND, &MediaType::PlainText, NOT_FOUND_BODY)
}

/// 405 naming the path, the method and what is allowed instead.
pub fn method_not_allowed(message: String, allowed: &str) -> Response {
    let mut response = reply(StatusCode::METHOD_NOT_ALLOWED, &MediaType::PlainText, message);
    if let Ok(value) = HeaderValue::from_str(allowed) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_sets_content_type() {
        let response = reply(StatusCode::OK, &MediaType::Yaml, "k: v");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/yaml");
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = method_not_allowed("nope".to_string(), "GET, HEAD");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }
}
