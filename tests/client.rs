//! RestClient against a live managed server.

use axum::body::Bytes;
use axum::http::Method;
use tls_rest::{
    ActionCall, ActionError, ClientError, MediaType, RestClient, RestMethod, RestProtocol,
    RestServer, TlsMaterial,
};

mod common;

fn server() -> RestServer {
    let server = RestServer::new();
    common::register_scenarios(&server);
    server.add_action(
        "/echo",
        [Method::POST],
        MediaType::PlainText,
        MediaType::PlainText,
        |call: ActionCall| async move {
            let accept = call.header("accept").unwrap_or("-").to_string();
            let body = String::from_utf8_lossy(&call.body).into_owned();
            call.sink.success(format!("{accept} {body}"));
            Ok::<(), ActionError>(())
        },
        true,
    );
    server
}

#[tokio::test]
async fn test_https_get_records_peer_chain() {
    let server = server();
    let addr = common::start_tls(&server);

    let mut client = RestClient::new("localhost", addr.port()).with_tls(common::client_material());
    client.open().await.unwrap();
    assert!(!client.peer_certificates().is_empty());

    let response = client
        .request(RestProtocol::Https, "/hello", RestMethod::Get, None, None, None)
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.text().contains("Hello there"));

    client.close();
    client.close();
    assert!(!client.is_open());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_post_and_form() {
    let server = server();
    let addr = common::start_tls(&server);
    let mut client = RestClient::new("127.0.0.1", addr.port()).with_tls(common::client_material());
    client.open().await.unwrap();

    let response = client
        .request(
            RestProtocol::Https,
            "echo",
            RestMethod::Post,
            Some(&MediaType::Json),
            Some(Bytes::from_static(b"payload")),
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.text(), "application/json payload");

    let form = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "x y".to_string())];
    let response = client
        .request(RestProtocol::Https, "/echo", RestMethod::PostForm, None, None, Some(form.as_slice()))
        .await
        .unwrap();
    assert!(response.text().ends_with(" a=1&b=x+y"), "{}", response.text());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_200_is_status_error() {
    let server = server();
    let addr = common::start_plain(&server);
    let mut client = RestClient::new("127.0.0.1", addr.port()).with_handshake_probe(false);
    client.open().await.unwrap();

    let err = client
        .request(RestProtocol::Http, "/missing", RestMethod::Get, None, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Status Code: 404, Message: Not Found");
    match err {
        ClientError::Status { body, .. } => assert_eq!(body, Bytes::from_static(b"NOT_FOUND")),
        other => panic!("unexpected error: {other}"),
    }

    let err = client
        .request(RestProtocol::Http, "/hello", RestMethod::Head, None, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(405));

    let err = client
        .request(RestProtocol::Http, "/hello", RestMethod::Post, None, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(405));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_untrusted_server_fails_handshake() {
    let server = server();
    let addr = common::start_tls(&server);

    // Web PKI roots do not include the test CA.
    let mut client = RestClient::new("localhost", addr.port());
    let err = client.open().await.unwrap_err();
    assert!(matches!(err, ClientError::Handshake { .. }), "{err}");
    assert!(!client.is_open());

    let mut insecure = RestClient::new("localhost", addr.port()).with_tls(TlsMaterial::new().insecure(true));
    insecure.open().await.unwrap();
    let response = insecure
        .request(RestProtocol::Https, "/hello", RestMethod::Get, None, None, None)
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_double_open() {
    let server = server();
    let addr = common::start_tls(&server);
    let mut client = RestClient::new("localhost", addr.port()).with_tls(common::client_material());

    client.open().await.unwrap();
    assert!(matches!(client.open().await, Err(ClientError::AlreadyOpen)));
    assert!(client.is_open());

    client.close();
    client.open().await.unwrap();
    server.stop().await.unwrap();
}
