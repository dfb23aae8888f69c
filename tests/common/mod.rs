//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::Method;
use tls_rest::{
    ActionCall, ActionError, BufferedStream, MediaType, RestServer, TlsFactory, TlsMaterial,
};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Server identity signed by the test CA, trusting the same CA for clients.
pub fn server_material() -> TlsMaterial {
    TlsMaterial::new()
        .with_ca(fixture("ca.pem"))
        .with_certificate(fixture("server.pem"), fixture("server.key"))
}

/// Client material trusting the test CA.
pub fn client_material() -> TlsMaterial {
    TlsMaterial::new()
        .with_ca(fixture("ca.pem"))
        .with_certificate(fixture("client.pem"), fixture("client.key"))
}

/// A reqwest client that trusts the test CA.
pub fn https_client() -> reqwest::Client {
    let config = TlsFactory::default()
        .client_config(&client_material())
        .unwrap();
    reqwest::Client::builder()
        .use_preconfigured_tls((*config).clone())
        .no_proxy()
        .build()
        .unwrap()
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Register scenario routes A, B, D and E.
pub fn register_scenarios(server: &RestServer) {
    server.add_action(
        "/hello",
        [Method::GET],
        MediaType::Json,
        MediaType::Json,
        |call: ActionCall| async move {
            call.sink
                .success(r#"{"status":"OK","message":"Hello there..."}"#);
            Ok::<(), ActionError>(())
        },
        true,
    );
    server.add_action(
        "/hello/envelope",
        [Method::GET],
        MediaType::Json,
        MediaType::Json,
        |_call: ActionCall| async { Ok::<(), ActionError>(()) },
        false,
    );
    server.add_stream(
        "/nodes",
        [Method::GET],
        MediaType::Json,
        MediaType::Yaml,
        BufferedStream::from_bytes(br#"[{"k":"v"}]"#.to_vec()).unwrap(),
    );
}

pub fn start_plain(server: &RestServer) -> SocketAddr {
    server.start("127.0.0.1:0").unwrap()
}

pub fn start_tls(server: &RestServer) -> SocketAddr {
    server.start_tls("127.0.0.1:0", &server_material()).unwrap()
}
