//! Concurrent load against a managed server.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tls_rest::RestServer;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let server = RestServer::new();
    common::register_scenarios(&server);
    let addr = common::start_tls(&server);
    let base = format!("https://localhost:{}", addr.port());

    let concurrency = 16;
    let requests_per_task = 25;
    let client = common::https_client();
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(concurrency);
    for task in 0..concurrency {
        let client = client.clone();
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            let mut ok = 0;
            for i in 0..requests_per_task {
                let path = if (task + i) % 2 == 0 { "/hello" } else { "/nodes" };
                let response = client.get(format!("{base}{path}")).send().await.unwrap();
                if response.status() == StatusCode::OK {
                    ok += 1;
                }
            }
            ok
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        succeeded += task.await.unwrap();
    }
    let elapsed = start.elapsed();

    assert_eq!(succeeded, concurrency * requests_per_task);
    assert!(elapsed < Duration::from_secs(60), "load took {elapsed:?}");
    drop(client);
    server.shutdown().await.unwrap();
}
