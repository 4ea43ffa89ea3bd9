// tests/integration/lifecycle_test.rs

//! Server startup and graceful shutdown.

use super::test_helpers::{TestServer, prime_request, read_response, test_config};
use primegate::core::protocol::StatusCode;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn test_binds_ephemeral_port() {
    let server = TestServer::start().await;
    assert_ne!(server.addr().port(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_stop_refuses_new_connections() {
    let server = TestServer::start().await;
    let addr = server.addr();
    assert_eq!(server.request(&prime_request(5)).await.status, StatusCode::Ok);

    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .expect("stop took too long");

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stats_track_requests() {
    let server = TestServer::start().await;
    for n in [2u64, 3, 4] {
        assert_eq!(server.request(&prime_request(n)).await.status, StatusCode::Ok);
    }

    let stats = server.handle.stats().clone();
    assert_eq!(stats.get_requests_dispatched(), 3);
    assert!(stats.get_total_connections() >= 3);
    assert!(stats.get_responses_sent() >= 3);
    server.stop().await;
}

#[tokio::test]
async fn test_multi_hop_pipeline_end_to_end() {
    let mut config = test_config();
    config.pipeline.stages = vec![
        primegate::core::pipeline::stages::StageKind::Halving,
        primegate::core::pipeline::stages::StageKind::Echo,
    ];
    let server = TestServer::with_config(config).await;

    let mut stream = server.connect().await;
    let request = b"GET /abc HTTP/1.0\r\n\r\n";
    stream.write_all(request).await.unwrap();
    let response = read_response(&mut stream).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], &request[..request.len() / 2 + 1]);
    server.stop().await;
}
