// tests/integration/gateway_test.rs

//! End-to-end request handling over real TCP connections.

use super::test_helpers::{
    TestServer, closed_by_server, eventually, prime_request, read_response, test_config,
};
use primegate::config::FailurePolicyConfig;
use primegate::core::gateway::HEALTH_CHECK_BODY;
use primegate::core::pipeline::stages::primality::smallest_factor;
use primegate::core::protocol::StatusCode;
use primegate::core::router::ERROR_BODY;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_prime_is_echoed_back() {
    let server = TestServer::start().await;
    let response = server.request(&prime_request(17)).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], b"17");
    assert_eq!(
        response.header("content-type"),
        Some("text/plain;charset=utf-8")
    );
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    server.stop().await;
}

#[tokio::test]
async fn test_composite_returns_smallest_factor() {
    let server = TestServer::start().await;
    let response = server.request(&prime_request(18)).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], b"2");
    server.stop().await;
}

#[tokio::test]
async fn test_connection_closes_after_response() {
    let server = TestServer::start().await;
    let mut stream = server.connect().await;
    stream.write_all(&prime_request(7)).await.unwrap();

    assert_eq!(read_response(&mut stream).await.status, StatusCode::Ok);
    assert!(closed_by_server(&mut stream).await);
    server.stop().await;
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let server = TestServer::start().await;
    let request = prime_request(97);
    let (head, tail) = request.split_at(request.len() - 2);
    let (first, middle) = head.split_at(10);

    let response = server
        .request_in_chunks(&[first, middle, tail], Duration::from_millis(20))
        .await;
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], b"97");
    server.stop().await;
}

#[tokio::test]
async fn test_bad_query_gets_generic_error() {
    let server = TestServer::start().await;
    let response = server
        .request(b"GET /is_prime?possible_prime=banana HTTP/1.0\r\n\r\n")
        .await;

    assert_eq!(response.status, StatusCode::BadRequest);
    assert_eq!(&response.body[..], ERROR_BODY.as_bytes());
    server.stop().await;
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = TestServer::start().await;

    let response = server.request(b"BREW /pot HTTP/1.0\r\n\r\n").await;
    assert_eq!(response.status, StatusCode::NotImplemented);

    let response = server.request(b"GET / HTTP/9.9\r\n\r\n").await;
    assert_eq!(response.status, StatusCode::VersionNotSupported);

    let response = server.request(b"GET / HTTP/1.0\r\n\r\nleftover").await;
    assert_eq!(response.status, StatusCode::BadRequest);
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_request_is_rejected_and_closed() {
    let mut config = test_config();
    config.limits.max_request_size = 64;
    let server = TestServer::with_config(config).await;

    let mut stream = server.connect().await;
    stream.write_all(&[b'A'; 100]).await.unwrap();
    assert_eq!(read_response(&mut stream).await.status, StatusCode::BadRequest);
    assert!(closed_by_server(&mut stream).await);
    server.stop().await;
}

#[tokio::test]
async fn test_stalled_request_is_rejected() {
    let mut config = test_config();
    config.limits.assembly_timeout = Duration::from_millis(100);
    let server = TestServer::with_config(config).await;

    let mut stream = server.connect().await;
    stream.write_all(b"GET /is_prime?possible").await.unwrap();
    assert_eq!(read_response(&mut stream).await.status, StatusCode::BadRequest);
    server.stop().await;
}

#[tokio::test]
async fn test_zero_depth_queue_rejects_with_500() {
    let mut config = test_config();
    config.queue.depth = Some(0);
    let server = TestServer::with_config(config).await;

    let mut stream = server.connect().await;
    stream.write_all(&prime_request(17)).await.unwrap();
    assert_eq!(
        read_response(&mut stream).await.status,
        StatusCode::InternalServerError
    );
    assert!(closed_by_server(&mut stream).await);
    assert!(eventually(|| server.handle.stats().get_open_connections() == 0).await);
    server.stop().await;
}

#[tokio::test]
async fn test_health_check() {
    let mut config = test_config();
    config.health_check_path = Some("/health".to_string());
    let server = TestServer::with_config(config).await;

    let response = server.request(b"GET /health HTTP/1.1\r\n\r\n").await;
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], HEALTH_CHECK_BODY.as_bytes());
    assert_eq!(server.handle.stats().get_requests_dispatched(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_always_fail_policy() {
    let mut config = test_config();
    config.pipeline.failure_policy = FailurePolicyConfig::AlwaysFail;
    let server = TestServer::with_config(config).await;

    let response = server.request(&prime_request(17)).await;
    assert_eq!(response.status, StatusCode::BadRequest);
    server.stop().await;
}

#[tokio::test]
async fn test_connect_and_disconnect_without_sending() {
    let server = TestServer::start().await;
    let stats = server.handle.stats().clone();

    let stream = server.connect().await;
    assert!(eventually(|| stats.get_open_connections() == 1).await);
    drop(stream);

    assert!(eventually(|| stats.get_open_connections() == 0).await);
    assert_eq!(stats.get_requests_dispatched(), 0);
    assert_eq!(stats.get_responses_sent(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_many_concurrent_clients_get_their_own_answers() {
    let server = TestServer::start().await;
    let addr = server.addr();

    let mut tasks = Vec::new();
    for n in 1000u64..1064 {
        tasks.push(tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream.write_all(&prime_request(n)).await.unwrap();
            (n, read_response(&mut stream).await)
        }));
    }

    for task in tasks {
        let (n, response) = task.await.unwrap();
        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.body, smallest_factor(n).to_string());
    }
    assert_eq!(server.handle.stats().get_requests_dispatched(), 64);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_primality_checks_leave_gateway_responsive() {
    // Trial division of this prime runs far longer than the request timeout.
    const SLOW_PRIME: u64 = 10_000_000_000_000_061;

    let mut config = test_config();
    config.health_check_path = Some("/health".to_string());
    config.pipeline.workers_per_stage = 2;
    config.limits.request_timeout = Duration::from_millis(100);
    let server = TestServer::with_config(config).await;
    let stats = server.handle.stats().clone();

    let mut slow = Vec::new();
    for _ in 0..2 {
        let mut stream = server.connect().await;
        stream.write_all(&prime_request(SLOW_PRIME)).await.unwrap();
        slow.push(stream);
    }
    let sent_at = std::time::Instant::now();
    assert!(eventually(|| stats.get_requests_dispatched() == 2).await);

    let started = std::time::Instant::now();
    let health = server.request(b"GET /health HTTP/1.1\r\n\r\n").await;
    assert_eq!(health.status, StatusCode::Ok);
    assert!(
        started.elapsed() < Duration::from_millis(250),
        "health check took {:?}",
        started.elapsed()
    );

    for stream in &mut slow {
        let response = read_response(stream).await;
        assert_eq!(response.status, StatusCode::GatewayTimeout);
    }
    assert!(
        sent_at.elapsed() < Duration::from_secs(1),
        "timeouts arrived after {:?}",
        sent_at.elapsed()
    );
    server.stop().await;
}
