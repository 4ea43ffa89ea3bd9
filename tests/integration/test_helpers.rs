// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use futures::StreamExt;
use primegate::config::Config;
use primegate::core::protocol::{HttpResponse, HttpResponseCodec};
use primegate::server::{self, ServerHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How long any single client operation may take before a test fails.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A configuration suited to tests: ephemeral port, short timeouts.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.port = 0;
    config.pipeline.workers_per_stage = 2;
    config.limits.sweep_interval = Duration::from_millis(20);
    config.shutdown.drain_timeout = Duration::from_secs(2);
    config.shutdown.shutdown_timeout = Duration::from_millis(500);
    config
}

/// TestServer runs a complete gateway and pipeline for the duration of a test.
pub struct TestServer {
    pub handle: ServerHandle,
}

impl TestServer {
    /// Starts a server with the test configuration.
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    /// Starts a server with a custom configuration.
    pub async fn with_config(config: Config) -> Self {
        // Initialize tracing (ignore error if already initialized)
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        let handle = server::start(config)
            .await
            .expect("Failed to start test server");
        Self { handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr())
            .await
            .expect("Failed to connect to test server")
    }

    /// Sends `raw` on a fresh connection and reads one response.
    pub async fn request(&self, raw: &[u8]) -> HttpResponse {
        self.request_in_chunks(&[raw], Duration::ZERO).await
    }

    /// Sends `chunks` as separate writes, pausing between them, then reads one response.
    pub async fn request_in_chunks(&self, chunks: &[&[u8]], pause: Duration) -> HttpResponse {
        let mut stream = self.connect().await;
        for chunk in chunks {
            stream.write_all(chunk).await.expect("Failed to write");
            stream.flush().await.expect("Failed to flush");
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        read_response(&mut stream).await
    }

    pub async fn stop(self) {
        self.handle.stop().await.expect("Server failed to stop cleanly");
    }
}

/// Builds a prime check request for `n`.
pub fn prime_request(n: impl std::fmt::Display) -> Vec<u8> {
    format!("GET /is_prime?possible_prime={n} HTTP/1.1\r\nHost: localhost\r\n\r\n").into_bytes()
}

/// Reads exactly one response from `stream`, leaving the stream usable.
pub async fn read_response(stream: &mut TcpStream) -> HttpResponse {
    let mut frames = FramedRead::new(stream, HttpResponseCodec);
    tokio::time::timeout(IO_TIMEOUT, frames.next())
        .await
        .expect("Timed out waiting for a response")
        .expect("Connection closed before a response")
        .expect("Failed to decode response")
}

/// Returns true if the server closes `stream` within the timeout.
pub async fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(
        tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}

/// Polls `condition` until it holds or the timeout passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
