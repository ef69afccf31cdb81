//! Slow and stalled transfers against a hand-driven HTTP endpoint
//!
//! Run with: cargo test --package podex-client --test timeout_tests

use futures::TryStreamExt;
use podex_client::{ClientError, Config, S3Client};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve one GET whose body arrives a byte at a time, `gap` apart.
/// With `stall_after` set, the body stops after that many bytes.
async fn trickle_server(total: usize, gap: Duration, stall_after: Option<usize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }

        let status = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            total
        );
        socket.write_all(status.as_bytes()).await.unwrap();
        for sent in 0..total {
            if stall_after == Some(sent) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if socket.write_all(b"x").await.is_err() {
                return;
            }
            socket.flush().await.unwrap();
            tokio::time::sleep(gap).await;
        }
    });

    addr
}

fn client(endpoint: String, idle: Duration) -> S3Client {
    S3Client::new(
        Config::new(endpoint)
            .with_credentials("ACCESSKEY012", "SECRETKEY012")
            .with_idle_timeout(Some(idle)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_slow_download_outlives_idle_timeout() {
    let addr = trickle_server(20, Duration::from_millis(50), None).await;
    let idle = Duration::from_millis(400);
    let started = Instant::now();

    let result = client(format!("http://{}", addr), idle)
        .get_object("builds", "fcos.qcow2")
        .await
        .unwrap();
    let chunks: Vec<bytes::Bytes> = result.body.try_collect().await.unwrap();

    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, 20);
    assert!(started.elapsed() > idle);
}

#[tokio::test]
async fn test_stalled_download_times_out() {
    let addr = trickle_server(20, Duration::from_millis(10), Some(5)).await;

    let result = client(format!("http://{}", addr), Duration::from_millis(200))
        .get_object("builds", "fcos.qcow2")
        .await
        .unwrap();
    let err = result
        .body
        .try_collect::<Vec<bytes::Bytes>>()
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/builds"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client(server.uri(), Duration::from_millis(200))
        .bucket_exists("builds")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(_)), "got {err:?}");
}
