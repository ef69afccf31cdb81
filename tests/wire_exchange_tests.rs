//! Exchange protocol over the S3 wire adapter, against a mock server
//!
//! Run with: cargo test --test wire_exchange_tests

use podex_core::writer::content_stamp;
use podex_core::{Credentials, ExchangeError, LocalIdentity, ObjectReader, ObjectWriter, S3Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> Arc<S3Store> {
    let addr = server.address();
    let creds = Credentials::new("ACCESSKEY012", "SECRETKEY012");
    Arc::new(S3Store::connect(&addr.ip().to_string(), addr.port(), &creds).unwrap())
}

fn source_file(dir: &Path) -> (PathBuf, String) {
    let path = dir.join("fcos.qcow2");
    std::fs::write(&path, b"qcow2 bytes").unwrap();
    let stamp = content_stamp(std::fs::metadata(&path).unwrap().modified().unwrap());
    (path, stamp)
}

async fn mount_bucket_present(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path("/builds"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_first_write_creates_bucket_and_uploads() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/builds"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/builds"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/builds/fcos.qcow2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (source, stamp) = source_file(dir.path());

    Mock::given(method("PUT"))
        .and(path("/builds/fcos.qcow2"))
        .and(header("x-amz-meta-creator", "pod-a"))
        .and(header("x-amz-meta-stamp", stamp.as_str()))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"0a1b2c\""))
        .expect(1)
        .mount(&server)
        .await;

    let writer = ObjectWriter::new(store_for(&server), LocalIdentity::new("pod-a"));
    let outcome = writer
        .put("builds", "fcos.qcow2", &source, false)
        .await
        .unwrap();

    match outcome {
        podex_core::PutOutcome::Uploaded(receipt) => {
            assert_eq!(receipt.etag, "0a1b2c");
            assert_eq!(receipt.size, 11);
        }
        other => panic!("expected upload, got {other:?}"),
    }
}

#[tokio::test]
async fn test_matching_stamp_sends_no_bytes() {
    let server = MockServer::start().await;
    mount_bucket_present(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let (source, stamp) = source_file(dir.path());

    Mock::given(method("HEAD"))
        .and(path("/builds/fcos.qcow2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Amz-Meta-Creator", "pod-a")
                .insert_header("X-Amz-Meta-Stamp", stamp.as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/builds/fcos.qcow2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let writer = ObjectWriter::new(store_for(&server), LocalIdentity::new("pod-a"));
    let outcome = writer
        .put("builds", "fcos.qcow2", &source, false)
        .await
        .unwrap();
    assert!(!outcome.transferred());
}

#[tokio::test]
async fn test_foreign_creator_blocks_upload() {
    let server = MockServer::start().await;
    mount_bucket_present(&server).await;

    Mock::given(method("HEAD"))
        .and(path("/builds/fcos.qcow2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Amz-Meta-Creator", "pod-a")
                .insert_header("X-Amz-Meta-Stamp", "1"),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/builds/fcos.qcow2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (source, _) = source_file(dir.path());

    let writer = ObjectWriter::new(store_for(&server), LocalIdentity::new("pod-b"));
    let err = writer
        .put("builds", "fcos.qcow2", &source, false)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExchangeError::OwnershipConflict { ref creator, .. } if creator == "pod-a")
    );
}

#[tokio::test]
async fn test_bucket_backend_failure_aborts_write() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/builds"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (source, _) = source_file(dir.path());

    let writer = ObjectWriter::new(store_for(&server), LocalIdentity::new("pod-a"));
    let err = writer
        .put("builds", "fcos.qcow2", &source, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Bucket { ref bucket, .. } if bucket == "builds"));
}

#[tokio::test]
async fn test_reader_streams_remote_object() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..50_000u32).map(|i| (i % 7) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/builds/x86_64/kernel"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let reader = ObjectReader::new(store_for(&server));
    let mut sink = Vec::new();
    let read = reader
        .fetch("builds", "x86_64/kernel", &mut sink)
        .await
        .unwrap();

    assert_eq!(read, body.len() as u64);
    assert_eq!(sink, body);
}

/// Answer one GET with `total` body bytes, one every `gap`
async fn trickle_server(total: usize, gap: Duration) -> std::net::SocketAddr {
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
        for _ in 0..total {
            socket.write_all(b"x").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(gap).await;
        }
    });

    addr
}

#[tokio::test]
async fn test_slow_transfer_completes() {
    // 20 bytes 100ms apart: two seconds in total, never silent for a full second
    let addr = trickle_server(20, Duration::from_millis(100)).await;
    let creds = Credentials::new("ACCESSKEY012", "SECRETKEY012");
    let store = S3Store::connect_with_timeouts(
        &addr.ip().to_string(),
        addr.port(),
        &creds,
        Duration::from_secs(1),
        Some(Duration::from_secs(1)),
    )
    .unwrap();

    let reader = ObjectReader::new(Arc::new(store));
    let mut sink = Vec::new();
    let read = reader
        .fetch("builds", "fcos.qcow2", &mut sink)
        .await
        .unwrap();

    assert_eq!(read, 20);
    assert_eq!(sink, vec![b'x'; 20]);
}
