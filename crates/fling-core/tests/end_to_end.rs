//! Both transfer roles talking over loopback.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use fling_core::client::{ClientConfig, TransferClient};
use fling_core::events::{EventBus, StatusEvent};
use fling_core::files::SharedFile;
use fling_core::server::TransferServer;

fn fixture(dir: &TempDir, name: &str, content: &[u8]) -> SharedFile {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    SharedFile::from_path(&path).unwrap()
}

async fn wait_for_file(path: &std::path::Path, expected_len: u64) {
    for _ in 0..100 {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() == expected_len {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("file {} never reached {expected_len} bytes", path.display());
}

#[tokio::test]
async fn test_full_session_including_late_share() {
    let sender_dir = TempDir::new().unwrap();
    let receiver_dir = TempDir::new().unwrap();

    let server_events = EventBus::new();
    let mut server = TransferServer::new(sender_dir.path().join("uploads"), server_events);
    let port = server.start(0).await.unwrap();

    let first = vec![1u8; 3000];
    server
        .update_files(vec![fixture(&sender_dir, "first.bin", &first)])
        .await;

    let client_events = EventBus::new();
    let mut rx = client_events.subscribe();
    let mut config = ClientConfig::new(receiver_dir.path().to_path_buf());
    config.port = port;
    config.poll_interval = Duration::from_millis(50);
    let client = Arc::new(TransferClient::new(config, client_events));

    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run(Ipv4Addr::LOCALHOST).await })
    };

    wait_for_file(&receiver_dir.path().join("first.bin"), 3000).await;
    assert_eq!(
        std::fs::read(receiver_dir.path().join("first.bin")).unwrap(),
        first
    );

    // File shared mid-session arrives on a later poll.
    let second = vec![2u8; 1234];
    server
        .update_files(vec![fixture(&sender_dir, "second.bin", &second)])
        .await;
    wait_for_file(&receiver_dir.path().join("second.bin"), 1234).await;
    assert_eq!(
        std::fs::read(receiver_dir.path().join("second.bin")).unwrap(),
        second
    );

    client.stop();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("client did not stop")
        .unwrap()
        .unwrap();
    server.stop().await;

    let mut completed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let StatusEvent::FileCompleted { name, .. } = event {
            completed.push(name);
        }
    }
    assert!(completed.contains(&"first.bin".to_string()));
    assert!(completed.contains(&"second.bin".to_string()));
}

#[tokio::test]
async fn test_concurrent_raw_downloads_stay_isolated() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let sender_dir = TempDir::new().unwrap();
    let mut server = TransferServer::new(sender_dir.path().join("uploads"), EventBus::new());
    let port = server.start(0).await.unwrap();

    // Two multi-chunk files with distinct byte patterns, so a stream
    // served from the wrong reader (or interleaved with the other
    // connection's bytes) cannot compare equal.
    let alpha: Vec<u8> = (0..100_000u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
    let beta: Vec<u8> = (0..120_000u32)
        .map(|i| u8::try_from(i % 241).unwrap().wrapping_add(7))
        .collect();
    server
        .update_files(vec![
            fixture(&sender_dir, "alpha.bin", &alpha),
            fixture(&sender_dir, "beta.bin", &beta),
        ])
        .await;

    let fetch = |name: &'static str| async move {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(format!("GET_FILE:{name}").as_bytes())
            .await
            .unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    };

    let first = tokio::spawn(fetch("alpha.bin"));
    let second = tokio::spawn(fetch("beta.bin"));

    let (got_alpha, got_beta) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(got_alpha, alpha, "alpha.bin corrupted by concurrent transfer");
    assert_eq!(got_beta, beta, "beta.bin corrupted by concurrent transfer");

    server.stop().await;
}

#[tokio::test]
async fn test_server_stops_accepting_after_stop() {
    let dir = TempDir::new().unwrap();
    let mut server = TransferServer::new(dir.path().to_path_buf(), EventBus::new());
    let port = server.start(0).await.unwrap();
    server.stop().await;

    // Give the accept loop a moment to wind down, then expect refusal
    // or an immediate close.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
    if let Ok(mut stream) = connect {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf)).await;
        assert!(matches!(n, Ok(Ok(0)) | Ok(Err(_))), "listener still serving");
    }
}
