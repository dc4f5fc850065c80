//! `OdinClient` against a raw TCP server that cuts bodies short of their
//! declared `Content-Length`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use microq_catalog::{Catalog, CatalogError, OdinClient};
use microq_core::http::HttpError;

const BODY: &str = r#"{"Date": "2015-01-20", "Name": "ecmwf_2015-01-20"}"#;

/// Serve every connection with `BODY`; the first `short` connections
/// declare 20 bytes more than they send.
async fn spawn_raw(short: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/rest_api", listener.local_addr().unwrap());
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            let declared = if seen < short { BODY.len() + 20 } else { BODY.len() };
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {declared}\r\nconnection: close\r\n\r\n{BODY}"
            );
            socket.write_all(response.as_bytes()).await.ok();
            socket.shutdown().await.ok();
        }
    });
    (base, requests)
}

#[tokio::test]
async fn short_body_is_fetched_again() {
    let (base, requests) = spawn_raw(1).await;
    let day = OdinClient::new(&base).latest_ecmf_day().await.unwrap();

    assert_eq!(day, NaiveDate::from_ymd_opt(2015, 1, 20).unwrap());
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_short_body_is_truncated_error() {
    let (base, requests) = spawn_raw(usize::MAX).await;
    let err = OdinClient::new(&base).latest_ecmf_day().await.unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Http(HttpError::Truncated { declared, .. }) if declared == BODY.len() as u64 + 20
    ));
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}
