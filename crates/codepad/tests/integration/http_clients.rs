//! The reqwest clients against a one-shot HTTP responder

use std::time::Duration;

use codepad::services::{
    CompileClient, CompileService, CompileServiceError, JudgeClient, JudgeError, JudgeService,
    UNKNOWN_COMPILATION_ERROR, encode_base64_text,
};
use codepad::types::Framework;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve a single request with `status` and a JSON `body`.
///
/// Returns the base URL and a receiver for the raw request text.
async fn respond_once(status: u16, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_owned();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        let _ = tx.send(request);
    });

    (format!("http://{addr}"), rx)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

#[tokio::test]
async fn test_judge_submission_round_trip() {
    let body = format!(
        r#"{{"stdout":"{}","stderr":null,"compile_output":null,"time":"0.021","memory":3456,"status":{{"id":3,"description":"Accepted"}}}}"#,
        encode_base64_text("héllo\n")
    );
    let (base, request) = respond_once(200, &body).await;
    let client = JudgeClient::new(&base, TIMEOUT).unwrap();

    let result = client.submit("print('héllo')", 71).await.unwrap();
    assert_eq!(result.stdout.as_deref(), Some("héllo\n"));
    assert_eq!(result.time.as_deref(), Some("0.021"));
    assert_eq!(result.memory, Some(3456));
    assert!(result.status.is_accepted());

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /submissions?base64_encoded=true&wait=true "));
    assert!(request.contains(&encode_base64_text("print('héllo')")));
    assert!(request.contains(r#""language_id":71"#));
}

#[tokio::test]
async fn test_judge_error_status_is_surfaced() {
    let (base, _request) = respond_once(500, r#"{"error":"queue full"}"#).await;
    let client = JudgeClient::new(&base, TIMEOUT).unwrap();

    let err = client.submit("x", 71).await.unwrap_err();
    let JudgeError::Status { status, body } = err else {
        panic!("expected a status error, got {err:?}");
    };
    assert_eq!(status, 500);
    assert!(body.contains("queue full"));
}

#[tokio::test]
async fn test_judge_unreachable_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = JudgeClient::new(&format!("http://{addr}"), TIMEOUT).unwrap();
    let err = client.submit("x", 71).await.unwrap_err();
    assert!(matches!(err, JudgeError::Transport(_)));
}

#[tokio::test]
async fn test_compile_success_returns_bundle() {
    let body = r#"{"success":true,"compilationTime":640,"files":{"index.html":"<div id=\"app\"></div>","assets/index.js":"mount()"}}"#;
    let (base, request) = respond_once(200, body).await;
    let client = CompileClient::new(&base, TIMEOUT).unwrap();

    let bundle = client.submit("<template/>", Framework::Vue).await.unwrap();
    assert_eq!(bundle.len(), 2);
    assert_eq!(bundle.get("assets/index.js"), Some("mount()"));

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /compile "));
    assert!(request.contains(r#""framework":"vue""#));
    assert!(request.contains(r#""code":"<template/>""#));
}

#[tokio::test]
async fn test_compile_failure_body_is_read_despite_status() {
    let body = r#"{"success":false,"logs":"Error: Unexpected token\n    at parse (x.js:1:1)"}"#;
    let (base, _request) = respond_once(422, body).await;
    let client = CompileClient::new(&base, TIMEOUT).unwrap();

    let err = client.submit("<div", Framework::React).await.unwrap_err();
    let CompileServiceError::Compilation(failure) = err else {
        panic!("expected a compilation error, got {err:?}");
    };
    assert!(failure.log.starts_with("Error: Unexpected token"));
    assert_eq!(failure.summary(), "❌ Error: Unexpected token");
}

#[tokio::test]
async fn test_compile_failure_without_details() {
    let (base, _request) = respond_once(200, r#"{"success":false}"#).await;
    let client = CompileClient::new(&base, TIMEOUT).unwrap();

    let err = client.submit("x", Framework::Angular).await.unwrap_err();
    let CompileServiceError::Compilation(failure) = err else {
        panic!("expected a compilation error, got {err:?}");
    };
    assert_eq!(failure.log, UNKNOWN_COMPILATION_ERROR);
}
