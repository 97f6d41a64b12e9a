//! CLI Integration Tests
//!
//! Runs the `sockrpc` binary against demo servers started in-process.
//!
//! Test Scenarios:
//! 1. Argument validation (URL scheme, JSON arguments)
//! 2. `call`, `stream` and `describe` over WebSocket and TCP
//! 3. Remote errors reported on stderr with a non-zero exit code
//! 4. `serve` startup
//!
//! All servers bind `127.0.0.1` on port 0 to avoid clashes.

use std::process::Output;
use std::time::Duration;

use sockrpc_cli::demo;
use sockrpc_client::{Client, ClientConfig};
use sockrpc_server::{TcpServer, WebSocketServer};
use tokio::process::Command;

// ============================================================================
// Test Helpers
// ============================================================================

fn sockrpc_bin() -> &'static str {
    env!("CARGO_BIN_EXE_sockrpc")
}

async fn run(args: &[&str]) -> Output {
    Command::new(sockrpc_bin())
        .args(args)
        .output()
        .await
        .expect("failed to run sockrpc")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Starts the demo backend over WebSocket and returns its URL.
async fn websocket_server() -> String {
    let server = WebSocketServer::bind("127.0.0.1:0", demo::backend(Duration::ZERO))
        .await
        .unwrap();
    let url = format!("ws://{}/ws", server.local_addr());
    tokio::spawn(server.run());
    url
}

/// Starts the demo backend over TCP and returns its URL.
async fn tcp_server() -> String {
    let server = TcpServer::bind("127.0.0.1:0", demo::backend(Duration::ZERO)).await.unwrap();
    let url = format!("tcp://{}", server.local_addr());
    tokio::spawn(server.run());
    url
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[tokio::test]
async fn test_call_requires_known_scheme() {
    let output = run(&["call", "http://127.0.0.1:8000", "greet"]).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ws://"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_call_with_invalid_json_args() {
    let output = run(&["call", "ws://127.0.0.1:8000/ws", "greet", "-a", "[not json"]).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid JSON in args"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_serve_rejects_unknown_transport() {
    let output = run(&["serve", "--transport", "quic"]).await;

    assert!(!output.status.success());
}

#[tokio::test]
async fn test_describe_times_out_without_server() {
    // A listener that accepts but never speaks
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("tcp://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let output = run(&["describe", &url, "--timeout-ms", "200"]).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("200"), "stderr: {}", stderr);
}

// ============================================================================
// Client Command Tests
// ============================================================================

#[tokio::test]
async fn test_call_over_websocket() {
    let url = websocket_server().await;

    let output = run(&["call", &url, "greet", "-a", "[\"world\"]"]).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec!["\"Hello, world!\""]);
}

#[tokio::test]
async fn test_call_nested_over_tcp() {
    let url = tcp_server().await;

    let output = run(&["call", &url, "math.subtract", "-a", "[10, 4]"]).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec!["6"]);
}

#[tokio::test]
async fn test_call_remote_error() {
    let url = websocket_server().await;

    let output = run(&["call", &url, "greet", "-a", "[42]"]).await;

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("argument 0 must be a string"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_call_unknown_method() {
    let url = websocket_server().await;

    let output = run(&["call", &url, "math.multiply", "-a", "[2, 3]"]).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("math.multiply"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_stream_prints_each_value() {
    let url = tcp_server().await;

    let output = run(&["stream", &url, "countTo", "-a", "[4]"]).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_describe() {
    let url = websocket_server().await;

    let output = run(&["describe", &url]).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        schema,
        serde_json::json!({
            "countTo": "generator",
            "echo": "function",
            "greet": "function",
            "math": {"add": "function", "subtract": "function"}
        })
    );
}

// ============================================================================
// Server Startup Tests
// ============================================================================

#[tokio::test]
async fn test_serve_starts_and_listens() {
    // Reserve a free port, then hand it to the server
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let bind = format!("127.0.0.1:{}", port);

    let mut child = Command::new(sockrpc_bin())
        .args(["serve", "-b", &bind, "--transport", "tcp", "--step-delay-ms", "0"])
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn sockrpc serve");

    let url = format!("tcp://{}", bind);
    let config = ClientConfig::new().with_description_timeout(Duration::from_millis(500));
    let mut client = None;
    for _ in 0..50 {
        if let Ok(connected) = Client::connect_url(&url, config.clone()).await {
            client = Some(connected);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let client = client.expect("server never came up");

    let sum = client.call("math.add", vec![serde_json::json!(2), serde_json::json!(3)]).await.unwrap();
    assert_eq!(sum, serde_json::json!(5));

    client.close();
    child.kill().await.unwrap();
}
