// Integration tests for sockrpc-server
//
// These tests serve a module over one end of an in-memory connection and
// speak the raw wire protocol from the other end.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sockrpc_common::transport::{memory, Connection};
use sockrpc_server::{Module, Responder};

// ============================================================================
// Test Helpers
// ============================================================================

/// Raw protocol peer standing in for a caller
struct TestPeer {
    connection: Connection,
}

impl TestPeer {
    async fn send(&mut self, message: Value) {
        self.connection.sink.send(message.to_string()).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.connection.stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .expect("connection error");
        serde_json::from_str(&frame).unwrap()
    }

    /// Asserts that nothing arrives within `wait`
    async fn assert_silent(&mut self, wait: Duration) {
        let next = tokio::time::timeout(wait, self.connection.stream.next()).await;
        assert!(next.is_err(), "unexpected message: {:?}", next);
    }
}

fn test_module() -> Module {
    Module::new()
        .sync_function("greet", |args| {
            let name = args.first().and_then(Value::as_str).unwrap_or("nobody");
            Ok(json!(format!("Hello, {}!", name)))
        })
        .module(
            "math",
            Module::new()
                .sync_function("add", |args| {
                    Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
                })
                .sync_function("fail", |_| anyhow::bail!("boom")),
        )
        .function("slow", |args| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        })
        .sync_function("panics", |_| panic!("handler bug"))
        .coroutine("countTo", |args, yielder| async move {
            let n = args.first().and_then(Value::as_u64).unwrap_or(0);
            for i in 1..n {
                yielder.yield_(json!(i)).await;
            }
            Ok(json!(n))
        })
        .coroutine("accumulate", |_, yielder| async move {
            let mut total = 0;
            while let Some(value) = yielder.yield_(json!(total)).await {
                total += value.as_i64().unwrap_or(0);
            }
            Ok(json!(total))
        })
        .coroutine("flaky", |_, yielder| async move {
            yielder.yield_(json!("ok")).await;
            anyhow::bail!("step broke")
        })
        .coroutine("explodes", |args, yielder| async move {
            yielder.yield_(json!(1)).await;
            // Indexes past the end of the arguments
            Ok(args[5].clone())
        })
        .iterator("unbuildable", |args| Ok(vec![args[3].clone()]))
        .generator("refuses", |_| -> anyhow::Result<sockrpc_server::IterGenerator<std::vec::IntoIter<Value>>> {
            anyhow::bail!("cannot start")
        })
}

/// Starts serving the test module and consumes the description
async fn serve() -> (TestPeer, Value) {
    let (server, client) = memory::pair();
    let responder = Responder::new(test_module());
    tokio::spawn(async move { responder.serve_connection(server).await });

    let mut peer = TestPeer { connection: client };
    let description = peer.recv().await;
    (peer, description)
}

// ============================================================================
// Description Tests
// ============================================================================

#[tokio::test]
async fn test_description_is_sent_first() {
    let (_peer, description) = serve().await;

    assert_eq!(description["type"], json!("description"));
    assert_eq!(
        description["module"],
        json!({
            "accumulate": "generator",
            "countTo": "generator",
            "explodes": "generator",
            "flaky": "generator",
            "greet": "function",
            "math": {"add": "function", "fail": "function"},
            "panics": "function",
            "refuses": "generator",
            "slow": "function",
            "unbuildable": "generator"
        })
    );
}

#[tokio::test]
async fn test_every_connection_gets_its_own_description() {
    let responder = Responder::new(test_module());
    let mut peers = Vec::new();
    for _ in 0..2 {
        let (server, client) = memory::pair();
        let responder = responder.clone();
        tokio::spawn(async move { responder.serve_connection(server).await });
        peers.push(TestPeer { connection: client });
    }

    for peer in &mut peers {
        let description = peer.recv().await;
        assert_eq!(description["type"], json!("description"));
        assert_eq!(description["module"]["math"], json!({"add": "function", "fail": "function"}));
    }

    // Calls on one connection are answered on that connection only.
    peers[1].send(json!({"type": "method call", "id": 0, "method": "math.add", "args": [1, 2]})).await;
    assert_eq!(peers[1].recv().await, json!({"type": "method result", "id": 0, "result": 3}));
    peers[0].assert_silent(Duration::from_millis(100)).await;
}

// ============================================================================
// Plain Call Tests
// ============================================================================

#[tokio::test]
async fn test_plain_call_result() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 0, "method": "math.add", "args": [2, 3]})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 0, "result": 5}));

    peer.send(json!({"type": "method call", "id": 1, "method": "greet", "args": ["world"]})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 1, "result": "Hello, world!"})
    );
}

#[tokio::test]
async fn test_failure_is_reported_and_listener_keeps_serving() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 4, "method": "math.fail", "args": []})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 4, "error": "boom"}));

    peer.send(json!({"type": "method call", "id": 5, "method": "math.fail", "args": []})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 5, "error": "boom"}));
}

#[tokio::test]
async fn test_panicking_handler_reports_error() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 1, "method": "panics", "args": []})).await;
    let reply = peer.recv().await;
    assert_eq!(reply["id"], json!(1));
    assert!(reply["error"].as_str().unwrap().contains("panicked"));

    peer.send(json!({"type": "method call", "id": 2, "method": "math.add", "args": [1, 1]})).await;
    assert_eq!(peer.recv().await["result"], json!(2));
}

#[tokio::test]
async fn test_panicking_generator_step_reports_error() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 6, "method": "explodes", "args": []})).await;
    assert_eq!(peer.recv().await, json!({"type": "method start", "id": 6}));

    peer.send(json!({"type": "method next", "id": 6})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 6, "result": 1, "done": false})
    );

    peer.send(json!({"type": "method next", "id": 6})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 6, "error": "method 'explodes' panicked"})
    );

    // The broken generator is gone; the call finishes instead of hanging.
    peer.send(json!({"type": "method next", "id": 6})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 6, "result": null, "done": true})
    );

    peer.send(json!({"type": "method call", "id": 7, "method": "math.add", "args": [2, 2]})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 7, "result": 4}));
}

#[tokio::test]
async fn test_panicking_generator_factory_reports_error() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 8, "method": "unbuildable", "args": []})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 8, "error": "method 'unbuildable' panicked"})
    );

    peer.send(json!({"type": "method next", "id": 8})).await;
    peer.assert_silent(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_slow_call_does_not_block_others() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 0, "method": "slow", "args": ["late"]})).await;
    peer.send(json!({"type": "method call", "id": 1, "method": "slow", "args": ["later"]})).await;
    peer.send(json!({"type": "method call", "id": 2, "method": "math.add", "args": [1, 2]})).await;

    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 2, "result": 3}));

    let mut slow = vec![peer.recv().await, peer.recv().await];
    slow.sort_by_key(|reply| reply["id"].as_u64());
    assert_eq!(slow[0], json!({"type": "method result", "id": 0, "result": "late"}));
    assert_eq!(slow[1], json!({"type": "method result", "id": 1, "result": "later"}));
}

#[tokio::test]
async fn test_unknown_method_and_garbage_are_ignored() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 0, "method": "nope", "args": []})).await;
    peer.send(json!({"type": "method call", "id": 1, "method": "math", "args": []})).await;
    peer.send(json!({"hello": "there"})).await;
    peer.assert_silent(Duration::from_millis(100)).await;

    peer.send(json!({"type": "method call", "id": 2, "method": "math.add", "args": [0, 0]})).await;
    assert_eq!(peer.recv().await["id"], json!(2));
}

// ============================================================================
// Streaming Tests
// ============================================================================

#[tokio::test]
async fn test_stream_sequence_and_return_value() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 7, "method": "countTo", "args": [4]})).await;
    assert_eq!(peer.recv().await, json!({"type": "method start", "id": 7}));

    for expected in 1..4 {
        peer.send(json!({"type": "method next", "id": 7})).await;
        assert_eq!(
            peer.recv().await,
            json!({"type": "method result", "id": 7, "result": expected, "done": false})
        );
    }

    peer.send(json!({"type": "method next", "id": 7})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 7, "result": 4, "done": true})
    );

    // The per-call listener is gone once done.
    peer.send(json!({"type": "method next", "id": 7})).await;
    peer.assert_silent(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_stream_receives_sent_values() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 1, "method": "accumulate", "args": []})).await;
    assert_eq!(peer.recv().await["type"], json!("method start"));

    peer.send(json!({"type": "method next", "id": 1, "args": 99})).await;
    assert_eq!(peer.recv().await["result"], json!(0));

    peer.send(json!({"type": "method next", "id": 1, "args": 3})).await;
    assert_eq!(peer.recv().await["result"], json!(3));

    peer.send(json!({"type": "method next", "id": 1, "args": 4})).await;
    assert_eq!(peer.recv().await["result"], json!(7));

    peer.send(json!({"type": "method next", "id": 1})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 1, "result": 7, "done": true})
    );
}

#[tokio::test]
async fn test_step_error_keeps_call_open() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 3, "method": "flaky", "args": []})).await;
    assert_eq!(peer.recv().await["type"], json!("method start"));

    peer.send(json!({"type": "method next", "id": 3})).await;
    assert_eq!(peer.recv().await["result"], json!("ok"));

    peer.send(json!({"type": "method next", "id": 3})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 3, "error": "step broke"}));

    peer.send(json!({"type": "method next", "id": 3})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 3, "result": null, "done": true})
    );
}

#[tokio::test]
async fn test_generator_factory_error_replaces_start() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 2, "method": "refuses", "args": []})).await;
    assert_eq!(
        peer.recv().await,
        json!({"type": "method result", "id": 2, "error": "cannot start"})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_streams_are_independent() {
    let (mut peer, _) = serve().await;

    peer.send(json!({"type": "method call", "id": 10, "method": "countTo", "args": [3]})).await;
    peer.send(json!({"type": "method call", "id": 11, "method": "countTo", "args": [2]})).await;

    let mut starts = vec![peer.recv().await["id"].clone(), peer.recv().await["id"].clone()];
    starts.sort_by_key(|id| id.as_u64());
    assert_eq!(starts, vec![json!(10), json!(11)]);

    peer.send(json!({"type": "method next", "id": 11})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 11, "result": 1, "done": false}));

    peer.send(json!({"type": "method next", "id": 10})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 10, "result": 1, "done": false}));

    peer.send(json!({"type": "method next", "id": 11})).await;
    assert_eq!(peer.recv().await, json!({"type": "method result", "id": 11, "result": 2, "done": true}));
}
