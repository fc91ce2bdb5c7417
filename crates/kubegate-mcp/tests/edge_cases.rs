//! Protocol-level integration tests for kubegate-mcp.
//!
//! Drives the full read-dispatch-write loop over in-memory byte streams.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use kubegate_mcp::config::{Settings, SettingsSource};
use kubegate_mcp::protocol::{ProtocolHandler, SessionState};
use kubegate_mcp::tools::{self, CallContext, FnHandler, SharedRegistry, Tool, ToolError};
use kubegate_mcp::transport::framing::{encode, FramedReader, Framing};
use kubegate_mcp::transport::StdioTransport;
use kubegate_mcp::types::ToolDefinition;

// ─────────────────────── helpers ───────────────────────

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

fn init_request(id: i64) -> Value {
    request(
        id,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }),
    )
}

fn call_request(id: i64, name: &str, arguments: Value) -> Value {
    request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
}

fn settings(timeout: Option<Duration>) -> Arc<SettingsSource> {
    Arc::new(SettingsSource::Fixed(Settings {
        call_timeout: timeout,
        ..Settings::default()
    }))
}

fn handler() -> ProtocolHandler {
    ProtocolHandler::new(SharedRegistry::new(), settings(None))
}

fn frame_all(framing: Framing, messages: &[Value]) -> Vec<u8> {
    messages
        .iter()
        .flat_map(|m| encode(framing, &serde_json::to_vec(m).unwrap()))
        .collect()
}

/// Run the transport over `input` and decode every message it wrote.
async fn run(transport: &StdioTransport, input: &[u8]) -> (Framing, Vec<Value>) {
    let mut out = Vec::new();
    transport.serve(input, &mut out).await.unwrap();
    decode_all(&out).await
}

async fn decode_all(bytes: &[u8]) -> (Framing, Vec<Value>) {
    let mut reader = FramedReader::detect(bytes).await.unwrap();
    let mut messages = Vec::new();
    while let Some(body) = reader.read_message().await.unwrap() {
        messages.push(serde_json::from_slice(&body).unwrap());
    }
    (reader.framing(), messages)
}

async fn dispatch(handler: &ProtocolHandler, message: Value) -> Option<Value> {
    let raw = serde_json::to_vec(&message).unwrap();
    handler
        .handle_message(&raw, &CancellationToken::new())
        .await
        .map(|r| r.message)
}

fn tool<F, Fut>(name: &str, description: &str, handler: F) -> Tool
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    Tool::new(
        ToolDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: None,
        },
        FnHandler(handler),
    )
}

fn constant_tool(name: &str, description: &str, value: Value) -> Tool {
    tool(name, description, move |_ctx, _args| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// AsyncWrite into a shared buffer, so a background task can inspect what
/// has been written so far.
#[derive(Clone, Default)]
struct SharedBuf(Arc<parking_lot::Mutex<Vec<u8>>>);

impl AsyncWrite for SharedBuf {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.0.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// AsyncWrite that always fails.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// ═══════════════════════════════════════════════════════
// FRAMING
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_01_header_framed_handshake_and_list() {
    let transport = StdioTransport::new(handler());
    let input = frame_all(
        Framing::Header,
        &[init_request(1), request(2, "tools/list", json!({}))],
    );

    let (framing, responses) = run(&transport, &input).await;
    assert_eq!(framing, Framing::Header);
    assert_eq!(responses.len(), 2);

    let init = &responses[0];
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "kubegate-mcp");
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["capabilities"]["tools"]["listChanged"], false);

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "echo"));
    assert!(tools.iter().all(|t| t.get("handler").is_none()));
}

#[tokio::test]
async fn test_02_newline_delimited_session() {
    let transport = StdioTransport::new(handler());
    let input = frame_all(
        Framing::Line,
        &[init_request(1), call_request(2, "echo", json!({ "text": "hi" }))],
    );

    let (framing, responses) = run(&transport, &input).await;
    assert_eq!(framing, Framing::Line);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["result"]["content"][0], json!({ "type": "text", "text": "hi" }));
    assert_eq!(responses[1]["result"]["isError"], false);
}

#[tokio::test]
async fn test_03_lowercase_header_is_detected() {
    let body = serde_json::to_vec(&request(4, "tools/list", json!({}))).unwrap();
    let mut input = format!("content-length: {}\r\n\r\n", body.len()).into_bytes();
    input.extend_from_slice(&body);

    let transport = StdioTransport::new(handler());
    let (framing, responses) = run(&transport, &input).await;
    assert_eq!(framing, Framing::Header);
    assert_eq!(responses[0]["id"], 4);
}

#[tokio::test]
async fn test_04_malformed_length_is_a_hard_error() {
    let transport = StdioTransport::new(handler());
    let mut out = Vec::new();
    let result = transport
        .serve(&b"Content-Length: twelve\r\n\r\n{}"[..], &mut out)
        .await;
    assert!(result.is_err());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_05_empty_input_is_clean_shutdown() {
    let transport = StdioTransport::new(handler());
    let (_, responses) = run(&transport, b"").await;
    assert!(responses.is_empty());
}

#[tokio::test]
async fn test_06_write_failure_terminates_loop() {
    let transport = StdioTransport::new(handler());
    let input = frame_all(Framing::Line, &[request(1, "tools/list", json!({}))]);
    let result = transport.serve(input.as_slice(), BrokenPipe).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_07_cancellation_mid_message_is_clean() {
    let transport = StdioTransport::new(handler());
    let shutdown = transport.shutdown_token();
    let (mut client, server) = tokio::io::duplex(1024);

    use tokio::io::AsyncWriteExt;
    client
        .write_all(b"Content-Length: 100\r\n\r\n{\"jsonrpc\"")
        .await
        .unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
    });

    let mut out = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), transport.serve(server, &mut out))
        .await
        .expect("loop should stop on cancellation");
    assert!(result.is_ok());
    assert!(out.is_empty());
    canceller.await.unwrap();
    drop(client);
}

// ═══════════════════════════════════════════════════════
// DISPATCH ERRORS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_08_parse_error_then_recovery() {
    let transport = StdioTransport::new(handler());
    let mut input = b"{this is not json}\n".to_vec();
    input.extend(frame_all(Framing::Line, &[request(9, "tools/list", json!({}))]));

    let (_, responses) = run(&transport, &input).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1]["id"], 9);
    assert!(responses[1]["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_09_wrong_version_echoes_id() {
    let h = handler();
    let response = dispatch(&h, json!({ "jsonrpc": "1.0", "id": "abc", "method": "tools/list" }))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], "abc");
}

#[tokio::test]
async fn test_10_unknown_method() {
    let h = handler();
    let response = dispatch(&h, request(3, "resources/list", json!({}))).await.unwrap();
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 3);
}

#[tokio::test]
async fn test_11_invalid_params() {
    let h = handler();
    let response = dispatch(&h, request(5, "tools/call", json!({ "arguments": {} })))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32602);

    let response = dispatch(&h, request(6, "initialize", json!("not an object")))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_12_notifications_get_no_reply() {
    let transport = StdioTransport::new(handler());
    let input = frame_all(
        Framing::Header,
        &[
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            request(1, "tools/list", json!({})),
        ],
    );
    let (_, responses) = run(&transport, &input).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 1);
}

#[tokio::test]
async fn test_13_unknown_tool_is_a_result_not_an_error() {
    let h = handler();
    let response = dispatch(&h, call_request(7, "nonexistent-tool", json!({})))
        .await
        .unwrap();
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("nonexistent-tool"));
}

#[tokio::test]
async fn test_14_tools_usable_before_initialize() {
    let h = handler();
    assert_eq!(h.state(), SessionState::AwaitingInitialize);
    let response = dispatch(&h, call_request(1, "echo", json!({ "text": "early" })))
        .await
        .unwrap();
    assert_eq!(response["result"]["content"][0]["text"], "early");
}

#[tokio::test]
async fn test_15_initialize_without_params() {
    let h = handler();
    let response = dispatch(&h, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
        .await
        .unwrap();
    assert_eq!(response["result"]["serverInfo"]["name"], "kubegate-mcp");
}

// ═══════════════════════════════════════════════════════
// REGISTRY AND CALLS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_16_last_registration_wins() {
    let registry = SharedRegistry::new();
    let h = ProtocolHandler::new(registry.clone(), settings(None));
    registry.register(constant_tool("status", "first", json!("one")));
    registry.register(constant_tool("status", "second", json!({ "v": 2 })));

    let list = dispatch(&h, request(1, "tools/list", json!({}))).await.unwrap();
    let tools = list["result"]["tools"].as_array().unwrap();
    let status: Vec<_> = tools.iter().filter(|t| t["name"] == "status").collect();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0]["description"], "second");

    let call = dispatch(&h, call_request(2, "status", json!({}))).await.unwrap();
    assert_eq!(call["result"]["content"][0], json!({ "type": "json", "data": { "v": 2 } }));
}

#[tokio::test]
async fn test_17_call_timeout_becomes_domain_error() {
    let registry = SharedRegistry::new();
    let h = ProtocolHandler::new(registry.clone(), settings(Some(Duration::from_millis(30))));
    registry.register(tool(
        "slow",
        "sleeps",
        |ctx: CallContext, _args| async move {
            ctx.run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, ToolError>(json!("done"))
            })
            .await
        },
    ));

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        dispatch(&h, call_request(1, "slow", json!({}))),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response["result"]["isError"], true);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("timed out"), "{text}");
}

#[tokio::test]
async fn test_18_placeholders_report_not_ready() {
    let registry = SharedRegistry::new();
    tools::register_placeholders(&registry);
    let h = ProtocolHandler::new(registry, settings(None));

    let response = dispatch(&h, call_request(1, "cluster_health", json!({})))
        .await
        .unwrap();
    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Kubernetes backend not initialized yet"
    );
}

// ═══════════════════════════════════════════════════════
// DEFERRED INITIALIZATION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_19_hook_runs_after_response_is_written() {
    let out = SharedBuf::default();
    let seen_by_hook = out.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let h = handler().on_initialized(move |_ctx| async move {
        let written = seen_by_hook.0.lock().clone();
        let _ = tx.send(written);
    });
    let transport = StdioTransport::new(h);
    let input = frame_all(Framing::Header, &[init_request(1)]);
    transport.serve(input.as_slice(), out.clone()).await.unwrap();

    let written = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    let (_, messages) = decode_all(&written).await;
    assert_eq!(messages.len(), 1, "initialize reply must be flushed before the hook runs");
    assert_eq!(messages[0]["id"], 1);
}

#[tokio::test]
async fn test_20_hook_fires_once_and_upgrades_tools() {
    let registry = SharedRegistry::new();
    registry.register(tool(
        "ready",
        "placeholder",
        |_ctx, _args| async { Err(ToolError::NotReady) },
    ));

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let h = ProtocolHandler::new(registry, settings(None)).on_initialized(move |ctx| async move {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        ctx.registry
            .register(constant_tool("ready", "working", json!("ok")));
        let _ = tx.send(());
    });

    let shutdown = CancellationToken::new();
    let before = dispatch(&h, call_request(1, "ready", json!({}))).await.unwrap();
    assert_eq!(before["result"]["isError"], true);

    for id in [2, 3] {
        let raw = serde_json::to_vec(&init_request(id)).unwrap();
        let reply = h.handle_message(&raw, &shutdown).await.unwrap();
        assert!(reply.completes_handshake);
        h.complete_handshake(&shutdown);
    }
    assert_eq!(h.state(), SessionState::Ready);

    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    tokio::task::yield_now().await;
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let after = dispatch(&h, call_request(4, "ready", json!({}))).await.unwrap();
    assert_eq!(after["result"]["isError"], false);
    assert_eq!(after["result"]["content"][0]["text"], "ok");
}

#[tokio::test]
async fn test_21_failed_initialize_does_not_fire_hook() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let h = handler().on_initialized(move |_ctx| async move {
        let _ = tx.send(());
    });

    let raw = serde_json::to_vec(&request(1, "initialize", json!(42))).unwrap();
    let reply = h.handle_message(&raw, &CancellationToken::new()).await.unwrap();
    assert!(!reply.completes_handshake);
    assert_eq!(reply.message["error"]["code"], -32602);
    assert_eq!(h.state(), SessionState::AwaitingInitialize);

    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err());
}
