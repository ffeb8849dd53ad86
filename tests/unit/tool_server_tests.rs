//! Unit tests for the in-process MCP tool server.
//!
//! Each test connects a server to a fresh channel pair and drives raw
//! JSON-RPC frames through it, the same way a session bridges
//! `mcp_message` traffic.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Value};

use agent_conduit::{McpChannel, Result, SdkMcpServer, SdkTool, ToolServer};

/// Echoes the `text` argument back as its result.
struct EchoTool;

impl SdkTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text back"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    fn call(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>> {
        Box::pin(async move {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            Ok(CallToolResult::success(vec![Content::text(text)]))
        })
    }
}

/// Connect a one-tool server and return its channel pair.
async fn connect_echo_server() -> McpChannel {
    let server = ToolServer::new("echo-server", "1.2.3").with_tool(Arc::new(EchoTool));
    server.connect().await.expect("connect must succeed")
}

/// Round-trip one request frame through the server.
async fn round_trip(channel: &mut McpChannel, frame: Value) -> Value {
    channel
        .to_server
        .send(frame)
        .await
        .expect("server must be accepting frames");
    channel
        .from_server
        .recv()
        .await
        .expect("server must produce a reply")
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// The initialize reply reports the protocol revision, a tools capability,
/// and the configured server identity.
#[tokio::test]
async fn initialize_reports_identity() {
    let mut channel = connect_echo_server().await;

    let reply = round_trip(
        &mut channel,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
    )
    .await;

    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["serverInfo"]["name"], "echo-server");
    assert_eq!(reply["result"]["serverInfo"]["version"], "1.2.3");
    assert!(
        reply["result"]["capabilities"]["tools"].is_object(),
        "a tools capability must be advertised"
    );
}

/// Notifications produce no reply; the next request is answered as usual.
#[tokio::test]
async fn notifications_produce_no_reply() {
    let mut channel = connect_echo_server().await;

    channel
        .to_server
        .send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await
        .expect("server must accept the notification");

    // The very next reply must answer the ping, not the notification.
    let reply = round_trip(
        &mut channel,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }),
    )
    .await;

    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"], json!({}));
}

// ── Tool listing and dispatch ────────────────────────────────────────────────

/// `tools/list` returns every registered tool with its schema.
#[tokio::test]
async fn tools_list_returns_registered_tools() {
    let mut channel = connect_echo_server().await;

    let reply = round_trip(
        &mut channel,
        json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }),
    )
    .await;

    let tools = reply["result"]["tools"]
        .as_array()
        .expect("tools must be an array");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "echo");
    assert_eq!(tools[0]["description"], "Echo the input text back");
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
}

/// `tools/call` dispatches to the named tool and returns its content.
#[tokio::test]
async fn tools_call_dispatches() {
    let mut channel = connect_echo_server().await;

    let reply = round_trip(
        &mut channel,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "echo", "arguments": { "text": "ahoy" } }
        }),
    )
    .await;

    assert_eq!(reply["id"], 4);
    assert_eq!(reply["result"]["content"][0]["text"], "ahoy");
}

/// Calling an unregistered tool is an invalid-params error, not a crash.
#[tokio::test]
async fn tools_call_unknown_tool_errors() {
    let mut channel = connect_echo_server().await;

    let reply = round_trip(
        &mut channel,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": { "name": "missing", "arguments": {} }
        }),
    )
    .await;

    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], -32602);
    assert!(
        reply["error"]["message"]
            .as_str()
            .expect("error message")
            .contains("missing"),
        "error must name the unknown tool"
    );
}

// ── Method handling ──────────────────────────────────────────────────────────

/// A request for a method this server does not implement gets a
/// method-not-found error with its id echoed back.
#[tokio::test]
async fn unknown_method_not_found() {
    let mut channel = connect_echo_server().await;

    let reply = round_trip(
        &mut channel,
        json!({ "jsonrpc": "2.0", "id": 6, "method": "resources/list" }),
    )
    .await;

    assert_eq!(reply["id"], 6);
    assert_eq!(reply["error"]["code"], -32601);
}

/// Dropping the session side stops the serving task without a reply ever
/// being sent to a closed channel.
#[tokio::test]
async fn server_stops_when_session_side_drops() {
    let channel = connect_echo_server().await;

    drop(channel);
    // Nothing to assert beyond not hanging: the serving task observes the
    // closed inbound channel and exits.
    tokio::task::yield_now().await;
}
