//! In-process MCP tool server.
//!
//! [`ToolServer`] answers the JSON-RPC methods a stream-json agent issues
//! against an SDK-hosted server: `initialize`, `tools/list`, `tools/call`,
//! and `ping`. Each connected session gets its own serving task reading
//! from a private channel pair.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{CallToolResult, ErrorCode, ListToolsResult, Tool};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{McpChannel, SdkMcpServer};
use crate::errors::Result;

/// MCP protocol revision reported by the initialize reply.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Frame capacity for each direction of a server sub-transport.
const CHANNEL_CAPACITY: usize = 32;

/// One tool exposed by a [`ToolServer`].
pub trait SdkTool: Send + Sync {
    /// Tool name, unique within its server.
    fn name(&self) -> &str;

    /// Description surfaced to the model through `tools/list`.
    fn description(&self) -> &str;

    /// JSON schema for the tool arguments.
    fn input_schema(&self) -> Value;

    /// Run the tool against the given arguments.
    ///
    /// # Errors
    ///
    /// A returned [`SdkError`](crate::SdkError) is reported to the caller as
    /// a JSON-RPC internal error.
    fn call(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>>;
}

/// A named collection of [`SdkTool`]s served over MCP.
pub struct ToolServer {
    name: String,
    version: String,
    tools: Vec<Arc<dyn SdkTool>>,
}

impl ToolServer {
    /// Create an empty server with the given name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: Vec::new(),
        }
    }

    /// Add a tool to the server.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn SdkTool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Server version reported by the initialize reply.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl SdkMcpServer for ToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<McpChannel>> + Send + '_>> {
        Box::pin(async move {
            let (to_server, inbound) = mpsc::channel(CHANNEL_CAPACITY);
            let (outbound, from_server) = mpsc::channel(CHANNEL_CAPACITY);
            tokio::spawn(serve(
                self.name.clone(),
                self.version.clone(),
                self.tools.clone(),
                inbound,
                outbound,
            ));
            Ok(McpChannel {
                to_server,
                from_server,
            })
        })
    }
}

/// Answer JSON-RPC frames until the session side hangs up.
async fn serve(
    name: String,
    version: String,
    tools: Vec<Arc<dyn SdkTool>>,
    mut inbound: mpsc::Receiver<Value>,
    outbound: mpsc::Sender<Value>,
) {
    while let Some(frame) = inbound.recv().await {
        let method = frame
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        if method.is_empty() {
            debug!(server = name.as_str(), "ignoring frame without method");
            continue;
        }
        let Some(id) = frame.get("id").filter(|id| !id.is_null()).cloned() else {
            // Notifications carry no id and expect no reply.
            debug!(
                server = name.as_str(),
                method = method.as_str(),
                "notification received"
            );
            continue;
        };
        let reply = match method.as_str() {
            "initialize" => ok_reply(
                &id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": name, "version": version },
                }),
            ),
            "tools/list" => list_tools(&tools, &id),
            "tools/call" => handle_call(&tools, &id, frame.get("params")).await,
            "ping" => ok_reply(&id, json!({})),
            other => err_reply(
                &id,
                &rmcp::ErrorData::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                    None,
                ),
            ),
        };
        if outbound.send(reply).await.is_err() {
            debug!(server = name.as_str(), "session side hung up, stopping");
            break;
        }
    }
    debug!(server = name.as_str(), "tool server task stopped");
}

/// Build the `tools/list` reply.
fn list_tools(tools: &[Arc<dyn SdkTool>], id: &Value) -> Value {
    let listing =
        ListToolsResult::with_all_items(tools.iter().map(|tool| describe(tool.as_ref())).collect());
    match serde_json::to_value(listing) {
        Ok(value) => ok_reply(id, value),
        Err(err) => err_reply(
            id,
            &rmcp::ErrorData::internal_error(format!("failed to encode tool listing: {err}"), None),
        ),
    }
}

/// Dispatch one `tools/call` request.
async fn handle_call(tools: &[Arc<dyn SdkTool>], id: &Value, params: Option<&Value>) -> Value {
    let Some(params) = params else {
        return err_reply(
            id,
            &rmcp::ErrorData::invalid_params("tools/call requires params", None),
        );
    };
    let tool_name = params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let Some(tool) = tools.iter().find(|tool| tool.name() == tool_name) else {
        return err_reply(
            id,
            &rmcp::ErrorData::invalid_params(format!("unknown tool: {tool_name}"), None),
        );
    };
    match tool.call(arguments).await {
        Ok(result) => match serde_json::to_value(result) {
            Ok(value) => ok_reply(id, value),
            Err(err) => err_reply(
                id,
                &rmcp::ErrorData::internal_error(
                    format!("failed to encode tool result: {err}"),
                    None,
                ),
            ),
        },
        Err(err) => err_reply(id, &rmcp::ErrorData::internal_error(err.to_string(), None)),
    }
}

/// Render one tool for the `tools/list` reply.
fn describe(tool: &dyn SdkTool) -> Tool {
    Tool {
        name: tool.name().to_owned().into(),
        title: None,
        description: Some(tool.description().to_owned().into()),
        input_schema: schema(tool.input_schema()),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// Convert a JSON value into the schema map the MCP model expects.
fn schema(value: Value) -> Arc<Map<String, Value>> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}

/// Successful JSON-RPC response frame.
fn ok_reply(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// JSON-RPC error response frame.
fn err_reply(id: &Value, error: &rmcp::ErrorData) -> Value {
    match serde_json::to_value(error) {
        Ok(body) => json!({ "jsonrpc": "2.0", "id": id, "error": body }),
        Err(_) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32603, "message": "internal error" },
        }),
    }
}
