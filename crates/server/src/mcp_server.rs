//! MCP server.
//!
//! Newline-delimited JSON-RPC 2.0 over stdio in front of a
//! [`UnifiedServer`]. Requests without an `id` are notifications and get
//! no reply.

use aceflow_core::ToolName;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info};

use crate::error::ServerError;
use crate::server::{UnifiedServer, LOCAL_USER};

/// MCP Protocol version
pub const MCP_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "aceflow";

/// JSON-RPC error codes.
pub mod error_codes {
    /// Malformed JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Not a JSON-RPC request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Missing or malformed params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Handler failure
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Tool definition for MCP protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema of the arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Resource definition for MCP protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResource {
    /// Resource URI
    pub uri: String,
    /// Resource name
    pub name: String,
    /// Resource description
    pub description: String,
    /// MIME type
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// MCP Request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// Always `2.0`
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Request id; absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

/// MCP Response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    /// Always `2.0`
    pub jsonrpc: String,
    /// Id of the request answered (`null` when unknown)
    pub id: Value,
    /// Result data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

/// MCP Error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    /// JSON-RPC error code
    pub code: i32,
    /// Human readable message
    pub message: String,
    /// Extra data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP definition of a tool.
pub fn tool_definition(tool: ToolName) -> McpTool {
    let (description, input_schema) = match tool {
        ToolName::AceflowInit => (
            "Initialize an AceFlow project: state directory, result directory and optional skeleton",
            json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": ["minimal", "standard", "complete", "smart"], "description": "Initialization mode"},
                    "project_name": {"type": "string", "description": "Project name (defaults to the directory name)"},
                    "directory": {"type": "string", "description": "Subdirectory to initialize, relative to the project root"}
                }
            }),
        ),
        ToolName::AceflowStage => (
            "Query or move the workflow stage, or execute the current stage",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["status", "list", "next", "set", "reset", "execute"], "description": "Stage action (default: status)"},
                    "stage": {"type": "string", "description": "Target stage for set and execute"}
                }
            }),
        ),
        ToolName::AceflowValidate => (
            "Validate the project against quality checks",
            json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": ["basic", "standard", "comprehensive"], "description": "Validation depth (default: basic)"},
                    "fix": {"type": "boolean", "description": "Count warnings as fixed"}
                }
            }),
        ),
        ToolName::AceflowRespond => (
            "Answer a pending confirmation request",
            json!({
                "type": "object",
                "properties": {
                    "request_id": {"type": "string", "description": "Id of the pending request"},
                    "response": {"type": "string", "description": "Free-form answer, e.g. yes or no"},
                    "user_id": {"type": "string", "description": "Answering user"}
                },
                "required": ["request_id", "response"]
            }),
        ),
        ToolName::AceflowCollaborationStatus => (
            "Report pending requests, collaboration history and insights",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string", "description": "Project to report on"}
                }
            }),
        ),
        ToolName::AceflowTaskExecute => (
            "Execute the next executable task, or a named one",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string", "description": "Task id or part of its name"},
                    "auto_confirm": {"type": "boolean", "description": "Skip the confirmation request"}
                }
            }),
        ),
        ToolName::AceflowIntentAnalyze => (
            "Classify free-form user input into a workflow intent",
            json!({
                "type": "object",
                "properties": {
                    "user_input": {"type": "string", "description": "What the user said"},
                    "context": {"type": "object", "description": "Extra context echoed back"}
                },
                "required": ["user_input"]
            }),
        ),
        ToolName::AceflowRecommend => (
            "Recommend next actions for the current project",
            json!({
                "type": "object",
                "properties": {
                    "context": {"type": "object", "description": "Optional context, e.g. {\"user_input\": \"...\"}"}
                }
            }),
        ),
    };

    McpTool {
        name: tool.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// MCP front end of a [`UnifiedServer`].
pub struct McpServer {
    server: Arc<UnifiedServer>,
    version: String,
}

impl McpServer {
    /// Wrap an initialized server.
    pub fn new(server: Arc<UnifiedServer>) -> Self {
        Self {
            server,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The wrapped server.
    pub fn server(&self) -> &Arc<UnifiedServer> {
        &self.server
    }

    /// Tool definitions currently served.
    pub async fn list_tools(&self) -> Vec<McpTool> {
        self.server.tools().await.into_iter().map(tool_definition).collect()
    }

    /// Resource definitions.
    pub fn list_resources(&self) -> Vec<McpResource> {
        self.server
            .list_resources()
            .into_iter()
            .map(|route| McpResource {
                uri: route.uri.to_string(),
                name: route.name.to_string(),
                description: route.description.to_string(),
                mime_type: "application/json".to_string(),
            })
            .collect()
    }

    /// Handle one input line; `None` when nothing should be written back.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(McpResponse::failure(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                    None,
                ));
            }
        };

        let id = raw.get("id").cloned();
        let request: McpRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                return Some(McpResponse::failure(
                    id.unwrap_or(Value::Null),
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                    None,
                ));
            }
        };

        match request.id.clone() {
            Some(id) => Some(self.handle_request(id, &request).await),
            None => {
                self.handle_notification(&request);
                None
            }
        }
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            "notifications/initialized" => info!("MCP client initialized"),
            other => debug!("Ignoring notification: {}", other),
        }
    }

    async fn handle_request(&self, id: Value, request: &McpRequest) -> McpResponse {
        debug!("MCP request: {}", request.method);
        match request.method.as_str() {
            "initialize" => McpResponse::success(
                id,
                json!({
                    "protocolVersion": MCP_VERSION,
                    "capabilities": {
                        "tools": {"listChanged": false},
                        "resources": {"subscribe": false, "listChanged": false}
                    },
                    "serverInfo": {"name": SERVER_NAME, "version": self.version}
                }),
            ),

            "ping" => McpResponse::success(id, json!({})),

            "tools/list" => McpResponse::success(id, json!({ "tools": self.list_tools().await })),

            "tools/call" => {
                let Some(name) = request.params.get("name").and_then(|v| v.as_str()) else {
                    return McpResponse::failure(id, error_codes::INVALID_PARAMS, "Missing tool name", None);
                };
                let arguments = request.params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                debug!("Tool call: {}", name);

                let payload = self.server.call_tool_json(name, &arguments).await;
                let is_error = !payload.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
                let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());
                McpResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": is_error
                    }),
                )
            }

            "resources/list" => McpResponse::success(id, json!({ "resources": self.list_resources() })),

            "resources/read" => {
                let Some(uri) = request.params.get("uri").and_then(|v| v.as_str()) else {
                    return McpResponse::failure(id, error_codes::INVALID_PARAMS, "Missing resource uri", None);
                };
                debug!("Resource read: {}", uri);

                match self.server.read_resource(uri, Some(LOCAL_USER)).await {
                    Ok(content) => {
                        let text = serde_json::to_string_pretty(&content).unwrap_or_else(|_| "{}".to_string());
                        McpResponse::success(
                            id,
                            json!({
                                "contents": [{"uri": uri, "mimeType": "application/json", "text": text}]
                            }),
                        )
                    }
                    Err(e) => {
                        let code = match e {
                            ServerError::UnknownResource(_) => error_codes::INVALID_PARAMS,
                            _ => error_codes::INTERNAL_ERROR,
                        };
                        McpResponse::failure(id, code, e.to_string(), Some(json!({ "error_type": e.kind() })))
                    }
                }
            }

            other => McpResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None,
            ),
        }
    }

    /// Serve requests from `reader` until end of input.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let response_json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());

            if let Err(e) = writer.write_all(response_json.as_bytes()).await {
                error!("Failed to write response: {}", e);
                break;
            }
            if let Err(e) = writer.write_all(b"\n").await {
                error!("Failed to write newline: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush: {}", e);
            }
        }
        Ok(())
    }

    /// Serve MCP over stdin and stdout.
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting AceFlow MCP Server v{} (stdio transport)", self.version);
        self.server.start().await?;

        let served = self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

        self.server.stop().await;
        info!("MCP Server stopped");
        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerOptions;

    async fn mcp(dir: &std::path::Path) -> McpServer {
        let server = UnifiedServer::new(ServerOptions::new(dir).without_env());
        server.initialize().await.unwrap();
        McpServer::new(Arc::new(server))
    }

    fn request(id: i64, method: &str, params: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let response = mcp.handle_line(&request(1, "initialize", json!({}))).await.unwrap();
        assert_eq!(response.id, json!(1));
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(mcp.handle_line(&notification).await.is_none());

        let pong = mcp.handle_line(&request(2, "ping", Value::Null)).await.unwrap();
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let parse = mcp.handle_line("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, error_codes::PARSE_ERROR);
        assert_eq!(parse.id, Value::Null);

        let unknown = mcp.handle_line(&request(3, "tools/destroy", json!({}))).await.unwrap();
        assert_eq!(unknown.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let invalid = mcp.handle_line(&json!({"id": 4}).to_string()).await.unwrap();
        assert_eq!(invalid.id, json!(4));
        assert_eq!(invalid.error.unwrap().code, error_codes::INVALID_REQUEST);

        let missing = mcp.handle_line(&request(5, "tools/call", json!({}))).await.unwrap();
        assert_eq!(missing.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_list_has_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let response = mcp.handle_line(&request(1, "tools/list", json!({}))).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["aceflow_init", "aceflow_stage", "aceflow_validate"]);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_tools_call_wraps_boundary_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let ok = mcp
            .handle_line(&request(1, "tools/call", json!({"name": "aceflow_init", "arguments": {"project_name": "demo"}})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(ok["isError"], false);
        let payload: Value = serde_json::from_str(ok["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["success"], true);

        let failed = mcp
            .handle_line(&request(2, "tools/call", json!({"name": "aceflow_nothing"})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(failed["isError"], true);
        let payload: Value = serde_json::from_str(failed["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["error_type"], "unknown_tool");
    }

    #[tokio::test]
    async fn test_resources() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let list = mcp.handle_line(&request(1, "resources/list", json!({}))).await.unwrap();
        assert_eq!(list.result.unwrap()["resources"].as_array().unwrap().len(), 4);

        let read = mcp
            .handle_line(&request(2, "resources/read", json!({"uri": "aceflow://stage/guide/planning"})))
            .await
            .unwrap()
            .result
            .unwrap();
        let guide: Value = serde_json::from_str(read["contents"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(guide["stage"], "planning");

        let unknown = mcp
            .handle_line(&request(3, "resources/read", json!({"uri": "aceflow://nope"})))
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_over_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = mcp(dir.path()).await;

        let input = [
            request(1, "initialize", json!({})),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            String::new(),
            request(2, "tools/list", json!({})),
        ]
        .join("\n");

        let mut output = Vec::new();
        mcp.serve(input.as_bytes(), &mut output).await.unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
    }
}
