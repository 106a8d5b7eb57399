use crate::chain::ChainResolver;
use crate::error::{QuestchainError, Result};
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server over a shared chain resolver
pub struct McpServer {
    resolver: Arc<ChainResolver>,
}

impl McpServer {
    pub fn new(resolver: Arc<ChainResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<ChainResolver> {
        &self.resolver
    }

    /// Process one JSON-RPC request (transport-agnostic).
    ///
    /// Returns `Ok(None)` for notifications. Handler failures come back as
    /// JSON-RPC error responses, never as `Err`.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        if request.jsonrpc != "2.0" {
            return Ok(Some(JsonRpcResponse::error(
                id,
                error_codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            )));
        }

        // HTTP requests are stateless, so initialization is not enforced here
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(JsonRpcResponse::result(id.clone(), Value::Null)),
            _ => Ok(JsonRpcResponse::error(
                id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        };

        Ok(Some(response.unwrap_or_else(|e| error_response(&id, e))))
    }

    /// Run the MCP server (reads from stdin, writes to stdout)
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdin_reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut line = String::new();
        let mut initialized = false;

        // stdout carries protocol frames only
        log::info!("Questchain MCP server v{} starting on stdio", env!("CARGO_PKG_VERSION"));

        loop {
            line.clear();
            let bytes_read = stdin_reader.read_line(&mut line).await?;

            // EOF - client disconnected
            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    let id = extract_id_from_line(trimmed).unwrap_or(Value::Null);
                    let error_response =
                        JsonRpcResponse::error(id, error_codes::PARSE_ERROR, format!("Parse error: {}", e));
                    send_response(&mut stdout, &error_response).await?;
                    continue;
                }
            };

            let was_initialized = initialized;
            match self.process_mcp_request(request, &mut initialized).await {
                Ok(Some(response)) => send_response(&mut stdout, &response).await?,
                Ok(None) => {
                    if initialized && !was_initialized {
                        log::info!("Client initialized");
                    }
                }
                Err(e) => log::error!("Unexpected error in process_mcp_request: {}", e),
            }
        }

        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or(serde_json::json!({})))
                .map_err(|e| QuestchainError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        if let Some(client) = &params.client_info {
            log::debug!("initialize from client {}", client);
        }

        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "questchain".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::result(id.clone(), to_json(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(JsonRpcResponse::result(id.clone(), to_json(&result)?))
    }

    async fn handle_tools_call(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| QuestchainError::McpProtocol("Missing params for tools/call".to_string()))?,
        )
        .map_err(|e| QuestchainError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        log::debug!("tools/call {} {}", params.name, params.arguments);

        match tools::call_tool(&self.resolver, &params.name, &params.arguments).await {
            Some(result) => Ok(JsonRpcResponse::result(id.clone(), to_json(&result?)?)),
            None => Ok(JsonRpcResponse::error(
                id.clone(),
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            )),
        }
    }
}

/// Map a handler failure to its JSON-RPC error code.
fn error_response(id: &JsonRpcId, e: QuestchainError) -> JsonRpcResponse {
    let code = match &e {
        QuestchainError::McpProtocol(_) | QuestchainError::InvalidInput(_) => error_codes::INVALID_PARAMS,
        QuestchainError::StoreUnavailable(_) | QuestchainError::Timeout(_) => error_codes::STORE_UNAVAILABLE,
        _ => error_codes::INTERNAL_ERROR,
    };
    if code != error_codes::INVALID_PARAMS {
        log::error!("request {:?} failed: {}", id, e);
    }

    let mut response = JsonRpcResponse::error(id.clone(), code, e.to_string());
    if let JsonRpcResponsePayload::Error { error } = &mut response.payload {
        error.data = Some(serde_json::json!({ "details": e.to_string() }));
    }
    response
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| QuestchainError::McpProtocol(format!("JSON serialization error: {}", e)))
}

/// Send JSON-RPC response to stdout (newline-delimited)
async fn send_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| QuestchainError::McpProtocol(format!("JSON serialization error: {}", e)))?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Best-effort id recovery from a line that failed to parse.
fn extract_id_from_line(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let id_str = &line[id_start + 5..];
    let id_end = id_str.find([',', '}'])?;
    let id_val = id_str[..id_end].trim();
    if id_val.len() >= 2 && id_val.starts_with('"') && id_val.ends_with('"') {
        Some(Value::String(id_val[1..id_val.len() - 1].to_string()))
    } else {
        id_val.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}
