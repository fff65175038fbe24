//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Result;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "gmail-mail-tools";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for the Gmail mail tools
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Whether initialized
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(tool_handler: ToolHandler) -> Self {
        Self {
            tool_handler,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio
    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run(stdin, stdout).await
    }

    /// Serve newline-delimited JSON-RPC until `reader` is exhausted
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    let mut response_str = serde_json::to_string(&response)?;
                    response_str.push('\n');
                    writer.write_all(response_str.as_bytes()).await?;
                    writer.flush().await?;
                }
                Ok(None) => {
                    // Notification, no response needed
                }
                Err(e) => {
                    tracing::error!("Error handling message: {}", e);
                }
            }
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle an incoming JSON-RPC message
    pub async fn handle_message(&mut self, message: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                return Ok(Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(e.to_string()),
                )));
            }
        };

        if request.method == methods::INITIALIZED {
            self.initialized = true;
            return Ok(None);
        }

        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                tracing::debug!("Ignoring notification {}", request.method);
                return Ok(None);
            }
        };

        let response = match request.method.as_str() {
            methods::INITIALIZE => match self.handle_initialize() {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
            },
            methods::PING => JsonRpcResponse::success(id, serde_json::json!({})),
            methods::LIST_TOOLS => match self.handle_list_tools() {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
            },
            methods::CALL_TOOL => {
                let result = self.handle_call_tool(&request).await;
                JsonRpcResponse::success(id, result)
            }
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method)),
        };

        Ok(Some(response))
    }

    /// Handle initialize request
    fn handle_initialize(&self) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.tool_handler.list_tools(),
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    async fn handle_call_tool(&self, request: &JsonRpcRequest) -> Value {
        let result = match request.params.as_ref() {
            Some(p) => match serde_json::from_value::<CallToolParams>(p.clone()) {
                Ok(params) => {
                    self.tool_handler
                        .call_tool(&params.name, params.arguments)
                        .await
                }
                Err(e) => CallToolResult::error(format!("Invalid tool parameters: {}", e)),
            },
            None => CallToolResult::error("Missing tool parameters"),
        };

        serde_json::to_value(&result).unwrap_or_else(|e| {
            serde_json::json!({
                "content": [{"type": "text", "text": format!("Error: {}", e)}],
                "isError": true
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GmailMcpError;
    use crate::gmail::client::{MailProvider, ProviderFactory};
    use crate::mcp::tools::ToolSettings;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl ProviderFactory for Offline {
        async fn connect(&self) -> Result<Arc<dyn MailProvider>> {
            Err(GmailMcpError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "offline",
            )))
        }
    }

    fn server() -> McpServer {
        McpServer::new(ToolHandler::new(
            Arc::new(Offline),
            ToolSettings {
                sender_address: None,
                list_limit: 10,
            },
        ))
    }

    #[test]
    fn test_server_info() {
        assert_eq!(SERVER_NAME, "gmail-mail-tools");
    }

    #[tokio::test]
    async fn test_initialize_and_notification() {
        let mut server = server();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap()
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert!(result["capabilities"]["tools"].is_object());

        let none = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = server().handle_message("{not json").await.unwrap().unwrap();
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.id, RequestId::String("x".to_string()));
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_call_tool_without_params() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.result.unwrap()["isError"], true);
    }

    #[tokio::test]
    async fn test_run_over_buffers() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );

        let mut output = Vec::new();
        server().run(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["result"]["tools"].as_array().unwrap().len(), 2);
    }
}
