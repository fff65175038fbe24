//! MCP Tool definitions and handlers
//!
//! Defines the two mail tools and their implementations.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::error::{GmailMcpError, McpError};
use crate::gmail::client::{MailProvider, ProviderFactory};
use crate::gmail::lister::{list_recent_messages, ListResult};
use crate::gmail::sender::{resolve_sender, send_email, SendRequest};
use crate::gmail::types::Message;
use crate::mcp::types::{CallToolResult, Tool};

pub const SEND_EMAIL: &str = "send_email";
pub const GET_EMAILS: &str = "get_emails_tool";

/// Settings the tools need besides the provider
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Address written into the From header; `None` asks the provider once
    pub sender_address: Option<String>,

    /// Messages returned by `get_emails_tool`
    pub list_limit: u32,
}

/// Tool handler
pub struct ToolHandler {
    provider_factory: Arc<dyn ProviderFactory>,
    settings: ToolSettings,
    sender: OnceCell<String>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(provider_factory: Arc<dyn ProviderFactory>, settings: ToolSettings) -> Self {
        Self {
            provider_factory,
            settings,
            sender: OnceCell::new(),
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                SEND_EMAIL,
                "Send an email with optional file attachment",
                send_email_schema(),
            ),
            tool_def(
                GET_EMAILS,
                "Returns the user's most recent Gmail messages with subjects, senders, dates, and snippets",
                json!({"type": "object", "properties": {}}),
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Tool {} called", name);
        match name {
            SEND_EMAIL => self.handle_send_email(args).await,
            GET_EMAILS => CallToolResult::json(&self.handle_get_emails().await),
            _ => CallToolResult::error(McpError::UnknownTool {
                name: name.to_string(),
            }
            .to_string()),
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_send_email(&self, args: Value) -> CallToolResult {
        #[derive(Deserialize)]
        struct Args {
            toaddress: String,
            subject: String,
            body: String,
            #[serde(default)]
            filename: Option<String>,
        }

        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                return CallToolResult::error(McpError::InvalidArguments {
                    message: e.to_string(),
                }
                .to_string())
            }
        };

        let provider = match self.provider_factory.connect().await {
            Ok(p) => p,
            Err(e) => return CallToolResult::error(e.to_string()),
        };

        let sender = match self.sender_address(provider.as_ref()).await {
            Ok(s) => s,
            Err(e) if e.is_provider_error() => {
                tracing::error!("Could not look up the sender address: {}", e);
                return CallToolResult::json(&None::<Message>);
            }
            Err(e) => return CallToolResult::error(e.to_string()),
        };

        let request = SendRequest {
            to: args.toaddress,
            subject: args.subject,
            body: args.body,
            attachment_path: args
                .filename
                .filter(|f| !f.is_empty())
                .map(PathBuf::from),
        };

        match send_email(provider.as_ref(), &sender, request).await {
            Ok(sent) => CallToolResult::json(&sent),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn sender_address(&self, provider: &dyn MailProvider) -> crate::error::Result<String> {
        let sender = self
            .sender
            .get_or_try_init(|| resolve_sender(provider, self.settings.sender_address.as_deref()))
            .await?;
        Ok(sender.clone())
    }

    /// Runs the listing; failures before the listing starts become an error result
    pub async fn handle_get_emails(&self) -> ListResult {
        let provider = match self.provider_factory.connect().await {
            Ok(p) => p,
            Err(e) => return tool_exception(&e),
        };

        let result = list_recent_messages(provider.as_ref(), self.settings.list_limit).await;
        tracing::debug!(
            "Tool returning: status={:?}, count={}",
            result.status,
            result.count
        );
        result
    }
}

fn tool_exception(error: &GmailMcpError) -> ListResult {
    tracing::error!("Exception in tool: {}", error);
    ListResult::failure("Tool exception", error)
}

// ==================== Schema Definitions ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn send_email_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "toaddress": {
                "type": "string",
                "description": "Recipient's email address"
            },
            "subject": {
                "type": "string",
                "description": "Subject of the email"
            },
            "body": {
                "type": "string",
                "description": "Text content of the email"
            },
            "filename": {
                "type": "string",
                "description": "Optional path to a file to attach"
            }
        },
        "required": ["toaddress", "subject", "body"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, Result};
    use crate::gmail::client::MailProvider;
    use crate::gmail::lister::ListStatus;
    use async_trait::async_trait;

    struct NoCredentials;

    #[async_trait]
    impl ProviderFactory for NoCredentials {
        async fn connect(&self) -> Result<Arc<dyn MailProvider>> {
            Err(GmailMcpError::Auth(AuthError::ClientSecretNotFound {
                path: "credentials.json".to_string(),
            }))
        }
    }

    fn handler() -> ToolHandler {
        ToolHandler::new(
            Arc::new(NoCredentials),
            ToolSettings {
                sender_address: Some("bot@example.com".to_string()),
                list_limit: 100,
            },
        )
    }

    #[test]
    fn test_lists_two_tools() {
        let names: Vec<String> = handler().list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![SEND_EMAIL.to_string(), GET_EMAILS.to_string()]);
    }

    #[test]
    fn test_send_schema_requires_core_fields() {
        let schema = send_email_schema();
        assert_eq!(schema["required"], json!(["toaddress", "subject", "body"]));
        assert!(schema["properties"]["filename"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = handler().call_tool("delete_everything", json!({})).await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_send_rejects_missing_arguments() {
        let result = handler()
            .call_tool(SEND_EMAIL, json!({"subject": "no recipient"}))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_send_surfaces_credential_failure() {
        let result = handler()
            .call_tool(
                SEND_EMAIL,
                json!({"toaddress": "a@b.com", "subject": "s", "body": "b"}),
            )
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("credentials.json"));
    }

    #[tokio::test]
    async fn test_listing_turns_credential_failure_into_error_result() {
        let result = handler().handle_get_emails().await;
        assert_eq!(result.status, ListStatus::Error);
        assert_eq!(result.count, 0);
        assert!(result.debug_info.starts_with("Tool exception: "));
    }
}
