//! Recent-message listing
//!
//! Produces the structured listing result returned by the `get_emails_tool`
//! tool. Listing never fails: errors become an `"error"` result, and a
//! message that cannot be fetched becomes an inline error entry.

use serde::Serialize;

use crate::error::GmailMcpError;
use crate::gmail::client::MailProvider;
use crate::gmail::types::Message;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const UNKNOWN_RECIPIENT: &str = "Unknown Recipient";
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const NO_SNIPPET: &str = "No snippet available";

/// Metadata for one listed message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSummary {
    pub email_number: usize,
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub size_estimate: i64,
}

impl MessageSummary {
    /// Extract the summary fields from a full-format message
    pub fn from_message(email_number: usize, message_id: &str, message: &Message) -> Self {
        let header = |name: &str, fallback: &str| {
            message
                .payload
                .as_ref()
                .and_then(|p| p.header(name))
                .unwrap_or(fallback)
                .to_string()
        };

        Self {
            email_number,
            message_id: message_id.to_string(),
            thread_id: message.thread_id.clone().unwrap_or_default(),
            subject: header("Subject", NO_SUBJECT),
            from: header("From", UNKNOWN_SENDER),
            to: header("To", UNKNOWN_RECIPIENT),
            date: header("Date", UNKNOWN_DATE),
            snippet: message
                .snippet
                .clone()
                .unwrap_or_else(|| NO_SNIPPET.to_string()),
            labels: message.label_ids.clone().unwrap_or_default(),
            size_estimate: message.size_estimate.unwrap_or(0),
        }
    }
}

/// A message whose detail fetch failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedMessage {
    pub email_number: usize,
    pub message_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageEntry {
    Summary(MessageSummary),
    Failed(FailedMessage),
}

impl MessageEntry {
    pub fn message_id(&self) -> &str {
        match self {
            MessageEntry::Summary(s) => &s.message_id,
            MessageEntry::Failed(f) => &f.message_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Success,
    Error,
}

/// Result of a listing call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    pub status: ListStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub count: usize,
    pub messages: Vec<MessageEntry>,
    pub debug_info: String,
}

impl ListResult {
    fn success(messages: Vec<MessageEntry>) -> Self {
        let debug_info = if messages.is_empty() {
            "No messages found in Gmail".to_string()
        } else {
            format!("Successfully processed {} messages", messages.len())
        };

        Self {
            status: ListStatus::Success,
            error: None,
            count: messages.len(),
            messages,
            debug_info,
        }
    }

    /// An error result; `context` prefixes the message in `debug_info`
    pub fn failure(context: &str, error: &GmailMcpError) -> Self {
        let error = error.to_string();
        Self {
            status: ListStatus::Error,
            debug_info: format!("{}: {}", context, error),
            error: Some(error),
            count: 0,
            messages: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ListStatus::Success
    }
}

/// List up to `limit` recent messages with their metadata
pub async fn list_recent_messages(provider: &dyn MailProvider, limit: u32) -> ListResult {
    tracing::debug!("Fetching messages list");

    let mut refs = match provider.list_message_ids(limit).await {
        Ok(refs) => refs,
        Err(e) if e.is_provider_error() => {
            tracing::error!("Gmail API error: {}", e);
            return ListResult::failure("Gmail API error", &e);
        }
        Err(e) => {
            tracing::error!("Unexpected error: {}", e);
            return ListResult::failure("Unexpected error", &e);
        }
    };

    refs.truncate(limit as usize);
    tracing::debug!("Found {} messages", refs.len());

    let total = refs.len();
    let mut entries = Vec::with_capacity(total);

    for (i, message_ref) in refs.iter().enumerate() {
        let number = i + 1;
        tracing::debug!("Processing message {}/{}", number, total);

        match provider.get_message(&message_ref.id).await {
            Ok(message) => entries.push(MessageEntry::Summary(MessageSummary::from_message(
                number,
                &message_ref.id,
                &message,
            ))),
            Err(e) => {
                tracing::debug!("Error processing message {}: {}", number, e);
                entries.push(MessageEntry::Failed(FailedMessage {
                    email_number: number,
                    message_id: message_ref.id.clone(),
                    error: e.to_string(),
                }));
            }
        }
    }

    ListResult::success(entries)
}
