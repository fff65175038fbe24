//! Gmail API type definitions
//!
//! These types mirror the Gmail API responses and are used for serialization/deserialization.

use serde::{Deserialize, Serialize};

/// A Gmail message part (MIME part)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// Part ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,

    /// MIME type of this part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Filename for attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Headers for this part
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,

    /// Nested parts (for multipart messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Find a header value by exact, case-sensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }
}

/// Header in a message part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,

    /// Header value
    pub value: String,
}

/// A Gmail message
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Label IDs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,

    /// Snippet (preview text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Message payload (MIME structure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,

    /// Size estimate in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_estimate: Option<i64>,

    /// Internal date (epoch millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
}

/// List of messages response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Messages in this page
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    /// Next page token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    /// Result size estimate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_size_estimate: Option<u32>,
}

/// Reference to a message (id and thread_id only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
}

/// Mailbox profile of the authenticated user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,

    #[serde(default)]
    pub messages_total: Option<u64>,
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Raw RFC822 message (base64url encoded)
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_deserialize() {
        let json = r#"{"emailAddress":"owner@example.com","messagesTotal":12,"threadsTotal":9,"historyId":"77"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.email_address, "owner@example.com");
        assert_eq!(profile.messages_total, Some(12));
    }

    #[test]
    fn test_message_deserialize() {
        let json = r#"{"id":"123","threadId":"456","labelIds":["INBOX"],"sizeEstimate":42}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "123");
        assert_eq!(msg.thread_id, Some("456".to_string()));
        assert_eq!(msg.label_ids, Some(vec!["INBOX".to_string()]));
        assert_eq!(msg.size_estimate, Some(42));
    }

    #[test]
    fn test_header_lookup_is_case_sensitive() {
        let part = MessagePart {
            headers: vec![
                Header {
                    name: "subject".to_string(),
                    value: "lowercase".to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: "Exact".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(part.header("Subject"), Some("Exact"));
        assert_eq!(part.header("SUBJECT"), None);
    }

    #[test]
    fn test_empty_message_list() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(list.messages.is_empty());
    }

    #[test]
    fn test_sent_message_serializes_like_api() {
        let msg = Message {
            id: "abc".to_string(),
            thread_id: Some("thr".to_string()),
            label_ids: Some(vec!["SENT".to_string()]),
            ..Default::default()
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["threadId"], "thr");
        assert_eq!(json["labelIds"][0], "SENT");
        assert!(json.get("payload").is_none());
    }
}
