//! Gmail API client
//!
//! [`MailProvider`] is the seam between the tools and the transport;
//! [`GmailClient`] is the reqwest implementation against the Gmail REST API.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::gmail::USER_ID;
use crate::config::Config;
use crate::error::{GmailApiError, GmailMcpError, Result};
use crate::gmail::auth::CredentialManager;
use crate::gmail::types::{Message, MessageList, MessageRef, Profile, SendMessageRequest};

/// Operations the mail tools need from a mail provider
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Submit a base64url-encoded RFC 822 message
    async fn send_raw(&self, raw: String) -> Result<Message>;

    /// List up to `max_results` message references, most recent first
    async fn list_message_ids(&self, max_results: u32) -> Result<Vec<MessageRef>>;

    /// Fetch one message in full format
    async fn get_message(&self, message_id: &str) -> Result<Message>;

    /// Email address of the authenticated mailbox
    async fn profile_address(&self) -> Result<String>;
}

/// Builds an authorized [`MailProvider`] for a single tool call
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MailProvider>>;
}

/// Gmail API client
pub struct GmailClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// API base URL
    base_url: String,

    /// Bearer token
    access_token: String,
}

impl GmailClient {
    /// Create a new Gmail client
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Base URL for messages
    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, USER_ID)
    }
}

async fn request_failed(context: &str, response: reqwest::Response) -> GmailMcpError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    GmailMcpError::Gmail(GmailApiError::RequestFailed {
        message: format!("{} ({}): {}", context, status, text),
    })
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn send_raw(&self, raw: String) -> Result<Message> {
        let url = format!("{}/send", self.messages_url());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&SendMessageRequest { raw })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(request_failed("Failed to send email", response).await)
        }
    }

    async fn list_message_ids(&self, max_results: u32) -> Result<Vec<MessageRef>> {
        let response = self
            .http_client
            .get(self.messages_url())
            .query(&[("maxResults", max_results)])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(request_failed("Failed to list messages", response).await);
        }

        let list: MessageList = response.json().await?;
        Ok(list.messages)
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        let url = format!(
            "{}/{}?format=full",
            self.messages_url(),
            urlencoding::encode(message_id)
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else if response.status().as_u16() == 404 {
            Err(GmailMcpError::Gmail(GmailApiError::MessageNotFound {
                message_id: message_id.to_string(),
            }))
        } else {
            Err(request_failed("Failed to get message", response).await)
        }
    }

    async fn profile_address(&self) -> Result<String> {
        let url = format!("{}/users/{}/profile", self.base_url, USER_ID);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(request_failed("Failed to get profile", response).await);
        }

        let profile: Profile = response.json().await?;
        Ok(profile.email_address)
    }
}

/// Connects to Gmail with credentials from the [`CredentialManager`]
pub struct GmailConnector {
    credentials: Arc<CredentialManager>,
}

impl GmailConnector {
    pub fn new(credentials: Arc<CredentialManager>) -> Self {
        Self { credentials }
    }

    fn config(&self) -> &Config {
        self.credentials.config()
    }
}

#[async_trait]
impl ProviderFactory for GmailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailProvider>> {
        let bundle = self
            .credentials
            .obtain_credentials(&self.config().scopes)
            .await?;

        tracing::debug!("Building Gmail client");
        Ok(Arc::new(GmailClient::new(
            self.config().api_base_url.clone(),
            bundle.access_token,
        )))
    }
}
