//! Mail sending
//!
//! Provider failures are soft: they are logged and reported as `Ok(None)`.

use std::path::PathBuf;

use crate::error::Result;
use crate::gmail::client::MailProvider;
use crate::gmail::message::{Attachment, Mailbox, OutgoingMessage};
use crate::gmail::types::Message;

/// Arguments of a send call
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_path: Option<PathBuf>,
}

/// The configured sender, or the authenticated mailbox's address when none is configured
pub async fn resolve_sender(provider: &dyn MailProvider, configured: Option<&str>) -> Result<String> {
    let address = match configured {
        Some(address) => address.to_string(),
        None => provider.profile_address().await?,
    };

    Mailbox::parse(&address)?;
    tracing::debug!("Sending as {}", address);
    Ok(address)
}

/// Compose the message for `request`, skipping an attachment path that does not exist
pub async fn compose(sender_address: &str, request: SendRequest) -> Result<OutgoingMessage> {
    let attachment = match request.attachment_path {
        Some(ref path) => Attachment::from_path(path).await?,
        None => None,
    };

    Ok(OutgoingMessage {
        to: request.to,
        from: sender_address.to_string(),
        subject: request.subject,
        body: request.body,
        attachment,
    })
}

/// Send an email through `provider`.
///
/// Returns `Ok(None)` when the provider rejects or fails the send.
pub async fn send_email(
    provider: &dyn MailProvider,
    sender_address: &str,
    request: SendRequest,
) -> Result<Option<Message>> {
    let message = compose(sender_address, request).await?;
    let raw = message.encode_raw()?;

    match provider.send_raw(raw).await {
        Ok(sent) => {
            tracing::info!("Message Id: {}", sent.id);
            Ok(Some(sent))
        }
        Err(e) if e.is_provider_error() => {
            tracing::error!("An error occurred while sending: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
