//! Outgoing message construction
//!
//! Builds the RFC 822 wire form of a message and the base64url encoding the
//! Gmail `send` endpoint expects.

use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use mail_builder::headers::address::Address;
use mail_builder::MessageBuilder;

use crate::error::{GmailMcpError, Result};

/// Media type used when the extension is unknown
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// File attached to an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Base filename
    pub filename: String,
    /// Media type
    pub media_type: String,
    /// File content (raw bytes)
    pub data: Vec<u8>,
}

impl Attachment {
    /// Load an attachment from a file path.
    ///
    /// Returns `Ok(None)` when nothing exists at `path`.
    pub async fn from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!("Attachment {} does not exist, skipping", path.display());
            return Ok(None);
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());

        let data = tokio::fs::read(path).await?;

        Ok(Some(Self {
            filename,
            media_type: guess_media_type(path).to_string(),
            data,
        }))
    }
}

/// Guess MIME type from extension
pub fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/x-wav",
        Some("mp4") => "video/mp4",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

/// One entry of an address header, e.g. `Alice <alice@example.com>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub email: String,
}

impl Mailbox {
    /// Parse a single `addr@domain` or `Display Name <addr@domain>` entry
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || GmailMcpError::InvalidAddress(input.to_string());

        let (name, email) = match input.rfind('<') {
            Some(open) => {
                let email = input[open + 1..].strip_suffix('>').ok_or_else(invalid)?;
                let name = input[..open].trim().trim_matches('"').trim();
                ((!name.is_empty()).then(|| name.to_string()), email.trim())
            }
            None => (None, input),
        };

        if !is_plausible_email(email) {
            return Err(invalid());
        }

        Ok(Self {
            name,
            email: email.to_string(),
        })
    }

    fn to_address(&self) -> Address<'_> {
        Address::new_address(self.name.as_deref(), self.email.as_str())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | ','))
        }
        None => false,
    }
}

/// Parse a comma separated address list.
///
/// Commas inside double quotes or angle brackets do not split entries.
pub fn parse_address_list(input: &str) -> Result<Vec<Mailbox>> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for c in input.chars() {
        match c {
            '"' if !in_angle => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);

    let mailboxes = entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| Mailbox::parse(entry))
        .collect::<Result<Vec<_>>>()?;

    if mailboxes.is_empty() {
        return Err(GmailMcpError::InvalidAddress(input.to_string()));
    }

    Ok(mailboxes)
}

fn header_address(mailboxes: &[Mailbox]) -> Address<'_> {
    match mailboxes {
        [single] => single.to_address(),
        many => Address::new_list(many.iter().map(Mailbox::to_address).collect()),
    }
}

/// A message ready to be serialized and sent
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Serialize to RFC 822 bytes
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>> {
        let from = Mailbox::parse(&self.from)?;
        let to = parse_address_list(&self.to)?;

        let mut builder = MessageBuilder::new()
            .from(from.to_address())
            .to(header_address(&to))
            .subject(self.subject.as_str())
            .text_body(self.body.as_str());

        if let Some(ref attachment) = self.attachment {
            builder = builder.attachment(
                attachment.media_type.as_str(),
                attachment.filename.as_str(),
                attachment.data.as_slice(),
            );
        }

        Ok(builder.write_to_vec()?)
    }

    /// Serialize and base64url-encode for the `raw` field
    pub fn encode_raw(&self) -> Result<String> {
        Ok(URL_SAFE.encode(self.to_wire_bytes()?))
    }
}
