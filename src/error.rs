//! Error types for the Gmail mail tools
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the Gmail mail tools
#[derive(Error, Debug)]
pub enum GmailMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Gmail API errors
    #[error("Gmail API error: {0}")]
    Gmail(#[from] GmailApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A mailbox or address list that cannot go into a header
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

impl GmailMcpError {
    /// Whether the error came from the mail provider (transport or API response).
    pub fn is_provider_error(&self) -> bool {
        matches!(self, GmailMcpError::Gmail(_) | GmailMcpError::Http(_))
    }
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Client secret file not found: {path}. Download it from the Google Cloud Console.")]
    ClientSecretNotFound { path: String },

    #[error("Invalid client secret format: expected 'installed' or 'web' credentials")]
    InvalidClientSecret,

    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("Consent was not completed within {secs} seconds")]
    ConsentTimedOut { secs: u64 },

    #[error("No authorization code provided")]
    NoAuthCode,

    #[error("Invalid authorization state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

/// Gmail API errors
#[derive(Error, Debug)]
pub enum GmailApiError {
    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("API request failed: {message}")]
    RequestFailed { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Gmail mail tool operations
pub type Result<T> = std::result::Result<T, GmailMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::ClientSecretNotFound {
            path: "/path/to/credentials.json".to_string(),
        };
        assert!(err.to_string().contains("/path/to/credentials.json"));
    }

    #[test]
    fn test_error_conversion() {
        let auth_err = AuthError::NoAuthCode;
        let gmail_err: GmailMcpError = auth_err.into();
        assert!(matches!(gmail_err, GmailMcpError::Auth(_)));
    }

    #[test]
    fn test_provider_classification() {
        let api: GmailMcpError = GmailApiError::RequestFailed {
            message: "500".to_string(),
        }
        .into();
        assert!(api.is_provider_error());

        let auth: GmailMcpError = AuthError::NoAuthCode.into();
        assert!(!auth.is_provider_error());

        let io: GmailMcpError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(!io.is_provider_error());

        assert!(!GmailMcpError::InvalidAddress("me".to_string()).is_provider_error());
    }
}
