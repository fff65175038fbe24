//! Configuration management for the Gmail mail tools
//!
//! Handles paths, environment variables, and configuration loading.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, GmailMcpError, Result};
use crate::gmail::message::Mailbox;

/// Default location of the persisted credential bundle
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Default location of the OAuth client secret
pub const DEFAULT_CLIENT_SECRET_PATH: &str = "credentials.json";

/// Default number of messages returned by the listing tool
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Largest `maxResults` the Gmail API accepts for `messages.list`
pub const MAX_LIST_LIMIT: u32 = 500;

/// Configuration for the Gmail mail tools
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to stored credentials (access/refresh tokens)
    pub credentials_path: PathBuf,

    /// Path to OAuth client secret (client id/secret)
    pub client_secret_path: PathBuf,

    /// OAuth callback port
    pub oauth_callback_port: u16,

    /// How long to wait for the user to finish consent
    pub consent_timeout: Duration,

    /// Address written into the From header of sent mail.
    /// `None` means the authenticated mailbox's own address.
    pub sender_address: Option<String>,

    /// Number of messages fetched by the listing tool
    pub list_limit: u32,

    /// Gmail API base URL
    pub api_base_url: String,

    /// Gmail API scopes
    pub scopes: Vec<String>,
}

impl Config {
    /// Create a configuration from the process environment
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials_path = lookup("GMAIL_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH));

        let client_secret_path = lookup("GMAIL_CLIENT_SECRET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_SECRET_PATH));

        let oauth_callback_port = parse_var(&lookup, "GMAIL_OAUTH_PORT")?.unwrap_or(8080);

        let consent_timeout = Duration::from_secs(
            parse_var(&lookup, "GMAIL_CONSENT_TIMEOUT_SECS")?.unwrap_or(300),
        );

        let sender_address = lookup("GMAIL_SENDER_ADDRESS").filter(|a| !a.trim().is_empty());
        if let Some(ref address) = sender_address {
            Mailbox::parse(address).map_err(|e| {
                GmailMcpError::Config(ConfigError::InvalidValue {
                    var: "GMAIL_SENDER_ADDRESS".to_string(),
                    message: e.to_string(),
                })
            })?;
        }

        let list_limit = parse_var(&lookup, "GMAIL_LIST_LIMIT")?.unwrap_or(DEFAULT_LIST_LIMIT);
        if list_limit == 0 || list_limit > MAX_LIST_LIMIT {
            return Err(GmailMcpError::Config(ConfigError::InvalidConfig {
                message: format!(
                    "GMAIL_LIST_LIMIT must be between 1 and {}, got {}",
                    MAX_LIST_LIMIT, list_limit
                ),
            }));
        }

        let api_base_url = lookup("GMAIL_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| gmail::API_BASE_URL.to_string());

        Ok(Self {
            credentials_path,
            client_secret_path,
            oauth_callback_port,
            consent_timeout,
            sender_address,
            list_limit,
            api_base_url,
            scopes: vec![
                gmail::scopes::SEND.to_string(),
                gmail::scopes::READONLY.to_string(),
            ],
        })
    }

    /// OAuth redirect URI served by the local callback listener
    pub fn oauth_redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.oauth_callback_port)
    }

    /// Check if the client secret file exists
    pub fn client_secret_exists(&self) -> bool {
        self.client_secret_path.exists()
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            GmailMcpError::Config(ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            })
        }),
        None => Ok(None),
    }
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// OAuth scopes used by the tools
    pub mod scopes {
        pub const SEND: &str = "https://www.googleapis.com/auth/gmail.send";
        pub const READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.credentials_path, PathBuf::from("token.json"));
        assert_eq!(config.client_secret_path, PathBuf::from("credentials.json"));
        assert_eq!(config.oauth_callback_port, 8080);
        assert_eq!(config.list_limit, 100);
        assert_eq!(config.consent_timeout, Duration::from_secs(300));
        assert_eq!(config.api_base_url, gmail::API_BASE_URL);
        assert_eq!(config.sender_address, None);
    }

    #[test]
    fn test_default_scopes() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.scopes.len(), 2);
        assert!(config.scopes[0].contains("gmail.send"));
        assert!(config.scopes[1].contains("gmail.readonly"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GMAIL_TOKEN_PATH", "/tmp/t.json"),
            ("GMAIL_OAUTH_PORT", "9090"),
            ("GMAIL_LIST_LIMIT", "10"),
            ("GMAIL_SENDER_ADDRESS", "bot@example.com"),
            ("GMAIL_API_BASE_URL", "http://127.0.0.1:1234/gmail/v1/"),
        ])
        .unwrap();
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/t.json"));
        assert_eq!(config.oauth_redirect_uri(), "http://localhost:9090/");
        assert_eq!(config.list_limit, 10);
        assert_eq!(config.sender_address.as_deref(), Some("bot@example.com"));
        assert_eq!(config.api_base_url, "http://127.0.0.1:1234/gmail/v1");
    }

    #[test]
    fn test_list_limit_out_of_range() {
        assert!(config_from(&[("GMAIL_LIST_LIMIT", "0")]).is_err());
        assert!(config_from(&[("GMAIL_LIST_LIMIT", "501")]).is_err());
        assert!(config_from(&[("GMAIL_LIST_LIMIT", "500")]).is_ok());
    }

    #[test]
    fn test_sender_address_must_be_a_mailbox() {
        let err = config_from(&[("GMAIL_SENDER_ADDRESS", "me")]).unwrap_err();
        assert!(err.to_string().contains("GMAIL_SENDER_ADDRESS"));

        let config = config_from(&[("GMAIL_SENDER_ADDRESS", "Bot <bot@example.com>")]).unwrap();
        assert_eq!(config.sender_address.as_deref(), Some("Bot <bot@example.com>"));
    }

    #[test]
    fn test_unparseable_port() {
        let err = config_from(&[("GMAIL_OAUTH_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("GMAIL_OAUTH_PORT"));
    }
}
