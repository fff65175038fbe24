//! OAuth credential management for the Gmail API
//!
//! Handles the credential lifecycle:
//! - Loading the persisted credential bundle
//! - Refreshing expired access tokens
//! - Falling back to interactive consent
//! - Persisting the result

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::{AuthError, GmailMcpError, Result};
use crate::gmail::consent::{ConsentFlow, ConsentSignal, LoopbackConsent};

/// Access tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 10;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// OAuth client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Auth URI
    pub auth_uri: String,

    /// Token URI
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// Redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Client secret file format (can be "installed" or "web")
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(alias = "web")]
    installed: Option<ClientSecret>,
}

impl ClientSecret {
    /// Load the client secret from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GmailMcpError::Auth(AuthError::ClientSecretNotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse the client secret from its JSON representation
    pub fn parse(content: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(content)
            .map_err(|_| GmailMcpError::Auth(AuthError::InvalidClientSecret))?;

        file.installed
            .ok_or(GmailMcpError::Auth(AuthError::InvalidClientSecret))
    }
}

/// Persisted credentials, in Google's "authorized user" layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Access token
    #[serde(rename = "token", alias = "access_token")]
    pub access_token: String,

    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token endpoint used for refresh
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// Client ID the tokens were issued to
    #[serde(default)]
    pub client_id: String,

    /// Client secret the tokens were issued to
    #[serde(default)]
    pub client_secret: String,

    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Access token expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialBundle {
    /// Build a bundle from a token endpoint response
    pub(crate) fn from_token_response(
        secret: &ClientSecret,
        response: TokenResponse,
        requested_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = match response.scope.as_deref() {
            Some(s) if !s.trim().is_empty() => s.split_whitespace().map(str::to_string).collect(),
            _ => requested_scopes.to_vec(),
        };

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_uri: secret.token_uri.clone(),
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes,
            expiry: response.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// Whether every required scope was granted
    pub fn covers_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Whether the access token is past (or within the skew of) its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    /// Whether the bundle can be used as-is for the required scopes
    pub fn is_valid(&self, required: &[String], now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.covers_scopes(required) && !self.is_expired(now)
    }

    /// Whether a refresh token exchange can revive this bundle
    pub fn can_refresh(&self, required: &[String], now: DateTime<Utc>) -> bool {
        self.refresh_token.is_some() && self.covers_scopes(required) && self.is_expired(now)
    }

    /// Apply a refresh response in place
    fn apply_refresh(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        if let Some(scope) = response.scope.filter(|s| !s.trim().is_empty()) {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        self.expiry = response.expires_in.map(|secs| now + Duration::seconds(secs));
    }
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Load/save capability for the credential bundle
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted bundle, `None` when nothing is stored
    async fn load(&self) -> Result<Option<CredentialBundle>>;

    /// Persist the bundle, replacing any previous one
    async fn save(&self, bundle: &CredentialBundle) -> Result<()>;
}

/// Credential store backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<CredentialBundle>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let bundle: CredentialBundle = serde_json::from_str(&content)?;
        Ok(Some(bundle))
    }

    async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(bundle)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await?;

        // mode() only applies on creation; tighten a pre-existing file before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    bundle: Mutex<Option<CredentialBundle>>,
    saves: Mutex<usize>,
}

impl MemoryCredentialStore {
    pub fn new(bundle: Option<CredentialBundle>) -> Self {
        Self {
            bundle: Mutex::new(bundle),
            saves: Mutex::new(0),
        }
    }

    /// The currently stored bundle
    pub fn current(&self) -> Option<CredentialBundle> {
        self.bundle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of times `save` has been called
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<CredentialBundle>> {
        Ok(self.current())
    }

    async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        *self
            .bundle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(bundle.clone());
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

/// Obtains valid credentials, refreshing or re-consenting as needed
pub struct CredentialManager {
    /// Configuration
    config: Config,

    /// Where the bundle lives between calls
    store: Arc<dyn CredentialStore>,

    /// Completes the interactive consent step
    consent: Arc<dyn ConsentSignal>,

    /// HTTP client
    http_client: reqwest::Client,
}

impl CredentialManager {
    /// Create a credential manager with explicit store and consent signal
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        consent: Arc<dyn ConsentSignal>,
    ) -> Self {
        Self {
            config,
            store,
            consent,
            http_client: reqwest::Client::new(),
        }
    }

    /// Create a credential manager using the token file and a loopback browser flow
    pub fn from_config(config: Config) -> Self {
        let store = Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
        let consent = Arc::new(LoopbackConsent::new(config.oauth_callback_port));
        Self::new(config, store, consent)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return a bundle carrying `required_scopes`, refreshing or running consent if needed
    pub async fn obtain_credentials(&self, required_scopes: &[String]) -> Result<CredentialBundle> {
        let stored = match self.store.load().await {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored credentials: {}", e);
                None
            }
        };

        let now = Utc::now();

        let bundle = match stored {
            Some(bundle) if bundle.is_valid(required_scopes, now) => {
                tracing::debug!("Using stored credentials");
                return Ok(bundle);
            }
            Some(mut bundle) if bundle.can_refresh(required_scopes, now) => {
                tracing::debug!("Refreshing expired credentials");
                self.refresh(&mut bundle).await?;
                bundle
            }
            Some(_) => {
                tracing::debug!("Stored credentials invalid for requested scopes");
                self.run_interactive(required_scopes).await?
            }
            None => {
                tracing::debug!("No stored credentials");
                self.run_interactive(required_scopes).await?
            }
        };

        self.store.save(&bundle).await?;
        tracing::debug!("Credentials saved");

        Ok(bundle)
    }

    /// Refresh the access token in place using the refresh token
    async fn refresh(&self, bundle: &mut CredentialBundle) -> Result<()> {
        let refresh_token = bundle.refresh_token.clone().ok_or_else(|| {
            GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: "No refresh token available".to_string(),
            })
        })?;

        let params = [
            ("client_id", bundle.client_id.as_str()),
            ("client_secret", bundle.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&bundle.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                    message: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: format!("{}: {}", status, text),
            }));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: e.to_string(),
            })
        })?;

        bundle.apply_refresh(token_response, Utc::now());
        Ok(())
    }

    /// Run the consent flow: begin, wait for the code (bounded), exchange it
    async fn run_interactive(&self, scopes: &[String]) -> Result<CredentialBundle> {
        tracing::debug!("Starting OAuth consent flow");
        let secret = ClientSecret::load(&self.config.client_secret_path)?;

        let mut flow = ConsentFlow::new(
            secret,
            self.config.oauth_redirect_uri(),
            scopes.to_vec(),
            self.http_client.clone(),
        );

        let (auth_url, state) = flow.begin()?;

        let timeout = self.config.consent_timeout;
        let code = tokio::time::timeout(timeout, self.consent.wait_for_code(&auth_url, &state))
            .await
            .map_err(|_| {
                GmailMcpError::Auth(AuthError::ConsentTimedOut {
                    secs: timeout.as_secs(),
                })
            })??;

        flow.complete(&code).await
    }
}
