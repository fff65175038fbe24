//! Interactive OAuth consent
//!
//! The consent flow is a small state machine:
//! `Unauthenticated -> AwaitingConsent -> Authorized`.
//! The step that waits for the user is behind [`ConsentSignal`], so the
//! browser + loopback listener can be swapped for anything that yields an
//! authorization code.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio::sync::{oneshot, Mutex};

use crate::error::{AuthError, GmailMcpError, Result};
use crate::gmail::auth::{ClientSecret, CredentialBundle, TokenResponse};

/// Where a consent flow currently stands
#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    AwaitingConsent { auth_url: String, state: String },
    Authorized(CredentialBundle),
}

impl AuthState {
    fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "Unauthenticated",
            AuthState::AwaitingConsent { .. } => "AwaitingConsent",
            AuthState::Authorized(_) => "Authorized",
        }
    }
}

/// One run of the authorization-code flow
pub struct ConsentFlow {
    secret: ClientSecret,
    redirect_uri: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
    state: AuthState,
}

impl ConsentFlow {
    pub fn new(
        secret: ClientSecret,
        redirect_uri: String,
        scopes: Vec<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            secret,
            redirect_uri,
            scopes,
            http_client,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Generate the consent URL and move to `AwaitingConsent`.
    ///
    /// Returns the URL and the anti-forgery `state` value the callback must echo.
    pub fn begin(&mut self) -> Result<(String, String)> {
        if !matches!(self.state, AuthState::Unauthenticated) {
            return Err(self.invalid_state("Unauthenticated"));
        }

        let state = uuid::Uuid::new_v4().simple().to_string();
        let scopes = self.scopes.join(" ");
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            self.secret.auth_uri,
            urlencoding::encode(&self.secret.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            state
        );

        self.state = AuthState::AwaitingConsent {
            auth_url: auth_url.clone(),
            state: state.clone(),
        };

        Ok((auth_url, state))
    }

    /// Exchange the authorization code for tokens and move to `Authorized`
    pub async fn complete(&mut self, code: &str) -> Result<CredentialBundle> {
        if !matches!(self.state, AuthState::AwaitingConsent { .. }) {
            return Err(self.invalid_state("AwaitingConsent"));
        }
        if code.is_empty() {
            return Err(GmailMcpError::Auth(AuthError::NoAuthCode));
        }

        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                message: format!("{}: {}", status, text),
            }));
        }

        let token_response: TokenResponse = response.json().await?;
        let bundle =
            CredentialBundle::from_token_response(&self.secret, token_response, &self.scopes, Utc::now());

        self.state = AuthState::Authorized(bundle.clone());
        tracing::info!("Authorization completed");

        Ok(bundle)
    }

    fn invalid_state(&self, expected: &'static str) -> GmailMcpError {
        GmailMcpError::Auth(AuthError::InvalidState {
            expected,
            found: self.state.name(),
        })
    }
}

/// Delivers the authorization code once the user has consented
#[async_trait]
pub trait ConsentSignal: Send + Sync {
    /// Present `auth_url` to the user and resolve with the returned code.
    ///
    /// Callbacks whose `state` does not equal `expected_state` are ignored.
    async fn wait_for_code(&self, auth_url: &str, expected_state: &str) -> Result<String>;
}

/// Browser + local HTTP listener consent
#[derive(Debug, Clone)]
pub struct LoopbackConsent {
    port: u16,
    open_browser: bool,
}

impl LoopbackConsent {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            open_browser: true,
        }
    }

    /// Print the URL only, without launching a browser
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }
}

type CodeSender = oneshot::Sender<std::result::Result<String, String>>;

struct CallbackState {
    expected_state: String,
    tx: Mutex<Option<CodeSender>>,
}

async fn oauth_callback(
    State(shared): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    if params.get("state").map(String::as_str) != Some(shared.expected_state.as_str()) {
        return Html("<html><body><h1>Authentication failed</h1><p>State mismatch.</p></body></html>");
    }

    let outcome = match (params.get("code"), params.get("error")) {
        (Some(code), _) => Ok(code.clone()),
        (None, Some(error)) => Err(error.clone()),
        (None, None) => Err("no authorization code received".to_string()),
    };
    let succeeded = outcome.is_ok();

    if let Some(tx) = shared.tx.lock().await.take() {
        let _ = tx.send(outcome);
    }

    if succeeded {
        Html("<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>")
    } else {
        Html("<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>")
    }
}

#[async_trait]
impl ConsentSignal for LoopbackConsent {
    async fn wait_for_code(&self, auth_url: &str, expected_state: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(CallbackState {
            expected_state: expected_state.to_string(),
            tx: Mutex::new(Some(tx)),
        });

        let app = Router::new()
            .route("/", get(oauth_callback))
            .with_state(shared);

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        eprintln!("\nPlease visit this URL to authorize this application:");
        eprintln!("{}\n", auth_url);

        if self.open_browser {
            if let Err(e) = open::that(auth_url) {
                tracing::warn!("Could not open browser automatically: {}", e);
            }
        }

        tracing::info!("Waiting for authorization callback on port {}", self.port);

        let server = axum::serve(listener, app).into_future();

        tokio::select! {
            result = server => {
                let message = match result {
                    Ok(()) => "callback server stopped".to_string(),
                    Err(e) => e.to_string(),
                };
                Err(GmailMcpError::Auth(AuthError::CallbackError { message }))
            }
            outcome = rx => {
                match outcome {
                    Ok(Ok(code)) => Ok(code),
                    Ok(Err(message)) => Err(GmailMcpError::Auth(AuthError::CallbackError { message })),
                    Err(_) => Err(GmailMcpError::Auth(AuthError::NoAuthCode)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(token_uri: String) -> ClientSecret {
        ClientSecret {
            client_id: "client id".to_string(),
            client_secret: "shh".to_string(),
            auth_uri: "https://accounts.example.com/auth".to_string(),
            token_uri,
            redirect_uris: vec![],
        }
    }

    fn flow(token_uri: String) -> ConsentFlow {
        ConsentFlow::new(
            secret(token_uri),
            "http://localhost:8080/".to_string(),
            vec!["scope.one".to_string(), "scope.two".to_string()],
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_begin_builds_consent_url() {
        let mut flow = flow("https://unused".to_string());
        let (url, state) = flow.begin().unwrap();

        assert!(url.starts_with("https://accounts.example.com/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F"));
        assert!(url.contains("scope=scope.one%20scope.two"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains(&format!("state={}", state)));
        assert!(matches!(flow.state(), AuthState::AwaitingConsent { .. }));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut flow = flow("https://unused".to_string());
        flow.begin().unwrap();
        let err = flow.begin().unwrap_err();
        assert!(matches!(
            err,
            GmailMcpError::Auth(AuthError::InvalidState {
                expected: "Unauthenticated",
                found: "AwaitingConsent"
            })
        ));
    }

    #[tokio::test]
    async fn test_complete_before_begin_is_rejected() {
        let mut flow = flow("https://unused".to_string());
        let err = flow.complete("code").await.unwrap_err();
        assert!(matches!(err, GmailMcpError::Auth(AuthError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_complete_exchanges_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("code".into(), "the-code".into()),
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let mut flow = flow(format!("{}/token", server.url()));
        flow.begin().unwrap();
        let bundle = flow.complete("the-code").await.unwrap();

        mock.assert_async().await;
        assert_eq!(bundle.access_token, "at");
        assert_eq!(bundle.refresh_token.as_deref(), Some("rt"));
        assert_eq!(bundle.scopes, vec!["scope.one".to_string(), "scope.two".to_string()]);
        assert_eq!(bundle.client_id, "client id");
        assert!(matches!(flow.state(), AuthState::Authorized(_)));
    }

    #[tokio::test]
    async fn test_complete_reports_exchange_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let mut flow = flow(format!("{}/token", server.url()));
        flow.begin().unwrap();
        let err = flow.complete("bad").await.unwrap_err();
        assert!(matches!(
            err,
            GmailMcpError::Auth(AuthError::TokenExchangeFailed { .. })
        ));
        assert!(matches!(flow.state(), AuthState::AwaitingConsent { .. }));
    }

    #[tokio::test]
    async fn test_loopback_delivers_code() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let consent = LoopbackConsent::new(port).without_browser();
        let waiter = tokio::spawn(async move { consent.wait_for_code("https://consent", "xyz").await });

        let client = reqwest::Client::new();
        let mut delivered = false;
        for _ in 0..50 {
            let wrong = client
                .get(format!("http://127.0.0.1:{}/?code=forged&state=nope", port))
                .send()
                .await;
            if wrong.is_err() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                continue;
            }
            // The listener shuts down as soon as the code arrives, so the reply may be cut off.
            let _ = client
                .get(format!("http://127.0.0.1:{}/?code=abc&state=xyz", port))
                .send()
                .await;
            delivered = true;
            break;
        }

        assert!(delivered);
        assert_eq!(waiter.await.unwrap().unwrap(), "abc");
    }
}
