//! One-time OAuth 2.0 authorization with PKCE
//!
//! Used only when no refresh token is configured. The operator opens the
//! printed URL, approves the app, and the authorization code reaches us either
//! through a local HTTP callback on the redirect URI or by pasting it into the
//! console. The code is then exchanged for tokens by the credential store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::config::{AuthMode, TwitterConfig};
use crate::error::AuthError;

/// PKCE verifier/challenge pair (S256)
pub struct PkceChallenge {
    verifier: SecretString,
    challenge: String,
}

impl PkceChallenge {
    /// 32 random bytes, base64url encoded: a 43 character verifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier: SecretString::from(verifier),
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        self.verifier.expose_secret()
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// Everything needed to send the operator to the consent page and later
/// redeem the code they bring back
pub struct AuthorizationRequest {
    url: Url,
    state: String,
    redirect_uri: String,
    pkce: PkceChallenge,
}

impl AuthorizationRequest {
    pub fn new(
        authorize_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<Self, AuthError> {
        Self::with_pkce(
            authorize_url,
            client_id,
            redirect_uri,
            scopes,
            PkceChallenge::generate(),
            uuid::Uuid::new_v4().to_string(),
        )
    }

    pub fn from_config(config: &TwitterConfig) -> Result<Self, AuthError> {
        let redirect_uri = config.redirect_uri.as_deref().ok_or_else(|| {
            AuthError::Authorization("TWITTER_REDIRECT_URI is not configured".to_string())
        })?;
        Self::new(
            &config.authorize_url,
            &config.client_id,
            redirect_uri,
            &config.scopes,
        )
    }

    pub fn with_pkce(
        authorize_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        pkce: PkceChallenge,
        state: String,
    ) -> Result<Self, AuthError> {
        let mut url = Url::parse(authorize_url).map_err(|e| {
            AuthError::Authorization(format!("invalid authorize URL '{}': {}", authorize_url, e))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", "S256");

        Ok(Self {
            url,
            state,
            redirect_uri: redirect_uri.to_string(),
            pkce,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn verifier(&self) -> &str {
        self.pkce.verifier()
    }
}

/// Source of the authorization code for the one-time flow
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String, AuthError>;
}

/// Select the prompt matching the configured mode
pub fn prompt_for(mode: AuthMode) -> Box<dyn AuthorizationPrompt> {
    match mode {
        AuthMode::Manual => Box::new(ManualPrompt),
        AuthMode::Callback => Box::new(CallbackPrompt),
    }
}

/// Query parameters the provider appends to the redirect URI
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Validate the redirect and pull the code out of it
    pub fn into_code(self, expected_state: &str) -> Result<String, AuthError> {
        if let Some(error) = self.error {
            let detail = self
                .error_description
                .map(|d| format!(": {}", d))
                .unwrap_or_default();
            return Err(AuthError::Authorization(format!(
                "provider returned '{}'{}",
                error, detail
            )));
        }

        match self.state.as_deref() {
            Some(state) if state == expected_state => {}
            Some(_) => {
                return Err(AuthError::Authorization(
                    "state parameter mismatch; discarding the code".to_string(),
                ))
            }
            None => {
                return Err(AuthError::Authorization(
                    "state parameter missing; discarding the code".to_string(),
                ))
            }
        }

        match self.code.map(|c| c.trim().to_string()) {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(AuthError::Authorization(
                "no authorization code in the response".to_string(),
            )),
        }
    }
}

/// Accept a bare code, a query string, or the full redirected URL
pub fn parse_pasted_code(input: &str, expected_state: &str) -> Result<String, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::Authorization("no code entered".to_string()));
    }

    if !input.contains('=') {
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .or_else(|_| Url::parse(&format!("http://localhost/?{}", input.trim_start_matches('?'))))
        .map_err(|e| AuthError::Authorization(format!("could not parse pasted value: {}", e)))?;

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            "error_description" => params.error_description = Some(value.into_owned()),
            _ => {}
        }
    }
    params.into_code(expected_state)
}

/// Operator pastes the code (or the URL they were redirected to) on stdin
pub struct ManualPrompt;

#[async_trait]
impl AuthorizationPrompt for ManualPrompt {
    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String, AuthError> {
        eprintln!("\nOpen this URL in a browser and approve access:\n\n  {}\n", request.url());
        eprintln!("Then paste the authorization code (or the full redirected URL) and press Enter:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        parse_pasted_code(&line, request.state())
    }
}

/// Listens on the redirect URI and takes the first callback it receives
pub struct CallbackPrompt;

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>,
}

async fn receive_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(params);
    }
    Html("<html><body><p>Authorization received. You can close this tab.</p></body></html>")
}

#[async_trait]
impl AuthorizationPrompt for CallbackPrompt {
    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String, AuthError> {
        let redirect = Url::parse(request.redirect_uri())
            .map_err(|e| AuthError::Authorization(format!("invalid redirect URI: {}", e)))?;
        let host = redirect
            .host_str()
            .ok_or_else(|| AuthError::Authorization("redirect URI has no host".to_string()))?
            .to_string();
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| AuthError::Authorization("redirect URI has no port".to_string()))?;
        let path = match redirect.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
        debug!("Authorization callback listening on {}", listener.local_addr()?);

        let (code_tx, code_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = Router::new()
            .route(&path, get(receive_callback))
            .with_state(CallbackState {
                sender: Arc::new(Mutex::new(Some(code_tx))),
            });

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        eprintln!("\nOpen this URL in a browser and approve access:\n\n  {}\n", request.url());
        info!("Waiting for authorization callback on {}", request.redirect_uri());

        let params = code_rx.await.map_err(|_| {
            AuthError::Authorization("callback listener stopped before a code arrived".to_string())
        })?;

        let _ = stop_tx.send(());
        if let Ok(Err(e)) = server.await {
            debug!("Callback listener shut down with error: {}", e);
        }

        params.into_code(request.state())
    }
}
