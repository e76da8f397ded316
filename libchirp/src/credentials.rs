//! OAuth 2.0 credential store for the social platform
//!
//! The store owns the access token and the refresh token. Only the platform
//! client talks to it: it asks for the current access token before each call
//! and asks for a refresh when the platform answers 401.
//!
//! ```no_run
//! use libchirp::credentials::{CredentialStore, OAuthClient};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), libchirp::error::AuthError> {
//! let endpoint = OAuthClient::new(
//!     "https://api.twitter.com",
//!     "client-id",
//!     SecretString::from("client-secret".to_string()),
//! );
//! let mut store = CredentialStore::new(
//!     Box::new(endpoint),
//!     None,
//!     Some(SecretString::from("refresh-token".to_string())),
//! );
//!
//! // No access token yet, so this refreshes first
//! let token = store.current_access_token().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::oauth::{AuthorizationPrompt, AuthorizationRequest};

/// Tokens returned by a successful token endpoint call
#[derive(Debug)]
pub struct TokenResponse {
    pub access_token: SecretString,
    /// Absent when the provider does not rotate refresh tokens
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<u64>,
}

/// The platform's OAuth token endpoint
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;

    /// Redeem an authorization code obtained through the PKCE flow
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError>;
}

/// Token endpoint client for a confidential OAuth 2.0 app
pub struct OAuthClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl OAuthClient {
    pub fn new(api_base: &str, client_id: &str, client_secret: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!("{}/2/oauth2/token", api_base.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret,
        }
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: RawTokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("missing access_token".to_string()))?;

        Ok(TokenResponse {
            access_token: SecretString::from(access_token),
            refresh_token: raw
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in: raw.expires_in,
        })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.request_tokens(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
        ])
        .await
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.request_tokens(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
            ("client_id", &self.client_id),
        ])
        .await
    }
}

/// Holder of the platform tokens
pub struct CredentialStore {
    endpoint: Box<dyn TokenEndpoint>,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    authorization_attempted: bool,
}

impl CredentialStore {
    pub fn new(
        endpoint: Box<dyn TokenEndpoint>,
        access_token: Option<SecretString>,
        refresh_token: Option<SecretString>,
    ) -> Self {
        Self {
            endpoint,
            access_token,
            refresh_token,
            authorization_attempted: false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Current refresh token, for operators who need to persist it
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    /// Cached access token, refreshing first when none is held
    pub async fn current_access_token(&mut self) -> Result<String, AuthError> {
        if self.access_token.is_none() {
            debug!("No access token cached, refreshing");
            self.refresh().await?;
        }
        self.access_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or(AuthError::MissingRefreshToken)
    }

    /// Exchange the refresh token for a fresh access token.
    ///
    /// Both tokens are replaced only after the endpoint answered with a
    /// usable response; on error the store is left exactly as it was.
    pub async fn refresh(&mut self) -> Result<(), AuthError> {
        let refresh_token = self
            .refresh_token
            .as_ref()
            .ok_or(AuthError::MissingRefreshToken)?;

        let response = self.endpoint.refresh(refresh_token.expose_secret()).await?;
        self.apply(response);
        info!("Access token refreshed");
        Ok(())
    }

    /// Run the interactive authorization flow when no refresh token exists.
    ///
    /// A no-op if a refresh token is already held. The flow runs at most once
    /// per store; a second attempt after a completed or failed flow is refused.
    pub async fn bootstrap(
        &mut self,
        request: &AuthorizationRequest,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<(), AuthError> {
        if self.refresh_token.is_some() {
            debug!("Refresh token present, skipping authorization flow");
            return Ok(());
        }
        if self.authorization_attempted {
            return Err(AuthError::Authorization(
                "authorization flow already ran in this process".to_string(),
            ));
        }
        self.authorization_attempted = true;

        let code = prompt.obtain_code(request).await?;
        let response = self
            .endpoint
            .exchange_code(&code, request.verifier(), request.redirect_uri())
            .await?;

        if response.refresh_token.is_none() {
            return Err(AuthError::Authorization(
                "token endpoint issued no refresh token; request the offline.access scope"
                    .to_string(),
            ));
        }

        self.access_token = Some(response.access_token);
        self.refresh_token = response.refresh_token;
        info!("Authorization complete; persist the new refresh token for future runs");
        Ok(())
    }

    fn apply(&mut self, response: TokenResponse) {
        if let Some(expires_in) = response.expires_in {
            debug!("New access token expires in {}s", expires_in);
        }
        self.access_token = Some(response.access_token);
        if let Some(rotated) = response.refresh_token {
            let changed = self
                .refresh_token
                .as_ref()
                .map_or(true, |old| old.expose_secret() != rotated.expose_secret());
            if changed {
                warn!("Refresh token rotated; update TWITTER_REFRESH_TOKEN before the next restart");
            }
            self.refresh_token = Some(rotated);
        }
    }
}

#[cfg(test)]
mod tests;
