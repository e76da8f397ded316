//! Twitter/X API v2 platform implementation
//!
//! Every request carries `Bearer <access token>` from the credential store.
//! A 401 triggers exactly one token refresh and one retry of the same
//! request; a second 401 is reported as [`PlatformError::Unauthorized`].
//! Rate limiting is never retried here: the scheduler's interval is the
//! backoff.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::TwitterConfig;
use crate::credentials::{CredentialStore, OAuthClient};
use crate::error::PlatformError;
use crate::platforms::{truncate_for_post, Platform, MAX_POST_CHARS};
use crate::types::{Post, PostId};

/// API bounds for `max_results`
const SEARCH_RESULTS_RANGE: (usize, usize) = (10, 100);
const MENTIONS_RESULTS_RANGE: (usize, usize) = (5, 100);

/// One API call, kept around so it can be replayed after a refresh
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: String,
}

#[derive(Deserialize)]
struct User {
    id: String,
}

pub struct TwitterClient {
    http: reqwest::Client,
    api_base: String,
    credentials: CredentialStore,
    /// Authenticated account id, resolved on first mentions lookup
    user_id: Option<String>,
}

impl TwitterClient {
    pub fn new(api_base: &str, credentials: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            user_id: None,
        }
    }

    /// Build the client and its credential store from configuration.
    ///
    /// The store gets its own copy of the tokens and is their only owner from
    /// then on.
    pub fn from_config(config: &TwitterConfig) -> Self {
        let copy = |secret: &SecretString| SecretString::from(secret.expose_secret().to_string());
        let endpoint = OAuthClient::new(
            &config.api_base,
            &config.client_id,
            copy(&config.client_secret),
        );
        let store = CredentialStore::new(
            Box::new(endpoint),
            config.access_token.as_ref().map(copy),
            config.refresh_token.as_ref().map(copy),
        );
        Self::new(&config.api_base, store)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    async fn access_token(&mut self) -> Result<String, PlatformError> {
        self.credentials.current_access_token().await.map_err(|e| {
            warn!("No usable access token: {}", e);
            PlatformError::Unauthorized
        })
    }

    /// Send with the single refresh-and-retry on 401
    async fn send(&mut self, request: &ApiRequest) -> Result<Value, PlatformError> {
        let token = self.access_token().await?;
        match self.execute(&token, request).await {
            Err(PlatformError::Unauthorized) if self.credentials.has_refresh_token() => {
                debug!("{} {} returned 401, refreshing token", request.method, request.path);
                if let Err(e) = self.credentials.refresh().await {
                    warn!("Token refresh after 401 failed: {}", e);
                    return Err(PlatformError::Unauthorized);
                }
                let token = self.access_token().await?;
                self.execute(&token, request).await
            }
            other => other,
        }
    }

    async fn execute(&self, token: &str, request: &ApiRequest) -> Result<Value, PlatformError> {
        let url = format!("{}{}", self.api_base, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            return Err(PlatformError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PlatformError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| PlatformError::Rejected {
            status: status.as_u16(),
            body: format!("unparseable response ({}): {}", e, body),
        })
    }

    async fn create(&mut self, payload: Value) -> Result<PostId, PlatformError> {
        let response = self.send(&ApiRequest::post("/2/tweets", payload)).await?;
        let created: CreatedPost = required_data(response)?;
        Ok(PostId::new(created.id))
    }

    async fn own_user_id(&mut self) -> Result<String, PlatformError> {
        if let Some(id) = &self.user_id {
            return Ok(id.clone());
        }
        let response = self.send(&ApiRequest::get("/2/users/me")).await?;
        let user: User = required_data(response)?;
        debug!("Resolved authenticated user id {}", user.id);
        self.user_id = Some(user.id.clone());
        Ok(user.id)
    }
}

fn required_data<T: DeserializeOwned>(response: Value) -> Result<T, PlatformError> {
    let raw = response.to_string();
    let envelope: Envelope<T> = serde_json::from_value(response).map_err(|e| {
        PlatformError::Rejected {
            status: 200,
            body: format!("unexpected response shape ({}): {}", e, raw),
        }
    })?;
    envelope.data.ok_or(PlatformError::Rejected {
        status: 200,
        body: raw,
    })
}

/// Absent `data` means no results
fn post_list(response: Value, limit: usize) -> Result<Vec<Post>, PlatformError> {
    let raw = response.to_string();
    let envelope: Envelope<Vec<Post>> =
        serde_json::from_value(response).map_err(|e| PlatformError::Rejected {
            status: 200,
            body: format!("unexpected response shape ({}): {}", e, raw),
        })?;
    let mut posts = envelope.data.unwrap_or_default();
    posts.truncate(limit);
    Ok(posts)
}

fn clamp_results(limit: usize, (min, max): (usize, usize)) -> usize {
    limit.clamp(min, max)
}

#[async_trait]
impl Platform for TwitterClient {
    async fn post(&mut self, text: &str) -> Result<PostId, PlatformError> {
        let text = truncate_for_post(text, MAX_POST_CHARS);
        self.create(json!({ "text": text })).await
    }

    async fn reply(&mut self, parent_id: &PostId, text: &str) -> Result<PostId, PlatformError> {
        let text = truncate_for_post(text, MAX_POST_CHARS);
        self.create(json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": parent_id.as_str() },
        }))
        .await
    }

    async fn search_recent(
        &mut self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let request = ApiRequest::get("/2/tweets/search/recent")
            .query("query", query)
            .query("max_results", clamp_results(limit, SEARCH_RESULTS_RANGE))
            .query("tweet.fields", "author_id");
        let response = self.send(&request).await?;
        post_list(response, limit)
    }

    async fn fetch_mentions(&mut self, limit: usize) -> Result<Vec<Post>, PlatformError> {
        let user_id = self.own_user_id().await?;
        let request = ApiRequest::get(format!("/2/users/{}/mentions", user_id))
            .query("max_results", clamp_results(limit, MENTIONS_RESULTS_RANGE))
            .query("tweet.fields", "author_id");
        let response = self.send(&request).await?;
        post_list(response, limit)
    }

    fn name(&self) -> &str {
        "twitter"
    }
}
