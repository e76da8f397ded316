use super::*;
use crate::oauth::{AuthorizationRequest, PkceChallenge};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn tokens(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: secret(access),
        refresh_token: refresh.map(secret),
        expires_in: Some(7200),
    }
}

/// Token endpoint that replays scripted responses and records what it saw
#[derive(Clone, Default)]
struct ScriptedEndpoint {
    refresh_responses: Arc<Mutex<VecDeque<Result<TokenResponse, AuthError>>>>,
    exchange_responses: Arc<Mutex<VecDeque<Result<TokenResponse, AuthError>>>>,
    refresh_calls: Arc<Mutex<Vec<String>>>,
    exchange_calls: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl ScriptedEndpoint {
    fn on_refresh(self, response: Result<TokenResponse, AuthError>) -> Self {
        self.refresh_responses.lock().unwrap().push_back(response);
        self
    }

    fn on_exchange(self, response: Result<TokenResponse, AuthError>) -> Self {
        self.exchange_responses.lock().unwrap().push_back(response);
        self
    }

    fn refresh_calls(&self) -> Vec<String> {
        self.refresh_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.refresh_calls
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        self.refresh_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Transport("no scripted response".to_string())))
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.exchange_calls.lock().unwrap().push((
            code.to_string(),
            verifier.to_string(),
            redirect_uri.to_string(),
        ));
        self.exchange_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Transport("no scripted response".to_string())))
    }
}

/// Prompt that hands out a fixed code and counts how often it was asked
struct CountingPrompt {
    code: String,
    prompts: Arc<AtomicUsize>,
}

#[async_trait]
impl AuthorizationPrompt for CountingPrompt {
    async fn obtain_code(&self, _request: &AuthorizationRequest) -> Result<String, AuthError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.code.clone())
    }
}

fn auth_request() -> AuthorizationRequest {
    AuthorizationRequest::with_pkce(
        "https://twitter.com/i/oauth2/authorize",
        "client",
        "http://127.0.0.1:8976/callback",
        &["offline.access".to_string()],
        PkceChallenge::from_verifier("the-verifier".to_string()),
        "state".to_string(),
    )
    .unwrap()
}

mod store_tests {
    use super::*;

    #[tokio::test]
    async fn test_cached_token_returned_without_refresh() {
        let endpoint = ScriptedEndpoint::default();
        let mut store = CredentialStore::new(
            Box::new(endpoint.clone()),
            Some(secret("cached")),
            Some(secret("refresh")),
        );

        assert_eq!(store.current_access_token().await.unwrap(), "cached");
        assert!(endpoint.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_access_token_triggers_refresh() {
        let endpoint = ScriptedEndpoint::default().on_refresh(Ok(tokens("fresh", None)));
        let mut store =
            CredentialStore::new(Box::new(endpoint.clone()), None, Some(secret("refresh-1")));

        assert_eq!(store.current_access_token().await.unwrap(), "fresh");
        assert_eq!(endpoint.refresh_calls(), vec!["refresh-1"]);

        // Second call uses the cache
        assert_eq!(store.current_access_token().await.unwrap(), "fresh");
        assert_eq!(endpoint.refresh_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_tokens_at_all_is_an_error() {
        let endpoint = ScriptedEndpoint::default();
        let mut store = CredentialStore::new(Box::new(endpoint.clone()), None, None);

        let result = store.current_access_token().await;
        assert!(matches!(result, Err(AuthError::MissingRefreshToken)));
        assert!(endpoint.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_both_tokens_on_rotation() {
        let endpoint = ScriptedEndpoint::default()
            .on_refresh(Ok(tokens("access-2", Some("refresh-2"))))
            .on_refresh(Ok(tokens("access-3", Some("refresh-3"))));
        let mut store = CredentialStore::new(
            Box::new(endpoint.clone()),
            Some(secret("access-1")),
            Some(secret("refresh-1")),
        );

        store.refresh().await.unwrap();
        assert_eq!(store.current_access_token().await.unwrap(), "access-2");
        assert_eq!(
            store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("refresh-2".to_string())
        );

        // The rotated token is what the next refresh presents
        store.refresh().await.unwrap();
        assert_eq!(endpoint.refresh_calls(), vec!["refresh-1", "refresh-2"]);
        assert_eq!(store.current_access_token().await.unwrap(), "access-3");
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_refresh_token() {
        let endpoint = ScriptedEndpoint::default().on_refresh(Ok(tokens("access-2", None)));
        let mut store = CredentialStore::new(Box::new(endpoint), None, Some(secret("keep-me")));

        store.refresh().await.unwrap();
        assert_eq!(
            store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("keep-me".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_tokens_untouched() {
        let endpoint = ScriptedEndpoint::default().on_refresh(Err(AuthError::Rejected {
            status: 400,
            body: "invalid_grant".to_string(),
        }));
        let mut store = CredentialStore::new(
            Box::new(endpoint),
            Some(secret("access-1")),
            Some(secret("refresh-1")),
        );

        let result = store.refresh().await;
        assert!(matches!(result, Err(AuthError::Rejected { status: 400, .. })));
        assert_eq!(store.current_access_token().await.unwrap(), "access-1");
        assert_eq!(
            store.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("refresh-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_recoverable_on_next_call() {
        let endpoint = ScriptedEndpoint::default()
            .on_refresh(Err(AuthError::Transport("connection reset".to_string())))
            .on_refresh(Ok(tokens("later", None)));
        let mut store = CredentialStore::new(Box::new(endpoint), None, Some(secret("refresh")));

        assert!(store.current_access_token().await.is_err());
        assert_eq!(store.current_access_token().await.unwrap(), "later");
    }
}

mod bootstrap_tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_supplies_tokens_without_reprompting() {
        let endpoint =
            ScriptedEndpoint::default().on_exchange(Ok(tokens("access-0", Some("refresh-0"))));
        let prompts = Arc::new(AtomicUsize::new(0));
        let prompt = CountingPrompt {
            code: "auth-code".to_string(),
            prompts: prompts.clone(),
        };
        let mut store = CredentialStore::new(Box::new(endpoint.clone()), None, None);
        assert!(!store.has_refresh_token());

        store.bootstrap(&auth_request(), &prompt).await.unwrap();
        assert!(store.has_refresh_token());

        for _ in 0..3 {
            assert_eq!(store.current_access_token().await.unwrap(), "access-0");
        }
        // Repeated bootstrap is a no-op once a refresh token exists
        store.bootstrap(&auth_request(), &prompt).await.unwrap();

        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        let exchanges = endpoint.exchange_calls.lock().unwrap().clone();
        assert_eq!(
            exchanges,
            vec![(
                "auth-code".to_string(),
                "the-verifier".to_string(),
                "http://127.0.0.1:8976/callback".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_skipped_when_refresh_token_configured() {
        let prompts = Arc::new(AtomicUsize::new(0));
        let prompt = CountingPrompt {
            code: "unused".to_string(),
            prompts: prompts.clone(),
        };
        let mut store = CredentialStore::new(
            Box::new(ScriptedEndpoint::default()),
            None,
            Some(secret("refresh")),
        );

        store.bootstrap(&auth_request(), &prompt).await.unwrap();
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_runs_at_most_once() {
        let endpoint = ScriptedEndpoint::default().on_exchange(Err(AuthError::Rejected {
            status: 400,
            body: "invalid_request".to_string(),
        }));
        let prompts = Arc::new(AtomicUsize::new(0));
        let prompt = CountingPrompt {
            code: "code".to_string(),
            prompts: prompts.clone(),
        };
        let mut store = CredentialStore::new(Box::new(endpoint), None, None);

        assert!(store.bootstrap(&auth_request(), &prompt).await.is_err());
        let second = store.bootstrap(&auth_request(), &prompt).await;
        assert!(matches!(second, Err(AuthError::Authorization(_))));
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_requires_refresh_token_in_response() {
        let endpoint = ScriptedEndpoint::default().on_exchange(Ok(tokens("access-only", None)));
        let prompt = CountingPrompt {
            code: "code".to_string(),
            prompts: Arc::new(AtomicUsize::new(0)),
        };
        let mut store = CredentialStore::new(Box::new(endpoint), None, None);

        let result = store.bootstrap(&auth_request(), &prompt).await;
        assert!(matches!(result, Err(AuthError::Authorization(msg)) if msg.contains("offline.access")));
        assert!(!store.has_refresh_token());
    }
}

mod oauth_client_tests {
    use super::*;

    fn client(server: &MockServer) -> OAuthClient {
        OAuthClient::new(&server.uri(), "client-id", secret("client-secret"))
    }

    #[tokio::test]
    async fn test_refresh_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r-1"))
            .and(body_string_contains("client_id=client-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "expires_in": 7200,
                "access_token": "a-2",
                "scope": "tweet.read tweet.write offline.access",
                "refresh_token": "r-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).refresh("r-1").await.unwrap();
        assert_eq!(response.access_token.expose_secret(), "a-2");
        assert_eq!(
            response.refresh_token.map(|t| t.expose_secret().to_string()),
            Some("r-2".to_string())
        );
        assert_eq!(response.expires_in, Some(7200));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_pkce_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a-1",
                "refresh_token": "r-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .exchange_code("the-code", "the-verifier", "http://127.0.0.1:8976/callback")
            .await
            .unwrap();
        assert_eq!(response.access_token.expose_secret(), "a-1");
    }

    #[tokio::test]
    async fn test_rejected_refresh_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":"invalid_request","error_description":"Value passed for the token was invalid."}"#),
            )
            .mount(&server)
            .await;

        match client(&server).refresh("expired").await {
            Err(AuthError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_request"));
            }
            other => panic!("Expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_response_without_access_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token_type": "bearer"})),
            )
            .mount(&server)
            .await;

        let result = client(&server).refresh("r").await;
        assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_non_json_response_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client(&server).refresh("r").await;
        assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let endpoint = OAuthClient::new("http://127.0.0.1:9", "id", secret("secret"));
        let result = endpoint.refresh("r").await;
        assert!(matches!(result, Err(AuthError::Transport(_))));
    }
}
