//! Generation client against a mock chat completions endpoint

use libchirp::error::GenError;
use libchirp::generation::{GenerationClient, Generator, FALLBACK_TEXT};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GenerationClient {
    GenerationClient::new(
        &format!("{}/openai/v1", server.uri()),
        "llama-3.1-8b-instant",
        SecretString::from("gsk-test".to_string()),
    )
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

#[tokio::test]
async fn test_request_carries_persona_prompt_and_sampling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "say hi"}
            ],
            "max_tokens": 50
        })))
        .respond_with(completion("hi"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server).generate("be terse", "say hi", 50, 0.5).await;
    assert_eq!(text, "hi");
}

#[tokio::test]
async fn test_quoted_completion_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("  \"Compilers are just very patient critics.\"\n"))
        .mount(&server)
        .await;

    let text = client(&server).try_generate("p", "u", 80, 0.8).await.unwrap();
    assert_eq!(text, "Compilers are just very patient critics.");
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.try_generate("p", "u", 80, 0.8).await,
        Err(GenError::Rejected {
            status: 503,
            body: "overloaded".to_string()
        })
    );
    assert_eq!(client.generate("p", "u", 80, 0.8).await, FALLBACK_TEXT);
}

#[tokio::test]
async fn test_missing_completion_field_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(
        client.try_generate("p", "u", 80, 0.8).await,
        Err(GenError::Malformed(_))
    ));
    assert_eq!(client.generate("p", "u", 80, 0.8).await, FALLBACK_TEXT);
}

#[tokio::test]
async fn test_non_json_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    assert_eq!(client(&server).generate("p", "u", 80, 0.8).await, FALLBACK_TEXT);
}

#[tokio::test]
async fn test_blank_completion_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("   "))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.try_generate("p", "u", 80, 0.8).await,
        Err(GenError::EmptyCompletion)
    );
    assert_eq!(client.generate("p", "u", 80, 0.8).await, FALLBACK_TEXT);
}
