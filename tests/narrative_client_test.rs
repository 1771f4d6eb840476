//! Integration tests for the narrative collaborator client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use insight_engine::config::{NarrativeConfig, RequestConfig};
use insight_engine::error::NarrativeError;
use insight_engine::narrative::{NarrativeClient, NarrativeContext};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str) -> NarrativeClient {
    let config = NarrativeConfig {
        api_key: Some("test-api-key".to_string()),
        base_url: base_url.to_string(),
        model: "gpt-4o".to_string(),
        max_tokens: 1500,
        temperature: 0.7,
    };

    let request_config = RequestConfig {
        timeout_ms: 2000,
        max_retries: 0, // No retries for testing
        retry_delay_ms: 100,
    };

    NarrativeClient::new(&config, request_config).expect("Failed to create client")
}

/// Minimal context for request payloads
fn create_test_context() -> NarrativeContext {
    NarrativeContext {
        title: "Test Report".to_string(),
        rows: 3,
        date_range: None,
        metrics: BTreeMap::from([("total_clicks".to_string(), 360.0)]),
        anomalies: vec![],
        correlations: vec![],
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [
            {"message": {"role": "assistant", "content": content}}
        ]
    })
}

#[tokio::test]
async fn test_successful_narrative_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"summary": "360 clicks total.", "highlights": [], "issues": [], "recommendations": []}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.request_narrative(&create_test_context()).await;

    assert!(result.is_ok(), "request should succeed: {:?}", result.err());
    assert!(result.unwrap().contains("360 clicks"));
}

#[tokio::test]
async fn test_api_error_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "invalid api key"}
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client
        .request_narrative(&create_test_context())
        .await
        .unwrap_err();

    // With retries exhausted the client reports unavailability, carrying
    // the last API error message
    match err {
        NarrativeError::Unavailable { message, .. } => {
            assert!(message.contains("401"), "message was: {}", message)
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_immediate_and_typed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("{}"))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client
        .request_narrative(&create_test_context())
        .await
        .unwrap_err();

    assert!(matches!(err, NarrativeError::Timeout { timeout_ms: 2000 }));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client
        .request_narrative(&create_test_context())
        .await
        .unwrap_err();

    match err {
        NarrativeError::Unavailable { message, .. } => {
            assert!(message.contains("Invalid response"), "message was: {}", message)
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credentials_never_calls_the_network() {
    let mock_server = MockServer::start().await;
    // No mock mounted: any request would 404 and the test would still
    // distinguish the early return by error type

    let config = NarrativeConfig {
        api_key: None,
        base_url: mock_server.uri(),
        model: "gpt-4o".to_string(),
        max_tokens: 1500,
        temperature: 0.7,
    };
    let client = NarrativeClient::new(&config, RequestConfig::default()).unwrap();

    let err = client
        .request_narrative(&create_test_context())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NarrativeError::Unavailable { retries: 0, .. }
    ));
}

#[tokio::test]
async fn test_retries_with_backoff_then_succeeds() {
    let mock_server = MockServer::start().await;

    // First attempt fails, second succeeds
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"summary": "ok", "highlights": [], "issues": [], "recommendations": []}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = NarrativeConfig {
        api_key: Some("test-api-key".to_string()),
        base_url: mock_server.uri(),
        model: "gpt-4o".to_string(),
        max_tokens: 1500,
        temperature: 0.7,
    };
    let request_config = RequestConfig {
        timeout_ms: 2000,
        max_retries: 2,
        retry_delay_ms: 10,
    };
    let client = NarrativeClient::new(&config, request_config).unwrap();

    let result = client.request_narrative(&create_test_context()).await;
    assert!(result.is_ok(), "retry should recover: {:?}", result.err());
}
