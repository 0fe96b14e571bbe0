//! Gateway client tests against a wiremock server.

use recap_core::{Embedder, Error, LlmGateway};
use recap_inference::{EmbedderConfig, GatewayConfig, HttpEmbedder, HttpLlmGateway};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> HttpLlmGateway {
    HttpLlmGateway::new(GatewayConfig::default().with_base_url(server.uri()))
        .expect("client should build")
}

fn chat_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

#[tokio::test]
async fn test_generate_content_builds_prompt_and_returns_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "model-a",
            "temperature": 0.3,
            "messages": [{
                "role": "user",
                "content": "Summarize.\n\nContent:\nThe document body."
            }]
        })))
        .respond_with(chat_response("A concise summary."))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let summary = gateway
        .generate_content("The document body.", "model-a", "Summarize.")
        .await
        .unwrap();

    assert_eq!(summary, "A concise summary.");
}

#[tokio::test]
async fn test_extract_metadata_parses_json_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "model-b",
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(chat_response(
            r#"{"date": "2024-03-01", "keywords": ["rust", "queues"]}"#,
        ))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let metadata = gateway
        .extract_metadata("body", "model-b", "Extract metadata.")
        .await
        .unwrap();

    assert_eq!(metadata.date, "2024-03-01");
    assert_eq!(metadata.keywords, vec!["rust", "queues"]);
}

#[tokio::test]
async fn test_extract_metadata_malformed_json_falls_back_to_placeholder() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_response("Sorry, I cannot produce JSON today."))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let metadata = gateway
        .extract_metadata("body", "model-b", "Extract metadata.")
        .await
        .unwrap();

    assert_eq!(metadata.date, "unknown");
    assert!(metadata.keywords.is_empty());
}

#[tokio::test]
async fn test_generate_content_http_error_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "backend exploded", "type": "server_error"}
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway
        .generate_content("body", "model-a", "Summarize.")
        .await
        .unwrap_err();

    match err {
        Error::Inference(msg) => assert!(msg.contains("backend exploded")),
        other => panic!("expected Inference error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_content_empty_choices_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": []
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway
        .generate_content("body", "model-a", "Summarize.")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_list_models_returns_advertised_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "alpha"}, {"id": "beta"}]
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    assert_eq!(gateway.list_models().await, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_list_models_falls_back_when_unreachable() {
    // Nothing listens on this port.
    let gateway =
        HttpLlmGateway::new(GatewayConfig::default().with_base_url("http://127.0.0.1:1"))
            .expect("client should build");

    let models = gateway.list_models().await;
    assert_eq!(
        models,
        recap_core::defaults::FALLBACK_MODELS
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_embedder_roundtrip_and_dimension_check() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3, 0.4], "index": 0}]
        })))
        .mount(&server)
        .await;

    let config = EmbedderConfig {
        base_url: server.uri(),
        dimension: 4,
        ..Default::default()
    };
    let embedder = HttpEmbedder::new(config).unwrap();

    let vector = embedder.embed("some text").await.unwrap();
    assert_eq!(vector.as_slice().len(), 4);
    assert_eq!(embedder.dimension(), 4);

    // A mismatched dimension is rejected.
    let config = EmbedderConfig {
        base_url: server.uri(),
        dimension: 384,
        ..Default::default()
    };
    let embedder = HttpEmbedder::new(config).unwrap();
    let err = embedder.embed("some text").await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}
