#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client behaviour against a mock HTTP server

use arabic_rag::chat::Turn;
use arabic_rag::config::OllamaConfig;
use arabic_rag::embeddings::ollama::OllamaClient;
use arabic_rag::embeddings::{Embedder, Generator};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers embed requests with one `[index, text length]` vector per input
struct EchoEmbeddings;

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("request body should be JSON");
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .expect("input should be an array")
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let len = text.as_str().map_or(0, |t| t.chars().count());
                vec![i as f32, len as f32]
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let uri = Url::parse(&server.uri()).expect("mock server uri should parse");
    let config = OllamaConfig {
        protocol: uri.scheme().to_string(),
        host: uri.host_str().expect("mock server has a host").to_string(),
        port: uri.port().expect("mock server has a port"),
        embedding_model: "test-embed".to_string(),
        chat_model: "test-chat".to_string(),
        batch_size,
        timeout_secs: 5,
        temperature: 0.2,
    };
    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_retry_attempts(3)
        .with_retry_delay(Duration::from_millis(5))
}

/// The client is blocking, so drive it off the runtime thread the mock server uses
async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task should not panic")
}

#[tokio::test]
async fn embeddings_are_returned_in_order() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-embed" })))
        .respond_with(EchoEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let texts = vec!["أ".to_string(), "بب".to_string(), "ججج".to_string()];
    let vectors = blocking(move || client.generate_embeddings_batch(&texts))
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 2.0], vec![2.0, 3.0]]);
}

#[tokio::test]
async fn large_inputs_are_split_into_server_batches() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings)
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let texts: Vec<String> = (0..5).map(|i| "نص".repeat(i + 1)).collect();
    let vectors = blocking(move || client.embed_batch(&texts))
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 5);
    // Index restarts in each request of two
    assert_eq!(vectors[2], vec![0.0, 6.0]);
    assert_eq!(vectors[4], vec![0.0, 10.0]);
}

#[tokio::test]
async fn count_mismatch_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0]] })))
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = blocking(move || client.generate_embeddings_batch(&texts)).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn server_errors_are_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let vector = blocking(move || client.embed("نص"))
        .await
        .expect("third attempt should succeed");

    assert_eq!(vector, vec![0.0, 2.0]);
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = blocking(move || client.embed("نص")).await;

    let err = result.expect_err("404 should fail");
    assert!(format!("{err:#}").contains("404"));
}

#[tokio::test]
async fn chat_sends_history_and_prompt() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "test-chat",
            "stream": false,
            "options": { "temperature": 0.2 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-chat",
            "message": { "role": "assistant", "content": "الشمس نجم" },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let history = vec![Turn {
        question: "سؤال سابق".to_string(),
        answer: "جواب سابق".to_string(),
    }];
    let answer = blocking(move || client.generate("ما هي الشمس؟", &history))
        .await
        .expect("chat should succeed");
    assert_eq!(answer, "الشمس نجم");

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let body: Value = requests[0].body_json().expect("body should be JSON");
    let messages = body["messages"].as_array().expect("messages should be an array");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "سؤال سابق");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[2]["content"], "ما هي الشمس؟");
}

#[tokio::test]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "test-embed", "size": 1000, "digest": "abc" },
                { "name": "test-chat" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    blocking(move || client.health_check())
        .await
        .expect("health check should pass");
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "test-embed" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let retrieval_client = client.clone();
    let err = blocking(move || client.health_check())
        .await
        .expect_err("missing chat model should fail");
    assert!(err.to_string().contains("test-chat"));

    blocking(move || retrieval_client.embedding_health_check())
        .await
        .expect("retrieval only needs the embedding model");
}
