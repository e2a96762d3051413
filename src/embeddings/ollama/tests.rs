use super::*;

#[test]
fn client_configuration() {
    let config = EmbeddingConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        dimension: 384,
        ..EmbeddingConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(client.dimension(), 384);
    assert_eq!(client.model_id(), "ollama:test-model:384");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&EmbeddingConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn model_id_tracks_dimension() {
    let small = OllamaClient::new(&EmbeddingConfig {
        dimension: 384,
        ..EmbeddingConfig::default()
    })
    .expect("Failed to create client");
    let large = OllamaClient::new(&EmbeddingConfig::default()).expect("Failed to create client");

    assert_ne!(small.model_id(), large.model_id());
}

#[test]
fn empty_batch_needs_no_server() {
    let client = OllamaClient::new(&EmbeddingConfig {
        host: "unreachable.invalid".to_string(),
        ..EmbeddingConfig::default()
    })
    .expect("Failed to create client");

    let embeddings = client
        .embed_blocking(&[])
        .expect("empty batch should succeed");
    assert!(embeddings.is_empty());
}

#[test]
fn embed_request_serialization() {
    let inputs = vec!["first".to_string(), "second".to_string()];
    let request = EmbedRequest {
        model: "nomic-embed-text:latest",
        input: &inputs,
    };

    let json = serde_json::to_value(&request).expect("should serialize request");
    assert_eq!(json["model"], "nomic-embed-text:latest");
    assert_eq!(json["input"][1], "second");
}

#[test]
fn bare_model_name_matches_latest_tag() {
    assert!(same_model("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(same_model("nomic-embed-text:latest", "nomic-embed-text"));
    assert!(same_model("mxbai-embed-large:v1", "mxbai-embed-large:v1"));
    assert!(!same_model("mxbai-embed-large:v1", "mxbai-embed-large:latest"));
    assert!(!same_model("nomic-embed-text", "nomic-embed-text-v2:latest"));
}

#[test]
fn backoff_doubles_until_capped() {
    assert_eq!(backoff_delay(1), Duration::from_millis(500));
    assert_eq!(backoff_delay(2), Duration::from_millis(1000));
    assert_eq!(backoff_delay(3), Duration::from_millis(2000));
    assert_eq!(backoff_delay(10), Duration::from_millis(BACKOFF_CAP_MS));
    assert_eq!(backoff_delay(200), Duration::from_millis(BACKOFF_CAP_MS));
}

#[test]
fn only_server_and_transport_errors_are_transient() {
    assert_eq!(classify(&ureq::Error::StatusCode(503)), Retry::Transient);
    assert_eq!(classify(&ureq::Error::StatusCode(500)), Retry::Transient);
    assert_eq!(classify(&ureq::Error::ConnectionFailed), Retry::Transient);
    assert_eq!(classify(&ureq::Error::HostNotFound), Retry::Transient);
    assert_eq!(classify(&ureq::Error::StatusCode(404)), Retry::Fatal);
    assert_eq!(classify(&ureq::Error::StatusCode(400)), Retry::Fatal);
}

#[test]
fn response_shape_is_checked() {
    let client = OllamaClient::new(&EmbeddingConfig {
        dimension: 8,
        ..EmbeddingConfig::default()
    })
    .expect("Failed to create client");

    let good = vec![vec![0.0; 8], vec![1.0; 8]];
    assert_eq!(
        client
            .check_embeddings(2, good.clone())
            .expect("matching shape"),
        good
    );

    let short = client
        .check_embeddings(3, good)
        .expect_err("missing vector should fail");
    assert!(short.to_string().contains("received 2 embeddings"));

    let narrow = client
        .check_embeddings(1, vec![vec![0.0; 4]])
        .expect_err("narrow vector should fail");
    assert!(narrow.to_string().contains("expected 8"));
}
