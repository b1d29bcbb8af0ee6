use fintrack_llm::{GenerationOptions, InMemoryStore, LlmConfig, LlmService};
use serial_test::serial;
use std::sync::Arc;
use test_tag::tag;

fn should_run_ollama_tests() -> bool {
    if let Ok(value) = std::env::var("RUN_OLLAMA_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return true;
        }
    }
    false
}

fn live_service() -> LlmService {
    let mut config = LlmConfig {
        provider: "ollama".to_string(),
        cache_enabled: false,
        ..Default::default()
    };
    config.apply_env_overrides();
    LlmService::new(config, Arc::new(InMemoryStore::new()))
}

#[tokio::test]
#[tag(ollama)]
#[serial]
async fn test_ollama_generates_text() {
    if !should_run_ollama_tests() {
        eprintln!("skipping Ollama test: RUN_OLLAMA_TESTS not enabled");
        return;
    }

    let service = live_service();
    let client = service.client(None).expect("Ollama client should build");
    client.health_check().await.expect("Ollama server should be reachable");

    let text = service
        .generate_text(
            None,
            "live-test",
            "Reply with the single word: ready",
            &GenerationOptions::new().with_temperature(0.0).with_max_tokens(16),
        )
        .await
        .expect("Generation should succeed");
    assert!(!text.is_empty());

    let status = service.status(None, "live-test").await.unwrap();
    assert_eq!(status.window.count, 1);
    assert_eq!(status.circuit.failure_count, 0);
}

#[tokio::test]
#[tag(ollama)]
#[serial]
async fn test_ollama_structured_output_and_embeddings() {
    if !should_run_ollama_tests() {
        eprintln!("skipping Ollama test: RUN_OLLAMA_TESTS not enabled");
        return;
    }

    let service = live_service();
    let value = service
        .generate_structured_output(
            None,
            "live-test",
            "Return a JSON object with a numeric field \"total\" equal to 12.5",
            "json",
            &GenerationOptions::new().with_temperature(0.0),
        )
        .await
        .expect("Structured generation should succeed");
    assert!(value.is_object());

    let embedding = service
        .generate_embeddings(None, "live-test", "monthly rent payment")
        .await
        .expect("Embedding should succeed");
    assert!(!embedding.is_empty());
}
