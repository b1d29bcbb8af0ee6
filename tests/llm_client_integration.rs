use fintrack_llm::llm::MockProvider;
use fintrack_llm::{
    ClientSettings, GenerationOptions, InMemoryStore, KeyValueStore, LlmClient, LlmClientFactory,
    LlmConfig, LlmError, ProviderConfig,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(mock: Arc<MockProvider>, store: Arc<InMemoryStore>) -> LlmClient {
    LlmClient::new(
        mock,
        store,
        ClientSettings {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            system_prompt: Some("You are a finance assistant.".to_string()),
        },
    )
}

#[tokio::test]
async fn test_structured_json_output() {
    let mock = Arc::new(MockProvider::new().with_default_response(r#"{"name":"Test","value":123}"#));
    let client = client(mock, Arc::new(InMemoryStore::new()));

    let value = client
        .generate_structured_output("Describe the test", "json", &GenerationOptions::new())
        .await
        .expect("Mock output is valid JSON");

    assert_eq!(value, json!({"name": "Test", "value": 123}));
}

#[tokio::test]
async fn test_structured_output_shares_response_cache() {
    let mock = Arc::new(MockProvider::new().with_default_response(r#"{"ok":true}"#));
    let store = Arc::new(InMemoryStore::new());
    let client = client(mock.clone(), store.clone());

    for _ in 0..3 {
        client
            .generate_structured_output("same prompt", "json", &GenerationOptions::new())
            .await
            .unwrap();
    }

    assert_eq!(mock.call_count(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_cache_entries_expire_with_ttl() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let client = LlmClient::new(
        mock.clone(),
        store.clone(),
        ClientSettings {
            cache_enabled: true,
            cache_ttl: Duration::from_millis(50),
            system_prompt: None,
        },
    );

    client.generate_text("q", &GenerationOptions::new()).await.unwrap();
    client.generate_text("q", &GenerationOptions::new()).await.unwrap();
    assert_eq!(mock.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    client.generate_text("q", &GenerationOptions::new()).await.unwrap();
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_clients_sharing_a_store_share_the_cache() {
    let store = Arc::new(InMemoryStore::new());
    let first_mock = Arc::new(MockProvider::new().with_default_response("first"));
    let second_mock = Arc::new(MockProvider::new().with_default_response("second"));

    let first = client(first_mock.clone(), store.clone());
    let second = client(second_mock.clone(), store.clone());

    assert_eq!(first.generate_text("p", &GenerationOptions::new()).await.unwrap(), "first");
    assert_eq!(second.generate_text("p", &GenerationOptions::new()).await.unwrap(), "first");
    assert_eq!(second_mock.call_count(), 0);
}

#[tokio::test]
async fn test_cache_key_is_stored_under_response_prefix() {
    let store = Arc::new(InMemoryStore::new());
    let client = client(Arc::new(MockProvider::new()), store.clone());
    let options = GenerationOptions::new();

    let answer = client.generate_text("p", &options).await.unwrap();
    let key = client.cache_key("p", Some("You are a finance assistant."), &options).unwrap();

    assert!(key.starts_with("llm:response:"));
    assert_eq!(store.get(&key).await.unwrap(), Some(json!(answer)));
}

#[tokio::test]
async fn test_factory_builds_mock_client_from_config() {
    let config = LlmConfig {
        provider: "mock".to_string(),
        ..Default::default()
    };
    let factory = LlmClientFactory::new(config, Arc::new(InMemoryStore::new()));

    let overrides = ProviderConfig {
        additional_config: [("default_response".to_string(), json!("configured"))]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let client = factory.create_with_overrides(None, &overrides).unwrap();

    assert_eq!(client.provider_name(), "mock");
    assert_eq!(
        client.generate_text("x", &GenerationOptions::new()).await.unwrap(),
        "configured"
    );
}

#[tokio::test]
async fn test_unsupported_provider() {
    let factory = LlmClientFactory::new(LlmConfig::default(), Arc::new(InMemoryStore::new()));
    let err = factory.create(Some("unsupported")).unwrap_err();
    assert!(matches!(err, LlmError::UnsupportedProvider(ref name) if name == "unsupported"));
    assert_eq!(err.to_string(), "Unsupported provider: unsupported");
}

#[tokio::test]
async fn test_typed_structured_output() {
    #[derive(Debug, Deserialize)]
    struct Insight {
        category: String,
        monthly_total: f64,
        over_budget: bool,
    }

    let mock = Arc::new(MockProvider::new().with_default_response(
        "```json\n{\"category\": \"Dining\", \"monthly_total\": 310.5, \"over_budget\": true}\n```",
    ));
    let client = client(mock, Arc::new(InMemoryStore::new()));

    let insight: Insight = client
        .generate_structured("Where am I overspending?", &GenerationOptions::new())
        .await
        .unwrap();

    assert_eq!(insight.category, "Dining");
    assert_eq!(insight.monthly_total, 310.5);
    assert!(insight.over_budget);
}
