use fintrack_llm::llm::MockProvider;
use fintrack_llm::{
    CircuitBreakerConfig, CircuitStatus, ClientSettings, GenerationOptions, InMemoryStore,
    KeyValueStore, LlmClient, LlmConfig, LlmError, LlmService, RateLimiterConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn config(max_requests: u32, failure_threshold: u32, recovery: Duration) -> LlmConfig {
    LlmConfig {
        provider: "mock".to_string(),
        cache_enabled: false,
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: recovery,
            request_timeout: Duration::from_secs(30),
        },
        rate_limit: RateLimiterConfig {
            max_requests,
            window: Duration::from_secs(60),
        },
        ..Default::default()
    }
}

fn service(config: LlmConfig, mock: Arc<MockProvider>, store: Arc<InMemoryStore>) -> LlmService {
    service_with_cache(config, mock, store, false)
}

fn service_with_cache(
    config: LlmConfig,
    mock: Arc<MockProvider>,
    store: Arc<InMemoryStore>,
    cache_enabled: bool,
) -> LlmService {
    let client = LlmClient::new(
        mock,
        store.clone(),
        ClientSettings {
            cache_enabled,
            ..ClientSettings::default()
        },
    );
    LlmService::new(config, store).with_client(client)
}

#[tokio::test]
async fn test_admission_errors_are_distinguishable() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let service = service(config(1, 1, Duration::from_secs(300)), mock.clone(), store);
    let options = GenerationOptions::new();

    mock.fail_next(LlmError::HttpStatus {
        status: 503,
        body: "overloaded".to_string(),
    });
    let generation_failure = service
        .generate_text(None, "alice", "q", &options)
        .await
        .unwrap_err();
    assert!(generation_failure.is_generation_failure());
    assert!(!generation_failure.is_admission_rejection());

    let rate_limited = service
        .generate_text(None, "alice", "q", &options)
        .await
        .unwrap_err();
    assert!(matches!(rate_limited, LlmError::RateLimitExceeded { .. }));
    assert!(rate_limited.retry_at().is_some());

    let circuit_open = service
        .generate_text(None, "bob", "q", &options)
        .await
        .unwrap_err();
    assert!(matches!(circuit_open, LlmError::CircuitOpen { .. }));
    assert!(circuit_open.is_admission_rejection());

    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_malformed_output_does_not_trip_breaker() {
    let mock = Arc::new(MockProvider::new().with_default_response("Sorry, I can't do JSON today."));
    let store = Arc::new(InMemoryStore::new());
    let service = service(config(100, 2, Duration::from_secs(300)), mock.clone(), store);

    for _ in 0..5 {
        let err = service
            .generate_structured_output(None, "alice", "q", "json", &GenerationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { .. }));
    }

    let status = service.status(None, "alice").await.unwrap();
    assert_eq!(status.circuit.status, CircuitStatus::Closed);
    assert_eq!(status.circuit.failure_count, 0);
    assert_eq!(mock.call_count(), 5);
}

#[tokio::test]
async fn test_circuit_recovers_through_half_open_probe() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let service = service(config(100, 2, Duration::from_millis(50)), mock.clone(), store);
    let options = GenerationOptions::new();

    for _ in 0..2 {
        mock.fail_next(LlmError::Network("connection reset".to_string()));
        let _ = service.generate_text(None, "alice", "q", &options).await;
    }
    assert_eq!(
        service.status(None, "alice").await.unwrap().circuit.status,
        CircuitStatus::Open
    );
    assert!(matches!(
        service.generate_text(None, "alice", "q", &options).await,
        Err(LlmError::CircuitOpen { .. })
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The probe succeeds and closes the circuit.
    service.generate_text(None, "alice", "q", &options).await.unwrap();
    let status = service.status(None, "alice").await.unwrap();
    assert_eq!(status.circuit.status, CircuitStatus::Closed);
    assert_eq!(status.circuit.failure_count, 0);
}

#[tokio::test]
async fn test_failed_probe_reopens_circuit() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let service = service(config(100, 1, Duration::from_millis(50)), mock.clone(), store);
    let options = GenerationOptions::new();

    mock.fail_next(LlmError::Timeout(Duration::from_secs(30)));
    let _ = service.generate_text(None, "alice", "q", &options).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    mock.fail_next(LlmError::Timeout(Duration::from_secs(30)));
    let probe = service.generate_text(None, "alice", "q", &options).await;
    assert!(matches!(probe, Err(LlmError::Timeout(_))));

    let status = service.status(None, "alice").await.unwrap();
    assert_eq!(status.circuit.status, CircuitStatus::Open);
    assert!(status.circuit.retry_at.is_some());
    assert!(matches!(
        service.generate_text(None, "alice", "q", &options).await,
        Err(LlmError::CircuitOpen { .. })
    ));
}

#[tokio::test]
async fn test_services_sharing_a_store_share_state() {
    let store = Arc::new(InMemoryStore::new());
    let first_mock = Arc::new(MockProvider::new());
    let second_mock = Arc::new(MockProvider::new());
    let cfg = config(3, 1, Duration::from_secs(300));

    let first = service(cfg.clone(), first_mock.clone(), store.clone());
    let second = service(cfg, second_mock.clone(), store.clone());
    let options = GenerationOptions::new();

    first.generate_text(None, "alice", "q", &options).await.unwrap();
    second.generate_text(None, "alice", "q", &options).await.unwrap();
    assert_eq!(first.status(None, "alice").await.unwrap().remaining_requests, 1);

    first_mock.fail_next(LlmError::Network("down".to_string()));
    let _ = first.generate_text(None, "bob", "q", &options).await;

    assert!(matches!(
        second.generate_text(None, "carol", "q", &options).await,
        Err(LlmError::CircuitOpen { .. })
    ));
    assert!(store.get("circuit_breaker:mock").await.unwrap().is_some());
    assert!(store.get("rate_limit:mock:alice").await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_requests_respect_quota() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(service(
        config(10, 100, Duration::from_secs(300)),
        mock.clone(),
        store,
    ));

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .generate_text(None, "alice", &format!("q{}", i), &GenerationOptions::new())
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(LlmError::RateLimitExceeded { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(rejected, 20);
    assert_eq!(mock.call_count(), 10);
}

#[tokio::test]
async fn test_half_open_trial_reaches_provider_with_cache_enabled() {
    let mock = Arc::new(MockProvider::new());
    let store = Arc::new(InMemoryStore::new());
    let service = service_with_cache(
        config(100, 1, Duration::from_millis(50)),
        mock.clone(),
        store,
        true,
    );
    let options = GenerationOptions::new();

    service.generate_text(None, "alice", "cached", &options).await.unwrap();
    mock.fail_next(LlmError::Network("down".to_string()));
    assert!(service.generate_text(None, "alice", "other", &options).await.is_err());

    // Cached answers are still served while the circuit is open.
    service.generate_text(None, "alice", "cached", &options).await.unwrap();
    assert_eq!(mock.call_count(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // A cache hit after the cooldown neither claims the half-open slot nor closes the circuit.
    service.generate_text(None, "alice", "cached", &options).await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert_eq!(
        service.status(None, "alice").await.unwrap().circuit.status,
        CircuitStatus::Open
    );

    // The next uncached request is the half-open trial and reaches the provider.
    service.generate_text(None, "alice", "other", &options).await.unwrap();
    assert_eq!(mock.call_count(), 3);
    let status = service.status(None, "alice").await.unwrap();
    assert_eq!(status.circuit.status, CircuitStatus::Closed);
    assert_eq!(status.circuit.failure_count, 0);
}

#[tokio::test]
async fn test_malformed_output_is_retried_with_cache_enabled() {
    let mock = Arc::new(MockProvider::new().with_default_response("not json"));
    let store = Arc::new(InMemoryStore::new());
    let service = service_with_cache(
        config(100, 2, Duration::from_secs(300)),
        mock.clone(),
        store.clone(),
        true,
    );

    for _ in 0..3 {
        let err = service
            .generate_structured_output(None, "alice", "q", "json", &GenerationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { .. }));
    }
    assert_eq!(mock.call_count(), 3);

    let status = service.status(None, "alice").await.unwrap();
    assert_eq!(status.circuit.status, CircuitStatus::Closed);
    assert_eq!(status.circuit.failure_count, 0);
}

#[tokio::test]
async fn test_structured_cache_hits_skip_provider_and_breaker() {
    let mock = Arc::new(MockProvider::new().with_default_response(r#"{"total": 10}"#));
    let store = Arc::new(InMemoryStore::new());
    let service = service_with_cache(
        config(100, 1, Duration::from_secs(300)),
        mock.clone(),
        store,
        true,
    );
    let options = GenerationOptions::new();

    let first = service
        .generate_structured_output(None, "alice", "sum", "json", &options)
        .await
        .unwrap();
    mock.fail_next(LlmError::Network("down".to_string()));
    assert!(service.generate_text(None, "alice", "other", &options).await.is_err());

    let second = service
        .generate_structured_output(None, "alice", "sum", "json", &options)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(mock.call_count(), 2);
    assert_eq!(
        service.status(None, "alice").await.unwrap().circuit.status,
        CircuitStatus::Open
    );
}
