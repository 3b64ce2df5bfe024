//! End-to-end pipeline scenarios against wiremock provider endpoints.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use concierge::cache::{address_cache_key, ResponseCache, SqliteResponseCache};
use concierge::config::{
    AppConfig, CacheConfig, GeocoderConfig, PlacesConfig, ProviderConfig, ProviderKind,
};
use concierge::geocode::{Geocoder, HttpGeocoder};
use concierge::pipeline::Pipeline;
use concierge::providers::build_registry;
use concierge::types::{
    Category, Recommendation, RecommendationRequest, RecommendationResponse, ResponseMetadata,
};
use concierge::PipelineError;

// =============================================================================
// Harness
// =============================================================================

fn provider(tag: &str, kind: ProviderKind, endpoint: &str, api_key: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        tag: tag.to_string(),
        kind,
        enabled: api_key.is_some(),
        api_key: api_key.map(String::from),
        model: "test-model".to_string(),
        endpoint: endpoint.to_string(),
        max_tokens: 1024,
        timeout: Duration::from_secs(5),
    }
}

fn app_config(providers: Vec<ProviderConfig>) -> AppConfig {
    AppConfig {
        cache: CacheConfig {
            path: ":memory:".to_string(),
            default_ttl_hours: 24,
            grid_precision_decimal_places: 3,
            purge_on_startup: false,
        },
        providers,
        places: PlacesConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            default_radius_meters: 1000,
            max_results: 20,
            timeout: Duration::from_secs(2),
        },
        geocoder: GeocoderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
        },
    }
}

fn pipeline_with(
    config: AppConfig,
    geocoder: Option<Arc<dyn Geocoder>>,
    cache: Arc<SqliteResponseCache>,
) -> Pipeline {
    let providers = build_registry(&config);
    Pipeline::new(config, providers, geocoder, None, cache)
}

fn chat_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 10 }
    })
}

fn coordinate_request(lat: f64, lng: f64, category: Category) -> RecommendationRequest {
    RecommendationRequest {
        latitude: Some(lat),
        longitude: Some(lng),
        category: Some(category),
        ..Default::default()
    }
}

// =============================================================================
// Scenario: coordinate cache hit short-circuits stages 3-7
// =============================================================================

#[tokio::test]
async fn coordinate_cache_hit_skips_providers() {
    let server = MockServer::start().await;
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());

    let seeded = RecommendationResponse {
        lat: 43.477,
        lng: -79.76,
        resolved_address: Some("Oakville".to_string()),
        category: Category::Restaurant,
        categories: vec![Category::Restaurant],
        recommendations: vec![Recommendation::new(
            "Seeded Spot",
            "from cache",
            Category::Restaurant,
            0.9,
            "Consensus",
        )],
        metadata: ResponseMetadata::default(),
        from_cache: false,
        generated_at: Utc::now(),
    };
    cache
        .put(
            "rec:v1:43.477:-79.760:Restaurant",
            &seeded,
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let config = app_config(vec![provider(
        "openai",
        ProviderKind::Chat,
        &server.uri(),
        Some("sk-test"),
    )]);
    let pipeline = pipeline_with(config, None, cache);

    let response = pipeline
        .run(
            coordinate_request(43.4769, -79.7596, Category::Restaurant),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(response.from_cache);
    assert_eq!(response.recommendations.len(), 1);
    assert_eq!(response.recommendations[0].name, "Seeded Spot");
    // Stages 3-7 never ran: the provider endpoint saw no traffic.
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Scenario: geocoding miss falls back to the address-hash key
// =============================================================================

#[tokio::test]
async fn address_fallback_uses_hash_key_and_skips_enrichment() {
    let geocoder_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&geocoder_server)
        .await;

    let provider_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
            r#"{"recommendations": [
                {"name": "Fallback Cafe", "description": "d", "confidenceScore": 0.8}
            ]}"#,
        )))
        .mount(&provider_server)
        .await;

    let mut config = app_config(vec![provider(
        "openai",
        ProviderKind::Chat,
        &provider_server.uri(),
        Some("sk-test"),
    )]);
    config.geocoder.base_url = geocoder_server.uri();
    let geocoder: Arc<dyn Geocoder> = Arc::new(HttpGeocoder::new(&config.geocoder).unwrap());
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, Some(geocoder), cache.clone());

    let request = RecommendationRequest {
        address: Some("Nowhereville".to_string()),
        ..Default::default()
    };
    let response = pipeline.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(response.lat, 0.0);
    assert_eq!(response.lng, 0.0);
    assert!(response.resolved_address.is_none());
    assert!(!response.metadata.google_places_enriched);

    // Persisted under the address-hash key, not a coordinate key.
    let key = address_cache_key("Nowhereville", &[Category::All]);
    assert!(cache.get(&key).await.unwrap().is_some());
}

// =============================================================================
// Scenario: consensus fusion across providers
// =============================================================================

/// Routes chat responses by bearer token so one mock server can stand in for
/// several providers.
struct PerKeyResponder;

impl Respond for PerKeyResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let auth = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or_default();
        let prompt = body["messages"][0]["content"].as_str().unwrap_or("");

        // Validation and synthesis calls get shapes the generation parser
        // ignores and vice versa; only generation payloads matter here.
        if prompt.contains("\"validations\"") {
            return ResponseTemplate::new(200)
                .set_body_json(chat_body(r#"{"validations": []}"#));
        }

        let content = if auth.ends_with("key-a") {
            r#"{"recommendations": [
                {"name": "Joe's Diner", "description": "from a", "confidenceScore": 0.8}
            ]}"#
        } else {
            r#"{"recommendations": [
                {"name": "joes diner", "description": "from b", "confidenceScore": 0.8},
                {"name": "Unique Place", "description": "one of a kind", "confidenceScore": 0.9}
            ]}"#
        };
        ResponseTemplate::new(200).set_body_json(chat_body(content))
    }
}

#[tokio::test]
async fn consensus_fuses_name_variants_across_providers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(PerKeyResponder)
        .mount(&server)
        .await;

    let config = app_config(vec![
        provider("openai", ProviderKind::Chat, &server.uri(), Some("key-a")),
        provider("groq", ProviderKind::Chat, &server.uri(), Some("key-b")),
    ]);
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, None, cache);

    let response = pipeline
        .run(
            coordinate_request(43.4769, -79.7596, Category::Restaurant),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let joes: Vec<_> = response
        .recommendations
        .iter()
        .filter(|r| r.name.to_lowercase().contains("joe"))
        .collect();
    assert_eq!(joes.len(), 1, "variants must fuse into one entry");
    assert_eq!(joes[0].agreement_count, 2);
    assert!(joes[0].confidence_score >= 0.65);

    // 0.9*0.75 = 0.675 beats 0.8*0.75 + 0.05 = 0.65.
    assert_eq!(response.recommendations[0].name, "Unique Place");
    assert_eq!(response.metadata.total_candidates_evaluated, 3);
    assert_eq!(response.metadata.providers_used.len(), 2);
    assert!(response.metadata.providers_failed.is_empty());
}

// =============================================================================
// Scenario: streaming provider answers only in reasoning deltas
// =============================================================================

#[tokio::test]
async fn streaming_reasoning_fallback_parses_recommendations() {
    let server = MockServer::start().await;
    let payload = r#"{\"recommendations\":[{\"name\":\"Hidden Gem\",\"description\":\"quiet\",\"confidenceScore\":0.9}]}"#;
    let sse = format!(
        "data: {{\"choices\":[{{\"delta\":{{\"reasoning\":\"{payload}\"}}}}]}}\n\ndata: [DONE]\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse))
        .mount(&server)
        .await;

    let config = app_config(vec![provider(
        "openrouter",
        ProviderKind::Streaming,
        &server.uri(),
        Some("sk-or"),
    )]);
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, None, cache);

    let response = pipeline
        .run(
            coordinate_request(43.4769, -79.7596, Category::Cafe),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.recommendations.len(), 1);
    assert_eq!(response.recommendations[0].name, "Hidden Gem");
    assert_eq!(response.metadata.providers_used, vec!["openrouter".to_string()]);
}

// =============================================================================
// Scenario: every provider fails
// =============================================================================

#[tokio::test]
async fn all_providers_failing_yields_no_providers_and_no_cache_write() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let config = app_config(vec![
        provider("openai", ProviderKind::Chat, &server.uri(), Some("k1")),
        provider("groq", ProviderKind::Chat, &server.uri(), Some("k2")),
    ]);
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, None, cache.clone());

    let err = pipeline
        .run(
            coordinate_request(43.4769, -79.7596, Category::Restaurant),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NoProviders));
    assert_eq!(err.status_code(), 503);
    assert!(err.to_string().contains("no providers"));
    assert_eq!(cache.stats().await.unwrap().entry_count, 0);
}

// =============================================================================
// Scenario: pre-cancelled request
// =============================================================================

#[tokio::test]
async fn cancelled_request_aborts_with_504() {
    let config = app_config(vec![provider(
        "openai",
        ProviderKind::Chat,
        "http://127.0.0.1:9",
        Some("sk-test"),
    )]);
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, None, cache);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline
        .run(coordinate_request(43.0, -79.0, Category::All), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(err.status_code(), 504);
}

// =============================================================================
// Scenario: invalid request never reaches the stages
// =============================================================================

#[tokio::test]
async fn invalid_request_fails_fast() {
    let server = MockServer::start().await;
    let config = app_config(vec![provider(
        "openai",
        ProviderKind::Chat,
        &server.uri(),
        Some("sk-test"),
    )]);
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let pipeline = pipeline_with(config, None, cache);

    let err = pipeline
        .run(RecommendationRequest::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Wire shape
// =============================================================================

#[tokio::test]
async fn response_serializes_camel_case() {
    let response = RecommendationResponse {
        lat: 1.0,
        lng: 2.0,
        resolved_address: Some("x".to_string()),
        category: Category::Cafe,
        categories: vec![Category::Cafe],
        recommendations: vec![Recommendation::new("N", "d", Category::Cafe, 0.8, "p")],
        metadata: ResponseMetadata::default(),
        from_cache: true,
        generated_at: Utc::now(),
    };
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("fromCache").is_some());
    assert!(json.get("generatedAt").is_some());
    assert!(json.get("resolvedAddress").is_some());
    let rec = &json["recommendations"][0];
    assert!(rec.get("confidenceScore").is_some());
    assert!(rec.get("confidenceLevel").is_some());
    assert!(rec.get("sourceProvider").is_some());
    assert!(rec.get("agreementCount").is_some());
    let meta = &json["metadata"];
    assert!(meta.get("providersUsed").is_some());
    assert!(meta.get("googlePlacesEnriched").is_some());
}
