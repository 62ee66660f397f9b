//! End-to-end tests over HTTP: the content lake and its translate action are
//! both played by a wiremock server.

mod common;

use common::{registry, source};
use doc_fanout::config::Config;
use doc_fanout::index::TranslationRef;
use doc_fanout::limiter::ConcurrencyLimiter;
use doc_fanout::provider::AgentTranslator;
use doc_fanout::reset::BulkDeleter;
use doc_fanout::retry::RetryPolicy;
use doc_fanout::store::SanityStore;
use doc_fanout::translation::TranslationCoordinator;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

// ==================== Test Helpers ====================

fn create_test_config(host: &str) -> Config {
    Config {
        sanity_project_id: "proj".to_string(),
        sanity_dataset: "production".to_string(),
        sanity_api_token: "test-token".to_string(),
        sanity_api_version: "2024-03-19".to_string(),
        sanity_api_host: host.to_string(),
        sanity_schema_id: "_.schemas.default".to_string(),
        languages: registry(&["en", "fr", "es"]),
        translation_concurrency: 2,
        delete_concurrency: 2,
        delete_settle_delay: Duration::from_millis(10),
        reset_document_type: "post".to_string(),
        reset_keep_ids: vec!["k1".to_string()],
        webhook_secret: None,
        port: 8080,
    }
}

fn store_for(config: &Config) -> Arc<SanityStore> {
    Arc::new(SanityStore::new(reqwest::Client::new(), config).with_read_retry(RetryPolicy::none()))
}

fn index_entry_json() -> serde_json::Value {
    json!({
        "_id": "meta-1",
        "_type": "translation.metadata",
        "translations": [
            TranslationRef::strong("en", "d1").to_value(),
            TranslationRef::weak("fr", "t-fr", "post").to_value()
        ]
    })
}

// ==================== Translation job ====================

#[tokio::test]
async fn test_job_translates_missing_language_and_patches_index() {
    let server = MockServer::start().await;
    let config = create_test_config(&server.uri());

    Mock::given(method("GET"))
        .and(path("/v2024-03-19/data/query/production"))
        .and(query_param("$documentId", "\"d1\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "result": index_entry_json() })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/vX/agent/action/translate/production"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "drafts.t-es",
            "_type": "post"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let expected_patch = json!({
        "mutations": [{
            "patch": {
                "id": "meta-1",
                "setIfMissing": { "translations": [] },
                "insert": {
                    "after": "translations[-1]",
                    "items": [TranslationRef::weak("es", "t-es", "post").to_value()]
                }
            }
        }]
    });
    Mock::given(method("POST"))
        .and(path("/v2024-03-19/data/mutate/production"))
        .and(body_json(&expected_patch))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "meta-1", "document": index_entry_json() }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = TranslationCoordinator::new(
        store_for(&config),
        Arc::new(AgentTranslator::new(reqwest::Client::new(), &config)),
        config.languages.clone(),
        ConcurrencyLimiter::new(config.translation_concurrency),
    );
    let summary = coordinator.run(&source("d1", "en")).await.unwrap();

    assert_eq!((summary.successful, summary.skipped, summary.failed), (1, 1, 0));
    assert!(summary.final_entry.is_some());
}

#[tokio::test]
async fn test_provider_rejection_is_reported_not_raised() {
    let server = MockServer::start().await;
    let config = create_test_config(&server.uri());

    Mock::given(method("GET"))
        .and(path("/v2024-03-19/data/query/production"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "result": index_entry_json() })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/vX/agent/action/translate/production"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2024-03-19/data/mutate/production"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = TranslationCoordinator::new(
        store_for(&config),
        Arc::new(AgentTranslator::new(reqwest::Client::new(), &config)),
        config.languages.clone(),
        ConcurrencyLimiter::new(1),
    );
    let summary = coordinator.run(&source("d1", "en")).await.unwrap();

    assert_eq!(summary.failed, 1);
    let es = &summary.per_language_results[1];
    assert!(es.error.as_deref().unwrap().contains("429"));
}

// ==================== Bulk deletion ====================

#[tokio::test]
async fn test_bulk_delete_over_http() {
    let server = MockServer::start().await;
    let config = create_test_config(&server.uri());

    // Target set on the first query, nothing left afterwards
    Mock::given(method("GET"))
        .and(path("/v2024-03-19/data/query/production"))
        .and(query_param("$excludeIds", "[\"k1\"]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{ "_id": "p1", "_type": "post" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2024-03-19/data/query/production"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2024-03-19/data/mutate/production"))
        .and(body_json(json!({ "mutations": [{ "delete": { "id": "p1" } }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let deleter = BulkDeleter::new(
        store_for(&config),
        ConcurrencyLimiter::new(config.delete_concurrency),
        config.delete_settle_delay,
    );
    let summary = deleter
        .run(&config.reset_document_type, &config.reset_keep_ids)
        .await
        .unwrap();

    assert_eq!((summary.targeted, summary.deleted), (1, 1));
    assert!(summary.is_complete());
}
