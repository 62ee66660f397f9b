//! HTTP client for a Sanity-compatible content lake.
//!
//! Queries go through `GET /v{version}/data/query/{dataset}`, writes through
//! `POST /v{version}/data/mutate/{dataset}`. Only queries are retried; a
//! retried create could duplicate a document, and callers that delete or
//! patch already own their retry policy.

use super::{Document, DocumentStore, Query};
use crate::config::Config;
use crate::error::StoreError;
use crate::retry::{retry_when, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SanityStore {
    client: reqwest::Client,
    base_url: String,
    dataset: String,
    api_version: String,
    token: String,
    read_retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutationResult>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    #[serde(default)]
    document: Option<Document>,
}

impl SanityStore {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.sanity_api_host.trim_end_matches('/').to_string(),
            dataset: config.sanity_dataset.clone(),
            api_version: config.sanity_api_version.clone(),
            token: config.sanity_api_token.clone(),
            read_retry: RetryPolicy::store_read(),
        }
    }

    pub fn with_read_retry(mut self, retry: RetryPolicy) -> Self {
        self.read_retry = retry;
        self
    }

    fn endpoint(&self, kind: &str) -> String {
        format!(
            "{}/v{}/data/{}/{}",
            self.base_url,
            self.api_version.trim_start_matches('v'),
            kind,
            self.dataset
        )
    }

    async fn query_once(&self, url: &str, pairs: &[(String, String)]) -> Result<Value, StoreError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(pairs)
            .send()
            .await
            .map_err(|e| StoreError::read(format!("Failed to send query: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(StoreError::Read {
                message: format!("query rejected ({}): {}", status, body),
                status: Some(status.as_u16()),
            });
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Read {
                message: format!("Failed to parse query response: {}", e),
                status: decode_status(&e, status),
            })?;
        Ok(parsed.result)
    }

    async fn mutate(&self, mutation: Value) -> Result<Option<Document>, StoreError> {
        let response = self
            .client
            .post(self.endpoint("mutate"))
            .bearer_auth(&self.token)
            .query(&[("returnDocuments", "true"), ("visibility", "sync")])
            .json(&json!({ "mutations": [mutation] }))
            .send()
            .await
            .map_err(|e| StoreError::write(format!("Failed to send mutation: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(StoreError::Write {
                message: format!("mutation rejected ({}): {}", status, body),
                status: Some(status.as_u16()),
            });
        }

        let parsed: MutateResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Write {
                message: format!("Failed to parse mutation response: {}", e),
                status: decode_status(&e, status),
            })?;
        Ok(parsed.results.into_iter().next().and_then(|r| r.document))
    }
}

/// A body the store answered but that does not decode keeps the answer's
/// status, so it is not retried. A body cut off in transit stays `None`.
fn decode_status(error: &reqwest::Error, status: reqwest::StatusCode) -> Option<u16> {
    error.is_decode().then(|| status.as_u16())
}

/// A `[0]` query yields an object or null, anything else an array.
fn documents_from_result(result: Value) -> Result<Vec<Document>, StoreError> {
    let items = match result {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| StoreError::read(format!("Unexpected document shape: {}", e)))
        })
        .collect()
}

#[async_trait]
impl DocumentStore for SanityStore {
    async fn fetch(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let (groq, params) = query.to_groq();
        debug!("Store query: {}", groq);

        let mut pairs = vec![("query".to_string(), groq)];
        pairs.extend(
            params
                .into_iter()
                .map(|(name, value)| (format!("${}", name), value.to_string())),
        );

        let url = self.endpoint("query");
        let result = retry_when(
            &self.read_retry,
            "Store query",
            || self.query_once(&url, &pairs),
            StoreError::is_retryable,
        )
        .await?;

        documents_from_result(result)
    }

    async fn create(
        &self,
        doc_type: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let mut body = fields;
        body.insert("_type".to_string(), Value::from(doc_type));

        self.mutate(json!({ "create": body }))
            .await?
            .ok_or_else(|| StoreError::write("create returned no document"))
    }

    async fn patch_append(
        &self,
        id: &str,
        path: &str,
        value: Value,
    ) -> Result<Document, StoreError> {
        let mutation = json!({
            "patch": {
                "id": id,
                "setIfMissing": { path: [] },
                "insert": {
                    "after": format!("{}[-1]", path),
                    "items": [value],
                },
            }
        });

        self.mutate(mutation)
            .await?
            .ok_or_else(|| StoreError::write(format!("patch of {} returned no document", id)))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(json!({ "delete": { "id": id } })).await?;
        Ok(())
    }
}
