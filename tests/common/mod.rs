//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use doc_fanout::error::ProviderError;
use doc_fanout::i18n::{Language, LanguageRegistry};
use doc_fanout::index::{TranslationRef, INDEX_DOCUMENT_TYPE};
use doc_fanout::provider::{TranslatedDocument, TranslationProvider};
use doc_fanout::store::Document;
use doc_fanout::translation::SourceDocument;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Provider that records calls and answers from a script instead of the network.
///
/// Each call sleeps for `latency` on the tokio clock, so a paused test clock
/// keeps calls overlapping deterministically.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    latency: Duration,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Make every call targeting `language_id` fail
    pub fn fail_language(&self, language_id: &str) {
        self.failing.lock().unwrap().insert(language_id.to_string());
    }

    /// Target language ids of all calls, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls that were running at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    async fn translate(
        &self,
        _document_id: &str,
        _from: &Language,
        to: &Language,
    ) -> Result<TranslatedDocument, ProviderError> {
        self.calls.lock().unwrap().push(to.id.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&to.id) {
            return Err(ProviderError::Api {
                status: 500,
                message: format!("no translation to {}", to.id),
            });
        }
        Ok(TranslatedDocument {
            id: format!("drafts.t-{}", to.id),
            doc_type: "post".to_string(),
        })
    }
}

pub fn registry(ids: &[&str]) -> LanguageRegistry {
    LanguageRegistry::restricted_to(ids).unwrap()
}

pub fn source(id: &str, language: &str) -> SourceDocument {
    SourceDocument {
        id: id.to_string(),
        doc_type: "post".to_string(),
        language: language.to_string(),
    }
}

/// An existing index document holding `refs`
pub fn index_document(id: &str, refs: &[TranslationRef]) -> Document {
    let translations: Vec<Value> = refs.iter().map(TranslationRef::to_value).collect();
    Document::new(id, INDEX_DOCUMENT_TYPE).with_field("translations", Value::Array(translations))
}

pub fn posts(ids: &[&str]) -> Vec<Document> {
    ids.iter().map(|id| Document::new(*id, "post")).collect()
}
