//! Translation fan-out for one source document.
//!
//! A job moves through: resolve the source language, resolve (or create) the
//! family's index entry, fan out over every other supported language,
//! re-read the index, summarize. Languages already present in the index are
//! skipped without touching the limiter. Every other language takes a
//! limiter permit for the provider call and the index append.
//!
//! The skip check and the append are not atomic. Within one job the target
//! languages are disjoint, so this is safe. Two jobs for the same family
//! racing each other can both append the same language; inside one process,
//! [`FamilyLocks`] serializes them.

use crate::error::JobError;
use crate::i18n::{Language, LanguageRegistry};
use crate::index::{MetadataIndex, TranslationIndexEntry, TranslationRef};
use crate::limiter::ConcurrencyLimiter;
use crate::provider::TranslationProvider;
use crate::store::{canonical_id, Document, DocumentStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The document being translated. Only these fields are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(rename = "_type", alias = "type", default)]
    pub doc_type: String,

    #[serde(default)]
    pub language: String,
}

impl From<&Document> for SourceDocument {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            doc_type: doc.doc_type.clone(),
            language: doc.field_str("language").unwrap_or_default().to_string(),
        }
    }
}

/// Outcome for one target language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    pub language: Language,
    pub success: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationResult {
    fn succeeded(language: &Language) -> Self {
        Self {
            language: language.clone(),
            success: true,
            skipped: false,
            error: None,
        }
    }

    fn skipped(language: &Language) -> Self {
        Self {
            language: language.clone(),
            success: true,
            skipped: true,
            error: None,
        }
    }

    fn failed(language: &Language, error: impl std::fmt::Display) -> Self {
        Self {
            language: language.clone(),
            success: false,
            skipped: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub document_id: String,
    pub source_language: String,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    /// In supported-language order, not completion order
    pub per_language_results: Vec<TranslationResult>,
    /// Index entry as re-read after the fan-out; `None` if that read failed
    pub final_entry: Option<TranslationIndexEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobSummary {
    /// True when no language failed
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

pub struct TranslationCoordinator {
    index: MetadataIndex,
    provider: Arc<dyn TranslationProvider>,
    languages: LanguageRegistry,
    limiter: ConcurrencyLimiter,
}

impl TranslationCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn TranslationProvider>,
        languages: LanguageRegistry,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            index: MetadataIndex::new(store),
            provider,
            languages,
            limiter,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub async fn run(&self, document: &SourceDocument) -> Result<JobSummary, JobError> {
        self.run_until_cancelled(document, &CancellationToken::new()).await
    }

    /// Run a job, abandoning it when `cancel` fires.
    ///
    /// Held permits are released as the in-flight attempts are dropped. Refs
    /// already appended stay in the index.
    pub async fn run_until_cancelled(
        &self,
        document: &SourceDocument,
        cancel: &CancellationToken,
    ) -> Result<JobSummary, JobError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Translation job for {} cancelled", document.id);
                Err(JobError::Cancelled)
            }
            result = self.run_job(document) => result,
        }
    }

    async fn run_job(&self, document: &SourceDocument) -> Result<JobSummary, JobError> {
        let started_at = Utc::now();

        let source_language = self
            .languages
            .find(&document.language)
            .ok_or_else(|| {
                error!(
                    "Source language '{}' of {} is not supported",
                    document.language, document.id
                );
                JobError::UnsupportedSourceLanguage(document.language.clone())
            })?;

        let family_id = canonical_id(&document.id);
        let entry = match self.index.find_entry(family_id).await? {
            Some(entry) => entry,
            None => {
                info!("No translation index for {}, creating one", family_id);
                self.index.create_entry(family_id, source_language).await?
            }
        };

        let attempts = self
            .languages
            .targets_for(&source_language.id)
            .map(|language| self.attempt(document, source_language, language, &entry));
        let results = join_all(attempts).await;

        let final_entry = match self.index.find_entry(family_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Could not re-read translation index for {}: {}", family_id, e);
                None
            }
        };

        let successful = results.iter().filter(|r| r.success && !r.skipped).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            "Translation complete for {}: {} successful, {} skipped, {} failed",
            document.id, successful, skipped, failed
        );

        Ok(JobSummary {
            document_id: document.id.clone(),
            source_language: source_language.id.clone(),
            successful,
            skipped,
            failed,
            per_language_results: results,
            final_entry,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn attempt(
        &self,
        document: &SourceDocument,
        from: &Language,
        to: &Language,
        entry: &TranslationIndexEntry,
    ) -> TranslationResult {
        if entry.has_translation(&to.id) {
            info!("Translation of {} to {} already exists, skipping", document.id, to.id);
            return TranslationResult::skipped(to);
        }

        let _permit = self.limiter.acquire().await;
        self.translate_to(document, from, to, &entry.id).await
    }

    async fn translate_to(
        &self,
        document: &SourceDocument,
        from: &Language,
        to: &Language,
        entry_id: &str,
    ) -> TranslationResult {
        info!("Translating {} to {}", document.id, to);

        let created = match self.provider.translate(&document.id, from, to).await {
            Ok(created) => created,
            Err(e) => {
                error!("Error translating {} to {}: {}", document.id, to.id, e);
                return TranslationResult::failed(to, e);
            }
        };

        let translation = TranslationRef::weak(to.id.clone(), &created.id, created.doc_type);
        if let Err(e) = self.index.append_ref(entry_id, &translation).await {
            error!(
                "Translated {} to {} as {} but could not record it: {}",
                document.id, to.id, created.id, e
            );
            return TranslationResult::failed(to, e);
        }

        info!("✓ Translated {} to {} as {}", document.id, to.id, created.id);
        TranslationResult::succeeded(to)
    }
}

/// One async mutex per family (canonical document id).
///
/// Serializes jobs for the same family inside this process. Separate
/// processes can still race on the same index entry.
#[derive(Debug, Default, Clone)]
pub struct FamilyLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl FamilyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let family = canonical_id(document_id).to_string();
        let lock = {
            let mut locks = self.locks.lock().expect("family lock map poisoned");
            // Drop locks nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(family).or_default())
        };
        lock.lock_owned().await
    }
}
