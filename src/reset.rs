//! Bulk deletion with delete, verify, retry.
//!
//! The store acknowledges a delete before the deletion is visible to
//! queries, so "deleted" here is something observed by re-querying after a
//! settle delay, not something the delete call reports. Each target gets at
//! most three delete calls: the first attempt, one immediate retry on error,
//! and one final attempt if it is still visible after the settle delay.

use crate::error::StoreError;
use crate::index::INDEX_DOCUMENT_TYPE;
use crate::limiter::ConcurrencyLimiter;
use crate::store::{DocumentStore, Query};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSummary {
    pub document_type: String,
    /// Size of the target set
    pub targeted: usize,
    /// Targets observed absent at the end of the run
    pub deleted: usize,
    /// Targets whose delete and retry both failed and that are still visible
    pub failed_permanently: usize,
    /// Other targets still visible after the final attempt
    pub still_present: usize,
    pub failed_ids: Vec<String>,
    pub still_present_ids: Vec<String>,
}

impl DeletionSummary {
    fn empty(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            targeted: 0,
            deleted: 0,
            failed_permanently: 0,
            still_present: 0,
            failed_ids: Vec::new(),
            still_present_ids: Vec::new(),
        }
    }

    /// True when every target was observed deleted
    pub fn is_complete(&self) -> bool {
        self.deleted == self.targeted
    }
}

/// Summaries of a full reset: content documents and translation indexes
#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub content: DeletionSummary,
    pub metadata: DeletionSummary,
}

pub struct BulkDeleter {
    store: Arc<dyn DocumentStore>,
    limiter: ConcurrencyLimiter,
    settle_delay: Duration,
}

impl BulkDeleter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        limiter: ConcurrencyLimiter,
        settle_delay: Duration,
    ) -> Self {
        Self {
            store,
            limiter,
            settle_delay,
        }
    }

    /// Delete every `doc_type` document except `keep_ids`.
    ///
    /// Only the initial target-set query can fail the run. Per-document
    /// failures end up in the summary.
    pub async fn run<S: AsRef<str>>(
        &self,
        doc_type: &str,
        keep_ids: &[S],
    ) -> Result<DeletionSummary, StoreError> {
        info!("Starting deletion of {} documents", doc_type);

        let query = Query::of_type(doc_type).excluding(keep_ids);
        let targets: Vec<String> = self
            .store
            .fetch(&query)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();

        if targets.is_empty() {
            info!("No {} documents found to delete", doc_type);
            return Ok(DeletionSummary::empty(doc_type));
        }
        info!("Found {} {} documents to delete: {:?}", targets.len(), doc_type, targets);

        let outcomes =
            join_all(targets.iter().map(|id| self.delete_with_retry(doc_type, id))).await;
        let failed: HashSet<&str> = targets
            .iter()
            .zip(&outcomes)
            .filter(|(_, deleted)| !**deleted)
            .map(|(id, _)| id.as_str())
            .collect();

        sleep(self.settle_delay).await;
        let visible = match self.visible_targets(&query, &targets).await {
            Ok(visible) => visible,
            Err(e) => {
                warn!("Could not verify deletion of {} documents: {}", doc_type, e);
                targets.clone()
            }
        };

        let remaining = if visible.is_empty() {
            visible
        } else {
            warn!(
                "{} {} documents still present after deletion: {:?}",
                visible.len(),
                doc_type,
                visible
            );
            join_all(visible.iter().map(|id| self.final_delete(doc_type, id))).await;

            sleep(self.settle_delay).await;
            match self.visible_targets(&query, &targets).await {
                Ok(still) => still,
                Err(e) => {
                    warn!("Could not verify final deletion of {} documents: {}", doc_type, e);
                    visible
                }
            }
        };

        let summary = summarize(doc_type, &targets, &failed, &remaining);
        if summary.is_complete() {
            info!("✓ Deleted all {} {} documents", summary.deleted, doc_type);
        } else {
            error!(
                "Deletion of {} documents incomplete: {} deleted, {} failed, {} still present",
                doc_type, summary.deleted, summary.failed_permanently, summary.still_present
            );
        }
        Ok(summary)
    }

    /// Delete content documents (except `keep_ids`) and all translation
    /// indexes, concurrently.
    ///
    /// Both deletions always run to completion. If either target query
    /// failed, the error is returned once the other side has finished.
    pub async fn reset<S: AsRef<str>>(
        &self,
        content_type: &str,
        keep_ids: &[S],
    ) -> Result<ResetReport, StoreError> {
        let (content, metadata) = futures::join!(
            self.run(content_type, keep_ids),
            self.run::<&str>(INDEX_DOCUMENT_TYPE, &[]),
        );

        match (content, metadata) {
            (Ok(content), Ok(metadata)) => {
                info!("Completed all deletion operations");
                Ok(ResetReport { content, metadata })
            }
            (Err(e), other) => {
                if let Ok(metadata) = other {
                    warn!(
                        "Deleted {}/{} {} documents, but {} deletion failed: {}",
                        metadata.deleted, metadata.targeted, INDEX_DOCUMENT_TYPE, content_type, e
                    );
                }
                Err(e)
            }
            (Ok(content), Err(e)) => {
                warn!(
                    "Deleted {}/{} {} documents, but {} deletion failed: {}",
                    content.deleted, content.targeted, content_type, INDEX_DOCUMENT_TYPE, e
                );
                Err(e)
            }
        }
    }

    /// First attempt plus one retry. Returns whether either call was acknowledged.
    async fn delete_with_retry(&self, doc_type: &str, id: &str) -> bool {
        let _permit = self.limiter.acquire().await;
        debug!("Deleting {} document {}", doc_type, id);

        match self.store.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error deleting {} document {}: {}, retrying once", doc_type, id, e);
                match self.store.delete(id).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed retry deletion for {} document {}: {}", doc_type, id, e);
                        false
                    }
                }
            }
        }
    }

    async fn final_delete(&self, doc_type: &str, id: &str) {
        let _permit = self.limiter.acquire().await;
        if let Err(e) = self.store.delete(id).await {
            error!("Final attempt failed for {} document {}: {}", doc_type, id, e);
        }
    }

    /// Target ids the store still returns for `query`
    async fn visible_targets(
        &self,
        query: &Query,
        targets: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let visible: HashSet<String> = self
            .store
            .fetch(query)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        Ok(targets
            .iter()
            .filter(|id| visible.contains(*id))
            .cloned()
            .collect())
    }
}

fn summarize(
    doc_type: &str,
    targets: &[String],
    failed: &HashSet<&str>,
    remaining: &[String],
) -> DeletionSummary {
    let (failed_ids, still_present_ids): (Vec<String>, Vec<String>) = remaining
        .iter()
        .cloned()
        .partition(|id| failed.contains(id.as_str()));

    DeletionSummary {
        document_type: doc_type.to_string(),
        targeted: targets.len(),
        deleted: targets.len() - remaining.len(),
        failed_permanently: failed_ids.len(),
        still_present: still_present_ids.len(),
        failed_ids,
        still_present_ids,
    }
}
