//! In-process document store.
//!
//! Behaves like the content lake from the orchestrator's point of view,
//! including its rough edges: writes can be made to fail, and deletes can be
//! acknowledged while the document stays visible (either for a fixed lag or
//! for a number of delete calls). Time is measured with `tokio::time`, so a
//! paused test clock drives the lag.

use super::{Document, DocumentStore, Query};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Number of calls of each kind the store has served (including failed ones).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub fetches: usize,
    pub creates: usize,
    pub patches: usize,
    pub deletes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    documents: Vec<Document>,
    /// Deleted documents still visible to fetches until the given instant
    tombstones: Vec<(Document, Instant)>,
    next_id: u64,
    calls: StoreCalls,
    delete_lag: Duration,
    fail_reads: bool,
    failing_read_types: HashSet<String>,
    fail_creates: bool,
    fail_patches: usize,
    fail_deletes: HashMap<String, usize>,
    ignored_deletes: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `documents`, in order
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        for doc in documents {
            store.insert(doc);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store mutex poisoned")
    }

    /// Insert or replace a document by id
    pub fn insert(&self, doc: Document) {
        let mut state = self.state();
        match state.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => state.documents.push(doc),
        }
    }

    /// Current document by id (ignores lagging tombstones)
    pub fn get(&self, id: &str) -> Option<Document> {
        self.state().documents.iter().find(|d| d.id == id).cloned()
    }

    /// Live documents of a type, in insertion order
    pub fn documents_of_type(&self, doc_type: &str) -> Vec<Document> {
        self.state()
            .documents
            .iter()
            .filter(|d| d.doc_type == doc_type)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> StoreCalls {
        self.state().calls
    }

    /// Keep deleted documents visible to fetches for `lag` after the delete
    pub fn set_delete_lag(&self, lag: Duration) {
        self.state().delete_lag = lag;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Fail every fetch whose query is restricted to `doc_type`
    pub fn fail_reads_of_type(&self, doc_type: &str) {
        self.state().failing_read_types.insert(doc_type.to_string());
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Fail the next `count` patch calls
    pub fn fail_next_patches(&self, count: usize) {
        self.state().fail_patches = count;
    }

    /// Fail the next `count` delete calls for `id` with an error
    pub fn fail_deletes_of(&self, id: &str, count: usize) {
        self.state().fail_deletes.insert(id.to_string(), count);
    }

    /// Acknowledge the next `count` deletes of `id` without removing it
    pub fn ignore_deletes_of(&self, id: &str, count: usize) {
        self.state().ignored_deletes.insert(id.to_string(), count);
    }
}

impl State {
    fn visible(&mut self) -> impl Iterator<Item = &Document> {
        let now = Instant::now();
        self.tombstones.retain(|(_, until)| *until > now);
        self.documents
            .iter()
            .chain(self.tombstones.iter().map(|(doc, _)| doc))
    }
}

fn take_one(counter: &mut HashMap<String, usize>, id: &str) -> bool {
    match counter.get_mut(id) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut state = self.state();
        state.calls.fetches += 1;
        let type_fails = query
            .doc_type()
            .map_or(false, |t| state.failing_read_types.contains(t));
        if state.fail_reads || type_fails {
            return Err(StoreError::read("injected read failure"));
        }

        let limit = if query.is_first_only() { 1 } else { usize::MAX };
        Ok(state
            .visible()
            .filter(|doc| query.matches(doc))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        doc_type: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let mut state = self.state();
        state.calls.creates += 1;
        if state.fail_creates {
            return Err(StoreError::write("injected create failure"));
        }

        state.next_id += 1;
        let doc = Document {
            id: format!("{}-{}", doc_type.replace('.', "-"), state.next_id),
            doc_type: doc_type.to_string(),
            fields,
        };
        state.documents.push(doc.clone());
        Ok(doc)
    }

    async fn patch_append(
        &self,
        id: &str,
        path: &str,
        value: Value,
    ) -> Result<Document, StoreError> {
        let mut state = self.state();
        state.calls.patches += 1;
        if state.fail_patches > 0 {
            state.fail_patches -= 1;
            return Err(StoreError::write("injected patch failure"));
        }

        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::Write {
                message: format!("document {} not found", id),
                status: Some(404),
            })?;

        let target = doc
            .fields
            .entry(path.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match target {
            Value::Array(items) => items.push(value),
            _ => {
                return Err(StoreError::Write {
                    message: format!("{}.{} is not an array", id, path),
                    status: Some(400),
                })
            }
        }
        Ok(doc.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.deletes += 1;
        if take_one(&mut state.fail_deletes, id) {
            return Err(StoreError::write(format!("injected delete failure for {}", id)));
        }
        if take_one(&mut state.ignored_deletes, id) {
            return Ok(());
        }

        if let Some(pos) = state.documents.iter().position(|d| d.id == id) {
            let doc = state.documents.remove(pos);
            if !state.delete_lag.is_zero() {
                let until = Instant::now() + state.delete_lag;
                state.tombstones.push((doc, until));
            }
        }
        Ok(())
    }
}
