//! Translation index: one `translation.metadata` document per family.
//!
//! The entry maps language id to the document holding that language. It is
//! created lazily with a ref for the source language and afterwards only
//! grows by appending. `append_ref` is a blind append: it does not check for
//! an existing ref with the same language, so callers decide that first with
//! [`TranslationIndexEntry::has_translation`].

use crate::error::StoreError;
use crate::i18n::Language;
use crate::store::{canonical_id, Document, DocumentStore, Query};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const INDEX_DOCUMENT_TYPE: &str = "translation.metadata";
const TRANSLATIONS_FIELD: &str = "translations";
const REF_VALUE_TYPE: &str = "internationalizedArrayReferenceValue";

/// language -> document relation. The index does not own the target document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRef {
    pub language_id: String,
    pub target_document_id: String,

    /// For weak refs: the type the reference strengthens to on publish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strengthen_on_publish: Option<String>,
}

impl TranslationRef {
    /// Plain reference, used for the source-language provenance ref
    pub fn strong(language_id: impl Into<String>, target_document_id: &str) -> Self {
        Self {
            language_id: language_id.into(),
            target_document_id: canonical_id(target_document_id).to_string(),
            strengthen_on_publish: None,
        }
    }

    /// Weak reference to a freshly created (possibly unpublished) translation
    pub fn weak(
        language_id: impl Into<String>,
        target_document_id: &str,
        doc_type: impl Into<String>,
    ) -> Self {
        Self {
            language_id: language_id.into(),
            target_document_id: canonical_id(target_document_id).to_string(),
            strengthen_on_publish: Some(doc_type.into()),
        }
    }

    pub fn is_weak(&self) -> bool {
        self.strengthen_on_publish.is_some()
    }

    /// Stored shape: an internationalized array item keyed by language id
    pub fn to_value(&self) -> Value {
        let mut reference = json!({
            "_type": "reference",
            "_ref": self.target_document_id,
        });
        if let Some(doc_type) = &self.strengthen_on_publish {
            reference["_weak"] = json!(true);
            reference["_strengthenOnPublish"] = json!({ "type": doc_type });
        }

        json!({
            "_key": self.language_id,
            "_type": REF_VALUE_TYPE,
            "value": reference,
        })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let language_id = value.get("_key")?.as_str()?;
        let reference = value.get("value")?;
        let target = reference.get("_ref")?.as_str()?;
        let strengthen = reference
            .get("_strengthenOnPublish")
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            language_id: language_id.to_string(),
            target_document_id: target.to_string(),
            strengthen_on_publish: strengthen,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationIndexEntry {
    pub id: String,
    /// In append order
    pub translations: Vec<TranslationRef>,
}

impl TranslationIndexEntry {
    pub fn from_document(doc: &Document) -> Self {
        let translations = match doc.fields.get(TRANSLATIONS_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    let parsed = TranslationRef::from_value(item);
                    if parsed.is_none() {
                        warn!("Ignoring malformed translation ref in {}: {}", doc.id, item);
                    }
                    parsed
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            id: doc.id.clone(),
            translations,
        }
    }

    pub fn has_translation(&self, language_id: &str) -> bool {
        self.translations.iter().any(|r| r.language_id == language_id)
    }

    pub fn get(&self, language_id: &str) -> Option<&TranslationRef> {
        self.translations.iter().find(|r| r.language_id == language_id)
    }

    pub fn language_ids(&self) -> Vec<&str> {
        self.translations.iter().map(|r| r.language_id.as_str()).collect()
    }

    /// Language ids that occur more than once
    pub fn duplicate_languages(&self) -> Vec<&str> {
        let ids = self.language_ids();
        let mut duplicates: Vec<&str> = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) && !duplicates.contains(id) {
                duplicates.push(*id);
            }
        }
        duplicates
    }
}

/// Read-modify-write protocol for index entries.
#[derive(Clone)]
pub struct MetadataIndex {
    store: Arc<dyn DocumentStore>,
}

impl MetadataIndex {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The entry referencing the family's canonical document id, if any.
    pub async fn find_entry(
        &self,
        document_id: &str,
    ) -> Result<Option<TranslationIndexEntry>, StoreError> {
        let query = Query::of_type(INDEX_DOCUMENT_TYPE)
            .referencing(canonical_id(document_id))
            .first();

        let doc = self.store.fetch_first(&query).await?;
        Ok(doc.as_ref().map(TranslationIndexEntry::from_document))
    }

    /// New entry seeded with the source-language provenance ref.
    pub async fn create_entry(
        &self,
        source_document_id: &str,
        source_language: &Language,
    ) -> Result<TranslationIndexEntry, StoreError> {
        let provenance = TranslationRef::strong(source_language.id.clone(), source_document_id);

        let mut fields = Map::new();
        fields.insert(
            TRANSLATIONS_FIELD.to_string(),
            Value::Array(vec![provenance.to_value()]),
        );

        let doc = self.store.create(INDEX_DOCUMENT_TYPE, fields).await?;
        info!(
            "Created translation index {} for {} ({})",
            doc.id, provenance.target_document_id, source_language.id
        );
        Ok(TranslationIndexEntry::from_document(&doc))
    }

    /// Insert `translation` after the last ref of entry `entry_id`.
    pub async fn append_ref(
        &self,
        entry_id: &str,
        translation: &TranslationRef,
    ) -> Result<(), StoreError> {
        self.store
            .patch_append(entry_id, TRANSLATIONS_FIELD, translation.to_value())
            .await?;
        info!(
            "Added {} -> {} to translation index {}",
            translation.language_id, translation.target_document_id, entry_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn english() -> Language {
        Language::new("en", "English")
    }

    #[test]
    fn test_weak_ref_wire_shape() {
        let r = TranslationRef::weak("fr", "drafts.t-fr", "post");
        assert_eq!(
            r.to_value(),
            json!({
                "_key": "fr",
                "_type": "internationalizedArrayReferenceValue",
                "value": {
                    "_type": "reference",
                    "_ref": "t-fr",
                    "_weak": true,
                    "_strengthenOnPublish": {"type": "post"}
                }
            })
        );
        assert_eq!(TranslationRef::from_value(&r.to_value()), Some(r));
    }

    #[test]
    fn test_strong_ref_has_no_weak_flag() {
        let value = TranslationRef::strong("en", "d1").to_value();
        assert!(value["value"].get("_weak").is_none());
        assert_eq!(value["value"]["_ref"], json!("d1"));
    }

    #[test]
    fn test_entry_ignores_malformed_refs() {
        let doc = Document::new("m1", INDEX_DOCUMENT_TYPE).with_field(
            "translations",
            json!([
                TranslationRef::strong("en", "d1").to_value(),
                {"_key": "fr"},
                "garbage"
            ]),
        );
        let entry = TranslationIndexEntry::from_document(&doc);
        assert_eq!(entry.language_ids(), vec!["en"]);
    }

    #[test]
    fn test_has_translation() {
        let entry = TranslationIndexEntry {
            id: "m1".to_string(),
            translations: vec![TranslationRef::strong("en", "d1")],
        };
        assert!(entry.has_translation("en"));
        assert!(!entry.has_translation("fr"));
    }

    #[test]
    fn test_duplicate_languages() {
        let entry = TranslationIndexEntry {
            id: "m1".to_string(),
            translations: vec![
                TranslationRef::strong("en", "d1"),
                TranslationRef::weak("fr", "d2", "post"),
                TranslationRef::weak("fr", "d3", "post"),
            ],
        };
        assert_eq!(entry.duplicate_languages(), vec!["fr"]);
    }

    #[tokio::test]
    async fn test_create_then_find_by_canonical_id() {
        let store = Arc::new(MemoryStore::new());
        let index = MetadataIndex::new(store.clone());

        assert!(index.find_entry("d1").await.unwrap().is_none());

        let created = index.create_entry("drafts.d1", &english()).await.unwrap();
        assert_eq!(created.language_ids(), vec!["en"]);
        assert_eq!(created.get("en").unwrap().target_document_id, "d1");

        let found = index.find_entry("drafts.d1").await.unwrap().expect("entry exists");
        assert_eq!(found, created);
        assert_eq!(store.calls().creates, 1);
    }

    #[tokio::test]
    async fn test_append_ref_keeps_insertion_order() {
        let store = Arc::new(MemoryStore::new());
        let index = MetadataIndex::new(store.clone());
        let entry = index.create_entry("d1", &english()).await.unwrap();

        index
            .append_ref(&entry.id, &TranslationRef::weak("es", "t-es", "post"))
            .await
            .unwrap();
        index
            .append_ref(&entry.id, &TranslationRef::weak("fr", "t-fr", "post"))
            .await
            .unwrap();

        let found = index.find_entry("d1").await.unwrap().unwrap();
        assert_eq!(found.language_ids(), vec!["en", "es", "fr"]);
        assert!(found.get("fr").unwrap().is_weak());
    }

    #[tokio::test]
    async fn test_append_ref_is_blind() {
        let store = Arc::new(MemoryStore::new());
        let index = MetadataIndex::new(store.clone());
        let entry = index.create_entry("d1", &english()).await.unwrap();

        let fr = TranslationRef::weak("fr", "t-fr", "post");
        index.append_ref(&entry.id, &fr).await.unwrap();
        index.append_ref(&entry.id, &fr).await.unwrap();

        let found = index.find_entry("d1").await.unwrap().unwrap();
        assert_eq!(found.duplicate_languages(), vec!["fr"]);
    }

    #[tokio::test]
    async fn test_store_failures_surface() {
        let store = Arc::new(MemoryStore::new());
        let index = MetadataIndex::new(store.clone());

        store.fail_creates(true);
        let err = index.create_entry("d1", &english()).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));

        store.fail_reads(true);
        let err = index.find_entry("d1").await.unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }
}
