//! Document store boundary.
//!
//! The rest of the crate talks to the content lake only through
//! [`DocumentStore`]. Reads are eventually consistent: a successful delete or
//! patch may not be visible to the next fetch.
//!
//! - `sanity`: HTTP client for a Sanity-compatible query/mutate API
//! - `memory`: in-process store with fault injection and delete-visibility lag

pub mod memory;
pub mod sanity;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use memory::MemoryStore;
pub use sanity::SanityStore;

/// A stored document: `_id`, `_type` and whatever else it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_type")]
    pub doc_type: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// True if any `_ref` anywhere in the document points at `id`.
    pub fn references(&self, id: &str) -> bool {
        self.fields.values().any(|value| value_references(value, id))
    }
}

fn value_references(value: &Value, id: &str) -> bool {
    match value {
        Value::Object(map) => {
            map.get("_ref").and_then(Value::as_str) == Some(id)
                || map.values().any(|v| value_references(v, id))
        }
        Value::Array(items) => items.iter().any(|v| value_references(v, id)),
        _ => false,
    }
}

/// Strip any draft/version prefix: `drafts.abc` -> `abc`.
///
/// Index references and family lookups always use this form.
pub fn canonical_id(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// A filter over stored documents.
///
/// Structured rather than a raw query string so the in-memory store can
/// evaluate it directly; [`Query::to_groq`] renders it for the HTTP API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    doc_type: Option<String>,
    id: Option<String>,
    exclude_ids: Vec<String>,
    references: Option<String>,
    first_only: bool,
}

impl Query {
    pub fn of_type(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: Some(doc_type.into()),
            ..Self::default()
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Skip documents whose id is in `ids`
    pub fn excluding<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        self.exclude_ids
            .extend(ids.iter().map(|id| id.as_ref().to_string()));
        self
    }

    /// Only documents holding a reference to `id`
    pub fn referencing(mut self, id: impl Into<String>) -> Self {
        self.references = Some(id.into());
        self
    }

    /// Return at most one document
    pub fn first(mut self) -> Self {
        self.first_only = true;
        self
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn is_first_only(&self) -> bool {
        self.first_only
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.doc_type.as_deref().map_or(true, |t| doc.doc_type == t)
            && self.id.as_deref().map_or(true, |id| doc.id == id)
            && !self.exclude_ids.iter().any(|id| *id == doc.id)
            && self.references.as_deref().map_or(true, |id| doc.references(id))
    }

    /// Render as a GROQ filter plus its `$param` values.
    pub fn to_groq(&self) -> (String, BTreeMap<String, Value>) {
        let mut conditions = Vec::new();
        let mut params = BTreeMap::new();

        if let Some(doc_type) = &self.doc_type {
            conditions.push("_type == $type");
            params.insert("type".to_string(), Value::from(doc_type.as_str()));
        }
        if let Some(id) = &self.id {
            conditions.push("_id == $id");
            params.insert("id".to_string(), Value::from(id.as_str()));
        }
        if !self.exclude_ids.is_empty() {
            conditions.push("!(_id in $excludeIds)");
            params.insert("excludeIds".to_string(), Value::from(self.exclude_ids.clone()));
        }
        if let Some(id) = &self.references {
            conditions.push("references($documentId)");
            params.insert("documentId".to_string(), Value::from(id.as_str()));
        }

        let filter = if conditions.is_empty() {
            "*".to_string()
        } else {
            format!("*[{}]", conditions.join(" && "))
        };
        let groq = if self.first_only {
            format!("{}[0]", filter)
        } else {
            filter
        };

        (groq, params)
    }
}

/// Operations the orchestrator needs from the content lake.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `query` (at most one for a `first()` query)
    async fn fetch(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Create a document; the store assigns its id
    async fn create(
        &self,
        doc_type: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Ensure the array at `path` exists, then insert `value` after its last element
    async fn patch_append(
        &self,
        id: &str,
        path: &str,
        value: Value,
    ) -> Result<Document, StoreError>;

    /// Acknowledged delete. The document may stay visible to fetches for a while.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn fetch_first(&self, query: &Query) -> Result<Option<Document>, StoreError> {
        let query = query.clone().first();
        Ok(self.fetch(&query).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata_doc() -> Document {
        Document::new("meta-1", "translation.metadata").with_field(
            "translations",
            json!([
                {"_key": "en", "value": {"_type": "reference", "_ref": "d1"}},
                {"_key": "fr", "value": {"_type": "reference", "_ref": "d2", "_weak": true}}
            ]),
        )
    }

    #[test]
    fn test_canonical_id_strips_prefixes() {
        assert_eq!(canonical_id("drafts.abc"), "abc");
        assert_eq!(canonical_id("versions.r1.abc"), "abc");
        assert_eq!(canonical_id("abc"), "abc");
    }

    #[test]
    fn test_document_references_nested_refs() {
        let doc = metadata_doc();
        assert!(doc.references("d1"));
        assert!(doc.references("d2"));
        assert!(!doc.references("d3"));
    }

    #[test]
    fn test_document_serde_uses_underscore_keys() {
        let doc = Document::new("p1", "post").with_field("language", json!("en"));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"_id": "p1", "_type": "post", "language": "en"}));

        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back.field_str("language"), Some("en"));
    }

    #[test]
    fn test_query_matches_type_and_exclusions() {
        let query = Query::of_type("post").excluding(&["k1"]);
        assert!(query.matches(&Document::new("p1", "post")));
        assert!(!query.matches(&Document::new("k1", "post")));
        assert!(!query.matches(&Document::new("m1", "translation.metadata")));
    }

    #[test]
    fn test_query_matches_references() {
        let query = Query::of_type("translation.metadata").referencing("d1");
        assert!(query.matches(&metadata_doc()));
        assert!(!Query::of_type("translation.metadata")
            .referencing("zz")
            .matches(&metadata_doc()));
    }

    #[test]
    fn test_groq_for_index_lookup() {
        let (groq, params) = Query::of_type("translation.metadata")
            .referencing("d1")
            .first()
            .to_groq();
        assert_eq!(groq, "*[_type == $type && references($documentId)][0]");
        assert_eq!(params["type"], json!("translation.metadata"));
        assert_eq!(params["documentId"], json!("d1"));
    }

    #[test]
    fn test_groq_for_bulk_delete_target_set() {
        let (groq, params) = Query::of_type("post").excluding(&["k1", "k2"]).to_groq();
        assert_eq!(groq, "*[_type == $type && !(_id in $excludeIds)]");
        assert_eq!(params["excludeIds"], json!(["k1", "k2"]));
    }

    #[test]
    fn test_groq_by_id() {
        let (groq, params) = Query::by_id("p1").first().to_groq();
        assert_eq!(groq, "*[_id == $id][0]");
        assert_eq!(params.len(), 1);
    }
}
