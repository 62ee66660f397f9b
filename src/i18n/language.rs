//! Language value type.

use serde::{Deserialize, Serialize};

/// A supported language, identified by its id (e.g. "en", "fr").
///
/// Serializes as `{"id", "title"}`, which is also the shape the translation
/// provider expects for its `fromLanguage` / `toLanguage` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Language {
    /// Language id as stored in a document's `language` field
    pub id: String,

    /// Human readable name (e.g. "French")
    pub title: String,
}

impl Language {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}
