//! Language registry: the fixed set of languages a job fans out to.
//!
//! The set is configuration, not runtime state. It is built once at startup
//! (either the full built-in table or a subset selected by configuration) and
//! never changes afterwards. Order matters: fan-out results are reported in
//! registry order.

use crate::i18n::Language;
use anyhow::{bail, Result};

/// Built-in languages as (id, title), in fan-out order.
const BUILTIN_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
];

/// An ordered set of supported languages with unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
}

impl LanguageRegistry {
    /// All built-in languages.
    pub fn builtin() -> Self {
        Self {
            languages: BUILTIN_LANGUAGES
                .iter()
                .map(|(id, title)| Language::new(*id, *title))
                .collect(),
        }
    }

    /// Build a registry from an explicit list.
    ///
    /// # Errors
    /// Fails if the list is empty or contains the same id twice.
    pub fn new(languages: Vec<Language>) -> Result<Self> {
        if languages.is_empty() {
            bail!("At least one supported language is required");
        }
        for (i, language) in languages.iter().enumerate() {
            if languages[..i].iter().any(|other| other.id == language.id) {
                bail!("Language '{}' is listed more than once", language.id);
            }
        }
        Ok(Self { languages })
    }

    /// Restrict the built-in table to the given ids, keeping the order given.
    ///
    /// # Errors
    /// Fails on an id that is not built in, on duplicates, or on an empty list.
    pub fn restricted_to<S: AsRef<str>>(ids: &[S]) -> Result<Self> {
        let builtin = Self::builtin();
        let languages = ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                builtin
                    .find(id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Unknown language id: '{}'", id))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(languages)
    }

    pub fn find(&self, id: &str) -> Option<&Language> {
        self.languages.iter().find(|language| language.id == id)
    }

    /// Every supported language except `source_id`, in registry order.
    pub fn targets_for<'a>(
        &'a self,
        source_id: &'a str,
    ) -> impl Iterator<Item = &'a Language> + 'a {
        self.languages
            .iter()
            .filter(move |language| language.id != source_id)
    }

    pub fn all(&self) -> &[Language] {
        &self.languages
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
