//! Translation provider boundary.
//!
//! One call per (document, source language, target language). The provider
//! creates the translated document itself and reports back its id. Latency
//! and failure modes are opaque, and no retry contract is assumed.

mod agent;

pub use agent::AgentTranslator;

use crate::error::ProviderError;
use crate::i18n::Language;
use async_trait::async_trait;

/// The document a provider created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedDocument {
    pub id: String,
    pub doc_type: String,
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        document_id: &str,
        from: &Language,
        to: &Language,
    ) -> Result<TranslatedDocument, ProviderError>;
}
