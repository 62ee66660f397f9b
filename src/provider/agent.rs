//! Agent "translate" action of the content lake.
//!
//! `POST {host}/vX/agent/action/translate/{dataset}` creates a translated
//! copy of a document and returns it.

use super::{TranslatedDocument, TranslationProvider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::i18n::Language;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Agent actions are only served on the experimental API version
const AGENT_API_VERSION: &str = "vX";

#[derive(Debug, Clone)]
pub struct AgentTranslator {
    client: reqwest::Client,
    url: String,
    token: String,
    schema_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    schema_id: &'a str,
    document_id: &'a str,
    from_language: &'a Language,
    to_language: &'a Language,
    language_field_path: &'a str,
    target_document: TargetDocument,
}

#[derive(Debug, Serialize)]
struct TargetDocument {
    operation: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type")]
    doc_type: String,
}

impl AgentTranslator {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            url: format!(
                "{}/{}/agent/action/translate/{}",
                config.sanity_api_host.trim_end_matches('/'),
                AGENT_API_VERSION,
                config.sanity_dataset
            ),
            token: config.sanity_api_token.clone(),
            schema_id: config.sanity_schema_id.clone(),
        }
    }
}

#[async_trait]
impl TranslationProvider for AgentTranslator {
    async fn translate(
        &self,
        document_id: &str,
        from: &Language,
        to: &Language,
    ) -> Result<TranslatedDocument, ProviderError> {
        let request = TranslateRequest {
            schema_id: &self.schema_id,
            document_id,
            from_language: from,
            to_language: to,
            language_field_path: "language",
            target_document: TargetDocument { operation: "create" },
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let created: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(TranslatedDocument {
            id: created.id,
            doc_type: created.doc_type,
        })
    }
}
