use crate::i18n::LanguageRegistry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Content lake
    pub sanity_project_id: String,
    pub sanity_dataset: String,
    pub sanity_api_token: String,
    pub sanity_api_version: String,
    pub sanity_api_host: String,
    pub sanity_schema_id: String,

    // Translation
    pub languages: LanguageRegistry,
    pub translation_concurrency: usize,

    // Reset / bulk deletion
    pub delete_concurrency: usize,
    pub delete_settle_delay: Duration,
    pub reset_document_type: String,
    pub reset_keep_ids: Vec<String>,

    // Webhook server
    pub webhook_secret: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sanity_project_id =
            std::env::var("SANITY_PROJECT_ID").context("SANITY_PROJECT_ID not set")?;

        let languages = match list_var("SUPPORTED_LANGUAGES") {
            Some(ids) => LanguageRegistry::restricted_to(&ids)
                .context("SUPPORTED_LANGUAGES is invalid")?,
            None => LanguageRegistry::builtin(),
        };

        let translation_concurrency = number_var("TRANSLATION_CONCURRENCY", 5);
        let delete_concurrency = number_var("DELETE_CONCURRENCY", 5);
        if translation_concurrency == 0 || delete_concurrency == 0 {
            bail!("TRANSLATION_CONCURRENCY and DELETE_CONCURRENCY must be at least 1");
        }

        Ok(Self {
            sanity_api_host: std::env::var("SANITY_API_HOST")
                .unwrap_or_else(|_| format!("https://{}.api.sanity.io", sanity_project_id)),
            sanity_project_id,
            sanity_dataset: std::env::var("SANITY_DATASET").context("SANITY_DATASET not set")?,
            sanity_api_token: std::env::var("SANITY_API_TOKEN")
                .context("SANITY_API_TOKEN not set")?,
            sanity_api_version: std::env::var("SANITY_API_VERSION")
                .unwrap_or_else(|_| "2024-03-19".to_string()),
            sanity_schema_id: std::env::var("SANITY_SCHEMA_ID")
                .unwrap_or_else(|_| "_.schemas.default".to_string()),

            languages,
            translation_concurrency,

            delete_concurrency,
            delete_settle_delay: Duration::from_millis(number_var("DELETE_SETTLE_DELAY_MS", 2000)),
            reset_document_type: std::env::var("RESET_DOCUMENT_TYPE")
                .unwrap_or_else(|_| "post".to_string()),
            reset_keep_ids: list_var("RESET_KEEP_IDS").unwrap_or_default(),

            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            port: number_var("PORT", 8080),
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset or malformed
fn number_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma separated list; `None` when unset or blank
fn list_var(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
