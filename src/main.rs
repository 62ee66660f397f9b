use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doc_fanout::{
    config::Config,
    limiter::ConcurrencyLimiter,
    provider::AgentTranslator,
    reset::BulkDeleter,
    server::{self, AppState},
    store::{DocumentStore, Query, SanityStore},
    translation::{FamilyLocks, SourceDocument, TranslationCoordinator},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "doc-fanout", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate one document into every other supported language
    Translate {
        /// Id of the source document
        document_id: String,
    },
    /// Delete content documents and all translation indexes
    Reset {
        /// Content type to delete (defaults to RESET_DOCUMENT_TYPE)
        #[arg(long = "type")]
        doc_type: Option<String>,
        /// Ids to keep; repeatable (defaults to RESET_KEEP_IDS)
        #[arg(long = "keep")]
        keep: Vec<String>,
    },
    /// Run the translation webhook server
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("doc_fanout=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let store: Arc<dyn DocumentStore> = Arc::new(SanityStore::new(client.clone(), &config));

    match cli.command {
        Command::Translate { document_id } => translate(&config, client, store, &document_id).await,
        Command::Reset { doc_type, keep } => reset(&config, store, doc_type, keep).await,
        Command::Serve => serve(&config, client, store).await,
    }
}

fn coordinator(
    config: &Config,
    client: reqwest::Client,
    store: Arc<dyn DocumentStore>,
) -> TranslationCoordinator {
    TranslationCoordinator::new(
        store,
        Arc::new(AgentTranslator::new(client, config)),
        config.languages.clone(),
        ConcurrencyLimiter::new(config.translation_concurrency),
    )
}

/// Cancel `token` on Ctrl+C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            token.cancel();
        }
    });
}

async fn translate(
    config: &Config,
    client: reqwest::Client,
    store: Arc<dyn DocumentStore>,
    document_id: &str,
) -> Result<()> {
    info!("Starting translation of {}", document_id);

    let document = store
        .fetch_first(&Query::by_id(document_id))
        .await
        .with_context(|| format!("Failed to fetch document {}", document_id))?;
    let Some(document) = document else {
        bail!("Document {} not found", document_id);
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let coordinator = coordinator(config, client, store);
    let summary = coordinator
        .run_until_cancelled(&SourceDocument::from(&document), &cancel)
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.is_complete() {
        bail!("{} translation(s) failed for {}", summary.failed, document_id);
    }
    Ok(())
}

async fn reset(
    config: &Config,
    store: Arc<dyn DocumentStore>,
    doc_type: Option<String>,
    keep: Vec<String>,
) -> Result<()> {
    let doc_type = doc_type.unwrap_or_else(|| config.reset_document_type.clone());
    let keep_ids = if keep.is_empty() {
        config.reset_keep_ids.clone()
    } else {
        keep
    };
    info!("Resetting {} documents (keeping {:?}) and translation indexes", doc_type, keep_ids);

    let deleter = BulkDeleter::new(
        store,
        ConcurrencyLimiter::new(config.delete_concurrency),
        config.delete_settle_delay,
    );
    let report = deleter.reset(&doc_type, &keep_ids).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.content.is_complete() || !report.metadata.is_complete() {
        error!("Reset left documents behind");
        bail!("Reset incomplete");
    }
    Ok(())
}

async fn serve(
    config: &Config,
    client: reqwest::Client,
    store: Arc<dyn DocumentStore>,
) -> Result<()> {
    let Some(webhook_secret) = config.webhook_secret.clone() else {
        bail!("WEBHOOK_SECRET must be set to run the webhook server");
    };

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = Arc::new(AppState {
        coordinator: Arc::new(coordinator(config, client, store)),
        locks: FamilyLocks::new(),
        webhook_secret,
        shutdown,
    });
    server::serve(config.port, state).await
}
