use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use mocksmith_core::config::MockSmithConfig;
use mocksmith_core::error::MockSmithError;
use mocksmith_core::llm::{LlmClient, LlmProvider};
use mocksmith_core::output::SqlRepository;
use mocksmith_core::schema::introspect::load_schema_file;
use mocksmith_core::schema::types::SchemaModel;
use mocksmith_core::{CancelHandle, GenerateOptions};

use crate::args::{GenerationArgs, LlmArgs, SourceArgs};

/// Resolve the database URL: --db flag (or DATABASE_URL), .env, mocksmith.toml.
pub fn resolve_db_url(explicit: Option<&str>, config: Option<&MockSmithConfig>) -> Result<String> {
    if let Some(url) = explicit {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var("DATABASE_URL") {
        return Ok(url);
    }

    if dotenvy::dotenv().is_ok() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return Ok(url);
        }
    }

    if let Some(url) = config.and_then(|c| c.database.url.as_ref()) {
        return Ok(url.clone());
    }

    Err(MockSmithError::NoDatabaseUrl.into())
}

pub async fn connect(
    source: &SourceArgs,
    config: Option<&MockSmithConfig>,
) -> Result<SqlRepository> {
    let db_url = resolve_db_url(source.db.as_deref(), config)?;
    let repo = SqlRepository::connect(&db_url).await?;
    Ok(match &source.pg_schema {
        Some(schema) => repo.with_pg_schema(schema.clone()),
        None => repo,
    })
}

/// Load the schema model from --schema-file, or introspect the database.
/// The connection is returned when one was opened.
pub async fn load_schema(
    source: &SourceArgs,
    config: Option<&MockSmithConfig>,
) -> Result<(SchemaModel, Option<SqlRepository>)> {
    if let Some(path) = &source.schema_file {
        let model = load_schema_file(path)?;
        return Ok((model, None));
    }

    let repo = connect(source, config).await?;
    let model = repo
        .introspect()
        .await
        .context("Failed to introspect database schema")?;
    Ok((model, Some(repo)))
}

/// Build the LLM client: CLI flags, then mocksmith.toml, then environment detection.
pub fn build_client(args: &LlmArgs, config: Option<&MockSmithConfig>) -> Result<LlmClient> {
    let llm = config.map(|c| &c.llm);
    let model = args
        .model
        .as_deref()
        .or_else(|| llm.and_then(|l| l.model.as_deref()));
    let provider_name = args
        .provider
        .as_deref()
        .or_else(|| llm.and_then(|l| l.provider.as_deref()));

    let provider = match provider_name {
        Some(name) => LlmProvider::named(name, model)?,
        None => LlmProvider::from_env(model)?,
    };

    let timeout = args
        .timeout_secs
        .or_else(|| llm.and_then(|l| l.timeout_secs))
        .map(Duration::from_secs);

    tracing::debug!("Using LLM model {}", provider.model());
    Ok(match timeout {
        Some(timeout) => LlmClient::with_timeout(provider, timeout),
        None => LlmClient::new(provider),
    })
}

/// Generation options for one table: CLI flags over mocksmith.toml over defaults.
pub fn build_options(
    entity: &str,
    args: &GenerationArgs,
    llm: &LlmArgs,
    config: Option<&MockSmithConfig>,
    cancel: &CancelHandle,
) -> GenerateOptions {
    let mut options = config
        .map(|c| c.options_for(entity))
        .unwrap_or_default();

    if let Some(rows) = args.rows {
        options.total_rows = rows;
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(locale) = &args.locale {
        options.locale = locale.clone();
    }
    if let Some(seed_hint) = &args.seed_hint {
        options.seed_hint = seed_hint.clone();
    }
    if let Some(retries) = args.retries {
        options.max_retries = retries;
    }
    options.ignored_columns.extend(args.ignore.iter().cloned());
    if let Some(secs) = llm.timeout_secs {
        options.request_timeout = Some(Duration::from_secs(secs));
    }
    options.cancel = Some(cancel.clone());
    options
}

/// A cancel handle tripped by Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelHandle {
    let handle = CancelHandle::new();
    let trigger = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after the current request...");
            trigger.cancel();
        }
    });
    handle
}

pub fn read_config() -> Result<Option<MockSmithConfig>> {
    Ok(mocksmith_core::config::read_config(Path::new("."))?)
}

pub fn spinner(prefix: &str, message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.cyan} [{prefix}] {msg}")
    {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
