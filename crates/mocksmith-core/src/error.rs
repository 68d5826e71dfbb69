//! # Error Types
//!
//! Defines `MockSmithError`, the unified error enum for every failure mode in
//! the generation pipeline. Variants carry the entity, column, and batch
//! context needed to act on a failure without digging through logs.
//!
//! Only `MalformedResponse` is retryable. The pipeline consumes retry budget
//! for it and surfaces every other variant to the caller unchanged.

use thiserror::Error;

/// All errors that can occur in mocksmith operations.
#[derive(Error, Debug)]
pub enum MockSmithError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Malformed LLM response: {message}")]
    MalformedResponse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Foreign key {column} in table {entity} could not be bound: table {principal} has no generated rows\n  Generate {principal} earlier in the same session.")]
    UnsatisfiedForeignKey {
        entity: String,
        column: String,
        principal: String,
    },

    #[error("Provider failure: {message}")]
    ProviderFailure { message: String },

    #[error("Retry budget exhausted while generating {entity} (sub-batch {batch_index}): {max_retries} malformed responses\n  Consider a smaller --batch-size or a larger --retries")]
    RetryBudgetExhausted {
        entity: String,
        batch_index: usize,
        max_retries: usize,
    },

    #[error("Unknown entity '{name}'. Known entities: {known}")]
    UnknownEntity { name: String, known: String },

    #[error("Entity {entity} was already generated in this session")]
    EntityAlreadyGenerated { entity: String },

    #[error("Generation of {entity} was cancelled")]
    Cancelled { entity: String },

    #[error("LLM API error: {message}")]
    LlmError { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No database URL provided. mocksmith looks for a connection in this order:\n  1. --db flag\n  2. DATABASE_URL environment variable\n  3. .env file with DATABASE_URL\n  4. mocksmith.toml [database] section")]
    NoDatabaseUrl,

    #[error("Unsupported database scheme '{scheme}'. Supported: postgres://, sqlite://")]
    UnsupportedDatabase { scheme: String },

    #[error("Database connection failed: {message}\n  Connection string: {connection_hint}\n  Cause: {source}")]
    Connection {
        message: String,
        connection_hint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema introspection failed on query '{query}': {source}")]
    Introspection {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Insert failed on {table} row {row_index}: {message}\n  SQL: {sql_preview}\n  DB error: {source}")]
    InsertFailed {
        table: String,
        row_index: usize,
        message: String,
        sql_preview: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl MockSmithError {
    /// True for failures the pipeline answers with another provider request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MockSmithError::MalformedResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, MockSmithError>;
