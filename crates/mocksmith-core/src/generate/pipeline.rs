//! # Generation Pipeline
//!
//! Drives one entity at a time through the provider: plan sub-batches,
//! request each one until it parses, then either hand the rows back
//! (`generate`) or bind their foreign keys, persist them, and record the
//! entity in the session (`generate_and_insert`).
//!
//! Sub-batches run strictly in sequence with one request in flight. A single
//! retry budget covers the whole operation and is only spent on malformed
//! responses; blank responses are requested again for free, up to
//! `max_empty_responses` in a row.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MockSmithError, Result};
use crate::generate::batch::plan_batches;
use crate::generate::foreign_key::{is_ignored, resolve_rows, touch_date_times};
use crate::generate::parse::{parse_rows, ParseOutcome};
use crate::generate::row::MockRow;
use crate::generate::session::Session;
use crate::generate::value::RowSnapshot;
use crate::llm::client::{GenerationMessage, MessageRequest, ProviderOptions, RowGeneratorClient};
use crate::output::repository::RowRepository;
use crate::schema::analyse::SchemaAnalyser;
use crate::schema::descriptor::EntityDescriptor;

/// Consecutive blank responses tolerated for one sub-batch.
pub const DEFAULT_MAX_EMPTY_RESPONSES: usize = 10;

/// Options for one `generate` or `generate_and_insert` call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub locale: String,
    pub total_rows: usize,
    /// Largest number of rows requested from the provider at once.
    pub batch_size: usize,
    /// Free-text steer passed through to the prompt.
    pub seed_hint: String,
    /// Malformed responses tolerated across the whole call.
    pub max_retries: usize,
    /// Columns left out of the prompt and out of inserted rows.
    pub ignored_columns: Vec<String>,
    /// Limit for a single provider request.
    pub request_timeout: Option<Duration>,
    pub max_empty_responses: usize,
    pub cancel: Option<CancelHandle>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            total_rows: 2,
            batch_size: 5,
            seed_hint: String::new(),
            max_retries: 3,
            ignored_columns: Vec::new(),
            request_timeout: None,
            max_empty_responses: DEFAULT_MAX_EMPTY_RESPONSES,
            cancel: None,
        }
    }
}

impl GenerateOptions {
    fn is_ignored(&self, column: &str) -> bool {
        is_ignored(&self.ignored_columns, column)
    }
}

/// Cooperative cancellation for a running pipeline call. Clones share state.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What one pipeline call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub entity: String,
    pub rows: usize,
    /// Sizes of the planned sub-batches, in order.
    pub batches: Vec<usize>,
    pub requests: usize,
    /// Retry budget spent on malformed responses.
    pub retries_used: usize,
    pub empty_responses: usize,
}

struct RetryBudget {
    max: usize,
    remaining: usize,
}

impl RetryBudget {
    fn new(max: usize) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    fn used(&self) -> usize {
        self.max - self.remaining
    }
}

pub struct Pipeline<C, A> {
    client: C,
    analyser: A,
    session: Session,
}

impl<C: RowGeneratorClient, A: SchemaAnalyser> Pipeline<C, A> {
    pub fn new(client: C, analyser: A) -> Self {
        Self::with_session(client, analyser, Session::new())
    }

    pub fn with_session(client: C, analyser: A, session: Session) -> Self {
        Self {
            client,
            analyser,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn analyser(&self) -> &A {
        &self.analyser
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Generate rows without persisting them. Date-time columns are stamped;
    /// keys are left as the model wrote them.
    pub async fn generate<K: MockRow>(
        &mut self,
        entity: &str,
        options: &GenerateOptions,
    ) -> Result<Vec<K>> {
        self.generate_with_report(entity, options)
            .await
            .map(|(rows, _)| rows)
    }

    pub async fn generate_with_report<K: MockRow>(
        &mut self,
        entity: &str,
        options: &GenerateOptions,
    ) -> Result<(Vec<K>, GenerationReport)> {
        let descriptor = self.analyser.analyse_entity(entity)?;
        let batches = plan_batches(options.total_rows, options.batch_size)?;
        let mut report = GenerationReport {
            entity: descriptor.display_name.clone(),
            batches: batches.clone(),
            ..GenerationReport::default()
        };
        let mut budget = RetryBudget::new(options.max_retries);
        let mut generated = Vec::with_capacity(options.total_rows);

        for (index, &size) in batches.iter().enumerate() {
            let (message, provider_options) = self
                .client
                .generate_message(&descriptor, &message_request(options, size));
            let mut rows: Vec<K> = self
                .request_batch(
                    &descriptor,
                    index,
                    &message,
                    &provider_options,
                    options,
                    &mut budget,
                    &mut report,
                )
                .await?;

            touch_date_times(&descriptor, &mut rows, now(), &options.ignored_columns)?;
            info!(
                "{}: sub-batch {}/{} produced {} rows",
                descriptor.display_name,
                index + 1,
                batches.len(),
                rows.len()
            );
            generated.append(&mut rows);
        }

        report.rows = generated.len();
        report.retries_used = budget.used();
        Ok((generated, report))
    }

    /// Generate rows, bind their foreign keys to entities generated earlier
    /// in this session, persist them through `repository`, and record the
    /// entity so later entities can reference it.
    pub async fn generate_and_insert<K: MockRow, R: RowRepository>(
        &mut self,
        entity: &str,
        options: &GenerateOptions,
        repository: &R,
    ) -> Result<GenerationReport> {
        let descriptor = self.analyser.analyse_entity(entity)?;
        if self.session.contains(&descriptor.display_name) {
            return Err(MockSmithError::EntityAlreadyGenerated {
                entity: descriptor.display_name,
            });
        }

        let batches = plan_batches(options.total_rows, options.batch_size)?;
        let mut report = GenerationReport {
            entity: descriptor.display_name.clone(),
            batches: batches.clone(),
            ..GenerationReport::default()
        };
        let mut budget = RetryBudget::new(options.max_retries);
        let mut persisted: Vec<RowSnapshot> = Vec::with_capacity(options.total_rows);

        for (index, &size) in batches.iter().enumerate() {
            let (message, provider_options) = self
                .client
                .generate_message(&descriptor, &message_request(options, size));
            let mut rows: Vec<K> = self
                .request_batch(
                    &descriptor,
                    index,
                    &message,
                    &provider_options,
                    options,
                    &mut budget,
                    &mut report,
                )
                .await?;

            resolve_rows(
                &descriptor,
                &mut rows,
                &mut self.session,
                now(),
                &options.ignored_columns,
            )?;

            let prepared: Vec<RowSnapshot> = rows
                .iter()
                .map(|row| {
                    let mut snapshot = row.snapshot(&descriptor);
                    snapshot.retain(|column, _| !options.is_ignored(column));
                    snapshot
                })
                .collect();
            let mut inserted = repository.insert(&descriptor, prepared).await?;
            info!(
                "{}: sub-batch {}/{} inserted {} rows",
                descriptor.display_name,
                index + 1,
                batches.len(),
                inserted.len()
            );
            persisted.append(&mut inserted);
        }

        report.rows = persisted.len();
        report.retries_used = budget.used();
        self.session.record(descriptor, persisted)?;
        Ok(report)
    }

    /// Request one sub-batch until it parses.
    #[allow(clippy::too_many_arguments)]
    async fn request_batch<K: MockRow>(
        &self,
        entity: &EntityDescriptor,
        batch_index: usize,
        message: &GenerationMessage,
        provider_options: &ProviderOptions,
        options: &GenerateOptions,
        budget: &mut RetryBudget,
        report: &mut GenerationReport,
    ) -> Result<Vec<K>> {
        let mut attempt = 1usize;
        let mut empty_streak = 0usize;

        loop {
            if budget.remaining == 0 {
                return Err(MockSmithError::RetryBudgetExhausted {
                    entity: entity.display_name.clone(),
                    batch_index,
                    max_retries: budget.max,
                });
            }

            debug!(
                "{}: requesting {} rows (sub-batch {}, attempt {})",
                entity.display_name, message.row_count, batch_index, attempt
            );
            let raw = self
                .request(&entity.display_name, message, provider_options, options)
                .await?;
            report.requests += 1;

            match parse_rows::<K>(&raw) {
                Ok(ParseOutcome::Rows(mut rows)) => {
                    if rows.len() != message.row_count {
                        debug!(
                            "{}: asked for {} rows, model returned {}",
                            entity.display_name,
                            message.row_count,
                            rows.len()
                        );
                        rows.truncate(message.row_count);
                    }
                    return Ok(rows);
                }
                Ok(ParseOutcome::Empty) => {
                    empty_streak += 1;
                    report.empty_responses += 1;
                    if empty_streak >= options.max_empty_responses {
                        return Err(MockSmithError::ProviderFailure {
                            message: format!(
                                "{} consecutive empty responses for {} (sub-batch {})",
                                empty_streak, entity.display_name, batch_index
                            ),
                        });
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "last operation failed with error {}. retry count {} for {} sub-batch {}",
                        e, attempt, entity.display_name, batch_index
                    );
                    attempt += 1;
                    empty_streak = 0;
                    budget.remaining -= 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One provider call, bounded by the request timeout and the cancel
    /// handle.
    async fn request(
        &self,
        entity: &str,
        message: &GenerationMessage,
        provider_options: &ProviderOptions,
        options: &GenerateOptions,
    ) -> Result<String> {
        let call = timed(
            self.client.generate_mock_data(message, provider_options),
            options.request_timeout,
        );

        match &options.cancel {
            Some(cancel) => {
                if cancel.is_cancelled() {
                    return Err(MockSmithError::Cancelled {
                        entity: entity.to_string(),
                    });
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(MockSmithError::Cancelled {
                        entity: entity.to_string(),
                    }),
                    result = call => result,
                }
            }
            None => call.await,
        }
    }
}

async fn timed<F>(call: F, limit: Option<Duration>) -> Result<String>
where
    F: std::future::Future<Output = Result<String>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| MockSmithError::ProviderFailure {
                message: format!("LLM request timed out after {:?}", limit),
            })?,
        None => call.await,
    }
}

fn message_request(options: &GenerateOptions, row_count: usize) -> MessageRequest {
    MessageRequest {
        locale: options.locale.clone(),
        row_count,
        seed_hint: options.seed_hint.clone(),
        ignored_columns: options.ignored_columns.clone(),
    }
}

fn now() -> DateTime<FixedOffset> {
    chrono::Local::now().fixed_offset()
}
