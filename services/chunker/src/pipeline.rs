//! End-to-end processing of one bucket notification.
//!
//! ```text
//! Idle → Reading → Cleaning → Partitioning → Writing(0..n) → Finalizing → Done
//!   └────────┴─────────┴────────────┴──────────────┴──────────────→ Failed
//! ```
//!
//! An event for one of the service's own chunks goes from `Idle` straight to
//! `Done` without touching storage.
//!
//! Entering `Failed` publishes exactly one error report. Chunks written before
//! the failure are left in place and the source object is kept.

use crate::archive::ArchiveExtractor;
use crate::cleaner::Cleaner;
use crate::config::{Config, InputConfig};
use crate::error::PipelineError;
use crate::event::SourceReference;
use crate::notification::{ErrorReport, NotificationSink};
use crate::object_store::ObjectStore;
use crate::partition::{output_key, partition};
use crate::table::Table;
use crate::table_store::{parse_table, SourceFormat, TableStore};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

/// Position of an invocation in the processing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Reading,
    Cleaning,
    Partitioning,
    /// Writing the chunk with this index
    Writing(usize),
    Finalizing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Reading)
            | (Idle, Done)
            | (Reading, Cleaning)
            | (Cleaning, Partitioning)
            | (Partitioning, Writing(0))
            | (Partitioning, Finalizing)
            | (Writing(_), Finalizing)
            | (Finalizing, Done) => true,
            (Writing(i), Writing(j)) => j == i + 1,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Writing(index) => write!(f, "Writing({})", index),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Where chunks go and how sources are decoded
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Output bucket; the source bucket when `None`
    pub output_bucket: Option<String>,
    pub output_prefix: String,
    pub max_rows_per_chunk: usize,
    pub input: InputConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_bucket: config.output.bucket.clone(),
            output_prefix: config.output.prefix.clone(),
            max_rows_per_chunk: config.output.max_rows_per_chunk,
            input: config.input.clone(),
        }
    }
}

impl PipelineSettings {
    /// Bucket chunks of `source` are written to
    pub fn output_bucket<'a>(&'a self, source: &'a SourceReference) -> &'a str {
        self.output_bucket.as_deref().unwrap_or(&source.bucket)
    }

    /// Whether `source` sits under this pipeline's own output location
    pub fn is_own_output(&self, source: &SourceReference) -> bool {
        let prefix = self.output_prefix.trim_end_matches('/');

        !prefix.is_empty()
            && self.output_bucket(source) == source.bucket
            && source.key.starts_with(&format!("{}/", prefix))
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of one invocation
#[derive(Debug)]
pub struct InvocationOutcome {
    pub invocation_id: Uuid,
    pub source: Option<SourceReference>,
    /// `Done` or `Failed`
    pub state: PipelineState,
    /// State the invocation was in when it failed
    pub failed_in: Option<PipelineState>,
    /// Output keys written, in chunk order
    pub written_keys: Vec<String>,
    pub source_deleted: bool,
    pub error: Option<anyhow::Error>,
}

impl InvocationOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// The pipeline error that failed the invocation
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        self.error.as_ref().and_then(|e| e.downcast_ref::<PipelineError>())
    }
}

/// Mutable bookkeeping for one invocation
struct Invocation {
    id: Uuid,
    state: PipelineState,
    source: Option<SourceReference>,
    written_keys: Vec<String>,
    source_deleted: bool,
}

impl Invocation {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Idle,
            source: None,
            written_keys: Vec::new(),
            source_deleted: false,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }
}

/// Orchestrates read → clean → partition → write → delete
pub struct Pipeline {
    tables: TableStore,
    archive: ArchiveExtractor,
    cleaner: Arc<dyn Cleaner>,
    sink: NotificationSink,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cleaner: Arc<dyn Cleaner>,
        sink: NotificationSink,
        settings: PipelineSettings,
    ) -> Self {
        let tables = TableStore::new(store);

        Self {
            archive: ArchiveExtractor::new(tables.clone()),
            tables,
            cleaner,
            sink,
            settings,
        }
    }

    /// Process one notification payload to a terminal state.
    ///
    /// Failures are reported and returned in the outcome, never raised.
    #[instrument(
        skip(self, payload),
        fields(invocation_id = tracing::field::Empty, source = tracing::field::Empty)
    )]
    pub async fn handle_event(&self, payload: &[u8]) -> InvocationOutcome {
        let started = Instant::now();
        let mut invocation = Invocation::new();
        Span::current().record("invocation_id", tracing::field::display(invocation.id));

        let result = self.run(&mut invocation, payload).await;

        metrics::histogram!("chunker.invocation.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!("chunker.invocations.succeeded").increment(1);
                info!(
                    chunks = invocation.written_keys.len(),
                    source_deleted = invocation.source_deleted,
                    "Invocation completed"
                );
                InvocationOutcome {
                    invocation_id: invocation.id,
                    source: invocation.source,
                    state: invocation.state,
                    failed_in: None,
                    written_keys: invocation.written_keys,
                    source_deleted: invocation.source_deleted,
                    error: None,
                }
            }
            Err(err) => self.fail(invocation, err).await,
        }
    }

    async fn run(&self, invocation: &mut Invocation, payload: &[u8]) -> Result<(), PipelineError> {
        debug!(payload = %String::from_utf8_lossy(payload), "Received event");

        let source = SourceReference::from_payload(payload)?;
        Span::current().record("source", tracing::field::display(&source));
        invocation.source = Some(source.clone());

        // Chunks written next to their source trigger notifications of their own
        if self.settings.is_own_output(&source) {
            info!("Source is a chunk written by this service, skipping");
            metrics::counter!("chunker.invocations.skipped").increment(1);
            invocation.transition(PipelineState::Done);
            return Ok(());
        }

        invocation.transition(PipelineState::Reading);
        let table = self.read_source(&source).await?;
        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Source table read"
        );

        invocation.transition(PipelineState::Cleaning);
        let cleaned = self.cleaner.clean(table)?;
        debug!(cleaner = self.cleaner.name(), rows = cleaned.row_count(), "Table cleaned");

        invocation.transition(PipelineState::Partitioning);
        let chunks = partition(cleaned, self.settings.max_rows_per_chunk)?;

        let output_bucket = self.settings.output_bucket(&source);

        // Sequential so a failure is attributable to one chunk index
        for chunk in chunks {
            invocation.transition(PipelineState::Writing(chunk.index));
            let key = output_key(&self.settings.output_prefix, &source.key, chunk.index);

            self.tables
                .write_table(output_bucket, &key, &chunk.table)
                .await?;

            metrics::counter!("chunker.chunks.written").increment(1);
            metrics::counter!("chunker.rows.written").increment(chunk.table.row_count() as u64);
            invocation.written_keys.push(key);
        }

        invocation.transition(PipelineState::Finalizing);
        match self.tables.delete(&source.bucket, &source.key).await {
            Ok(()) => {
                invocation.source_deleted = true;
                info!("Source object deleted");
            }
            Err(e) if !e.is_fatal() => {
                // Output is complete; a lingering source is not a failure
                warn!(error = ?anyhow::Error::from(e), "Failed to delete source object");
                metrics::counter!("chunker.source.delete_failed").increment(1);
            }
            Err(e) => return Err(e),
        }

        invocation.transition(PipelineState::Done);
        Ok(())
    }

    async fn read_source(&self, source: &SourceReference) -> Result<Table, PipelineError> {
        match SourceFormat::infer(&source.key, &self.settings.input) {
            SourceFormat::Archive => {
                let entry = self.archive_entry_name(source);
                let bytes = self
                    .archive
                    .extract_entry(&source.bucket, &source.key, &entry)
                    .await?
                    .ok_or_else(|| PipelineError::ArchiveEntryNotFound {
                        bucket: source.bucket.clone(),
                        key: source.key.clone(),
                        entry: entry.clone(),
                    })?;

                let format = SourceFormat::infer(&entry, &self.settings.input);
                parse_table(&bytes, &format).map_err(|e| PipelineError::Parse {
                    bucket: source.bucket.clone(),
                    key: format!("{}!{}", source.key, entry),
                    source: e,
                })
            }
            format => {
                self.tables
                    .read_table(&source.bucket, &source.key, &format)
                    .await
            }
        }
    }

    fn archive_entry_name(&self, source: &SourceReference) -> String {
        self.settings
            .input
            .archive_entry
            .clone()
            .unwrap_or_else(|| format!("{}.csv", source.stem()))
    }

    async fn fail(&self, mut invocation: Invocation, err: PipelineError) -> InvocationOutcome {
        let failed_in = invocation.state;
        invocation.transition(PipelineState::Failed);

        let error_kind = err.kind();
        let error = anyhow::Error::from(err);

        error!(
            error = ?error,
            error_kind,
            failed_in = %failed_in,
            chunks_written = invocation.written_keys.len(),
            "Invocation failed"
        );
        metrics::counter!("chunker.invocations.failed", "error" => error_kind).increment(1);

        let report = ErrorReport::new(
            invocation.id,
            invocation.source.clone(),
            failed_in,
            error_kind,
            &error,
        );
        self.sink.publish(report).await;

        InvocationOutcome {
            invocation_id: invocation.id,
            source: invocation.source,
            state: invocation.state,
            failed_in: Some(failed_in),
            written_keys: invocation.written_keys,
            source_deleted: false,
            error: Some(error),
        }
    }
}
