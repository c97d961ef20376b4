//! Chunker Service
//!
//! Event-triggered splitting of uploaded tabular files. When an object lands
//! in a watched bucket, the service reads it as a table, applies a cleaning
//! policy, splits the rows into bounded chunks, writes each chunk back as CSV
//! and deletes the source.
//!
//! ## Features
//!
//! - **Multiple source formats**: CSV/TSV, spreadsheets (xlsx, xls, ods) and
//!   zip archives holding a single CSV entry
//! - **Pluggable cleaning**: built-in policies or any [`Cleaner`]
//!   implementation
//! - **Bounded chunks**: every chunk carries the header and at most
//!   `max_rows_per_chunk` data rows
//! - **Failure reports**: exactly one SNS message per failed invocation
//!
//! ## Architecture
//!
//! ```text
//! Kafka Topic                 Pipeline                      S3 Bucket
//! ┌──────────────┐           ┌──────────────┐              ┌──────────────┐
//! │ Bucket       │──────────▶│ Read         │◀─────────────│ {key}        │
//! │ Events       │           │  (archive)   │              │              │
//! └──────────────┘           └──────────────┘              │              │
//!                                   │                      │              │
//!                                   ▼                      │              │
//!                            ┌──────────────┐              │              │
//!                            │ Clean        │              │              │
//!                            └──────────────┘              │              │
//!                                   │                      │              │
//!                                   ▼                      │              │
//!                            ┌──────────────┐              │ {prefix}/    │
//!                            │ Partition    │─────────────▶│  {stem}_N.csv│
//!                            │  + Write     │              └──────────────┘
//!                            └──────────────┘
//!                                   │ on failure
//!                                   ▼
//!                            ┌──────────────┐
//!                            │ SNS          │
//!                            │ Notification │
//!                            └──────────────┘
//! ```

pub mod archive;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod event;
pub mod kafka_consumer;
pub mod notification;
pub mod object_store;
pub mod partition;
pub mod pipeline;
pub mod table;
pub mod table_store;

pub use archive::ArchiveExtractor;
pub use cleaner::{Cleaner, CleaningPolicy, FnCleaner, PassThrough, TrimWhitespace};
pub use config::Config;
pub use error::{CleanError, NotifyError, PipelineError, StoreError, TableError};
pub use event::{BucketEvent, SourceReference};
pub use kafka_consumer::EventConsumer;
pub use notification::{ErrorReport, NotificationSink, Notifier, SnsNotifier};
pub use object_store::{ObjectResponse, ObjectStore, S3ObjectStore};
pub use partition::{output_key, partition};
pub use pipeline::{InvocationOutcome, Pipeline, PipelineSettings, PipelineState};
pub use table::{Chunk, Table};
pub use table_store::{SourceFormat, TableStore};
