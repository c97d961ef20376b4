use thiserror::Error;

/// Errors raised by a single pipeline invocation.
///
/// Every variant except [`PipelineError::StorageDelete`] is fatal: it aborts
/// the invocation and is reported through the notification sink.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Failed to read {bucket}/{key}")]
    StorageRead {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to parse {bucket}/{key}")]
    Parse {
        bucket: String,
        key: String,
        #[source]
        source: TableError,
    },

    #[error("Archive {bucket}/{key} has no entry named '{entry}'")]
    ArchiveEntryNotFound {
        bucket: String,
        key: String,
        entry: String,
    },

    #[error("Cleaning failed")]
    Clean(#[from] CleanError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to write {bucket}/{key}")]
    StorageWrite {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to delete {bucket}/{key}")]
    StorageDelete {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable name of the error class, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidEvent(_) => "InvalidEvent",
            PipelineError::StorageRead { .. } => "StorageReadError",
            PipelineError::Parse { .. } => "ParseError",
            PipelineError::ArchiveEntryNotFound { .. } => "ArchiveEntryNotFound",
            PipelineError::Clean(_) => "CleanError",
            PipelineError::InvalidConfiguration(_) => "InvalidConfiguration",
            PipelineError::StorageWrite { .. } => "StorageWriteError",
            PipelineError::StorageDelete { .. } => "StorageDeleteError",
            PipelineError::Unexpected(_) => "Unexpected",
        }
    }

    /// Whether this error aborts the invocation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::StorageDelete { .. })
    }
}

/// Errors reported by an [`crate::object_store::ObjectStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{operation} returned status {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("{operation} failed before a response was received: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Errors decoding or building a [`crate::table::Table`].
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Source has no header row")]
    Empty,

    #[error("Line {line} has {found} fields but the header declares {expected}")]
    TooManyFields {
        line: u64,
        found: usize,
        expected: usize,
    },

    #[error("Row {row} has {found} values but the table has {expected} columns")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Invalid zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archives nested inside archives are not supported")]
    NestedArchive,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by a cleaning policy.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Cleaned table is malformed: {0}")]
    Table(#[from] TableError),

    #[error("{0}")]
    Rule(String),
}

/// Errors publishing to the notification channel.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to publish notification: {0}")]
    Publish(String),
}
