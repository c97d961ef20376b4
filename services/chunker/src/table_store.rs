//! Reading and writing tables through the object store.
//!
//! Decoding keeps every value as text: CSV fields are taken exactly as
//! written and spreadsheet cells are rendered with their display form.

use crate::config::InputConfig;
use crate::error::{PipelineError, StoreError, TableError};
use crate::event::key_extension;
use crate::object_store::{ObjectStore, STATUS_OK};
use crate::table::Table;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, WriterBuilder};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const CSV_CONTENT_TYPE: &str = "text/csv";

/// How the bytes of a source object are decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text with a header row
    Csv { delimiter: u8 },
    /// Workbook; the named sheet or the first one
    Spreadsheet { sheet: Option<String> },
    /// Zip archive holding the actual table
    Archive,
}

impl SourceFormat {
    /// Infer the format from the key's extension.
    ///
    /// Unknown extensions are read as CSV.
    pub fn infer(key: &str, input: &InputConfig) -> Self {
        match key_extension(key).as_deref() {
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => SourceFormat::Spreadsheet {
                sheet: input.sheet_name.clone(),
            },
            Some("zip") => SourceFormat::Archive,
            Some("tsv") => SourceFormat::Csv { delimiter: b'\t' },
            _ => SourceFormat::Csv {
                delimiter: input.delimiter_byte(),
            },
        }
    }
}

/// Table-level access to the object store
#[derive(Clone)]
pub struct TableStore {
    store: Arc<dyn ObjectStore>,
}

impl TableStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Fetch the raw bytes of an object
    #[instrument(skip(self))]
    pub async fn read_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        let read_error = |source| PipelineError::StorageRead {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let response = self.store.get_object(bucket, key).await.map_err(read_error)?;

        if response.status != STATUS_OK {
            warn!(status = response.status, "Unsuccessful get_object");
            return Err(read_error(StoreError::Status {
                operation: "get_object",
                status: response.status,
            }));
        }

        info!(size_bytes = response.body.len(), "Successful get_object");
        Ok(response.body)
    }

    /// Fetch an object and decode it as a table
    pub async fn read_table(
        &self,
        bucket: &str,
        key: &str,
        format: &SourceFormat,
    ) -> Result<Table, PipelineError> {
        let bytes = self.read_bytes(bucket, key).await?;

        let table = parse_table(&bytes, format).map_err(|source| PipelineError::Parse {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;

        debug!(
            bucket,
            key,
            rows = table.row_count(),
            columns = table.column_count(),
            "Decoded source table"
        );
        Ok(table)
    }

    /// Serialize a table as CSV and store it
    #[instrument(skip(self, table), fields(rows = table.row_count()))]
    pub async fn write_table(
        &self,
        bucket: &str,
        key: &str,
        table: &Table,
    ) -> Result<(), PipelineError> {
        let write_error = |source| PipelineError::StorageWrite {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let body = encode_csv(table)?;

        let status = self
            .store
            .put_object(bucket, key, body, CSV_CONTENT_TYPE)
            .await
            .map_err(write_error)?;

        if status != STATUS_OK {
            warn!(status, "Unsuccessful put_object");
            return Err(write_error(StoreError::Status {
                operation: "put_object",
                status,
            }));
        }

        info!("Successful put_object");
        Ok(())
    }

    /// Delete an object. The caller decides whether a failure matters.
    #[instrument(skip(self))]
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), PipelineError> {
        self.store
            .delete_object(bucket, key)
            .await
            .map_err(|source| PipelineError::StorageDelete {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }
}

/// Decode bytes in the given format
pub fn parse_table(bytes: &[u8], format: &SourceFormat) -> Result<Table, TableError> {
    match format {
        SourceFormat::Csv { delimiter } => parse_csv(bytes, *delimiter),
        SourceFormat::Spreadsheet { sheet } => parse_spreadsheet(bytes, sheet.as_deref()),
        SourceFormat::Archive => Err(TableError::NestedArchive),
    }
}

fn parse_csv(bytes: &[u8], delimiter: u8) -> Result<Table, TableError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.is_empty() {
        return Err(TableError::Empty);
    }

    let mut table = Table::with_columns(columns);
    let width = table.column_count();

    for result in reader.records() {
        let record = result?;
        if record.len() > width {
            return Err(TableError::TooManyFields {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                found: record.len(),
                expected: width,
            });
        }

        // Short rows are padded with empty values
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        table.push_row(row)?;
    }

    Ok(table)
}

fn parse_spreadsheet(bytes: &[u8], sheet: Option<&str>) -> Result<Table, TableError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| TableError::Spreadsheet(e.to_string()))?;

    let range = match sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|n| n == name) {
                return Err(TableError::SheetNotFound(name.to_string()));
            }
            workbook
                .worksheet_range(name)
                .map_err(|e| TableError::Spreadsheet(e.to_string()))?
        }
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| TableError::Spreadsheet("workbook has no sheets".to_string()))?
            .map_err(|e| TableError::Spreadsheet(e.to_string()))?,
    };

    let mut rows = range.rows();
    let header = rows.next().ok_or(TableError::Empty)?;
    let mut table = Table::with_columns(header.iter().map(cell_text).collect());
    let width = table.column_count();

    for cells in rows {
        let mut row: Vec<String> = cells.iter().take(width).map(cell_text).collect();
        row.resize(width, String::new());
        table.push_row(row)?;
    }

    Ok(table)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(value) if !value.is_duration() => match value.as_datetime() {
            Some(datetime) => iso_datetime(datetime),
            None => cell.to_string(),
        },
        Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Date-formatted cells as ISO-8601; midnight renders as a bare date
fn iso_datetime(datetime: NaiveDateTime) -> String {
    if Some(datetime.time()) == NaiveTime::from_hms_opt(0, 0, 0) {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Header row plus data rows, comma separated, no index column
pub fn encode_csv(table: &Table) -> Result<Vec<u8>, PipelineError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    writer
        .write_record(table.columns())
        .map_err(|e| anyhow::Error::new(e).context("Failed to encode CSV header"))?;
    for row in table.rows() {
        writer
            .write_record(row)
            .map_err(|e| anyhow::Error::new(e).context("Failed to encode CSV row"))?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::Unexpected(anyhow::anyhow!("Failed to flush CSV buffer: {}", e)))
}
