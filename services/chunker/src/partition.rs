use crate::error::PipelineError;
use crate::event::key_stem;
use crate::table::{Chunk, Table};

/// Split a table into contiguous chunks of at most `max_rows` rows.
///
/// Every chunk carries the full column schema. A table with no rows produces
/// no chunks.
pub fn partition(table: Table, max_rows: usize) -> Result<Vec<Chunk>, PipelineError> {
    if max_rows == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "max_rows_per_chunk must be at least 1".to_string(),
        ));
    }

    let (columns, rows) = table.into_parts();
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(max_rows));
    let mut rows = rows.into_iter().peekable();

    while rows.peek().is_some() {
        let group: Vec<Vec<String>> = rows.by_ref().take(max_rows).collect();
        let table = Table::new(columns.clone(), group)
            .map_err(|e| PipelineError::Unexpected(anyhow::Error::new(e)))?;
        chunks.push(Chunk {
            index: chunks.len(),
            table,
        });
    }

    Ok(chunks)
}

/// Output key for a chunk: `{prefix}/{stem}_{index}.csv`.
///
/// Trailing slashes on the prefix are ignored; an empty prefix writes at the
/// bucket root.
pub fn output_key(prefix: &str, source_key: &str, index: usize) -> String {
    let prefix = prefix.trim_end_matches('/');
    let stem = key_stem(source_key);

    if prefix.is_empty() {
        format!("{}_{}.csv", stem, index)
    } else {
        format!("{}/{}_{}.csv", prefix, stem, index)
    }
}
