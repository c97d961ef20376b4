use crate::error::TableError;

/// An in-memory table with a fixed column schema and text-valued rows.
///
/// Values are never coerced to numbers or dates, so a table read from a file
/// and written back reproduces the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, checking that every row has one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        let expected = columns.len();
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(TableError::RaggedRow {
                row,
                found: values.len(),
                expected,
            });
        }

        Ok(Self { columns, rows })
    }

    /// A table with a schema and no rows
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RaggedRow {
                row: self.rows.len(),
                found: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Split the table into its schema and rows
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        (self.columns, self.rows)
    }
}

/// A bounded, ordered slice of a table plus its zero-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub table: Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let result = Table::new(
            strings(&["id", "name"]),
            vec![strings(&["1", "a"]), strings(&["2"])],
        );

        match result {
            Err(TableError::RaggedRow {
                row,
                found,
                expected,
            }) => {
                assert_eq!(row, 1);
                assert_eq!(found, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("Expected RaggedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_push_row_keeps_invariant() {
        let mut table = Table::with_columns(strings(&["id"]));
        assert!(table.push_row(strings(&["1"])).is_ok());
        assert!(table.push_row(strings(&["2", "extra"])).is_err());
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column_count(), 1);
    }

    #[test]
    fn test_zero_column_table_accepts_empty_rows() {
        let table = Table::new(vec![], vec![vec![], vec![]]).unwrap();
        assert_eq!(table.row_count(), 2);
    }
}
