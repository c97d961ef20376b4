use crate::error::CleanError;
use crate::table::Table;
use serde::Deserialize;
use std::sync::Arc;

/// Transform applied to every table between reading and chunking.
///
/// Implementations must be deterministic and idempotent, and must return a
/// well-formed table for any well-formed input.
pub trait Cleaner: Send + Sync {
    fn clean(&self, table: Table) -> Result<Table, CleanError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Configured choice of built-in cleaner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningPolicy {
    /// Leave the table untouched
    #[default]
    Passthrough,
    /// Trim surrounding whitespace from column names and values
    Trim,
}

impl CleaningPolicy {
    pub fn build(self) -> Arc<dyn Cleaner> {
        match self {
            CleaningPolicy::Passthrough => Arc::new(PassThrough),
            CleaningPolicy::Trim => Arc::new(TrimWhitespace),
        }
    }
}

/// Returns the table unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Cleaner for PassThrough {
    fn clean(&self, table: Table) -> Result<Table, CleanError> {
        Ok(table)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Trims leading and trailing whitespace from column names and values
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimWhitespace;

impl Cleaner for TrimWhitespace {
    fn clean(&self, table: Table) -> Result<Table, CleanError> {
        let (columns, rows) = table.into_parts();
        let columns = columns.into_iter().map(trim_owned).collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(trim_owned).collect())
            .collect();

        Ok(Table::new(columns, rows)?)
    }

    fn name(&self) -> &str {
        "trim"
    }
}

fn trim_owned(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_string()
    }
}

/// Function-based cleaner
pub struct FnCleaner<F>
where
    F: Fn(Table) -> Result<Table, CleanError> + Send + Sync,
{
    cleaner: F,
}

impl<F> FnCleaner<F>
where
    F: Fn(Table) -> Result<Table, CleanError> + Send + Sync,
{
    pub fn new(cleaner: F) -> Self {
        Self { cleaner }
    }
}

impl<F> Cleaner for FnCleaner<F>
where
    F: Fn(Table) -> Result<Table, CleanError> + Send + Sync,
{
    fn clean(&self, table: Table) -> Result<Table, CleanError> {
        (self.cleaner)(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_table() -> Table {
        Table::new(
            vec![" id ".to_string(), "name".to_string()],
            vec![
                vec!["1".to_string(), "  alpha ".to_string()],
                vec!["\t2".to_string(), "beta".to_string()],
                vec![" ".to_string(), String::new()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_passthrough_is_identity() {
        let table = sample_table();
        assert_eq!(PassThrough.clean(table.clone()).unwrap(), table);
    }

    #[test]
    fn test_trim_whitespace() {
        let cleaned = TrimWhitespace.clean(sample_table()).unwrap();

        assert_eq!(cleaned.columns(), ["id", "name"]);
        assert_eq!(cleaned.rows()[0], ["1", "alpha"]);
        assert_eq!(cleaned.rows()[1], ["2", "beta"]);
        assert_eq!(cleaned.rows()[2], ["", ""]);
    }

    /// Tables of 1-4 columns whose values mix padding with text
    fn arb_table() -> impl Strategy<Value = Table> {
        (1usize..5)
            .prop_flat_map(|width| {
                (
                    prop::collection::vec("[ \t]{0,2}[a-z0-9 ]{0,5}[ \t\n]{0,2}", width),
                    prop::collection::vec(
                        prop::collection::vec("[ \t]{0,2}[a-z0-9 ]{0,5}[ \t\n]{0,2}", width),
                        0..20,
                    ),
                )
            })
            .prop_map(|(columns, rows)| Table::new(columns, rows).unwrap())
    }

    proptest! {
        #[test]
        fn prop_builtin_policies_are_idempotent(table in arb_table()) {
            for policy in [CleaningPolicy::Passthrough, CleaningPolicy::Trim] {
                let cleaner = policy.build();
                let once = cleaner.clean(table.clone()).unwrap();
                let twice = cleaner.clean(once.clone()).unwrap();
                prop_assert_eq!(once, twice, "policy {} is not idempotent", cleaner.name());
            }
        }

        #[test]
        fn prop_builtin_policies_keep_shape(table in arb_table()) {
            for policy in [CleaningPolicy::Passthrough, CleaningPolicy::Trim] {
                let cleaned = policy.build().clean(table.clone()).unwrap();
                prop_assert_eq!(cleaned.column_count(), table.column_count());
                prop_assert_eq!(cleaned.row_count(), table.row_count());
            }
        }
    }

    #[test]
    fn test_fn_cleaner_errors_propagate() {
        let cleaner = FnCleaner::new(|_table: Table| Err(CleanError::Rule("unsupported schema".to_string())));

        match cleaner.clean(sample_table()) {
            Err(CleanError::Rule(message)) => assert_eq!(message, "unsupported schema"),
            other => panic!("Expected Rule error, got {:?}", other),
        }
    }

    #[test]
    fn test_policy_deserializes_from_snake_case() {
        let policy: CleaningPolicy = serde_json::from_str("\"trim\"").unwrap();
        assert_eq!(policy, CleaningPolicy::Trim);
    }
}
