use std::collections::HashMap;
use tracing::{error, info};

use super::validation::{ValidationResult, Validator, Violation};
use crate::table::{KeyValue, Table, Value};

/// Ensures the primary-key column is present, never null, and unique.
pub struct IdValidator {
    id_column: String,
}

impl IdValidator {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
        }
    }
}

impl Validator for IdValidator {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        validate_ids(table, &self.id_column)
    }
}

/// Check that `id_column` exists, has no nulls, and has no duplicates.
///
/// Null keys are reported per row. Each duplicated value is reported once
/// with every row index sharing it, in order of first appearance.
pub fn validate_ids(table: &Table, id_column: &str) -> ValidationResult {
    let mut result = ValidationResult::new("identity", table.len());

    if !table.has_column(id_column) {
        error!("ID column '{}' is not present in the table", id_column);
        result.push(Violation::MissingColumn {
            column: id_column.to_string(),
        });
        return result;
    }

    // value -> (first-seen order, sample value, row indices)
    let mut groups: HashMap<KeyValue, (usize, Value, Vec<usize>)> = HashMap::new();
    for (row_index, row) in table.rows().iter().enumerate() {
        let value = row.get(id_column);
        match value.key() {
            None => result.push(Violation::NullKey {
                row: row_index,
                column: id_column.to_string(),
            }),
            Some(key) => {
                let order = groups.len();
                groups
                    .entry(key)
                    .or_insert_with(|| (order, value.clone(), Vec::new()))
                    .2
                    .push(row_index);
            }
        }
    }

    let null_count = result.violations.len();
    if null_count > 0 {
        error!("ID column '{}' contains {} null value(s)", id_column, null_count);
    }

    let mut duplicates: Vec<(usize, Value, Vec<usize>)> =
        groups.into_values().filter(|(_, _, rows)| rows.len() > 1).collect();
    duplicates.sort_by_key(|(order, _, _)| *order);

    if !duplicates.is_empty() {
        let sample: Vec<String> = duplicates.iter().take(10).map(|(_, v, _)| v.to_string()).collect();
        error!(
            "ID column '{}' has {} duplicated value(s): {:?}",
            id_column,
            duplicates.len(),
            sample
        );
    }
    for (_, value, rows) in duplicates {
        result.push(Violation::DuplicateKey {
            column: id_column.to_string(),
            value,
            rows,
        });
    }

    if result.passed() {
        info!("ID validation passed for column '{}'", id_column);
    }
    result
}
