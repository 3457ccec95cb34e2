use std::collections::BTreeMap;
use tracing::{error, info};

use super::column_type::ColumnType;
use super::validation::{ValidationResult, Validator, Violation};
use crate::table::Table;

/// Asserts that a table carries the required columns and that every
/// non-null value in a typed column conforms to its declared type.
pub struct SchemaValidator {
    required_columns: Vec<String>,
    column_types: BTreeMap<String, ColumnType>,
}

impl SchemaValidator {
    pub fn new(required_columns: Vec<String>, column_types: BTreeMap<String, ColumnType>) -> Self {
        Self {
            required_columns,
            column_types,
        }
    }
}

impl Validator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        validate_schema(table, &self.required_columns, &self.column_types)
    }
}

/// Check column presence and value types.
///
/// A missing required column is reported once at column level so an empty
/// table missing it still fails. Typed columns that are absent and not
/// required are skipped.
pub fn validate_schema(
    table: &Table,
    required_columns: &[String],
    column_types: &BTreeMap<String, ColumnType>,
) -> ValidationResult {
    let mut result = ValidationResult::new("schema", table.len());

    // 1. Required column presence
    for column in required_columns {
        if !table.has_column(column) {
            result.push(Violation::MissingColumn { column: column.clone() });
        }
    }

    // 2. Type conformance of non-null values
    let typed: Vec<(&String, ColumnType)> = column_types
        .iter()
        .filter(|(column, _)| table.has_column(column))
        .map(|(column, ty)| (column, *ty))
        .collect();

    for (row_index, row) in table.rows().iter().enumerate() {
        for (column, expected) in &typed {
            let actual = row.get(column);
            if !expected.accepts(actual) {
                result.push(Violation::TypeMismatch {
                    row: row_index,
                    column: (*column).clone(),
                    expected: *expected,
                    actual: actual.clone(),
                });
            }
        }
    }

    if result.passed() {
        info!("Schema validation passed ({} rows)", table.len());
    } else {
        error!("Schema validation failed with {} violation(s)", result.violations.len());
        for violation in result.violations.iter().take(10) {
            error!("  {}", violation);
        }
    }

    result
}
