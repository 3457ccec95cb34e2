use serde::Serialize;
use std::fmt;

use super::column_type::ColumnType;
use crate::table::{Table, Value};

/// A single finding from a validation gate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A required (or primary-key) column is not part of the table
    MissingColumn { column: String },
    /// A non-null value does not conform to the declared column type
    TypeMismatch {
        row: usize,
        column: String,
        expected: ColumnType,
        actual: Value,
    },
    /// Primary-key value is null
    NullKey { row: usize, column: String },
    /// Primary-key value shared by more than one row
    DuplicateKey {
        column: String,
        value: Value,
        rows: Vec<usize>,
    },
}

impl Violation {
    /// Row indices implicated by this violation
    pub fn rows(&self) -> Vec<usize> {
        match self {
            Violation::MissingColumn { .. } => Vec::new(),
            Violation::TypeMismatch { row, .. } | Violation::NullKey { row, .. } => vec![*row],
            Violation::DuplicateKey { rows, .. } => rows.clone(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingColumn { column } => write!(f, "missing column '{}'", column),
            Violation::TypeMismatch {
                row,
                column,
                expected,
                actual,
            } => write!(
                f,
                "row {}: column '{}' expected {}, got {} '{}'",
                row,
                column,
                expected,
                actual.type_name(),
                actual
            ),
            Violation::NullKey { row, column } => write!(f, "row {}: null value in key column '{}'", row, column),
            Violation::DuplicateKey { column, value, rows } => {
                write!(f, "duplicate '{}' in key column '{}' at rows {:?}", value, column, rows)
            }
        }
    }
}

/// Outcome of one validation gate. Validators only report; the table is
/// never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub validator: String,
    pub rows_checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn new(validator: impl Into<String>, rows_checked: usize) -> Self {
        Self {
            validator: validator.into(),
            rows_checked,
            violations: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// All offending row indices, sorted and deduplicated
    pub fn offending_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.violations.iter().flat_map(Violation::rows).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }
}

/// A gate the master table must pass before it may be loaded
pub trait Validator {
    /// Name used in logs and run reports
    fn name(&self) -> &'static str;

    /// Inspect the table and report every violation found
    fn validate(&self, table: &Table) -> ValidationResult;
}
