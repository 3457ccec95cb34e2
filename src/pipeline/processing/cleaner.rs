use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::column_type::ColumnType;
use crate::table::{KeyValue, Record, Table, Value};

static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").expect("valid regex"));

/// Normalization applied to a single column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRule {
    pub trim_whitespace: bool,
    pub lowercase: bool,
    /// Target type; a value that cannot be converted drops the whole row
    pub coerce: Option<ColumnType>,
    pub drop_row_if_null: bool,
    /// Treat an empty string (after trimming) as null
    pub empty_as_null: bool,
}

/// Cleaning configuration for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    /// Rewrite headers to snake_case before any rule is applied
    pub normalize_column_names: bool,
    /// Trim every string value, regardless of per-column rules
    pub trim_strings: bool,
    pub columns: BTreeMap<String, ColumnRule>,
    /// Dedup key; empty means the whole record
    pub dedup_key: Vec<String>,
    /// Drop rows whose share of null values exceeds this fraction
    pub drop_na_threshold: Option<f64>,
}

impl CleaningRules {
    pub fn rule(mut self, column: impl Into<String>, rule: ColumnRule) -> Self {
        self.columns.insert(column.into(), rule);
        self
    }

    pub fn dedup_on(mut self, columns: &[&str]) -> Self {
        self.dedup_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn drop_na_above(mut self, threshold: f64) -> Self {
        self.drop_na_threshold = Some(threshold);
        self
    }
}

/// What happened to the rows of one `clean` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_null: usize,
    pub dropped_duplicate: usize,
    pub dropped_coercion: usize,
    /// Kept rows whose values were not modified by any rule
    pub unchanged: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.dropped_null + self.dropped_duplicate + self.dropped_coercion
    }
}

enum RowOutcome {
    Keep { record: Record, changed: bool },
    DropNull,
    DropCoercion,
}

/// Normalize, filter and deduplicate a raw table.
///
/// Total over any input: rows that cannot be normalized are dropped and
/// counted, never raised. The input table is left untouched.
pub fn clean(table: &Table, rules: &CleaningRules) -> (Table, CleanReport) {
    let mut report = CleanReport {
        rows_in: table.len(),
        ..CleanReport::default()
    };

    let columns: Vec<String> = if rules.normalize_column_names {
        let mut seen = Vec::new();
        for c in table.columns() {
            let name = normalize_column_name(c);
            if seen.contains(&name) {
                warn!(
                    "Column '{}' normalizes to '{}', which already exists; keeping the first value",
                    c, name
                );
                continue;
            }
            seen.push(name);
        }
        seen
    } else {
        table.columns().to_vec()
    };

    // (a) + (b): per-record normalization and null filtering
    let mut normalized = Vec::with_capacity(table.len());
    for (index, row) in table.rows().iter().enumerate() {
        match normalize_record(row, rules, &columns) {
            RowOutcome::Keep { record, changed } => normalized.push((record, changed)),
            RowOutcome::DropNull => {
                debug!("Row {} dropped: null values", index);
                report.dropped_null += 1;
            }
            RowOutcome::DropCoercion => {
                report.dropped_coercion += 1;
            }
        }
    }

    // (c): stable dedup, first occurrence wins
    let key_columns: &[String] = if rules.dedup_key.is_empty() {
        &columns
    } else {
        &rules.dedup_key
    };
    let mut seen: HashSet<Vec<Option<KeyValue>>> = HashSet::new();
    let mut cleaned = Table::new(columns.clone());
    for (record, changed) in normalized {
        let key: Vec<Option<KeyValue>> = key_columns.iter().map(|c| record.get(c).key()).collect();
        if !seen.insert(key) {
            report.dropped_duplicate += 1;
            continue;
        }
        if !changed {
            report.unchanged += 1;
        }
        cleaned.push(record);
    }

    report.rows_out = cleaned.len();
    info!(
        "Cleaned {} rows -> {} (null: {}, duplicate: {}, coercion: {})",
        report.rows_in, report.rows_out, report.dropped_null, report.dropped_duplicate, report.dropped_coercion
    );
    crate::observability::metrics::cleaner::report_recorded(&report);

    (cleaned, report)
}

fn normalize_record(row: &Record, rules: &CleaningRules, columns: &[String]) -> RowOutcome {
    let source = if rules.normalize_column_names {
        row.clone().rename_columns(normalize_column_name)
    } else {
        row.clone()
    };

    let mut changed = false;
    let mut record = Record::new();
    for (column, value) in source.iter() {
        // Headers colliding after normalization: first one wins
        if record.contains(column) {
            continue;
        }
        let mut value = value.clone();
        if rules.trim_strings {
            value = trim(value);
        }
        if let Some(rule) = rules.columns.get(column) {
            match apply_rule(value, rule) {
                Ok(v) => value = v,
                Err(failure) => {
                    debug!("Row dropped: column '{}': {}", column, failure);
                    return RowOutcome::DropCoercion;
                }
            }
        }
        if &value != source.get(column) {
            changed = true;
        }
        record.set(column, value);
    }

    // Columns the row does not carry read as null here
    for (column, rule) in &rules.columns {
        if rule.drop_row_if_null && record.get(column).is_null() {
            return RowOutcome::DropNull;
        }
    }

    if let Some(threshold) = rules.drop_na_threshold {
        if !columns.is_empty() {
            let nulls = columns.iter().filter(|c| record.get(c).is_null()).count();
            if nulls as f64 / columns.len() as f64 > threshold {
                return RowOutcome::DropNull;
            }
        }
    }

    RowOutcome::Keep { record, changed }
}

fn apply_rule(mut value: Value, rule: &ColumnRule) -> Result<Value, super::column_type::CoercionFailure> {
    if rule.trim_whitespace {
        value = trim(value);
    }
    if rule.lowercase {
        if let Value::Str(s) = &value {
            value = Value::Str(s.to_lowercase());
        }
    }
    if rule.empty_as_null {
        if let Value::Str(s) = &value {
            if s.trim().is_empty() {
                value = Value::Null;
            }
        }
    }
    match rule.coerce {
        Some(target) => target.coerce(value),
        None => Ok(value),
    }
}

fn trim(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(s.trim().to_string()),
        other => other,
    }
}

/// `"  First Name "` -> `"first_name"`, `"Gift-Type"` -> `"gift_type"`
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let joined = SEPARATOR_RUN.replace_all(&lowered, "_");
    NON_WORD.replace_all(&joined, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_table() -> Table {
        Table::from_records(vec![
            Record::new().with("  First Name  ", "  Alice  ").with("Gift Type", "Cash").with("Amount", 100i64),
            Record::new().with("  First Name  ", "Bob").with("Gift Type", Value::Null).with("Amount", 200i64),
            Record::new().with("  First Name  ", "Bob").with("Gift Type", "In-Kind").with("Amount", 200i64),
        ])
    }

    #[test]
    fn normalizes_column_names() {
        let rules = CleaningRules {
            normalize_column_names: true,
            ..CleaningRules::default()
        };
        let (cleaned, _) = clean(&dirty_table(), &rules);
        assert!(cleaned.has_column("first_name"));
        assert!(cleaned.has_column("gift_type"));
        assert!(cleaned.has_column("amount"));
    }

    #[test]
    fn trims_string_values() {
        let rules = CleaningRules {
            normalize_column_names: true,
            trim_strings: true,
            ..CleaningRules::default()
        };
        let (cleaned, report) = clean(&dirty_table(), &rules);
        assert_eq!(cleaned.rows()[0].get("first_name"), &Value::from("Alice"));
        assert_eq!(report.unchanged, 2);
    }

    #[test]
    fn drops_rows_with_null_in_flagged_column() {
        let rules = CleaningRules {
            normalize_column_names: true,
            ..CleaningRules::default()
        }
        .rule(
            "gift_type",
            ColumnRule {
                drop_row_if_null: true,
                ..ColumnRule::default()
            },
        );
        let (cleaned, report) = clean(&dirty_table(), &rules);
        assert_eq!(report.dropped_null, 1);
        assert!(cleaned.rows().iter().all(|r| !r.get("gift_type").is_null()));
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let rules = CleaningRules {
            normalize_column_names: true,
            ..CleaningRules::default()
        }
        .dedup_on(&["first_name"]);
        let (cleaned, report) = clean(&dirty_table(), &rules);
        assert_eq!(report.dropped_duplicate, 1);
        assert_eq!(cleaned.len(), 2);
        // the Bob row with a null gift type came first and survives
        assert!(cleaned.rows()[1].get("gift_type").is_null());
    }

    #[test]
    fn null_drop_runs_before_dedup() {
        let rules = CleaningRules {
            normalize_column_names: true,
            ..CleaningRules::default()
        }
        .rule(
            "gift_type",
            ColumnRule {
                drop_row_if_null: true,
                ..ColumnRule::default()
            },
        )
        .dedup_on(&["first_name"]);
        let (cleaned, report) = clean(&dirty_table(), &rules);
        assert_eq!(report.dropped_null, 1);
        assert_eq!(report.dropped_duplicate, 0);
        assert_eq!(cleaned.rows()[1].get("gift_type"), &Value::from("In-Kind"));
    }

    #[test]
    fn coercion_failure_drops_row_and_is_counted() {
        let table = Table::from_records(vec![
            Record::new().with("gift_id", "G1").with("amount", "100"),
            Record::new().with("gift_id", "G2").with("amount", "lots"),
        ]);
        let rules = CleaningRules::default().rule(
            "amount",
            ColumnRule {
                coerce: Some(ColumnType::Number),
                ..ColumnRule::default()
            },
        );
        let (cleaned, report) = clean(&table, &rules);
        assert_eq!(report.dropped_coercion, 1);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.rows()[0].get("amount"), &Value::Number(100.0));
        assert_eq!(report.unchanged, 0);
    }

    #[test]
    fn lowercase_and_trim_apply_per_column() {
        let table = Table::from_records(vec![Record::new().with("status", "  ACTIVE ").with("name", " Alice ")]);
        let rules = CleaningRules::default().rule(
            "status",
            ColumnRule {
                trim_whitespace: true,
                lowercase: true,
                ..ColumnRule::default()
            },
        );
        let (cleaned, _) = clean(&table, &rules);
        assert_eq!(cleaned.rows()[0].get("status"), &Value::from("active"));
        assert_eq!(cleaned.rows()[0].get("name"), &Value::from(" Alice "));
    }

    #[test]
    fn empty_as_null_feeds_the_null_drop() {
        let table = Table::from_records(vec![
            Record::new().with("beneficiary_id", "  "),
            Record::new().with("beneficiary_id", "B1"),
        ]);
        let rules = CleaningRules::default().rule(
            "beneficiary_id",
            ColumnRule {
                empty_as_null: true,
                drop_row_if_null: true,
                ..ColumnRule::default()
            },
        );
        let (cleaned, report) = clean(&table, &rules);
        assert_eq!(report.dropped_null, 1);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn rows_above_null_threshold_are_dropped() {
        let table = Table::from_records(vec![
            Record::new().with("gift_id", "G1").with("type", "Cash").with("amount", 10i64).with("date", "2024-01-01"),
            Record::new().with("gift_id", "G2").with("type", "Cash").with("amount", Value::Null).with("date", Value::Null),
            Record::new().with("gift_id", "G3").with("type", Value::Null).with("amount", Value::Null).with("date", Value::Null),
        ]);
        let rules = CleaningRules::default().drop_na_above(0.5);
        let (cleaned, report) = clean(&table, &rules);
        assert_eq!(report.dropped_null, 1);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.rows()[1].get("gift_id"), &Value::from("G2"));
    }

    #[test]
    fn null_threshold_counts_columns_the_row_lacks() {
        let table = Table::from_records(vec![
            Record::new().with("gift_id", "G1").with("type", "Cash").with("amount", 10i64),
            Record::new().with("gift_id", "G2"),
        ]);
        let (cleaned, report) = clean(&table, &CleaningRules::default().drop_na_above(0.5));
        assert_eq!(report.dropped_null, 1);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn colliding_headers_keep_the_first_value() {
        let table = Table::from_records(vec![Record::new()
            .with("gift_id", "G1")
            .with("Amount", "100")
            .with(" amount", "999")]);
        let rules = CleaningRules {
            normalize_column_names: true,
            ..CleaningRules::default()
        };
        let (cleaned, report) = clean(&table, &rules);
        assert_eq!(cleaned.columns(), &["gift_id", "amount"].map(String::from));
        assert_eq!(cleaned.rows()[0].get("amount"), &Value::from("100"));
        assert_eq!(cleaned.rows()[0].len(), 2);
        assert_eq!(report.rows_out, 1);
    }

    #[test]
    fn dedup_is_idempotent() {
        let rules = CleaningRules {
            normalize_column_names: true,
            trim_strings: true,
            ..CleaningRules::default()
        }
        .dedup_on(&["first_name", "amount"]);
        let (once, _) = clean(&dirty_table(), &rules);
        let (twice, report) = clean(&once, &rules);
        assert_eq!(once, twice);
        assert_eq!(report.dropped(), 0);
    }

    #[test]
    fn input_table_is_not_mutated() {
        let table = dirty_table();
        let before = table.clone();
        let rules = CleaningRules {
            normalize_column_names: true,
            trim_strings: true,
            ..CleaningRules::default()
        };
        let _ = clean(&table, &rules);
        assert_eq!(table, before);
    }

    #[test]
    fn empty_table_cleans_to_empty() {
        let (cleaned, report) = clean(&Table::default(), &CleaningRules::default());
        assert!(cleaned.is_empty());
        assert_eq!(report, CleanReport::default());
    }
}
