use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::table::{KeyValue, Record, Table, Value};

/// How unmatched rows are treated when merging Beneficiaries with Gifts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Only keys present on both sides produce rows
    Inner,
    /// Every right-table (Gifts) row survives; unmatched left fields are null
    #[default]
    Left,
    /// Union of keys; unmatched fields on either side are null
    Outer,
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinMode::Inner => "inner",
            JoinMode::Left => "left",
            JoinMode::Outer => "outer",
        })
    }
}

/// Which input table a master column is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Beneficiary,
    Gift,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Beneficiary => "beneficiary",
            Side::Gift => "gift",
        })
    }
}

/// One master column and where its value is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterColumn {
    pub name: String,
    pub side: Side,
    /// Column name in the source table
    pub column: String,
}

impl MasterColumn {
    pub fn new(name: &str, side: Side, column: &str) -> Self {
        Self {
            name: name.to_string(),
            side,
            column: column.to_string(),
        }
    }
}

/// Projection from the joined pair of records onto the master row shape.
///
/// `processed_at` is never projected here; the orchestrator stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterMapping {
    /// Master columns in output order
    pub columns: Vec<MasterColumn>,
}

impl Default for MasterMapping {
    fn default() -> Self {
        Self {
            columns: vec![
                MasterColumn::new(COL_ID, Side::Gift, GIFT_ID),
                MasterColumn::new(COL_BENEFICIARY_NAME, Side::Beneficiary, BENEFICIARY_NAME),
                MasterColumn::new(COL_GIFT_TYPE, Side::Gift, GIFT_TYPE),
                MasterColumn::new(COL_AMOUNT, Side::Gift, GIFT_AMOUNT),
                MasterColumn::new(COL_DATE, Side::Gift, GIFT_DATE),
                MasterColumn::new(COL_STATUS, Side::Beneficiary, BENEFICIARY_STATUS),
                MasterColumn::new(COL_SOURCE_URL, Side::Gift, COL_SOURCE_URL),
            ],
        }
    }
}

impl MasterMapping {
    /// Master column names produced by this mapping plus `processed_at`
    pub fn output_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        if !cols.iter().any(|c| c == COL_PROCESSED_AT) {
            cols.push(COL_PROCESSED_AT.to_string());
        }
        cols
    }

    /// Restrict the mapping to columns whose source column exists.
    ///
    /// Omitted master columns are left for the schema gate to report.
    fn available_in(&self, beneficiaries: &Table, gifts: &Table) -> MasterMapping {
        let columns = self
            .columns
            .iter()
            .filter(|col| {
                let table = match col.side {
                    Side::Beneficiary => beneficiaries,
                    Side::Gift => gifts,
                };
                let present = table.has_column(&col.column);
                if !present {
                    warn!(
                        "Master column '{}' source '{}.{}' not found; omitted from master",
                        col.name, col.side, col.column
                    );
                }
                present
            })
            .cloned()
            .collect();
        MasterMapping { columns }
    }

    fn project(&self, beneficiary: Option<&Record>, gift: Option<&Record>) -> Record {
        let mut row = Record::new();
        for col in &self.columns {
            let from = match col.side {
                Side::Beneficiary => beneficiary,
                Side::Gift => gift,
            };
            let value = from.map(|r| r.get(&col.column).clone()).unwrap_or(Value::Null);
            row.set(col.name.clone(), value);
        }
        row.set(COL_PROCESSED_AT, Value::Null);
        row
    }
}

/// Merge cleaned Beneficiaries (left) and Gifts (right) into master rows.
///
/// Multiplicity policy: a key matching several rows on the opposite side
/// yields the Cartesian product of those rows. Null keys never match,
/// including other nulls.
///
/// Output order follows the right table; each right row is followed by its
/// matches in left-table order. For `outer`, unmatched left rows come last.
///
/// # Errors
/// [`PipelineError::SchemaMismatch`] when `join_key` is missing from either input.
pub fn merge(
    left: &Table,
    right: &Table,
    join_key: &str,
    how: JoinMode,
    mapping: &MasterMapping,
) -> Result<Table> {
    if !left.has_column(join_key) {
        return Err(PipelineError::SchemaMismatch {
            key: join_key.to_string(),
            side: Side::Beneficiary.to_string(),
        });
    }
    if !right.has_column(join_key) {
        return Err(PipelineError::SchemaMismatch {
            key: join_key.to_string(),
            side: Side::Gift.to_string(),
        });
    }

    let mapping = mapping.available_in(left, right);

    debug!(
        "Merging on '{}' (how={}). Left rows: {}, Right rows: {}",
        join_key,
        how,
        left.len(),
        right.len()
    );

    let mut left_index: HashMap<KeyValue, Vec<usize>> = HashMap::new();
    for (i, row) in left.rows().iter().enumerate() {
        if let Some(key) = row.get(join_key).key() {
            left_index.entry(key).or_default().push(i);
        }
    }

    let mut master = Table::new(mapping.output_columns());
    let mut left_matched = vec![false; left.len()];

    for gift in right.rows() {
        let matches = gift
            .get(join_key)
            .key()
            .and_then(|key| left_index.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if matches.is_empty() {
            if how != JoinMode::Inner {
                master.push(mapping.project(None, Some(gift)));
            }
            continue;
        }

        for &li in matches {
            left_matched[li] = true;
            master.push(mapping.project(left.rows().get(li), Some(gift)));
        }
    }

    if how == JoinMode::Outer {
        for (li, beneficiary) in left.rows().iter().enumerate() {
            if !left_matched[li] {
                master.push(mapping.project(Some(beneficiary), None));
            }
        }
    }

    info!("Merged rows: {}", master.len());
    Ok(master)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::schema_validator::validate_schema;
    use crate::pipeline::processing::validation::Violation;

    fn beneficiaries() -> Table {
        Table::from_records(vec![Record::new()
            .with("beneficiary_id", "B1")
            .with("name", "Alice")
            .with("status", "active")])
    }

    fn gifts() -> Table {
        Table::from_records(vec![
            Record::new()
                .with("gift_id", "G1")
                .with("beneficiary_id", "B1")
                .with("amount", 100.0)
                .with("type", "Cash")
                .with("date", "2024-01-01")
                .with("source_url", "https://gifts.example.org"),
            Record::new()
                .with("gift_id", "G2")
                .with("beneficiary_id", "B9")
                .with("amount", 50.0)
                .with("type", "Cash")
                .with("date", "2024-01-02")
                .with("source_url", "https://gifts.example.org"),
        ])
    }

    fn run(left: &Table, right: &Table, how: JoinMode) -> Table {
        merge(left, right, "beneficiary_id", how, &MasterMapping::default()).unwrap()
    }

    #[test]
    fn inner_join_drops_unmatched_gift() {
        let master = run(&beneficiaries(), &gifts(), JoinMode::Inner);
        assert_eq!(master.len(), 1);
        assert_eq!(master.rows()[0].get("id"), &Value::from("G1"));
        assert_eq!(master.rows()[0].get("beneficiary_name"), &Value::from("Alice"));
    }

    #[test]
    fn left_join_keeps_every_gift_with_null_beneficiary_fields() {
        let master = run(&beneficiaries(), &gifts(), JoinMode::Left);
        assert_eq!(master.len(), 2);
        let g2 = &master.rows()[1];
        assert_eq!(g2.get("id"), &Value::from("G2"));
        assert!(g2.get("beneficiary_name").is_null());
        assert!(g2.get("status").is_null());
    }

    #[test]
    fn outer_join_appends_unmatched_beneficiaries() {
        let mut left = beneficiaries();
        left.push(Record::new().with("beneficiary_id", "B2").with("name", "Bob").with("status", "inactive"));
        let master = run(&left, &gifts(), JoinMode::Outer);
        assert_eq!(master.len(), 3);
        let bob = &master.rows()[2];
        assert_eq!(bob.get("beneficiary_name"), &Value::from("Bob"));
        assert!(bob.get("id").is_null());
    }

    #[test]
    fn one_to_many_produces_cartesian_product() {
        let left = Table::from_records(vec![
            Record::new().with("beneficiary_id", "B1").with("name", "Alice"),
            Record::new().with("beneficiary_id", "B1").with("name", "Alicia"),
        ]);
        let right = Table::from_records(vec![
            Record::new().with("gift_id", "G1").with("beneficiary_id", "B1"),
            Record::new().with("gift_id", "G2").with("beneficiary_id", "B1"),
            Record::new().with("gift_id", "G3").with("beneficiary_id", "B1"),
        ]);
        let master = run(&left, &right, JoinMode::Inner);
        assert_eq!(master.len(), 6);
        let names: Vec<&Value> = master.rows().iter().take(2).map(|r| r.get("beneficiary_name")).collect();
        assert_eq!(names, vec![&Value::from("Alice"), &Value::from("Alicia")]);
    }

    #[test]
    fn null_keys_never_match() {
        let left = Table::from_records(vec![Record::new().with("beneficiary_id", Value::Null).with("name", "Ghost")]);
        let right = Table::from_records(vec![Record::new().with("gift_id", "G1").with("beneficiary_id", Value::Null)]);
        assert!(run(&left, &right, JoinMode::Inner).is_empty());
        let outer = run(&left, &right, JoinMode::Outer);
        assert_eq!(outer.len(), 2);
        assert!(outer.rows()[0].get("beneficiary_name").is_null());
    }

    #[test]
    fn missing_join_key_is_schema_mismatch() {
        let left = Table::from_records(vec![Record::new().with("name", "Alice")]);
        let err = merge(&left, &gifts(), "beneficiary_id", JoinMode::Inner, &MasterMapping::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { ref side, .. } if side == "beneficiary"));

        let err = merge(&beneficiaries(), &Table::default(), "beneficiary_id", JoinMode::Left, &MasterMapping::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { ref side, .. } if side == "gift"));
    }

    #[test]
    fn output_has_master_shape_with_unset_processed_at() {
        let master = run(&beneficiaries(), &gifts(), JoinMode::Left);
        let expected: Vec<String> = MASTER_COLUMNS.iter().map(|c| c.to_string()).collect();
        assert_eq!(master.columns(), expected.as_slice());
        assert!(master.rows().iter().all(|r| r.get("processed_at").is_null()));
    }

    #[test]
    fn missing_source_columns_are_omitted_from_master() {
        let right = Table::from_records(vec![Record::new().with("gift_id", "G1").with("beneficiary_id", "B1")]);
        let master = run(&beneficiaries(), &right, JoinMode::Left);
        assert_eq!(
            master.columns(),
            &["id", "beneficiary_name", "status", "processed_at"].map(String::from)
        );
        assert!(!master.rows()[0].contains("amount"));
        assert!(!master.rows()[0].contains("gift_type"));

        let required: Vec<String> = ["id", "gift_type", "amount"].iter().map(|c| c.to_string()).collect();
        let result = validate_schema(&master, &required, &Default::default());
        assert!(!result.passed());
        assert!(result.violations.contains(&Violation::MissingColumn {
            column: "gift_type".to_string()
        }));
        assert!(result.violations.contains(&Violation::MissingColumn {
            column: "amount".to_string()
        }));
    }

    #[test]
    fn exact_equality_on_keys() {
        let left = Table::from_records(vec![Record::new().with("beneficiary_id", "b1").with("name", "Alice")]);
        assert!(run(&left, &gifts(), JoinMode::Inner).is_empty());
    }
}
