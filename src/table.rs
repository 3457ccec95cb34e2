use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// A single scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Short type label used in logs and violation reports
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Str(_) => "string",
        }
    }

    /// Hashable form used for joins, dedup and primary-key checks.
    /// Returns `None` for null.
    pub fn key(&self) -> Option<KeyValue> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(KeyValue::Bool(*b)),
            // -0.0 and 0.0 compare equal, so fold them onto one bit pattern
            Value::Number(n) => Some(KeyValue::Number(if *n == 0.0 { 0 } else { n.to_bits() })),
            Value::Date(d) => Some(KeyValue::Date(*d)),
            Value::DateTime(dt) => Some(KeyValue::DateTime(*dt)),
            Value::Str(s) => Some(KeyValue::Str(s.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Equality/hash projection of a non-null [`Value`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Bool(bool),
    Number(u64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Str(String),
}

/// An ordered column -> value mapping. Absent columns read as null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

static NULL: Value = Value::Null;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a column; absent columns are null
    pub fn get(&self, column: &str) -> &Value {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
            .unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Insert or overwrite a column, keeping the original position on overwrite
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Builder-style variant of [`Record::set`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rename every column through `f`, keeping order
    pub fn rename_columns(self, f: impl Fn(&str) -> String) -> Self {
        Self {
            fields: self.fields.into_iter().map(|(k, v)| (f(&k), v)).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

/// An ordered sequence of records sharing a column set
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table whose column set is the union of the records' keys,
    /// in order of first appearance
    pub fn from_records(rows: Vec<Record>) -> Self {
        let mut table = Self::default();
        for row in rows {
            table.push(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    /// Append a record, widening the column set with any new keys
    pub fn push(&mut self, record: Record) {
        for (name, _) in record.iter() {
            if !self.has_column(name) {
                self.columns.push(name.to_string());
            }
        }
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Set `column` to `value` on every row, adding the column if needed
    pub fn fill_column(&mut self, column: &str, value: &Value) {
        self.add_column(column);
        for row in &mut self.rows {
            row.set(column, value.clone());
        }
    }
}

/// Where and when an extracted table came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub source_url: String,
    pub extracted_at: DateTime<Utc>,
}

/// Output of an extractor: one materialized table plus its provenance
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub table: Table,
    pub metadata: SourceMetadata,
}

impl ExtractedTable {
    pub fn new(table: Table, source_url: impl Into<String>) -> Self {
        Self {
            table,
            metadata: SourceMetadata {
                source_url: source_url.into(),
                extracted_at: Utc::now(),
            },
        }
    }

    /// Hand the table to the core, stamping `source_url` from the metadata
    /// wherever the column is absent or null
    pub fn into_table_with_provenance(self) -> Table {
        let ExtractedTable { mut table, metadata } = self;
        let url = Value::Str(metadata.source_url);
        table.add_column(crate::constants::COL_SOURCE_URL);
        for row in &mut table.rows {
            if row.get(crate::constants::COL_SOURCE_URL).is_null() {
                row.set(crate::constants::COL_SOURCE_URL, url.clone());
            }
        }
        table
    }
}
