use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::table::Value;

/// Declared scalar type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    #[serde(alias = "date_time")]
    DateTime,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A value that could not be normalized to its declared type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot coerce {} value '{value}' to {target}", .value.type_name())]
pub struct CoercionFailure {
    pub value: Value,
    pub target: ColumnType,
}

impl ColumnType {
    /// Convert `value` to this type. Null stays null; blank strings become
    /// null for every non-string target.
    pub fn coerce(self, value: Value) -> Result<Value, CoercionFailure> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if self != ColumnType::String {
            if let Value::Str(s) = &value {
                if s.trim().is_empty() {
                    return Ok(Value::Null);
                }
            }
        }

        let converted = match (self, &value) {
            (ColumnType::String, Value::Str(_)) => Some(value.clone()),
            (ColumnType::String, other) => Some(Value::Str(other.to_string())),

            (ColumnType::Number, Value::Number(_)) => Some(value.clone()),
            (ColumnType::Number, Value::Str(s)) => parse_number(s).map(Value::Number),

            (ColumnType::Integer, Value::Number(n)) => integral(*n).map(Value::Number),
            (ColumnType::Integer, Value::Str(s)) => parse_number(s).and_then(integral).map(Value::Number),

            (ColumnType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ColumnType::Boolean, Value::Str(s)) => parse_bool(s).map(Value::Bool),
            (ColumnType::Boolean, Value::Number(n)) if *n == 1.0 => Some(Value::Bool(true)),
            (ColumnType::Boolean, Value::Number(n)) if *n == 0.0 => Some(Value::Bool(false)),

            (ColumnType::Date, Value::Date(_)) => Some(value.clone()),
            (ColumnType::Date, Value::DateTime(dt)) => Some(Value::Date(dt.date_naive())),
            (ColumnType::Date, Value::Str(s)) => parse_date(s)
                .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
                .map(Value::Date),

            (ColumnType::DateTime, Value::DateTime(_)) => Some(value.clone()),
            (ColumnType::DateTime, Value::Date(d)) => Some(Value::DateTime(midnight(*d))),
            (ColumnType::DateTime, Value::Str(s)) => parse_datetime(s)
                .or_else(|| parse_date(s).map(midnight))
                .map(Value::DateTime),

            _ => None,
        };

        converted.ok_or(CoercionFailure { value, target: self })
    }

    /// Whether a non-null value conforms to this type without repair.
    /// Strings conform when they parse as the type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::String, Value::Str(_)) => true,
            (ColumnType::Number, Value::Number(_)) => true,
            (ColumnType::Number, Value::Str(s)) => parse_number(s).is_some(),
            (ColumnType::Integer, Value::Number(n)) => integral(*n).is_some(),
            (ColumnType::Integer, Value::Str(s)) => parse_number(s).and_then(integral).is_some(),
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::Boolean, Value::Str(s)) => parse_bool(s).is_some(),
            (ColumnType::Date | ColumnType::DateTime, Value::Date(_) | Value::DateTime(_)) => true,
            (ColumnType::Date | ColumnType::DateTime, Value::Str(s)) => {
                parse_date(s).is_some() || parse_datetime(s).is_some()
            }
            _ => false,
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn integral(n: f64) -> Option<f64> {
    (n.fract() == 0.0).then_some(n)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a calendar date in one of the accepted layouts
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%m-%d-%Y"))
        .ok()
}

/// Parse a timestamp; naive timestamps are taken as UTC
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}
