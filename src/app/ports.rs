use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::table::{ExtractedTable, Table};

/// Source of one raw input table
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in logs and failure reports
    fn name(&self) -> &str;

    /// Fetch and materialize the whole table
    async fn extract(&self) -> Result<ExtractedTable>;
}

/// How a loader treats data already present at its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Replace,
    Append,
    /// Refuse to write if the destination already exists
    Fail,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
            WriteMode::Fail => "fail",
        })
    }
}

/// A validated master table handed to the loaders
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub table: &'a Table,
    /// The run's `processed_at` value
    pub run_id: DateTime<Utc>,
    pub mode: WriteMode,
}

/// Destination for the validated master table
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, request: LoadRequest<'_>) -> Result<()>;
}
