use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::Extractor;
use crate::error::{PipelineError, Result};
use crate::table::{ExtractedTable, Record, Table, Value};

/// Runs one SQL query against a SQLite database file.
pub struct SqliteExtractor {
    name: String,
    path: PathBuf,
    query: String,
}

impl SqliteExtractor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            query: query.into(),
        }
    }
}

#[async_trait]
impl Extractor for SqliteExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<ExtractedTable> {
        let path = self.path.clone();
        let query = self.query.clone();
        let table = tokio::task::spawn_blocking(move || query_table(&path, &query))
            .await
            .map_err(|e| PipelineError::Extract {
                source_name: self.name.clone(),
                message: e.to_string(),
            })??;

        info!("🗄️ Query returned {} rows from {}", table.len(), self.path.display());
        Ok(ExtractedTable::new(table, format!("sqlite://{}", self.path.display())))
    }
}

fn query_table(path: &Path, query: &str) -> Result<Table> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut table = Table::new(columns.clone());
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            record.set(column.clone(), sql_value(row.get_ref(i)?));
        }
        table.push(record);
    }
    Ok(table)
}

fn sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Value::Str(String::from_utf8_lossy(bytes).into_owned()),
    }
}
