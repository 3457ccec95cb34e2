use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::ports::{LoadRequest, Loader, WriteMode};
use crate::error::{PipelineError, Result};
use crate::table::Value;

/// Writes the master table into a named SQLite table.
pub struct SqliteLoader {
    path: PathBuf,
    table_name: String,
}

impl SqliteLoader {
    pub fn new(path: impl Into<PathBuf>, table_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table_name: table_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows currently stored in the target table
    pub fn row_count(&self) -> Result<usize> {
        let conn = Connection::open(&self.path)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table_name));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[async_trait]
impl Loader for SqliteLoader {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, request: LoadRequest<'_>) -> Result<()> {
        let table = request.table;
        if table.is_empty() {
            warn!("SQLite loader received an empty table; nothing written");
            return Ok(());
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut conn = Connection::open(&self.path)?;
        let target = quote_ident(&self.table_name);
        let column_list = table.columns().iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");

        let tx = conn.transaction()?;
        match request.mode {
            WriteMode::Replace => {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", target))?;
                tx.execute_batch(&format!("CREATE TABLE {} ({})", target, column_list))?;
            }
            WriteMode::Append => {
                tx.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {} ({})", target, column_list))?;
            }
            WriteMode::Fail => {
                if Self::table_exists(&tx, &self.table_name)? {
                    return Err(PipelineError::Load {
                        loader: self.name().to_string(),
                        message: format!("table '{}' already exists", self.table_name),
                    });
                }
                tx.execute_batch(&format!("CREATE TABLE {} ({})", target, column_list))?;
            }
        }

        {
            let placeholders = vec!["?"; table.columns().len()].join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                target, column_list, placeholders
            ))?;
            for row in table.rows() {
                stmt.execute(params_from_iter(table.columns().iter().map(|c| to_sql(row.get(c)))))?;
            }
        }
        tx.commit()?;

        info!(
            "💾 Wrote {} rows to table '{}' in {} (mode={})",
            table.len(),
            self.table_name,
            self.path.display(),
            request.mode
        );
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => SqlValue::Real(*n),
        other => SqlValue::Text(other.to_string()),
    }
}
