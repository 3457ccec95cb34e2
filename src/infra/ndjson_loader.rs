use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::{LoadRequest, Loader, WriteMode};
use crate::error::{PipelineError, Result};

/// File-based loader writing one JSON object per master row
pub struct NdjsonLoader {
    file_path: PathBuf,
}

impl NdjsonLoader {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl Loader for NdjsonLoader {
    fn name(&self) -> &str {
        "ndjson"
    }

    async fn load(&self, request: LoadRequest<'_>) -> Result<()> {
        if request.table.is_empty() {
            info!("NDJSON loader received an empty table; nothing written");
            return Ok(());
        }
        if request.mode == WriteMode::Fail && self.file_path.exists() {
            return Err(PipelineError::Load {
                loader: self.name().to_string(),
                message: format!("{} already exists", self.file_path.display()),
            });
        }

        let dir = self.file_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let append = request.mode == WriteMode::Append;
        let mut writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&self.file_path)?,
        );

        for row in request.table.rows() {
            let json_line = serde_json::to_string(row)?;
            writeln!(writer, "{}", json_line)?;
        }
        writer.flush()?;

        info!("📝 Wrote {} rows to {}", request.table.len(), self.file_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Record, Table, Value};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn master() -> Table {
        Table::from_records(vec![Record::new()
            .with("id", "G001")
            .with("amount", 500.0)
            .with("date", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
            .with("status", Value::Null)])
    }

    #[tokio::test]
    async fn writes_one_object_per_row() {
        let dir = TempDir::new().unwrap();
        let loader = NdjsonLoader::new(dir.path().join("out/master.ndjson"));
        let table = master();
        loader
            .load(LoadRequest { table: &table, run_id: Utc::now(), mode: WriteMode::Replace })
            .await
            .unwrap();

        let content = std::fs::read_to_string(loader.file_path()).unwrap();
        assert_eq!(
            content,
            "{\"id\":\"G001\",\"amount\":500.0,\"date\":\"2024-01-15\",\"status\":null}\n"
        );
    }

    #[tokio::test]
    async fn append_keeps_previous_lines() {
        let dir = TempDir::new().unwrap();
        let loader = NdjsonLoader::new(dir.path().join("master.ndjson"));
        let table = master();
        for _ in 0..2 {
            loader
                .load(LoadRequest { table: &table, run_id: Utc::now(), mode: WriteMode::Append })
                .await
                .unwrap();
        }
        let content = std::fs::read_to_string(loader.file_path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
