use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::ports::{LoadRequest, Loader, WriteMode};
use crate::error::{PipelineError, Result};

/// Writes the master table to `<prefix>_YYYYMMDD_HHMMSS.csv`, stamped with
/// the run's `processed_at`.
pub struct CsvLoader {
    output_dir: PathBuf,
    prefix: String,
}

impl CsvLoader {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Newest file written for this prefix, if any
    pub fn latest_file(&self) -> Result<Option<PathBuf>> {
        if !self.output_dir.exists() {
            return Ok(None);
        }
        let stem = format!("{}_", self.prefix);
        let mut newest: Option<PathBuf> = None;
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&stem) && n.ends_with(".csv"))
                .unwrap_or(false);
            // Timestamped names sort chronologically
            if matches && newest.as_ref().map_or(true, |current| path > *current) {
                newest = Some(path);
            }
        }
        Ok(newest)
    }
}

#[async_trait]
impl Loader for CsvLoader {
    fn name(&self) -> &str {
        "csv"
    }

    async fn load(&self, request: LoadRequest<'_>) -> Result<()> {
        let table = request.table;
        if table.is_empty() {
            warn!("CSV loader received an empty table; nothing written");
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir)?;
        let file_name = format!("{}_{}.csv", self.prefix, request.run_id.format("%Y%m%d_%H%M%S"));
        let path = self.output_dir.join(file_name);
        let exists = path.exists();

        if exists && request.mode == WriteMode::Fail {
            return Err(PipelineError::Load {
                loader: self.name().to_string(),
                message: format!("{} already exists", path.display()),
            });
        }

        let append = exists && request.mode == WriteMode::Append;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        let mut writer = csv::Writer::from_writer(file);

        if !append {
            writer.write_record(table.columns())?;
        }
        for row in table.rows() {
            writer.write_record(table.columns().iter().map(|c| row.get(c).to_string()))?;
        }
        writer.flush()?;

        info!("💾 Wrote {} rows to {}", table.len(), path.display());
        Ok(())
    }
}
