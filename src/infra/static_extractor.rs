use async_trait::async_trait;
use tracing::info;

use crate::app::ports::Extractor;
use crate::error::Result;
use crate::table::{ExtractedTable, Table};

/// Returns a fixed in-memory table. Used for fixtures and dry runs.
pub struct StaticExtractor {
    name: String,
    source_url: String,
    table: Table,
}

impl StaticExtractor {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            table,
        }
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<ExtractedTable> {
        info!("📦 Static source '{}' yields {} rows", self.name, self.table.len());
        Ok(ExtractedTable::new(self.table.clone(), self.source_url.clone()))
    }
}
