use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::ports::Extractor;
use crate::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::error::Result;
use crate::table::{ExtractedTable, Record, Table, Value};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static HEADER_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static DATA_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

/// Turns a fetched HTML page into a table
pub trait TableParser: Send + Sync {
    fn parse(&self, html: &str, source_url: &str) -> Table;
}

/// Reads the first `<table>` on the page: `<th>` cells become the header,
/// each `<tr>` with `<td>` cells becomes a row.
pub struct FirstTableParser;

impl TableParser for FirstTableParser {
    fn parse(&self, html: &str, source_url: &str) -> Table {
        let document = Html::parse_document(html);
        let Some(table) = document.select(&TABLE).next() else {
            warn!("No <table> found at {}", source_url);
            return Table::default();
        };

        let headers: Vec<String> = table.select(&HEADER_CELL).map(cell_text).collect();
        let mut parsed = Table::new(headers.clone());

        for tr in table.select(&ROW) {
            let cells: Vec<String> = tr.select(&DATA_CELL).map(cell_text).collect();
            if cells.is_empty() {
                continue;
            }
            let record = cells
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    let column = headers.get(i).cloned().unwrap_or_else(|| format!("column_{}", i));
                    (column, Value::Str(text))
                })
                .collect::<Record>();
            parsed.push(record);
        }

        if parsed.is_empty() {
            warn!("Table found at {} but contains no rows", source_url);
        }
        parsed
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Fetches a static HTML page and hands it to a [`TableParser`].
pub struct WebTableExtractor {
    name: String,
    url: String,
    client: reqwest::Client,
    parser: Box<dyn TableParser>,
}

impl WebTableExtractor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        Self::with_parser(name, url, DEFAULT_REQUEST_TIMEOUT_SECS, Box::new(FirstTableParser))
    }

    pub fn with_parser(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout_secs: u64,
        parser: Box<dyn TableParser>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
            parser,
        })
    }
}

#[async_trait]
impl Extractor for WebTableExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<ExtractedTable> {
        debug!("GET {}", self.url);
        let html = self.client.get(&self.url).send().await?.error_for_status()?.text().await?;
        let table = self.parser.parse(&html, &self.url);
        info!("🕸️ Parsed {} rows from {}", table.len(), self.url);
        Ok(ExtractedTable::new(table, self.url.clone()))
    }
}
