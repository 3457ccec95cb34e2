use tracing::warn;

use crate::app::ports::{Extractor, Loader};
use crate::config::{ExtractorConfig, LoaderConfig};
use crate::error::Result;
use crate::table::Table;

use super::api_extractor::ApiExtractor;
use super::csv_loader::CsvLoader;
use super::ndjson_loader::NdjsonLoader;
use super::sqlite_extractor::SqliteExtractor;
use super::sqlite_loader::SqliteLoader;
use super::static_extractor::StaticExtractor;
use super::web_table_extractor::{FirstTableParser, WebTableExtractor};
use crate::constants::SAMPLE_SOURCE_URL;

/// Build the extractor described by `config`. `sample` supplies the table
/// used for [`ExtractorConfig::Sample`].
pub fn build_extractor(name: &str, config: &ExtractorConfig, sample: fn() -> Table) -> Result<Box<dyn Extractor>> {
    let extractor: Box<dyn Extractor> = match config {
        ExtractorConfig::Sample => Box::new(StaticExtractor::new(name, SAMPLE_SOURCE_URL, sample())),
        ExtractorConfig::Api {
            url,
            page_size,
            token_env,
            timeout_secs,
            max_pages,
        } => {
            let token = token_env.as_deref().and_then(|var| match std::env::var(var) {
                Ok(token) => Some(token),
                Err(_) => {
                    warn!("Token variable '{}' is not set; calling {} without auth", var, url);
                    None
                }
            });
            Box::new(
                ApiExtractor::with_options(name, url.as_str(), token, *page_size, *timeout_secs)?
                    .with_max_pages(*max_pages),
            )
        }
        ExtractorConfig::Web { url, timeout_secs } => Box::new(WebTableExtractor::with_parser(
            name,
            url.as_str(),
            *timeout_secs,
            Box::new(FirstTableParser),
        )?),
        ExtractorConfig::Sqlite { path, query } => Box::new(SqliteExtractor::new(name, path, query.as_str())),
    };
    Ok(extractor)
}

/// Build loaders in configuration order
pub fn build_loaders(configs: &[LoaderConfig]) -> Vec<Box<dyn Loader>> {
    configs
        .iter()
        .map(|config| -> Box<dyn Loader> {
            match config {
                LoaderConfig::Csv { output_dir, prefix } => Box::new(CsvLoader::new(output_dir, prefix.as_str())),
                LoaderConfig::Sqlite { path, table } => Box::new(SqliteLoader::new(path, table.as_str())),
                LoaderConfig::Ndjson { path } => Box::new(NdjsonLoader::new(path)),
            }
        })
        .collect()
}
