// Infrastructure adapters: extractors, loaders, and their construction from config

pub mod api_extractor;
pub mod csv_loader;
pub mod factory;
pub mod ndjson_loader;
pub mod sample_data;
pub mod sqlite_extractor;
pub mod sqlite_loader;
pub mod static_extractor;
pub mod web_table_extractor;

pub use api_extractor::ApiExtractor;
pub use csv_loader::CsvLoader;
pub use factory::{build_extractor, build_loaders};
pub use ndjson_loader::NdjsonLoader;
pub use sqlite_extractor::SqliteExtractor;
pub use sqlite_loader::SqliteLoader;
pub use static_extractor::StaticExtractor;
pub use web_table_extractor::{FirstTableParser, TableParser, WebTableExtractor};
