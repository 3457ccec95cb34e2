use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::app::ports::WriteMode;
use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::{CleaningRules, ColumnRule, ColumnType, JoinMode, MasterMapping};

/// Everything a run needs, read once and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub join_key: String,
    pub join_mode: JoinMode,
    pub mapping: MasterMapping,
    pub beneficiary_rules: CleaningRules,
    pub gift_rules: CleaningRules,
    pub required_columns: Vec<String>,
    pub column_types: BTreeMap<String, ColumnType>,
    pub primary_key: String,
    pub write_mode: WriteMode,
    pub sources: SourcesConfig,
    pub loaders: Vec<LoaderConfig>,
    pub log_dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub beneficiaries: ExtractorConfig,
    pub gifts: ExtractorConfig,
}

/// Where one input table comes from
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractorConfig {
    /// Built-in sample records
    #[default]
    Sample,
    /// Paginated JSON REST endpoint
    Api {
        url: String,
        #[serde(default = "default_page_size")]
        page_size: usize,
        /// Environment variable holding a bearer token
        token_env: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Stop after this many pages even if the server keeps returning full pages
        #[serde(default)]
        max_pages: Option<usize>,
    },
    /// First HTML table on a static page
    Web {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Sqlite { path: String, query: String },
}

/// Where the validated master table is written
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoaderConfig {
    Csv {
        #[serde(default = "default_output_dir")]
        output_dir: String,
        #[serde(default = "default_table_name")]
        prefix: String,
    },
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: String,
        #[serde(default = "default_table_name")]
        table: String,
    },
    Ndjson { path: String },
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_sqlite_path() -> String {
    DEFAULT_SQLITE_PATH.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let beneficiary_rules = CleaningRules {
            normalize_column_names: true,
            trim_strings: true,
            ..Default::default()
        }
        .rule(
            BENEFICIARY_JOIN_KEY,
            ColumnRule {
                drop_row_if_null: true,
                empty_as_null: true,
                ..Default::default()
            },
        )
        .dedup_on(&[BENEFICIARY_JOIN_KEY]);

        let gift_rules = CleaningRules {
            normalize_column_names: true,
            trim_strings: true,
            ..Default::default()
        }
        .rule(
            GIFT_AMOUNT,
            ColumnRule {
                coerce: Some(ColumnType::Number),
                ..Default::default()
            },
        )
        .rule(
            GIFT_DATE,
            ColumnRule {
                coerce: Some(ColumnType::Date),
                ..Default::default()
            },
        );

        Self {
            join_key: BENEFICIARY_JOIN_KEY.to_string(),
            join_mode: JoinMode::Left,
            mapping: MasterMapping::default(),
            beneficiary_rules,
            gift_rules,
            required_columns: [COL_ID, COL_BENEFICIARY_NAME, COL_GIFT_TYPE, COL_AMOUNT]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            column_types: [(COL_AMOUNT, ColumnType::Number), (COL_DATE, ColumnType::Date)]
                .iter()
                .map(|(c, t)| (c.to_string(), *t))
                .collect(),
            primary_key: COL_ID.to_string(),
            write_mode: WriteMode::Replace,
            sources: SourcesConfig::default(),
            loaders: vec![
                LoaderConfig::Csv {
                    output_dir: default_output_dir(),
                    prefix: default_table_name(),
                },
                LoaderConfig::Sqlite {
                    path: default_sqlite_path(),
                    table: default_table_name(),
                },
            ],
            log_dir: "logs".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.join_key.trim().is_empty() {
            return Err(PipelineError::Config("join_key must not be empty".to_string()));
        }
        if self.primary_key.trim().is_empty() {
            return Err(PipelineError::Config("primary_key must not be empty".to_string()));
        }

        for (table, rules) in [("beneficiary", &self.beneficiary_rules), ("gift", &self.gift_rules)] {
            if let Some(threshold) = rules.drop_na_threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(PipelineError::Config(format!(
                        "{}_rules.drop_na_threshold must be between 0 and 1, got {}",
                        table, threshold
                    )));
                }
            }
        }

        let master = self.mapping.output_columns();
        let mut seen = HashSet::new();
        for column in &master {
            if !seen.insert(column.as_str()) {
                return Err(PipelineError::Config(format!(
                    "master column '{}' is mapped more than once",
                    column
                )));
            }
        }

        let not_in_master = |column: &String| !seen.contains(column.as_str());
        if let Some(column) = self.required_columns.iter().find(|c| not_in_master(*c)) {
            return Err(PipelineError::Config(format!(
                "required column '{}' is not produced by the master mapping",
                column
            )));
        }
        if let Some(column) = self.column_types.keys().find(|c| not_in_master(*c)) {
            return Err(PipelineError::Config(format!(
                "typed column '{}' is not produced by the master mapping",
                column
            )));
        }
        if not_in_master(&self.primary_key) {
            return Err(PipelineError::Config(format!(
                "primary key '{}' is not produced by the master mapping",
                self.primary_key
            )));
        }
        Ok(())
    }
}
