//! Column name constants for the master table and its two source entities.
//! These keep the default projection, validators and loaders in agreement.

// Master table columns
pub const COL_ID: &str = "id";
pub const COL_BENEFICIARY_NAME: &str = "beneficiary_name";
pub const COL_GIFT_TYPE: &str = "gift_type";
pub const COL_AMOUNT: &str = "amount";
pub const COL_DATE: &str = "date";
pub const COL_STATUS: &str = "status";
pub const COL_SOURCE_URL: &str = "source_url";
pub const COL_PROCESSED_AT: &str = "processed_at";

/// Master table columns in output order
pub const MASTER_COLUMNS: [&str; 8] = [
    COL_ID,
    COL_BENEFICIARY_NAME,
    COL_GIFT_TYPE,
    COL_AMOUNT,
    COL_DATE,
    COL_STATUS,
    COL_SOURCE_URL,
    COL_PROCESSED_AT,
];

// Source entity columns
pub const BENEFICIARY_JOIN_KEY: &str = "beneficiary_id";
pub const BENEFICIARY_NAME: &str = "name";
pub const BENEFICIARY_STATUS: &str = "status";
pub const GIFT_ID: &str = "gift_id";
pub const GIFT_TYPE: &str = "type";
pub const GIFT_AMOUNT: &str = "amount";
pub const GIFT_DATE: &str = "date";

// Loader and extractor defaults
pub const DEFAULT_TABLE_NAME: &str = "master_table";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_SQLITE_PATH: &str = "etl_output.db";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const SAMPLE_SOURCE_URL: &str = "https://example.com";
