// Pipeline processing: cleaning, merging, and validation gates

pub mod cleaner;
pub mod column_type;
pub mod id_validator;
pub mod mapper;
pub mod schema_validator;
pub mod validation;

// Re-export key types and functions
pub use cleaner::{clean, CleanReport, CleaningRules, ColumnRule};
pub use column_type::ColumnType;
pub use id_validator::{validate_ids, IdValidator};
pub use mapper::{merge, JoinMode, MasterColumn, MasterMapping, Side};
pub use schema_validator::{validate_schema, SchemaValidator};
pub use validation::{ValidationResult, Validator, Violation};
