//! Stage metrics for the gift pipeline
//!
//! Thin wrappers over the `metrics` facade. Recording is a no-op until the
//! host process installs a recorder; the library never installs one.

use std::fmt;

/// Every metric name emitted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Extract
    ExtractRows,
    ExtractError,

    // Cleaner
    CleanerRowsIn,
    CleanerRowsOut,
    CleanerRowsDropped,

    // Mapper
    MapperRowsOut,
    MapperSchemaMismatch,

    // Validators
    ValidationPassed,
    ValidationFailed,
    ValidationViolations,

    // Loaders
    LoadSuccess,
    LoadError,
    LoadRows,

    // Run
    RunComplete,
    RunFailed,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ExtractRows => "gift_pipeline_extract_rows_total",
            MetricName::ExtractError => "gift_pipeline_extract_error_total",

            MetricName::CleanerRowsIn => "gift_pipeline_cleaner_rows_in_total",
            MetricName::CleanerRowsOut => "gift_pipeline_cleaner_rows_out_total",
            MetricName::CleanerRowsDropped => "gift_pipeline_cleaner_rows_dropped_total",

            MetricName::MapperRowsOut => "gift_pipeline_mapper_rows_out_total",
            MetricName::MapperSchemaMismatch => "gift_pipeline_mapper_schema_mismatch_total",

            MetricName::ValidationPassed => "gift_pipeline_validation_passed_total",
            MetricName::ValidationFailed => "gift_pipeline_validation_failed_total",
            MetricName::ValidationViolations => "gift_pipeline_validation_violations_total",

            MetricName::LoadSuccess => "gift_pipeline_load_success_total",
            MetricName::LoadError => "gift_pipeline_load_error_total",
            MetricName::LoadRows => "gift_pipeline_load_rows_total",

            MetricName::RunComplete => "gift_pipeline_run_complete_total",
            MetricName::RunFailed => "gift_pipeline_run_failed_total",
            MetricName::RunDuration => "gift_pipeline_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Extract Metrics
// ============================================================================

pub mod extract {
    use super::MetricName;

    /// Record rows returned by an extractor
    pub fn rows_extracted(source: &str, rows: usize) {
        ::metrics::counter!(MetricName::ExtractRows.as_str(), "source" => source.to_string())
            .increment(rows as u64);
    }

    /// Record a failed extraction
    pub fn extract_error(source: &str) {
        ::metrics::counter!(MetricName::ExtractError.as_str(), "source" => source.to_string()).increment(1);
    }
}

// ============================================================================
// Cleaner Metrics
// ============================================================================

pub mod cleaner {
    use super::MetricName;
    use crate::pipeline::processing::cleaner::CleanReport;

    /// Record the row accounting of one `clean` call
    pub fn report_recorded(report: &CleanReport) {
        ::metrics::counter!(MetricName::CleanerRowsIn.as_str()).increment(report.rows_in as u64);
        ::metrics::counter!(MetricName::CleanerRowsOut.as_str()).increment(report.rows_out as u64);

        for (reason, count) in [
            ("null", report.dropped_null),
            ("duplicate", report.dropped_duplicate),
            ("coercion", report.dropped_coercion),
        ] {
            if count > 0 {
                ::metrics::counter!(MetricName::CleanerRowsDropped.as_str(), "reason" => reason)
                    .increment(count as u64);
            }
        }
    }
}

// ============================================================================
// Mapper Metrics
// ============================================================================

pub mod mapper {
    use super::MetricName;

    pub fn rows_merged(rows: usize) {
        ::metrics::counter!(MetricName::MapperRowsOut.as_str()).increment(rows as u64);
    }

    pub fn schema_mismatch() {
        ::metrics::counter!(MetricName::MapperSchemaMismatch.as_str()).increment(1);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validation {
    use super::MetricName;
    use crate::pipeline::processing::validation::ValidationResult;

    /// Record the outcome of one validation gate
    pub fn result_recorded(result: &ValidationResult) {
        let validator = result.validator.clone();
        if result.passed() {
            ::metrics::counter!(MetricName::ValidationPassed.as_str(), "validator" => validator).increment(1);
        } else {
            ::metrics::counter!(MetricName::ValidationFailed.as_str(), "validator" => validator.clone())
                .increment(1);
            ::metrics::counter!(MetricName::ValidationViolations.as_str(), "validator" => validator)
                .increment(result.violations.len() as u64);
        }
    }
}

// ============================================================================
// Load Metrics
// ============================================================================

pub mod load {
    use super::MetricName;

    pub fn load_success(loader: &str, rows: usize) {
        ::metrics::counter!(MetricName::LoadSuccess.as_str(), "loader" => loader.to_string()).increment(1);
        ::metrics::counter!(MetricName::LoadRows.as_str(), "loader" => loader.to_string()).increment(rows as u64);
    }

    pub fn load_error(loader: &str) {
        ::metrics::counter!(MetricName::LoadError.as_str(), "loader" => loader.to_string()).increment(1);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn run_complete(duration_secs: f64) {
        ::metrics::counter!(MetricName::RunComplete.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(duration_secs);
    }

    /// Record a failed run, labelled by the stage that failed
    pub fn run_failed(stage: &str, duration_secs: f64) {
        ::metrics::counter!(MetricName::RunFailed.as_str(), "stage" => stage.to_string()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(duration_secs);
    }
}
