use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::app::ports::{Extractor, LoadRequest, Loader};
use crate::config::PipelineConfig;
use crate::constants::COL_PROCESSED_AT;
use crate::error::{PipelineError, Result};
use crate::infra::{build_extractor, build_loaders, sample_data};
use crate::observability::metrics;
use crate::pipeline::processing::{
    clean, merge, CleanReport, IdValidator, SchemaValidator, ValidationResult, Validator,
};
use crate::table::{Table, Value};

/// Lifecycle of one run. Only ever moves forward; `Failed` is reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Extracting,
    Cleaning,
    Mapping,
    SchemaCheck,
    IdCheck,
    Loading,
    Complete,
    Failed,
}

impl RunState {
    /// Successor on success, `None` for terminal states
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Pending => Some(RunState::Extracting),
            RunState::Extracting => Some(RunState::Cleaning),
            RunState::Cleaning => Some(RunState::Mapping),
            RunState::Mapping => Some(RunState::SchemaCheck),
            RunState::SchemaCheck => Some(RunState::IdCheck),
            RunState::IdCheck => Some(RunState::Loading),
            RunState::Loading => Some(RunState::Complete),
            RunState::Complete | RunState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Pending => "PENDING",
            RunState::Extracting => "EXTRACTING",
            RunState::Cleaning => "CLEANING",
            RunState::Mapping => "MAPPING",
            RunState::SchemaCheck => "SCHEMA_CHECK",
            RunState::IdCheck => "ID_CHECK",
            RunState::Loading => "LOADING",
            RunState::Complete => "COMPLETE",
            RunState::Failed => "FAILED",
        })
    }
}

/// Records processed so far in the current run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub beneficiaries_extracted: usize,
    pub gifts_extracted: usize,
    pub beneficiaries_cleaned: usize,
    pub gifts_cleaned: usize,
    pub master_rows: usize,
    pub rows_loaded: usize,
}

/// Outcome of one completed stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage: RunState,
    pub rows_in: usize,
    pub rows_out: usize,
    pub message: String,
}

/// Why a run ended in `FAILED`
#[derive(Debug, Error)]
#[error("stage {stage} failed: {error}")]
pub struct StageFailure {
    pub stage: RunState,
    #[source]
    pub error: PipelineError,
    pub counts: RecordCounts,
}

/// Everything observed during one run
#[derive(Debug)]
pub struct RunReport {
    /// Every state entered, in order, starting with `PENDING`
    pub states: Vec<RunState>,
    pub stage_results: Vec<StageResult>,
    pub beneficiary_clean: Option<CleanReport>,
    pub gift_clean: Option<CleanReport>,
    pub validations: Vec<ValidationResult>,
    /// Run identifier; set once after mapping
    pub processed_at: Option<DateTime<Utc>>,
    /// Master table as of the last stage reached
    pub master: Option<Table>,
    pub counts: RecordCounts,
    pub failure: Option<StageFailure>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            states: vec![RunState::Pending],
            stage_results: Vec::new(),
            beneficiary_clean: None,
            gift_clean: None,
            validations: Vec::new(),
            processed_at: None,
            master: None,
            counts: RecordCounts::default(),
            failure: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Pending)
    }

    pub fn is_success(&self) -> bool {
        self.state() == RunState::Complete
    }

    /// Move to the next state in the sequence
    fn advance(&mut self) -> RunState {
        let next = self.state().next().unwrap_or(RunState::Failed);
        info!("➡️ {} -> {}", self.state(), next);
        self.states.push(next);
        next
    }

    fn stage_done(&mut self, rows_in: usize, rows_out: usize, message: String) {
        info!("✅ {} completed: {}", self.state(), message);
        self.stage_results.push(StageResult {
            stage: self.state(),
            rows_in,
            rows_out,
            message,
        });
    }

    fn fail(&mut self, error: PipelineError) {
        let stage = self.state();
        error!("❌ Stage {} failed: {}", stage, error);
        self.failure = Some(StageFailure {
            stage,
            error,
            counts: self.counts.clone(),
        });
        self.states.push(RunState::Failed);
    }
}

/// Drives one Extract, Clean, Map, Validate, Load run over two sources.
///
/// Holds no state between runs; each call to [`Orchestrator::run`] starts
/// from `PENDING`.
pub struct Orchestrator {
    config: PipelineConfig,
    beneficiaries: Box<dyn Extractor>,
    gifts: Box<dyn Extractor>,
    loaders: Vec<Box<dyn Loader>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        beneficiaries: Box<dyn Extractor>,
        gifts: Box<dyn Extractor>,
        loaders: Vec<Box<dyn Loader>>,
    ) -> Self {
        Self {
            config,
            beneficiaries,
            gifts,
            loaders,
        }
    }

    /// Wire extractors and loaders from the configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let beneficiaries = build_extractor(
            "beneficiaries",
            &config.sources.beneficiaries,
            sample_data::sample_beneficiaries,
        )?;
        let gifts = build_extractor("gifts", &config.sources.gifts, sample_data::sample_gifts)?;
        let loaders = build_loaders(&config.loaders);
        Ok(Self::new(config, beneficiaries, gifts, loaders))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run. Failures are captured in the report, never raised.
    #[instrument(skip(self), fields(join_key = %self.config.join_key, join_mode = %self.config.join_mode))]
    pub async fn run(&self) -> RunReport {
        info!("🚀 Starting pipeline run");
        let started = Instant::now();
        let mut report = RunReport::new();

        match self.execute(&mut report).await {
            Ok(()) => {
                report.advance();
                metrics::run::run_complete(started.elapsed().as_secs_f64());
                info!(
                    "🎉 Pipeline completed: {} master rows loaded into {} destination(s)",
                    report.counts.rows_loaded,
                    self.loaders.len()
                );
            }
            Err(e) => {
                report.fail(e);
                let stage = report.failure.as_ref().map_or(RunState::Failed, |f| f.stage);
                metrics::run::run_failed(&stage.to_string(), started.elapsed().as_secs_f64());
                error!("💥 Pipeline failed after {:?}", started.elapsed());
            }
        }

        report.completed_at = Some(Utc::now());
        report
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        report.advance();
        let (beneficiaries, gifts) = self.extract_stage(report).await?;

        report.advance();
        let (beneficiaries, gifts) = self.clean_stage(report, &beneficiaries, &gifts);

        report.advance();
        self.map_stage(report, &beneficiaries, &gifts)?;

        report.advance();
        self.gate_stage(
            report,
            &SchemaValidator::new(self.config.required_columns.clone(), self.config.column_types.clone()),
            PipelineError::SchemaViolation,
        )?;

        report.advance();
        self.gate_stage(
            report,
            &IdValidator::new(self.config.primary_key.clone()),
            PipelineError::IdentityViolation,
        )?;

        report.advance();
        self.load_stage(report).await
    }

    #[instrument(skip_all)]
    async fn extract_stage(&self, report: &mut RunReport) -> Result<(Table, Table)> {
        let beneficiaries = extract_one(&*self.beneficiaries).await?;
        report.counts.beneficiaries_extracted = beneficiaries.len();

        let gifts = extract_one(&*self.gifts).await?;
        report.counts.gifts_extracted = gifts.len();

        let rows = beneficiaries.len() + gifts.len();
        report.stage_done(
            0,
            rows,
            format!("{} beneficiary rows, {} gift rows", beneficiaries.len(), gifts.len()),
        );
        Ok((beneficiaries, gifts))
    }

    #[instrument(skip_all)]
    fn clean_stage(&self, report: &mut RunReport, beneficiaries: &Table, gifts: &Table) -> (Table, Table) {
        let (beneficiaries, b_report) = clean(beneficiaries, &self.config.beneficiary_rules);
        let (gifts, g_report) = clean(gifts, &self.config.gift_rules);

        report.counts.beneficiaries_cleaned = beneficiaries.len();
        report.counts.gifts_cleaned = gifts.len();
        let rows_in = b_report.rows_in + g_report.rows_in;
        let rows_out = b_report.rows_out + g_report.rows_out;
        let message = format!(
            "beneficiaries {} -> {}, gifts {} -> {}",
            b_report.rows_in, b_report.rows_out, g_report.rows_in, g_report.rows_out
        );
        report.beneficiary_clean = Some(b_report);
        report.gift_clean = Some(g_report);
        report.stage_done(rows_in, rows_out, message);
        (beneficiaries, gifts)
    }

    /// Merge, then stamp the run's `processed_at` on every master row
    #[instrument(skip_all)]
    fn map_stage(&self, report: &mut RunReport, beneficiaries: &Table, gifts: &Table) -> Result<()> {
        let mut master = merge(
            beneficiaries,
            gifts,
            &self.config.join_key,
            self.config.join_mode,
            &self.config.mapping,
        )
        .map_err(|e| {
            if matches!(e, PipelineError::SchemaMismatch { .. }) {
                metrics::mapper::schema_mismatch();
            }
            e
        })?;
        metrics::mapper::rows_merged(master.len());

        let processed_at = Utc::now();
        master.fill_column(COL_PROCESSED_AT, &Value::DateTime(processed_at));
        report.processed_at = Some(processed_at);
        report.counts.master_rows = master.len();

        let rows_in = beneficiaries.len() + gifts.len();
        let rows_out = master.len();
        report.master = Some(master);
        report.stage_done(
            rows_in,
            rows_out,
            format!("{} master rows (join={}), processed_at={}", rows_out, self.config.join_mode, processed_at.to_rfc3339()),
        );
        Ok(())
    }

    #[instrument(skip_all, fields(validator = validator.name()))]
    fn gate_stage(
        &self,
        report: &mut RunReport,
        validator: &dyn Validator,
        on_failure: fn(ValidationResult) -> PipelineError,
    ) -> Result<()> {
        let master = report.master.as_ref().ok_or_else(|| missing_master(report.state()))?;
        let result = validator.validate(master);
        metrics::validation::result_recorded(&result);
        report.validations.push(result.clone());

        if !result.passed() {
            warn!(
                "🚫 {} gate rejected the master table: offending rows {:?}",
                validator.name(),
                result.offending_rows()
            );
            return Err(on_failure(result));
        }

        let rows = result.rows_checked;
        report.stage_done(rows, rows, format!("{} gate passed", validator.name()));
        Ok(())
    }

    #[instrument(skip_all)]
    async fn load_stage(&self, report: &mut RunReport) -> Result<()> {
        let state = report.state();
        let master = report.master.as_ref().ok_or_else(|| missing_master(state))?;
        let run_id = report.processed_at.ok_or_else(|| missing_master(state))?;
        let request = LoadRequest {
            table: master,
            run_id,
            mode: self.config.write_mode,
        };

        for loader in &self.loaders {
            if let Err(e) = loader.load(request).await {
                metrics::load::load_error(loader.name());
                error!("❌ Loader '{}' failed: {}", loader.name(), e);
                return Err(e);
            }
            metrics::load::load_success(loader.name(), master.len());
        }

        let rows = master.len();
        report.counts.rows_loaded = rows;
        report.stage_done(rows, rows, format!("loaded into {} destination(s)", self.loaders.len()));
        Ok(())
    }
}

async fn extract_one(extractor: &dyn Extractor) -> Result<Table> {
    match extractor.extract().await {
        Ok(extracted) => {
            metrics::extract::rows_extracted(extractor.name(), extracted.table.len());
            info!(
                "📥 '{}' extracted {} rows from {}",
                extractor.name(),
                extracted.table.len(),
                extracted.metadata.source_url
            );
            Ok(extracted.into_table_with_provenance())
        }
        Err(e) => {
            metrics::extract::extract_error(extractor.name());
            error!("Extractor '{}' failed: {}", extractor.name(), e);
            Err(e)
        }
    }
}

fn missing_master(state: RunState) -> PipelineError {
    PipelineError::Config(format!("no master table available in {}", state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::StaticExtractor;
    use crate::pipeline::processing::{CleaningRules, JoinMode, Violation};
    use crate::table::{ExtractedTable, Record};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingLoader {
        calls: Arc<Mutex<Vec<(usize, DateTime<Utc>)>>>,
        fail: bool,
    }

    #[async_trait]
    impl Loader for RecordingLoader {
        fn name(&self) -> &str {
            "recording"
        }

        async fn load(&self, request: LoadRequest<'_>) -> Result<()> {
            self.calls.lock().unwrap().push((request.table.len(), request.run_id));
            if self.fail {
                return Err(PipelineError::Load {
                    loader: "recording".to_string(),
                    message: "disk full".to_string(),
                });
            }
            Ok(())
        }
    }

    struct BrokenExtractor;

    #[async_trait]
    impl Extractor for BrokenExtractor {
        fn name(&self) -> &str {
            "broken"
        }

        async fn extract(&self) -> Result<ExtractedTable> {
            Err(PipelineError::Extract {
                source_name: "broken".to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn beneficiaries() -> Table {
        Table::from_records(vec![Record::new()
            .with("beneficiary_id", "B1")
            .with("name", "  Alice ")
            .with("status", "active")])
    }

    fn gift(id: &str, beneficiary: &str) -> Record {
        Record::new()
            .with("gift_id", id)
            .with("beneficiary_id", beneficiary)
            .with("type", "Cash")
            .with("amount", "100")
            .with("date", "2024-01-01")
    }

    fn orchestrator(config: PipelineConfig, gifts: Table, loader: RecordingLoader) -> Orchestrator {
        Orchestrator::new(
            config,
            Box::new(StaticExtractor::new("beneficiaries", "https://example.com/b", beneficiaries())),
            Box::new(StaticExtractor::new("gifts", "https://example.com/g", gifts)),
            vec![Box::new(loader)],
        )
    }

    #[tokio::test]
    async fn successful_run_walks_every_state_and_loads_once() {
        let loader = RecordingLoader::default();
        let gifts = Table::from_records(vec![gift("G1", "B1"), gift("G2", "B9")]);
        let report = orchestrator(PipelineConfig::default(), gifts, loader.clone()).run().await;

        assert!(report.is_success(), "{:?}", report.failure);
        assert_eq!(
            report.states,
            vec![
                RunState::Pending,
                RunState::Extracting,
                RunState::Cleaning,
                RunState::Mapping,
                RunState::SchemaCheck,
                RunState::IdCheck,
                RunState::Loading,
                RunState::Complete,
            ]
        );

        let master = report.master.as_ref().unwrap();
        assert_eq!(master.len(), 2);
        assert_eq!(master.rows()[0].get("beneficiary_name"), &Value::from("Alice"));
        assert_eq!(master.rows()[0].get("amount"), &Value::Number(100.0));
        assert_eq!(master.rows()[0].get("source_url"), &Value::from("https://example.com/g"));

        let calls = loader.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (2, report.processed_at.unwrap()));
    }

    #[tokio::test]
    async fn processed_at_is_uniform_across_rows() {
        let gifts = Table::from_records((0..50).map(|i| gift(&format!("G{}", i), "B1")).collect());
        let report = orchestrator(PipelineConfig::default(), gifts, RecordingLoader::default()).run().await;

        let stamp = Value::DateTime(report.processed_at.unwrap());
        let master = report.master.unwrap();
        assert_eq!(master.len(), 50);
        assert!(master.rows().iter().all(|r| r.get("processed_at") == &stamp));
    }

    #[tokio::test]
    async fn duplicate_ids_stop_the_run_before_loading() {
        let loader = RecordingLoader::default();
        let mut second = gift("G1", "B1");
        second.set("amount", "250");
        let gifts = Table::from_records(vec![gift("G1", "B1"), second]);
        let report = orchestrator(PipelineConfig::default(), gifts, loader.clone()).run().await;

        assert_eq!(report.state(), RunState::Failed);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, RunState::IdCheck);
        assert_eq!(failure.error.violations().unwrap().offending_rows(), vec![0, 1]);
        assert_eq!(failure.counts.master_rows, 2);
        assert!(loader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_violation_fails_schema_check() {
        let config = PipelineConfig {
            gift_rules: CleaningRules::default(),
            ..PipelineConfig::default()
        };
        let mut bad = gift("G2", "B1");
        bad.set("amount", "ten");
        let gifts = Table::from_records(vec![gift("G1", "B1"), bad]);
        let loader = RecordingLoader::default();
        let report = orchestrator(config, gifts, loader.clone()).run().await;

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, RunState::SchemaCheck);
        assert!(matches!(failure.error, PipelineError::SchemaViolation(_)));
        let violations = &failure.error.violations().unwrap().violations;
        assert!(violations.iter().any(|v| matches!(v, Violation::TypeMismatch { row: 1, .. })));
        assert!(!report.states.contains(&RunState::IdCheck));
        assert!(loader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn gifts_without_required_columns_fail_schema_check() {
        let loader = RecordingLoader::default();
        let gifts = Table::from_records(vec![Record::new().with("gift_id", "G1").with("beneficiary_id", "B1")]);
        let report = orchestrator(PipelineConfig::default(), gifts, loader.clone()).run().await;

        assert!(!report.is_success());
        assert_eq!(report.state(), RunState::Failed);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, RunState::SchemaCheck);
        let violations = &failure.error.violations().unwrap().violations;
        for column in ["gift_type", "amount"] {
            assert!(violations.contains(&Violation::MissingColumn {
                column: column.to_string()
            }));
        }
        let master = report.master.as_ref().unwrap();
        assert!(!master.has_column("gift_type"));
        assert!(!master.has_column("amount"));
        assert!(loader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extractor_error_fails_in_extracting() {
        let orchestrator = Orchestrator::new(
            PipelineConfig::default(),
            Box::new(StaticExtractor::new("beneficiaries", "https://example.com", beneficiaries())),
            Box::new(BrokenExtractor),
            vec![Box::new(RecordingLoader::default())],
        );
        let report = orchestrator.run().await;

        assert_eq!(report.states, vec![RunState::Pending, RunState::Extracting, RunState::Failed]);
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, RunState::Extracting);
        assert_eq!(failure.counts.beneficiaries_extracted, 1);
        assert_eq!(failure.counts.gifts_extracted, 0);
        assert!(report.processed_at.is_none());
    }

    #[tokio::test]
    async fn missing_join_key_fails_in_mapping() {
        let config = PipelineConfig {
            join_key: "donor_id".to_string(),
            ..PipelineConfig::default()
        };
        let gifts = Table::from_records(vec![gift("G1", "B1")]);
        let report = orchestrator(config, gifts, RecordingLoader::default()).run().await;

        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, RunState::Mapping);
        assert!(matches!(failure.error, PipelineError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn first_failing_loader_fails_the_run() {
        let failing = RecordingLoader {
            fail: true,
            ..Default::default()
        };
        let after = RecordingLoader::default();
        let orchestrator = Orchestrator::new(
            PipelineConfig::default(),
            Box::new(StaticExtractor::new("beneficiaries", "https://example.com", beneficiaries())),
            Box::new(StaticExtractor::new("gifts", "https://example.com", Table::from_records(vec![gift("G1", "B1")]))),
            vec![Box::new(failing.clone()), Box::new(after.clone())],
        );
        let report = orchestrator.run().await;

        assert_eq!(report.failure.as_ref().unwrap().stage, RunState::Loading);
        assert_eq!(failing.calls.lock().unwrap().len(), 1);
        assert!(after.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inner_join_on_sample_data_keeps_matched_rows_only() {
        let config = PipelineConfig {
            join_mode: JoinMode::Inner,
            ..PipelineConfig::default()
        };
        let gifts = Table::from_records(vec![gift("G1", "B1"), gift("G2", "B9")]);
        let report = orchestrator(config, gifts, RecordingLoader::default()).run().await;

        assert!(report.is_success());
        assert_eq!(report.master.unwrap().len(), 1);
        assert_eq!(report.gift_clean.unwrap().rows_out, 2);
    }

    #[test]
    fn terminal_states_have_no_successor() {
        assert!(RunState::Complete.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert_eq!(RunState::IdCheck.next(), Some(RunState::Loading));
        assert_eq!(RunState::SchemaCheck.to_string(), "SCHEMA_CHECK");
    }
}
