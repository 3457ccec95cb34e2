// Transform-and-validate pipeline: core stages and the run orchestrator

pub mod orchestrator;
pub mod processing;

pub use orchestrator::{Orchestrator, RunReport, RunState, StageFailure, StageResult};
