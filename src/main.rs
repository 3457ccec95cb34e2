use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use gift_pipeline::config::{ExtractorConfig, PipelineConfig};
use gift_pipeline::logging;
use gift_pipeline::pipeline::{Orchestrator, RunReport};

#[derive(Parser)]
#[command(name = "gift_pipeline")]
#[command(about = "Merge Beneficiaries and Gifts into a validated master table")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run Extract, Clean, Map, Validate, Load once
    Run {
        /// Path to the TOML configuration; defaults apply when the file is absent
        #[arg(long, short, default_value = "pipeline.toml")]
        config: PathBuf,
        /// Use the built-in sample Beneficiaries and Gifts instead of the configured sources
        #[arg(long)]
        sample: bool,
    },
    /// Load and validate a configuration file without running
    CheckConfig {
        #[arg(long, short, default_value = "pipeline.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    if path.exists() {
        PipelineConfig::load(path).with_context(|| format!("invalid configuration in {}", path.display()))
    } else {
        Ok(PipelineConfig::default())
    }
}

fn print_report(report: &RunReport) {
    println!("\n📊 Pipeline Results:");
    println!(
        "   States: {}",
        report.states.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ")
    );
    for stage in &report.stage_results {
        println!("   {:<13} {:>6} -> {:<6} {}", stage.stage, stage.rows_in, stage.rows_out, stage.message);
    }
    if let Some(processed_at) = report.processed_at {
        println!("   processed_at: {}", processed_at.to_rfc3339());
    }
    if let Some(failure) = &report.failure {
        println!("\n❌ {}", failure);
        if let Some(result) = failure.error.violations() {
            for violation in result.violations.iter().take(20) {
                println!("   - {}", violation);
            }
            if result.violations.len() > 20 {
                println!("   ... and {} more", result.violations.len() - 20);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, sample } => {
            let mut config = load_config(&config)?;
            let _guard = logging::init_logging(&config.log_dir);

            if sample {
                info!("Using built-in sample sources");
                config.sources.beneficiaries = ExtractorConfig::Sample;
                config.sources.gifts = ExtractorConfig::Sample;
            }

            let orchestrator = Orchestrator::from_config(config)?;
            let report = orchestrator.run().await;
            print_report(&report);

            if !report.is_success() {
                bail!("pipeline run failed");
            }
        }
        Commands::CheckConfig { config } => {
            if !config.exists() {
                warn!("{} not found; checking built-in defaults", config.display());
            }
            let loaded = load_config(&config)?;
            loaded.validate()?;
            println!("✅ Configuration OK");
            println!("   join: {} on '{}'", loaded.join_mode, loaded.join_key);
            println!("   primary key: {}", loaded.primary_key);
            println!("   required columns: {}", loaded.required_columns.join(", "));
            println!("   loaders: {}", loaded.loaders.len());
        }
    }

    Ok(())
}
