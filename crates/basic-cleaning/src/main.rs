use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cleaning_artifacts::{FsArtifactStore, RunRecorder, RunStatus, StoreConfig};
use cleaning_core::{run_cleaning, CleaningArgs, RunContext, RunOptions, JOB_TYPE};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Download the raw dataset artifact, apply basic cleaning, and publish the result as a
/// new artifact.
#[derive(Parser, Debug)]
#[command(author, version, about = "A very basic data cleaning", long_about = None)]
struct Cli {
    /// Input artifact name
    #[arg(long = "input_artifact")]
    input_artifact: String,

    /// Output artifact name
    #[arg(long = "output_artifact")]
    output_artifact: String,

    /// Output artifact type
    #[arg(long = "output_type")]
    output_type: String,

    /// Output artifact description
    #[arg(long = "output_description")]
    output_description: String,

    /// Minimum price to consider
    #[arg(long = "min_price", allow_negative_numbers = true)]
    min_price: f64,

    /// Maximum price to consider
    #[arg(long = "max_price", allow_negative_numbers = true)]
    max_price: f64,

    /// Artifact registry root; overrides BASIC_CLEANING_ARTIFACT_ROOT
    #[arg(long = "artifact_root")]
    artifact_root: Option<PathBuf>,
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        match &self.artifact_root {
            Some(root) => StoreConfig::with_root(root),
            None => StoreConfig::from_env(),
        }
    }

    fn into_args(self) -> CleaningArgs {
        CleaningArgs {
            input_artifact: self.input_artifact,
            output_artifact: self.output_artifact,
            output_type: self.output_type,
            output_description: self.output_description,
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let store = FsArtifactStore::open(cli.store_config())
        .context("failed to open artifact store")?;
    let args = cli.into_args();

    let mut ctx = RunContext::new(JOB_TYPE);
    ctx.update_config(&args)
        .context("failed to record run configuration")?;
    store
        .record_run(&ctx.record(RunStatus::Running, None))
        .context("failed to register run")?;
    info!(run_id = %ctx.run_id(), job_type = ctx.job_type(), "run started");

    let outcome = run_cleaning(&mut ctx, &args, &RunOptions::from_env(), &store, &store)
        .map_err(anyhow::Error::from);

    let record = ctx.finish(outcome.as_ref().err().map(|err| format!("{err:#}")));
    if let Err(err) = store.record_run(&record) {
        let err = anyhow::Error::from(err);
        warn!(run_id = %ctx.run_id(), error = %format!("{err:#}"), "failed to write final run record");
    }

    let summary = outcome.context("basic cleaning run failed")?;
    info!(
        run_id = %summary.run_id,
        input = %summary.input,
        output = %summary.output.qualified_name(),
        retained_rows = summary.cleaning.retained_rows,
        "run finished"
    );
    Ok(())
}
