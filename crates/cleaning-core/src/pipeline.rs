use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cleaning_artifacts::{
    ArtifactFetcher, ArtifactPublisher, ArtifactRef, FetchError, NewArtifact, PendingArtifact,
    PublishedArtifact,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{CleaningArgs, RunContext};
use crate::dataset::{load_dataset, write_dataset};
use crate::error::RunError;
use crate::transform::{clean_listings, CleanedDataset, CleaningSummary};

pub const OUTPUT_FILE_NAME: &str = "clean_sample.csv";
pub const RECOVERY_DIR_ENV: &str = "BASIC_CLEANING_RECOVERY_DIR";

const DEFAULT_RECOVERY_DIR: &str = "basic-cleaning-recovery";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Where the cleaned file is copied when publication fails.
    pub recovery_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recovery_dir: env::temp_dir().join(DEFAULT_RECOVERY_DIR),
        }
    }
}

impl RunOptions {
    pub fn from_env() -> Self {
        match env::var(RECOVERY_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self {
                recovery_dir: PathBuf::from(dir),
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub input: String,
    pub output: PublishedArtifact,
    pub cleaning: CleaningSummary,
}

/// Fetch the input artifact, clean it, and publish the result as a new artifact version.
///
/// Nothing is published unless cleaning and serialization succeed. The temporary output
/// directory is removed on every path out of this function.
pub fn run_cleaning<F, P>(
    ctx: &mut RunContext,
    args: &CleaningArgs,
    options: &RunOptions,
    fetcher: &F,
    publisher: &P,
) -> Result<RunSummary, RunError>
where
    F: ArtifactFetcher + ?Sized,
    P: ArtifactPublisher + ?Sized,
{
    let reference = ArtifactRef::parse(&args.input_artifact).map_err(FetchError::from)?;
    let input = ctx.use_artifact(fetcher, &reference)?;

    info!(artifact = %input.qualified_name(), path = %input.path.display(), "Using artifact to read dataset");
    let raw = load_dataset(&input.path)?;

    info!(
        min_price = args.min_price,
        max_price = args.max_price,
        "Dropping outliers outside the minimum and maximum price range"
    );
    info!("Converting last_review to date type");
    let CleanedDataset { mut frame, summary } = clean_listings(&raw, args.bounds())?;
    if summary.retained_rows == 0 {
        warn!(input_rows = summary.input_rows, "price range retained no rows");
    }
    info!(
        input_rows = summary.input_rows,
        retained_rows = summary.retained_rows,
        dropped_rows = summary.dropped_rows,
        null_review_dates = summary.null_review_dates,
        "Cleaned dataset"
    );

    info!(artifact = %args.output_artifact, "Saving artifact");
    let tmp_dir = tempfile::Builder::new()
        .prefix("basic-cleaning-")
        .tempdir()
        .map_err(RunError::TempDir)?;
    let file_path = tmp_dir.path().join(OUTPUT_FILE_NAME);
    write_dataset(&mut frame, &file_path)?;

    let mut artifact = NewArtifact::new(args.descriptor()).with_metadata(json!({
        "config": ctx.config(),
        "cleaning": summary,
    }));
    artifact.add_file(&file_path);

    let published = match ctx
        .log_artifact(publisher, artifact)
        .and_then(PendingArtifact::wait)
    {
        Ok(published) => published,
        Err(source) => {
            let recovered = preserve_output(&file_path, &options.recovery_dir, ctx.run_id());
            return Err(RunError::Publish { source, recovered });
        }
    };

    info!(artifact = %published.qualified_name(), deduplicated = published.deduplicated, "Artifact published");
    ctx.mark_logged(published.clone());

    Ok(RunSummary {
        run_id: ctx.run_id(),
        input: input.qualified_name(),
        output: published,
        cleaning: summary,
    })
}

/// Copy the cleaned file out of the temporary directory before it is removed.
fn preserve_output(file_path: &Path, recovery_dir: &Path, run_id: Uuid) -> Option<PathBuf> {
    let dir = recovery_dir.join(run_id.to_string());
    let target = dir.join(OUTPUT_FILE_NAME);

    match fs::create_dir_all(&dir).and_then(|()| fs::copy(file_path, &target)) {
        Ok(_) => {
            warn!(path = %target.display(), "publication failed; cleaned output preserved");
            Some(target)
        }
        Err(err) => {
            warn!(path = %target.display(), error = %err, "publication failed and cleaned output could not be preserved");
            None
        }
    }
}
