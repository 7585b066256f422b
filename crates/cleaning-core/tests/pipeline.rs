use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Result;
use cleaning_artifacts::{
    ArtifactDescriptor, ArtifactFetcher, ArtifactPublisher, ArtifactRef, FetchError,
    FsArtifactStore, NewArtifact, PendingArtifact, PublishError, PublishedArtifact, RunStatus,
    StoreConfig, StoreError,
};
use cleaning_core::dataset::load_dataset;
use cleaning_core::{
    run_cleaning, CleaningArgs, CleaningError, RunContext, RunError, RunOptions, JOB_TYPE,
};
use polars::prelude::*;
use tempfile::TempDir;

const RAW_LISTINGS: &str = "\
id,name,neighbourhood,price,minimum_nights,last_review,reviews_per_month
2539,Clean & quiet apt home by the park,Kensington,149,1,2018-10-19,0.21
2595,Skylit Midtown Castle,Midtown,5,1,2019-05-21,0.38
3647,THE VILLAGE OF HARLEM,Harlem,150,3,,
3831,Cozy Entire Floor of Brownstone,Clinton Hill,89,1,2019-07-05,4.64
5022,Entire Apt: Spacious Studio/Loft,East Harlem,1000,10,2018-11-19,0.10
";

struct Fixture {
    dir: TempDir,
    store: FsArtifactStore,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let store = FsArtifactStore::open(StoreConfig::with_root(dir.path().join("registry")))?;
        Ok(Self { dir, store })
    }

    fn upload_raw(&self, contents: &str) -> Result<PublishedArtifact> {
        let path = self.dir.path().join("sample.csv");
        fs::write(&path, contents)?;
        let mut artifact = NewArtifact::new(ArtifactDescriptor::new(
            "sample.csv",
            "raw_data",
            "Raw listings sample",
        ));
        artifact.add_file(path);
        Ok(self.store.publish(artifact)?)
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            recovery_dir: self.dir.path().join("recovery"),
        }
    }
}

fn args(min_price: f64, max_price: f64) -> CleaningArgs {
    CleaningArgs {
        input_artifact: "sample.csv:latest".into(),
        output_artifact: "clean_sample.csv".into(),
        output_type: "clean_sample".into(),
        output_description: "Data with outliers and null values removed".into(),
        min_price,
        max_price,
    }
}

fn new_context(args: &CleaningArgs) -> Result<RunContext> {
    let mut ctx = RunContext::new(JOB_TYPE);
    ctx.update_config(args)?;
    Ok(ctx)
}

#[test]
fn run_publishes_cleaned_artifact_with_provenance() -> Result<()> {
    let fixture = Fixture::new()?;
    let raw = fixture.upload_raw(RAW_LISTINGS)?;
    let args = args(10.0, 350.0);
    let mut ctx = new_context(&args)?;

    let summary = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &fixture.store)?;

    assert_eq!(summary.input, "sample.csv:v0");
    assert_eq!(summary.output.qualified_name(), "clean_sample.csv:v0");
    assert_eq!(summary.cleaning.input_rows, 5);
    assert_eq!(summary.cleaning.retained_rows, 3);
    assert_eq!(summary.cleaning.null_review_dates, 1);

    let manifest = fixture
        .store
        .manifest(&ArtifactRef::parse("clean_sample.csv:latest")?)?;
    assert_eq!(manifest.artifact_type, "clean_sample");
    assert_eq!(manifest.description, "Data with outliers and null values removed");
    assert_eq!(manifest.produced_by, Some(ctx.run_id()));
    assert_eq!(manifest.consumed, vec![raw.id]);
    assert_eq!(manifest.metadata["config"]["min_price"], 10.0);
    assert_eq!(manifest.metadata["config"]["max_price"], 350.0);
    assert_eq!(manifest.metadata["config"]["input_artifact"], "sample.csv:latest");
    assert_eq!(manifest.metadata["cleaning"]["retained_rows"], 3);

    let output = fixture
        .store
        .resolve(&ArtifactRef::parse("clean_sample.csv")?)?;
    assert_eq!(output.path.file_name().and_then(|name| name.to_str()), Some("clean_sample.csv"));

    let written = fs::read_to_string(&output.path)?;
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("id,name,neighbourhood,price,minimum_nights,last_review,reviews_per_month")
    );
    assert!(written.contains("2018-10-19"));
    assert!(!written.contains("Skylit Midtown Castle"));

    let reloaded = load_dataset(&output.path)?;
    let ids: Vec<Option<i64>> = reloaded.column("id")?.i64()?.into_iter().collect();
    assert_eq!(ids, vec![Some(2539), Some(3647), Some(3831)]);

    assert_eq!(ctx.used().len(), 1);
    assert_eq!(ctx.used()[0].id, raw.id);

    let record = ctx.finish(None);
    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(record.used, vec!["sample.csv:v0".to_string()]);
    assert_eq!(record.logged, vec!["clean_sample.csv:v0".to_string()]);
    Ok(())
}

#[test]
fn rerunning_on_cleaned_output_is_a_fixed_point() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.upload_raw(RAW_LISTINGS)?;

    let first_args = args(10.0, 350.0);
    let mut first_ctx = new_context(&first_args)?;
    run_cleaning(&mut first_ctx, &first_args, &fixture.options(), &fixture.store, &fixture.store)?;

    let second_args = CleaningArgs {
        input_artifact: "clean_sample.csv:v0".into(),
        output_artifact: "clean_sample_again.csv".into(),
        ..first_args.clone()
    };
    let mut second_ctx = new_context(&second_args)?;
    let second = run_cleaning(&mut second_ctx, &second_args, &fixture.options(), &fixture.store, &fixture.store)?;
    assert_eq!(second.cleaning.dropped_rows, 0);

    let first_frame = load_dataset(
        &fixture
            .store
            .resolve(&ArtifactRef::parse("clean_sample.csv:v0")?)?
            .path,
    )?;
    let second_frame = load_dataset(
        &fixture
            .store
            .resolve(&ArtifactRef::parse("clean_sample_again.csv:v0")?)?
            .path,
    )?;
    assert!(first_frame.equals_missing(&second_frame));
    Ok(())
}

#[test]
fn late_malformed_prices_are_dropped_not_fatal() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut contents = String::from("id,price,last_review\n");
    for id in 0..10_000 {
        contents.push_str(&format!("{id},100,2019-05-21\n"));
    }
    contents.push_str("10000,149.5,2019-05-22\n");
    contents.push_str("10001,abc,2019-05-23\n");
    fixture.upload_raw(&contents)?;

    let raw = fixture.store.resolve(&ArtifactRef::parse("sample.csv")?)?;
    let loaded = load_dataset(&raw.path)?;
    assert_eq!(loaded.height(), 10_002);

    let args = args(10.0, 350.0);
    let mut ctx = new_context(&args)?;
    let summary = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &fixture.store)?;

    assert_eq!(summary.cleaning.input_rows, 10_002);
    assert_eq!(summary.cleaning.retained_rows, 10_001);
    assert_eq!(summary.cleaning.dropped_rows, 1);

    let output = fixture.store.resolve(&ArtifactRef::parse("clean_sample.csv")?)?;
    let written = fs::read_to_string(output.path)?;
    assert!(written.contains("10000,149.5,2019-05-22"));
    assert!(!written.contains("abc"));
    Ok(())
}

#[test]
fn unknown_input_artifact_aborts_before_publishing() -> Result<()> {
    let fixture = Fixture::new()?;
    let args = args(10.0, 350.0);
    let mut ctx = new_context(&args)?;

    let err = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &fixture.store)
        .unwrap_err();

    assert!(matches!(err, RunError::Fetch(FetchError::NotFound(_))));
    assert!(fixture.store.list(None)?.is_empty());
    Ok(())
}

#[test]
fn missing_price_column_aborts_before_publishing() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.upload_raw("id,last_review\n1,2019-05-21\n")?;
    let args = args(10.0, 350.0);
    let mut ctx = new_context(&args)?;

    let err = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &fixture.store)
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Cleaning(CleaningError::MissingColumn { column: "price" })
    ));
    assert!(fixture.store.list(Some("clean_sample.csv"))?.is_empty());
    assert!(ctx.logged().is_empty());
    assert_eq!(ctx.finish(Some(err.to_string())).status, RunStatus::Failed);
    Ok(())
}

/// Accepts artifacts but never confirms them.
#[derive(Default)]
struct RejectingPublisher {
    staged: RefCell<Vec<PathBuf>>,
}

struct RejectedArtifact;

impl PendingArtifact for RejectedArtifact {
    fn wait(self) -> Result<PublishedArtifact, PublishError> {
        Err(PublishError::Store(StoreError::Io {
            path: PathBuf::from("registry"),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "registry unavailable"),
        }))
    }
}

impl ArtifactPublisher for RejectingPublisher {
    type Pending = RejectedArtifact;

    fn log_artifact(&self, artifact: NewArtifact) -> Result<RejectedArtifact, PublishError> {
        self.staged.borrow_mut().extend(artifact.files);
        Ok(RejectedArtifact)
    }
}

#[test]
fn publish_failure_preserves_output_and_removes_temp_dir() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.upload_raw(RAW_LISTINGS)?;
    let args = args(10.0, 350.0);
    let mut ctx = new_context(&args)?;
    let publisher = RejectingPublisher::default();

    let err = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &publisher)
        .unwrap_err();

    let RunError::Publish { recovered, .. } = &err else {
        panic!("expected publish error, got {err:?}");
    };
    let recovered = recovered.clone().expect("output should be preserved");
    assert!(recovered.starts_with(fixture.dir.path().join("recovery")));
    assert!(err.to_string().contains(&recovered.display().to_string()));

    // The registry failure is reported once, as the source of the publish error.
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert_eq!(chain.matches("registry unavailable").count(), 1);

    let preserved = load_dataset(&recovered)?;
    assert_eq!(preserved.height(), 3);
    assert_eq!(preserved.column("last_review")?.dtype(), &DataType::String);

    let staged = publisher.staged.borrow();
    assert_eq!(staged.len(), 1);
    assert!(!staged[0].exists());
    assert!(staged[0].parent().is_some_and(|dir| !dir.exists()));
    assert!(ctx.logged().is_empty());
    Ok(())
}

#[test]
fn inverted_bounds_publish_an_empty_dataset() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.upload_raw(RAW_LISTINGS)?;
    let args = args(600.0, 10.0);
    let mut ctx = new_context(&args)?;

    let summary = run_cleaning(&mut ctx, &args, &fixture.options(), &fixture.store, &fixture.store)?;
    assert_eq!(summary.cleaning.retained_rows, 0);

    let output = fixture.store.resolve(&ArtifactRef::parse("clean_sample.csv")?)?;
    let written = fs::read_to_string(output.path)?;
    assert_eq!(
        written.lines().collect::<Vec<_>>(),
        vec!["id,name,neighbourhood,price,minimum_nights,last_review,reviews_per_month"]
    );
    Ok(())
}
