use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::{Args, Parser, Subcommand};
use cleaning_artifacts::{
    ArtifactDescriptor, ArtifactManifest, ArtifactPublisher, ArtifactRef, FsArtifactStore,
    NewArtifact, StoreConfig,
};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Parser, Debug)]
#[command(author, version, about = "Artifact registry administrative tooling", long_about = None)]
struct Cli {
    /// Artifact registry root; overrides BASIC_CLEANING_ARTIFACT_ROOT
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a local file as a new artifact version
    Upload(UploadArgs),
    /// List committed artifact versions
    List(ListArgs),
    /// Print the manifest of an artifact version
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// File to register
    #[arg(long)]
    file: PathBuf,
    /// Artifact name
    #[arg(long)]
    name: String,
    /// Artifact type
    #[arg(long = "type")]
    artifact_type: String,
    /// Artifact description
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args, Debug, Default)]
struct ListArgs {
    /// Only list versions of this artifact
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Reference such as `sample.csv`, `sample.csv:latest` or `sample.csv:v2`
    reference: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = match cli.root {
        Some(root) => StoreConfig::with_root(root),
        None => StoreConfig::from_env(),
    };
    let store = FsArtifactStore::open(config).context("failed to open artifact store")?;

    match cli.command {
        Command::Upload(args) => handle_upload(&store, args),
        Command::List(args) => handle_list(&store, args),
        Command::Show(args) => handle_show(&store, args),
    }
}

fn handle_upload(store: &FsArtifactStore, args: UploadArgs) -> Result<()> {
    let source = args
        .file
        .canonicalize()
        .with_context(|| format!("cannot read {}", args.file.display()))?;

    let mut artifact = NewArtifact::new(ArtifactDescriptor::new(
        args.name,
        args.artifact_type,
        args.description,
    ))
    .with_metadata(json!({ "source_path": source.display().to_string() }));
    artifact.add_file(&source);

    let published = store.publish(artifact).context("upload failed")?;
    info!(artifact = %published.qualified_name(), deduplicated = published.deduplicated, "artifact uploaded");

    if published.deduplicated {
        println!(
            "{} already holds identical content; no new version created.",
            published.qualified_name()
        );
    } else {
        println!("Uploaded {}", published.qualified_name());
    }
    Ok(())
}

fn handle_list(store: &FsArtifactStore, args: ListArgs) -> Result<()> {
    if let Some(name) = &args.name {
        ArtifactRef::latest(name).context("invalid artifact name")?;
    }

    let manifests = store.list(args.name.as_deref())?;
    if manifests.is_empty() {
        println!("No artifacts registered under {}", store.root().display());
        return Ok(());
    }

    println!("{}", render_table(&manifests));
    Ok(())
}

fn handle_show(store: &FsArtifactStore, args: ShowArgs) -> Result<()> {
    let reference = ArtifactRef::parse(&args.reference).context("invalid artifact reference")?;
    let manifest = store.manifest(&reference)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

fn render_table(manifests: &[ArtifactManifest]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "name",
        "version",
        "type",
        "digest",
        "created (UTC)",
        "description",
    ]);

    for manifest in manifests {
        let digest: String = manifest.digest.chars().take(DIGEST_PREFIX_LEN).collect();
        table.add_row(vec![
            manifest.name.clone(),
            format!("v{}", manifest.version),
            manifest.artifact_type.clone(),
            digest,
            manifest
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            manifest.description.clone(),
        ]);
    }
    table
}
