//! Filesystem-backed artifact registry.
//!
//! Layout under the registry root:
//!
//! ```text
//! artifacts/<name>/v<N>/manifest.json
//! artifacts/<name>/v<N>/files/<file>
//! runs/<run_id>.json
//! .staging/<uuid>/files/<file>
//! ```
//!
//! A version directory only counts as committed once its `manifest.json` exists.

use std::collections::BTreeSet;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{FetchError, PublishError, StoreError};
use crate::manifest::{combined_digest, ArtifactDescriptor, ArtifactManifest, ManifestEntry};
use crate::reference::{parse_version_tag, validate_name, ArtifactRef, VersionSelector};
use crate::run::RunRecord;
use crate::store::{
    ArtifactFetcher, ArtifactPublisher, NewArtifact, PendingArtifact, PublishedArtifact,
    ResolvedArtifact, RunRecorder,
};

pub const ROOT_ENV: &str = "BASIC_CLEANING_ARTIFACT_ROOT";

const DEFAULT_ROOT: &str = "artifacts";
const ARTIFACTS_DIR: &str = "artifacts";
const RUNS_DIR: &str = "runs";
const STAGING_DIR: &str = ".staging";
const FILES_DIR: &str = "files";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
        }
    }
}

impl StoreConfig {
    /// Reads `BASIC_CLEANING_ARTIFACT_ROOT`, falling back to `./artifacts`.
    pub fn from_env() -> Self {
        match env::var(ROOT_ENV) {
            Ok(root) if !root.trim().is_empty() => Self::with_root(root),
            _ => Self::default(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        for dir in [ARTIFACTS_DIR, RUNS_DIR, STAGING_DIR] {
            let path = config.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| StoreError::io(&path, source))?;
        }

        debug!(root = %config.root.display(), "opened artifact store");
        Ok(Self { root: config.root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self, reference: &ArtifactRef) -> Result<ArtifactManifest, FetchError> {
        let versions = self.committed_versions(reference.name())?;
        let version = match reference.version() {
            VersionSelector::Latest => versions.last().copied(),
            VersionSelector::Version(wanted) => versions.contains(&wanted).then_some(wanted),
        }
        .ok_or_else(|| FetchError::NotFound(reference.to_string()))?;

        Ok(read_json(&self.manifest_path(reference.name(), version))?)
    }

    /// Committed manifests ordered by name then version, optionally for one name only.
    pub fn list(&self, name: Option<&str>) -> Result<Vec<ArtifactManifest>, StoreError> {
        let mut manifests = Vec::new();
        for artifact in self.artifact_names()? {
            if name.is_some_and(|wanted| wanted != artifact) {
                continue;
            }
            for version in self.committed_versions(&artifact)? {
                manifests.push(read_json(&self.manifest_path(&artifact, version))?);
            }
        }
        Ok(manifests)
    }

    pub fn run_record(&self, run_id: Uuid) -> Result<RunRecord, StoreError> {
        read_json(&self.run_path(run_id))
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(name)
    }

    fn version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.artifact_dir(name).join(format!("v{version}"))
    }

    fn manifest_path(&self, name: &str, version: u32) -> PathBuf {
        self.version_dir(name, version).join(MANIFEST_FILE)
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.root.join(RUNS_DIR).join(format!("{run_id}.json"))
    }

    fn artifact_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = read_dir_or_empty(&self.root.join(ARTIFACTS_DIR))?
            .into_iter()
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every `v<N>` directory of an artifact, including ones whose commit never finished.
    fn version_numbers(&self, name: &str) -> Result<Vec<u32>, StoreError> {
        let mut versions: Vec<u32> = read_dir_or_empty(&self.artifact_dir(name))?
            .into_iter()
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(parse_version_tag)
            })
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn committed_versions(&self, name: &str) -> Result<Vec<u32>, StoreError> {
        Ok(self
            .version_numbers(name)?
            .into_iter()
            .filter(|version| self.manifest_path(name, *version).is_file())
            .collect())
    }

    fn latest_manifest(&self, name: &str) -> Result<Option<ArtifactManifest>, StoreError> {
        match self.committed_versions(name)?.last() {
            Some(&version) => read_json(&self.manifest_path(name, version)).map(Some),
            None => Ok(None),
        }
    }
}

impl ArtifactFetcher for FsArtifactStore {
    fn resolve(&self, reference: &ArtifactRef) -> Result<ResolvedArtifact, FetchError> {
        let manifest = self.manifest(reference)?;

        let [entry] = manifest.files.as_slice() else {
            return Err(FetchError::AmbiguousFile {
                reference: manifest.qualified_name(),
                count: manifest.files.len(),
            });
        };

        let path = self
            .version_dir(&manifest.name, manifest.version)
            .join(FILES_DIR)
            .join(&entry.path);
        if !path.is_file() {
            return Err(FetchError::NotFound(format!(
                "{} (file '{}' is missing)",
                manifest.qualified_name(),
                entry.path
            )));
        }

        debug!(artifact = %manifest.qualified_name(), path = %path.display(), "resolved artifact");
        Ok(ResolvedArtifact {
            id: manifest.id,
            name: manifest.name,
            version: manifest.version,
            path,
        })
    }
}

impl ArtifactPublisher for FsArtifactStore {
    type Pending = FsPendingArtifact;

    fn log_artifact(&self, artifact: NewArtifact) -> Result<FsPendingArtifact, PublishError> {
        let NewArtifact {
            descriptor,
            files,
            metadata,
            produced_by,
            consumed,
        } = artifact;

        validate_name(&descriptor.name)?;
        if files.is_empty() {
            return Err(PublishError::Empty(descriptor.name));
        }

        let staging = StagingDir(
            self.root
                .join(STAGING_DIR)
                .join(Uuid::new_v4().to_string()),
        );
        let files_dir = staging.0.join(FILES_DIR);
        fs::create_dir_all(&files_dir).map_err(|source| StoreError::io(&files_dir, source))?;

        let entries = stage_files(&files_dir, &files)?;
        let digest = combined_digest(&entries);
        debug!(artifact = %descriptor.name, files = entries.len(), %digest, "staged artifact");

        Ok(FsPendingArtifact {
            store: self.clone(),
            staging,
            descriptor,
            entries,
            digest,
            metadata,
            produced_by,
            consumed,
        })
    }
}

impl RunRecorder for FsArtifactStore {
    fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        write_json_atomic(&self.run_path(record.run_id), record)
    }
}

/// Staged files awaiting commit. Dropping it without committing discards the staging area.
#[derive(Debug)]
pub struct FsPendingArtifact {
    store: FsArtifactStore,
    staging: StagingDir,
    descriptor: ArtifactDescriptor,
    entries: Vec<ManifestEntry>,
    digest: String,
    metadata: Value,
    produced_by: Option<Uuid>,
    consumed: Vec<Uuid>,
}

impl PendingArtifact for FsPendingArtifact {
    fn wait(self) -> Result<PublishedArtifact, PublishError> {
        let name = self.descriptor.name.clone();

        if let Some(latest) = self.store.latest_manifest(&name)? {
            if latest.artifact_type != self.descriptor.artifact_type {
                return Err(PublishError::TypeMismatch {
                    name,
                    existing: latest.artifact_type,
                    requested: self.descriptor.artifact_type.clone(),
                });
            }
            if latest.digest == self.digest {
                info!(artifact = %latest.qualified_name(), "content unchanged, reusing existing version");
                return Ok(PublishedArtifact {
                    id: latest.id,
                    name,
                    version: latest.version,
                    digest: latest.digest,
                    deduplicated: true,
                });
            }
        }

        let version = self
            .store
            .version_numbers(&name)?
            .last()
            .map_or(0, |newest| newest + 1);
        let parent = self.store.artifact_dir(&name);
        fs::create_dir_all(&parent).map_err(|source| StoreError::io(&parent, source))?;

        let target = self.store.version_dir(&name, version);
        fs::rename(&self.staging.0, &target).map_err(|source| StoreError::io(&target, source))?;

        let manifest = ArtifactManifest {
            id: Uuid::new_v4(),
            name: name.clone(),
            version,
            artifact_type: self.descriptor.artifact_type.clone(),
            description: self.descriptor.description.clone(),
            digest: self.digest.clone(),
            created_at: Utc::now(),
            files: self.entries.clone(),
            metadata: self.metadata.clone(),
            produced_by: self.produced_by,
            consumed: self.consumed.clone(),
        };

        if let Err(err) = write_json_atomic(&self.store.manifest_path(&name, version), &manifest) {
            if let Err(cleanup) = fs::remove_dir_all(&target) {
                warn!(path = %target.display(), error = %cleanup, "failed to remove uncommitted version");
            }
            return Err(err.into());
        }

        info!(artifact = %manifest.qualified_name(), digest = %manifest.digest, "artifact committed");
        Ok(PublishedArtifact {
            id: manifest.id,
            name,
            version,
            digest: manifest.digest,
            deduplicated: false,
        })
    }
}

#[derive(Debug)]
struct StagingDir(PathBuf);

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.0.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.0) {
            warn!(path = %self.0.display(), error = %err, "failed to remove staging directory");
        }
    }
}

fn stage_files(files_dir: &Path, sources: &[PathBuf]) -> Result<Vec<ManifestEntry>, PublishError> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(sources.len());

    for source in sources {
        let file_name = match source.file_name() {
            Some(file_name) if source.is_file() => file_name.to_string_lossy().into_owned(),
            _ => return Err(PublishError::MissingFile(source.clone())),
        };
        if !seen.insert(file_name.clone()) {
            return Err(PublishError::DuplicateFile(file_name));
        }

        let destination = files_dir.join(&file_name);
        let size = fs::copy(source, &destination).map_err(|err| StoreError::io(source, err))?;
        let digest = hash_and_sync(&destination)?;

        entries.push(ManifestEntry {
            path: file_name,
            size,
            digest,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn hash_and_sync(path: &Path) -> Result<String, StoreError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| StoreError::io(path, source))?;

    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(|source| StoreError::io(path, source))?;
    file.sync_all()
        .map_err(|source| StoreError::io(path, source))?;

    Ok(hasher.finalize().to_hex().to_string())
}

fn read_dir_or_empty(dir: &Path) -> Result<Vec<fs::DirEntry>, StoreError> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .collect::<io::Result<Vec<_>>>()
            .map_err(|source| StoreError::io(dir, source)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(StoreError::io(dir, err)),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::io(path, source))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write, flush and rename into place so readers never observe a partial document.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp).map_err(|source| StoreError::io(&tmp, source))?;
    file.write_all(&bytes)
        .and_then(|()| file.sync_all())
        .map_err(|source| StoreError::io(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| StoreError::io(path, source))
}
