use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{FetchError, PublishError, StoreError};
use crate::manifest::ArtifactDescriptor;
use crate::reference::ArtifactRef;
use crate::run::RunRecord;

/// A committed artifact version materialized as a single local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub path: PathBuf,
}

impl ResolvedArtifact {
    pub fn qualified_name(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }
}

pub trait ArtifactFetcher {
    /// Resolve `reference` to a local file. Unknown names or versions yield
    /// [`FetchError::NotFound`].
    fn resolve(&self, reference: &ArtifactRef) -> Result<ResolvedArtifact, FetchError>;
}

/// An artifact about to be logged: descriptor, files and provenance.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub descriptor: ArtifactDescriptor,
    pub files: Vec<PathBuf>,
    pub metadata: Value,
    pub produced_by: Option<Uuid>,
    pub consumed: Vec<Uuid>,
}

impl NewArtifact {
    pub fn new(descriptor: ArtifactDescriptor) -> Self {
        Self {
            descriptor,
            files: Vec::new(),
            metadata: Value::Null,
            produced_by: None,
            consumed: Vec::new(),
        }
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.files.push(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub digest: String,
    /// True when the content matched the newest existing version and no new version was made.
    pub deduplicated: bool,
}

impl PublishedArtifact {
    pub fn qualified_name(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }
}

/// A logged artifact whose registration has not been confirmed yet.
pub trait PendingArtifact {
    /// Block until the store has durably registered the artifact.
    fn wait(self) -> Result<PublishedArtifact, PublishError>;
}

pub trait ArtifactPublisher {
    type Pending: PendingArtifact;

    /// Stage `artifact` for registration. Nothing is visible to fetchers until
    /// [`PendingArtifact::wait`] returns.
    fn log_artifact(&self, artifact: NewArtifact) -> Result<Self::Pending, PublishError>;

    fn publish(&self, artifact: NewArtifact) -> Result<PublishedArtifact, PublishError> {
        self.log_artifact(artifact)?.wait()
    }
}

pub trait RunRecorder {
    fn record_run(&self, record: &RunRecord) -> Result<(), StoreError>;
}
