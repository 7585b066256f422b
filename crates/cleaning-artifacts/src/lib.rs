//! Versioned artifact storage for the cleaning pipeline: references, manifests, the
//! fetch/publish contracts, and a filesystem-backed registry implementing them.

pub mod errors;
pub mod filesystem;
pub mod manifest;
pub mod reference;
pub mod run;
mod store;

pub use errors::{FetchError, PublishError, ReferenceError, StoreError};
pub use filesystem::{FsArtifactStore, FsPendingArtifact, StoreConfig};
pub use manifest::{ArtifactDescriptor, ArtifactManifest, ManifestEntry};
pub use reference::{ArtifactRef, VersionSelector};
pub use run::{RunRecord, RunStatus};
pub use store::{
    ArtifactFetcher, ArtifactPublisher, NewArtifact, PendingArtifact, PublishedArtifact,
    ResolvedArtifact, RunRecorder,
};
