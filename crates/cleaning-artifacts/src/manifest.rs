use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Caller-supplied identity of an artifact, attached verbatim to every version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub description: String,
}

impl ArtifactDescriptor {
    pub fn new(
        name: impl Into<String>,
        artifact_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_type: artifact_type.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the version's `files/` directory.
    pub path: String,
    pub size: u64,
    pub digest: String,
}

/// Everything the registry knows about one committed artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub description: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed: Vec<Uuid>,
}

impl ArtifactManifest {
    pub fn qualified_name(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }
}

/// Content digest of a whole artifact, independent of the order files were added in.
pub fn combined_digest(entries: &[ManifestEntry]) -> String {
    let mut sorted: Vec<&ManifestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = blake3::Hasher::new();
    for entry in sorted {
        hasher.update(entry.path.as_bytes());
        hasher.update(&[0]);
        hasher.update(entry.digest.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
