use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Provenance record for one pipeline run: its configuration and the artifacts it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub job_type: String,
    pub status: RunStatus,
    pub config: Value,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Qualified names (`name:vN`) of the artifacts read by the run.
    #[serde(default)]
    pub used: Vec<String>,
    /// Qualified names of the artifacts the run committed.
    #[serde(default)]
    pub logged: Vec<String>,
}
