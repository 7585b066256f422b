use chrono::{DateTime, Utc};
use cleaning_artifacts::{
    ArtifactDescriptor, ArtifactFetcher, ArtifactPublisher, ArtifactRef, FetchError, NewArtifact,
    PublishError, PublishedArtifact, ResolvedArtifact, RunRecord, RunStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::transform::PriceBounds;

pub const JOB_TYPE: &str = "basic_cleaning";

/// Parameters of one cleaning run, recorded verbatim as run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningArgs {
    pub input_artifact: String,
    pub output_artifact: String,
    pub output_type: String,
    pub output_description: String,
    pub min_price: f64,
    pub max_price: f64,
}

impl CleaningArgs {
    pub fn bounds(&self) -> PriceBounds {
        PriceBounds::new(self.min_price, self.max_price)
    }

    pub fn descriptor(&self) -> ArtifactDescriptor {
        ArtifactDescriptor::new(
            &self.output_artifact,
            &self.output_type,
            &self.output_description,
        )
    }
}

/// Tracking state of a single run. Passed explicitly to every step that needs it.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    job_type: String,
    started_at: DateTime<Utc>,
    config: Map<String, Value>,
    used: Vec<ResolvedArtifact>,
    logged: Vec<PublishedArtifact>,
}

impl RunContext {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_type: job_type.into(),
            started_at: Utc::now(),
            config: Map::new(),
            used: Vec::new(),
            logged: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn config(&self) -> Value {
        Value::Object(self.config.clone())
    }

    /// Merge the fields of `values` into the run configuration, replacing existing keys.
    pub fn update_config<T: Serialize>(&mut self, values: &T) -> Result<(), serde_json::Error> {
        match serde_json::to_value(values)? {
            Value::Object(fields) => self.config.extend(fields),
            Value::Null => {}
            other => {
                self.config.insert("value".to_string(), other);
            }
        }
        Ok(())
    }

    pub fn used(&self) -> &[ResolvedArtifact] {
        &self.used
    }

    pub fn logged(&self) -> &[PublishedArtifact] {
        &self.logged
    }

    /// Resolve an input artifact and record it as consumed by this run.
    pub fn use_artifact<F: ArtifactFetcher + ?Sized>(
        &mut self,
        fetcher: &F,
        reference: &ArtifactRef,
    ) -> Result<ResolvedArtifact, FetchError> {
        let resolved = fetcher.resolve(reference)?;
        self.used.push(resolved.clone());
        Ok(resolved)
    }

    /// Stage an output artifact, stamped with this run's id and the artifacts it consumed.
    pub fn log_artifact<P: ArtifactPublisher + ?Sized>(
        &self,
        publisher: &P,
        mut artifact: NewArtifact,
    ) -> Result<P::Pending, PublishError> {
        artifact.produced_by = Some(self.run_id);
        artifact.consumed = self.used.iter().map(|input| input.id).collect();
        publisher.log_artifact(artifact)
    }

    pub fn mark_logged(&mut self, artifact: PublishedArtifact) {
        self.logged.push(artifact);
    }

    /// Snapshot of the run with an explicit status.
    pub fn record(&self, status: RunStatus, error: Option<String>) -> RunRecord {
        let finished_at = match status {
            RunStatus::Running => None,
            RunStatus::Succeeded | RunStatus::Failed => Some(Utc::now()),
        };

        RunRecord {
            run_id: self.run_id,
            job_type: self.job_type.clone(),
            status,
            config: self.config(),
            started_at: self.started_at,
            finished_at,
            error,
            used: self.used.iter().map(ResolvedArtifact::qualified_name).collect(),
            logged: self
                .logged
                .iter()
                .map(PublishedArtifact::qualified_name)
                .collect(),
        }
    }

    /// Final record of the run; a `Some` error marks it failed.
    pub fn finish(&self, error: Option<String>) -> RunRecord {
        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        self.record(status, error)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args() -> CleaningArgs {
        CleaningArgs {
            input_artifact: "sample.csv:latest".into(),
            output_artifact: "clean_sample.csv".into(),
            output_type: "clean_sample".into(),
            output_description: "Data with outliers and null values removed".into(),
            min_price: 10.0,
            max_price: 350.0,
        }
    }

    #[test]
    fn config_update_merges_fields() {
        let mut ctx = RunContext::new(JOB_TYPE);
        ctx.update_config(&args()).unwrap();
        ctx.update_config(&json!({ "max_price": 400.0, "seed": 42 }))
            .unwrap();

        let config = ctx.config();
        assert_eq!(config["input_artifact"], "sample.csv:latest");
        assert_eq!(config["min_price"], 10.0);
        assert_eq!(config["max_price"], 400.0);
        assert_eq!(config["seed"], 42);
    }

    #[test]
    fn finish_reflects_outcome() {
        let mut ctx = RunContext::new(JOB_TYPE);
        ctx.update_config(&args()).unwrap();

        let running = ctx.record(RunStatus::Running, None);
        assert_eq!(running.status, RunStatus::Running);
        assert!(running.finished_at.is_none());

        let ok = ctx.finish(None);
        assert_eq!(ok.status, RunStatus::Succeeded);
        assert_eq!(ok.job_type, "basic_cleaning");
        assert_eq!(ok.run_id, ctx.run_id());
        assert!(ok.finished_at.is_some());

        let failed = ctx.finish(Some("boom".into()));
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn descriptor_passes_caller_fields_through() {
        let descriptor = args().descriptor();
        assert_eq!(descriptor.name, "clean_sample.csv");
        assert_eq!(descriptor.artifact_type, "clean_sample");
        assert_eq!(
            descriptor.description,
            "Data with outliers and null values removed"
        );
        assert_eq!(args().bounds(), PriceBounds::new(10.0, 350.0));
    }
}
