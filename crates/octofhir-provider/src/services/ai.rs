//! AI inference job orchestration.

use octofhir_client::{CallError, RestClient, ServiceApi};
use octofhir_config::Service;
use serde::{Deserialize, Serialize};

use super::{Collection, Identified, is_zero};
use crate::lifecycle::OpContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLocation {
    #[serde(default)]
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReference {
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceJob {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default = "job_resource_type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model: ModelReference,
    #[serde(default)]
    pub input: Vec<DataLocation>,
    #[serde(default)]
    pub output: Vec<DataLocation>,
    /// Seconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout: i64,
    #[serde(default, skip_serializing)]
    pub status: String,
    #[serde(default, skip_serializing)]
    pub status_message: String,
}

fn job_resource_type() -> String {
    "InferenceJob".to_string()
}

impl Identified for InferenceJob {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Job states reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "TIMEDOUT" | "TIMED_OUT" => JobStatus::TimedOut,
            "RUNNING" | "IN_PROGRESS" => JobStatus::Running,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone)]
pub struct Ai {
    rest: RestClient,
    endpoint: String,
}

impl Ai {
    /// `endpoint` is the organization-scoped inference URL.
    pub fn new(ctx: &OpContext, endpoint: &str) -> Self {
        Self {
            rest: ctx.rest(Service::Ai).with_header("api-version", "1"),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn jobs(&self) -> Collection<InferenceJob> {
        Collection::new(self.rest.clone(), format!("{}/InferenceJob", self.endpoint))
    }

    pub async fn job_status(&self, id: &str) -> Result<JobStatus, CallError> {
        let (job, _) = self.jobs().get(id).await?;
        Ok(JobStatus::parse(&job.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status() {
        assert_eq!(JobStatus::parse("completed"), JobStatus::Completed);
        assert!(JobStatus::parse("TIMEDOUT").is_terminal());
        assert!(!JobStatus::parse("SCHEDULED").is_terminal());
    }
}
