//! `ai_inference_job`: one-shot inference run of a model.
//!
//! Jobs cannot be modified. Create returns once the job settles, so the
//! outputs are usable by whatever depends on the resource.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};

use super::failed;
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::ai::{Ai, DataLocation, InferenceJob, JobStatus, ModelReference};
use crate::wait::{DeleteStatus, wait_for};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let location = || {
        Schema::new(0)
            .attr("name", Attribute::string().force_new())
            .attr("url", Attribute::string().required().force_new())
    };
    Schema::new(0)
        .attr("endpoint", Attribute::string().required().force_new())
        .attr("name", Attribute::string().required().force_new())
        .attr("description", Attribute::string().force_new())
        .attr("model_id", Attribute::string().required().force_new())
        .attr(
            "input",
            Attribute::block(location(), 0).required().min_items(1).force_new(),
        )
        .attr(
            "output",
            Attribute::block(location(), 0).required().min_items(1).force_new(),
        )
        .attr("timeout", Attribute::int().default(0).force_new())
        .attr("status", Attribute::string().computed())
        .attr("job_id", Attribute::string().computed())
});

impl AttrCodec for DataLocation {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            name: String::decode(field(block, "name"), &format!("{path}.name"))?,
            url: String::decode(field(block, "url"), &format!("{path}.url"))?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("name".to_string(), self.name.encode()),
            ("url".to_string(), self.url.encode()),
        ]))
    }
}

fn job_from(data: &ResourceData) -> Result<InferenceJob> {
    Ok(InferenceJob {
        resource_type: "InferenceJob".to_string(),
        name: data.get_string("name"),
        description: data.get_string("description"),
        model: ModelReference {
            reference: format!("Model/{}", data.get_string("model_id")),
        },
        input: data.decode_blocks("input")?,
        output: data.decode_blocks("output")?,
        timeout: data.get_int("timeout"),
        ..InferenceJob::default()
    })
}

/// Job states folded onto the poller's terminal states.
fn progress(status: JobStatus) -> DeleteStatus {
    match status {
        JobStatus::Completed => DeleteStatus::Success,
        JobStatus::Failed | JobStatus::TimedOut => DeleteStatus::Failed,
        JobStatus::Pending | JobStatus::Running => DeleteStatus::InProgress,
    }
}

#[derive(Debug, Default)]
pub struct AiInferenceJob;

#[async_trait]
impl Resource for AiInferenceJob {
    fn kind(&self) -> &'static str {
        "ai_inference_job"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let ai = Ai::new(ctx, data.get_str("endpoint").unwrap_or_default());
        let jobs = ai.jobs();
        let job = job_from(data)?;
        let (created, _) = ctx
            .call(Realm::Iam, &[], || jobs.create(&job))
            .await
            .map_err(failed("create inference job"))?;
        if created.id.is_empty() {
            return Err(ProviderError::Failed(
                "inference job created but the service returned no ID".to_string(),
            ));
        }
        data.set_id(created.id.clone());
        data.set("job_id", created.id.clone());
        data.set("status", created.status);

        let ai = &ai;
        let id = created.id.as_str();
        let waited = wait_for(
            &ctx.cancel,
            "inference job",
            ctx.poll_interval,
            ctx.timeouts.create,
            || async move {
                ctx.call(Realm::Iam, &[], || ai.job_status(id))
                    .await
                    .map(progress)
                    .map_err(|e| ProviderError::client("poll inference job", e))
            },
        )
        .await;

        // the job exists either way; record where it ended up
        if let Ok((job, _)) = ctx.call(Realm::Iam, &[], || jobs.get(id)).await {
            data.set("status", job.status);
        }
        waited
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let jobs = Ai::new(ctx, data.get_str("endpoint").unwrap_or_default()).jobs();
        let result = ctx.call(Realm::Iam, &[], || jobs.get(&id)).await;
        let Some((job, _)) = found(data, "read inference job", result)? else {
            return Ok(());
        };
        data.set("job_id", job.id);
        data.set("name", job.name);
        data.set("description", job.description);
        let model_id = job
            .model
            .reference
            .strip_prefix("Model/")
            .unwrap_or(&job.model.reference)
            .to_string();
        data.set("model_id", model_id);
        data.set("input", AttrValue::List(job.input.iter().map(AttrCodec::encode).collect()));
        data.set("output", AttrValue::List(job.output.iter().map(AttrCodec::encode).collect()));
        data.set("timeout", job.timeout);
        data.set("status", job.status);
        Ok(())
    }

    async fn update(&self, _ctx: &OpContext, _data: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let jobs = Ai::new(ctx, data.get_str("endpoint").unwrap_or_default()).jobs();
        let result = ctx.call(Realm::Iam, &[], || jobs.delete(&id)).await;
        tolerate_gone(result).map_err(failed("delete inference job"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert_eq!(progress(JobStatus::Completed), DeleteStatus::Success);
        assert_eq!(progress(JobStatus::TimedOut), DeleteStatus::Failed);
        assert_eq!(progress(JobStatus::Running), DeleteStatus::InProgress);
    }

    #[test]
    fn test_job_body() {
        let location = |url: &str| {
            AttrMap::from([
                ("name".to_string(), "data".into()),
                ("url".to_string(), url.into()),
            ])
        };
        let data = ResourceData::for_create(AttrMap::from([
            ("name".to_string(), "segment-ct".into()),
            ("model_id".to_string(), "m-1".into()),
            ("input".to_string(), AttrValue::blocks([location("s3://in")])),
            ("output".to_string(), AttrValue::blocks([location("s3://out")])),
        ]));
        let job = job_from(&data).unwrap();
        assert_eq!(job.model.reference, "Model/m-1");
        assert_eq!(job.input[0].url, "s3://in");
        assert_eq!(job.output[0].url, "s3://out");
        assert_eq!(job.resource_type, "InferenceJob");
    }
}
