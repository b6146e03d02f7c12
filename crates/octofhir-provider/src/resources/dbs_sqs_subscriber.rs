//! `dbs_sqs_subscriber`: SQS queue subscriber of the data broker.
//!
//! Deletion is asynchronous on the server. With `wait_for_delete` the
//! provider polls the deletion status until it settles, so a dependent
//! subscription can be recreated straight away.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};

use super::failed;
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::dbs::{Dbs, SqsSubscriber};
use crate::wait::{DeleteStatus, wait_for};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("name_infix", Attribute::string().required().force_new())
        .attr("description", Attribute::string().force_new())
        .attr(
            "queue_type",
            Attribute::string()
                .default("Standard")
                .force_new()
                .validate(crate::one_of!("Standard", "FIFO")),
        )
        .attr("delivery_delay_seconds", Attribute::int().default(0).force_new())
        .attr(
            "message_retention_period",
            Attribute::int().default(345_600).force_new(),
        )
        .attr(
            "receive_wait_time_seconds",
            Attribute::int().default(0).force_new(),
        )
        .attr(
            "server_side_encryption",
            Attribute::bool().default(true).force_new(),
        )
        .attr("wait_for_delete", Attribute::bool().default(false))
        .attr("name", Attribute::string().computed())
        .attr("status", Attribute::string().computed())
});

#[derive(Debug, Default)]
pub struct DbsSqsSubscriber;

#[async_trait]
impl Resource for DbsSqsSubscriber {
    fn kind(&self) -> &'static str {
        "dbs_sqs_subscriber"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let subscribers = Dbs::new(ctx).subscribers();
        let subscriber = SqsSubscriber {
            name_infix: data.get_string("name_infix"),
            description: data.get_string("description"),
            queue_type: data.get_string("queue_type"),
            delivery_delay_seconds: data.get_int("delivery_delay_seconds"),
            message_retention_period: data.get_int("message_retention_period"),
            receive_wait_time_seconds: data.get_int("receive_wait_time_seconds"),
            server_side_encryption: data.get_bool("server_side_encryption"),
            ..SqsSubscriber::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || subscribers.create(&subscriber))
            .await
            .map_err(failed("create subscriber"))?;
        data.set_id(created.id);
        data.set("name", created.name);
        data.set("status", created.status);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let subscribers = Dbs::new(ctx).subscribers();
        let result = ctx.call(Realm::Iam, &[], || subscribers.get(&id)).await;
        let Some((subscriber, _)) = found(data, "read subscriber", result)? else {
            return Ok(());
        };
        data.set("name_infix", subscriber.name_infix);
        data.set("description", subscriber.description);
        data.set("queue_type", subscriber.queue_type);
        data.set("delivery_delay_seconds", subscriber.delivery_delay_seconds);
        data.set("message_retention_period", subscriber.message_retention_period);
        data.set("receive_wait_time_seconds", subscriber.receive_wait_time_seconds);
        data.set("server_side_encryption", subscriber.server_side_encryption);
        data.set("name", subscriber.name);
        data.set("status", subscriber.status);
        Ok(())
    }

    /// Only `wait_for_delete` can change in place, and it lives in state only.
    async fn update(&self, _ctx: &OpContext, _data: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let dbs = Dbs::new(ctx);
        let subscribers = dbs.subscribers();
        let result = ctx.call(Realm::Iam, &[], || subscribers.delete(&id)).await;
        if tolerate_gone(result).map_err(failed("delete subscriber"))?.is_none() {
            return Ok(());
        }
        if !data.get_bool("wait_for_delete") {
            return Ok(());
        }

        let dbs = &dbs;
        let id = id.as_str();
        wait_for(
            &ctx.cancel,
            "subscriber deletion",
            ctx.poll_interval,
            ctx.timeouts.create,
            || async move {
                let status = ctx
                    .call(Realm::Iam, &[], || dbs.subscriber_delete_status(id))
                    .await;
                match status {
                    Ok(status) => Ok(status),
                    // the status record goes away with the subscriber
                    Err(err) if err.is_gone() => Ok(DeleteStatus::Success),
                    Err(err) => Err(ProviderError::client("poll subscriber deletion", err)),
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttrMap, AttrValue};

    #[test]
    fn test_queue_type() {
        let mut config = AttrMap::from([("name_infix".to_string(), "orders".into())]);
        SCHEMA.apply_defaults(&mut config);
        assert_eq!(config["queue_type"], AttrValue::from("Standard"));
        assert!(!SCHEMA.validate_config(&config).has_errors());

        config.insert("queue_type".to_string(), "Priority".into());
        assert!(SCHEMA.validate_config(&config).has_errors());
    }
}
