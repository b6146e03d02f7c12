//! `dbs_topic_subscription`: routes a data broker topic to a subscriber.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};
use octofhir_core::KindId;

use super::{failed, guid_of};
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::dbs::{Dbs, TopicSubscription};

const KIND: &str = "TopicSubscription";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("name_infix", Attribute::string().required().force_new())
        .attr("description", Attribute::string().force_new())
        .attr("subscriber_id", Attribute::string().required().force_new())
        .attr(
            "deliver_data_only",
            Attribute::bool().default(false).force_new(),
        )
        .attr("topic_name", Attribute::string().required().force_new())
        .attr("status", Attribute::string().computed())
});

#[derive(Debug, Default)]
pub struct DbsTopicSubscription;

#[async_trait]
impl Resource for DbsTopicSubscription {
    fn kind(&self) -> &'static str {
        "dbs_topic_subscription"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let subscriptions = Dbs::new(ctx).subscriptions();
        let subscription = TopicSubscription {
            name_infix: data.get_string("name_infix"),
            description: data.get_string("description"),
            subscriber_id: data.get_string("subscriber_id"),
            deliver_data_only: data.get_bool("deliver_data_only"),
            topic_name: data.get_string("topic_name"),
            ..TopicSubscription::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || subscriptions.create(&subscription))
            .await
            .map_err(failed("create topic subscription"))?;
        data.set_id(KindId::new(KIND, created.id).to_string());
        data.set("status", created.status);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let subscriptions = Dbs::new(ctx).subscriptions();
        let result = ctx.call(Realm::Iam, &[], || subscriptions.get(&guid)).await;
        let Some((subscription, _)) = found(data, "read topic subscription", result)? else {
            return Ok(());
        };
        data.set("name_infix", subscription.name_infix);
        data.set("description", subscription.description);
        data.set("subscriber_id", subscription.subscriber_id);
        data.set("deliver_data_only", subscription.deliver_data_only);
        data.set("topic_name", subscription.topic_name);
        data.set("status", subscription.status);
        Ok(())
    }

    async fn update(&self, _ctx: &OpContext, _data: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let subscriptions = Dbs::new(ctx).subscriptions();
        let result = ctx.call(Realm::Iam, &[], || subscriptions.delete(&guid)).await;
        tolerate_gone(result).map_err(failed("delete topic subscription"))?;
        Ok(())
    }

    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        data.set_id(KindId::parse_expecting(KIND, id)?.to_string());
        Ok(())
    }
}
