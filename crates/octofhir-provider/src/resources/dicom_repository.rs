//! `dicom_repository`: repository in a DICOM store configuration.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::Realm;
use octofhir_core::RepositoryId;

use super::failed;
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::dicom::{Dicom, Notification, Repository};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let notification = Schema::new(0)
        .attr("enabled", Attribute::bool().default(true))
        .attr("organization_id", Attribute::string().required());
    Schema::new(0)
        .attr("config_url", Attribute::string().required().force_new())
        .attr("organization_id", Attribute::string().required().force_new())
        .attr(
            "repository_organization_id",
            Attribute::string().optional_computed().force_new(),
        )
        .attr(
            "store_as_composite",
            Attribute::bool().default(false).force_new(),
        )
        .attr("notification", Attribute::block(notification, 1))
});

impl AttrCodec for Notification {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            enabled: bool::decode(field(block, "enabled"), &format!("{path}.enabled"))?,
            organization_id: String::decode(
                field(block, "organization_id"),
                &format!("{path}.organization_id"),
            )?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("enabled".to_string(), self.enabled.encode()),
            ("organization_id".to_string(), self.organization_id.encode()),
        ]))
    }
}

fn store_config(ctx: &OpContext, data: &ResourceData) -> Dicom {
    Dicom::new(
        ctx,
        data.get_str("config_url").unwrap_or_default(),
        data.get_str("organization_id").unwrap_or_default(),
    )
}

#[derive(Debug, Default)]
pub struct DicomRepository;

#[async_trait]
impl Resource for DicomRepository {
    fn kind(&self) -> &'static str {
        "dicom_repository"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let dicom = store_config(ctx, data);
        let organization = match data.get_str("repository_organization_id") {
            Some(org) if !org.is_empty() => org.to_string(),
            _ => data.get_string("organization_id"),
        };
        let repository = Repository {
            organization_id: organization,
            store_as_composite: data.get_bool("store_as_composite"),
            notification: data.decode_block("notification")?,
            ..Repository::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || dicom.create_repository(&repository))
            .await
            .map_err(failed("create repository"))?;
        data.set_id(created.id);
        data.set("repository_organization_id", created.organization_id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let dicom = store_config(ctx, data);
        let result = ctx.call(Realm::Iam, &[], || dicom.get_repository(&id)).await;
        let Some((repository, _)) = found(data, "read repository", result)? else {
            return Ok(());
        };
        data.set("repository_organization_id", repository.organization_id);
        data.set("store_as_composite", repository.store_as_composite);
        match &repository.notification {
            Some(n) => data.set("notification", AttrValue::List(vec![n.encode()])),
            None => data.set("notification", AttrValue::Null),
        }
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        if !data.has_change("notification") {
            return Ok(());
        }
        let dicom = store_config(ctx, data);
        // an absent block switches notifications off
        let notification = data
            .decode_block::<Notification>("notification")?
            .unwrap_or_default();
        ctx.call(Realm::Iam, &[], || dicom.put_notification(&id, &notification))
            .await
            .map_err(failed("update repository notification"))?;
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let dicom = store_config(ctx, data);
        let result = ctx.call(Realm::Iam, &[], || dicom.delete_repository(&id)).await;
        tolerate_gone(result).map_err(failed("delete repository"))?;
        Ok(())
    }

    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        let id: RepositoryId = id.parse()?;
        data.set("config_url", id.config_url);
        data.set("organization_id", id.organization_id);
        data.set_id(id.repository_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_block() {
        let block = AttrMap::from([
            ("enabled".to_string(), true.into()),
            ("organization_id".to_string(), "org-1".into()),
        ]);
        let decoded = Notification::decode(&AttrValue::Block(block), "notification.0").unwrap();
        assert!(decoded.enabled);
        assert_eq!(decoded.organization_id, "org-1");
        assert!(!Notification::default().enabled);
    }
}
