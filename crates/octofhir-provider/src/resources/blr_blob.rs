//! `blr_blob`: blob metadata in a bucket.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};
use octofhir_core::KindId;

use super::{failed, guid_of};
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::blr::{Blob, Blr};

const KIND: &str = "Blob";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("bucket_id", Attribute::string().required().force_new())
        .attr("blob_path", Attribute::string().required().force_new())
        .attr("virtual_path", Attribute::string())
        .attr("attachment_path", Attribute::string())
        .attr("guid", Attribute::string().computed())
        .attr("policy", Attribute::string().computed())
});

#[derive(Debug, Default)]
pub struct BlrBlob;

#[async_trait]
impl Resource for BlrBlob {
    fn kind(&self) -> &'static str {
        "blr_blob"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let blobs = Blr::new(ctx).blobs();
        let blob = Blob {
            bucket: data.get_string("bucket_id"),
            blob_path: data.get_string("blob_path"),
            virtual_path: data.get_string("virtual_path"),
            attachment_path: data.get_string("attachment_path"),
            ..Blob::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || blobs.create(&blob))
            .await
            .map_err(failed("create blob"))?;
        data.set_id(KindId::new(KIND, &created.id).to_string());
        data.set("guid", created.id);
        data.set("policy", created.policy);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let blobs = Blr::new(ctx).blobs();
        let result = ctx.call(Realm::Iam, &[], || blobs.get(&guid)).await;
        let Some((blob, _)) = found(data, "read blob", result)? else {
            return Ok(());
        };
        data.set("guid", guid);
        data.set("bucket_id", blob.bucket);
        data.set("blob_path", blob.blob_path);
        data.set("virtual_path", blob.virtual_path);
        data.set("attachment_path", blob.attachment_path);
        data.set("policy", blob.policy);
        Ok(())
    }

    /// Blob metadata cannot be changed after upload.
    async fn update(&self, _ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        data.warn(
            "blob not updated",
            "blob metadata is immutable; the change is recorded in state only",
        );
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let blobs = Blr::new(ctx).blobs();
        let result = ctx.call(Realm::Iam, &[], || blobs.delete(&guid)).await;
        tolerate_gone(result).map_err(failed("delete blob"))?;
        Ok(())
    }

    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        let id = KindId::parse_expecting(KIND, id)?;
        data.set("guid", id.guid.clone());
        data.set_id(id.to_string());
        Ok(())
    }
}
