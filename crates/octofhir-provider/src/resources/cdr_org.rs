//! `cdr_org`: Organization in a clinical data store.
//!
//! The ID is client-assigned, so create is a PUT. Without `org_id` a
//! fresh UUID is used.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::Realm;
use serde_json::{Value, json};

use super::{failed, fhir_store};
use crate::data::ResourceData;
use crate::error::Result;
use crate::fhir::model::{self, Meta};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema, validate_uuid};

const RESOURCE_TYPE: &str = "Organization";
const REFERENCE_PREFIX: &str = "Organization/";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("fhir_store", Attribute::string().required().force_new())
        .attr(
            "version",
            Attribute::string()
                .default("stu3")
                .force_new()
                .validate(crate::one_of!("stu3", "r4")),
        )
        .attr(
            "org_id",
            Attribute::string()
                .optional_computed()
                .force_new()
                .validate(validate_uuid),
        )
        .attr("name", Attribute::string().required())
        .attr("part_of", Attribute::string())
        .attr("version_id", Attribute::string().computed())
        .attr("last_updated", Attribute::string().computed())
});

#[derive(Debug, Default)]
pub struct CdrOrg;

fn apply_attributes(resource: &mut Value, data: &ResourceData) {
    model::set_string(resource, "name", data.get_str("name").unwrap_or_default());
    let part_of = data.get_str("part_of").unwrap_or_default();
    if let Value::Object(obj) = resource {
        if part_of.is_empty() {
            obj.remove("partOf");
        } else {
            obj.insert(
                "partOf".to_string(),
                json!({"reference": format!("{REFERENCE_PREFIX}{part_of}")}),
            );
        }
    }
}

/// Parent organization ID from a `partOf` reference.
fn parent_of(resource: &Value) -> String {
    let reference = resource
        .get("partOf")
        .map(|p| model::str_field(p, "reference"))
        .unwrap_or_default();
    reference
        .strip_prefix(REFERENCE_PREFIX)
        .unwrap_or(&reference)
        .to_string()
}

#[async_trait]
impl Resource for CdrOrg {
    fn kind(&self) -> &'static str {
        "cdr_org"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        if data.get_str("org_id").is_none_or(str::is_empty) {
            data.set("org_id", octofhir_core::generate_id());
        }
        let store = fhir_store(ctx, data)?;
        let id = data.get_string("org_id");
        let mut resource = json!({"resourceType": RESOURCE_TYPE, "id": id});
        apply_attributes(&mut resource, data);
        let (stored, _) = ctx
            .call(Realm::Iam, &[], || store.put(&resource))
            .await
            .map_err(failed("create organization"))?;
        let meta = Meta::from_resource(&stored);
        data.set_id(id);
        data.set("version_id", meta.version_id);
        data.set("last_updated", meta.last_updated);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let store = fhir_store(ctx, data)?;
        let result = ctx
            .call(Realm::Iam, &[], || store.read(RESOURCE_TYPE, &id))
            .await;
        let Some((resource, _)) = found(data, "read organization", result)? else {
            return Ok(());
        };
        data.set("org_id", id);
        data.set("name", model::str_field(&resource, "name"));
        data.set("part_of", parent_of(&resource));
        let meta = Meta::from_resource(&resource);
        data.set("version_id", meta.version_id);
        data.set("last_updated", meta.last_updated);
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        if !data.has_changes(&["name", "part_of"]) {
            return Ok(());
        }
        let store = fhir_store(ctx, data)?;
        let (original, _) = ctx
            .call(Realm::Iam, &[], || store.read(RESOURCE_TYPE, &id))
            .await
            .map_err(failed("read organization for update"))?;
        let mut modified = original.clone();
        apply_attributes(&mut modified, data);
        if let Some(updated) = store.patch(ctx, RESOURCE_TYPE, &id, &original, &modified).await? {
            let meta = Meta::from_resource(&updated);
            data.set("version_id", meta.version_id);
            data.set("last_updated", meta.last_updated);
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let store = fhir_store(ctx, data)?;
        let result = ctx
            .call(Realm::Iam, &[], || store.delete(RESOURCE_TYPE, &id))
            .await;
        tolerate_gone(result).map_err(failed("delete organization"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrMap;

    #[test]
    fn test_part_of_reference() {
        let data = ResourceData::for_create(AttrMap::from([
            ("name".to_string(), "Ward 7".into()),
            ("part_of".to_string(), "b8a4c0c2-94a2-4d4b-9c51-000000000001".into()),
        ]));
        let mut resource = json!({"resourceType": RESOURCE_TYPE, "id": "x"});
        apply_attributes(&mut resource, &data);
        assert_eq!(
            resource["partOf"]["reference"],
            "Organization/b8a4c0c2-94a2-4d4b-9c51-000000000001"
        );
        assert_eq!(parent_of(&resource), "b8a4c0c2-94a2-4d4b-9c51-000000000001");
        assert_eq!(parent_of(&json!({})), "");
    }

    #[test]
    fn test_org_id_must_be_uuid() {
        let mut config = AttrMap::from([
            ("fhir_store".to_string(), "https://cdr.example.com/store/fhir/org".into()),
            ("name".to_string(), "Ward 7".into()),
            ("org_id".to_string(), "ward-7".into()),
        ]);
        assert!(SCHEMA.validate_config(&config).has_errors());
        config.insert("org_id".to_string(), octofhir_core::generate_id().into());
        assert!(!SCHEMA.validate_config(&config).has_errors());
    }
}
