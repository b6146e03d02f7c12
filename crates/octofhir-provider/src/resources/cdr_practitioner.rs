//! `cdr_practitioner`: Practitioner in a clinical data store.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, retry_on_with};
use serde_json::{Value, json};

use super::{FHIR_DELETE_RETRY_ON, failed, fhir_store};
use crate::attr::codec::{AttrCodec, decode_blocks};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::{Diagnostics, ProviderError, Result};
use crate::fhir::model::{self, HumanName, Identifier, Meta};
use crate::fhir::{FhirStore, codec_for};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};

const RESOURCE_TYPE: &str = "Practitioner";

/// A fresh resource can answer 404 for a moment after create.
const READ_ATTEMPTS: u32 = 3;

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let identifier = Schema::new(0)
        .attr("system", Attribute::string().required())
        .attr("value", Attribute::string().required())
        .attr("use", Attribute::string().default("usual"));
    let name = Schema::new(0)
        .attr("text", Attribute::string())
        .attr("family", Attribute::string().required())
        .attr("given", Attribute::string_list())
        .attr("prefix", Attribute::string_list());
    Schema::new(0)
        .attr("fhir_store", Attribute::string().required().force_new())
        .attr(
            "version",
            Attribute::string()
                .default("stu3")
                .force_new()
                .validate(crate::one_of!("stu3", "r4")),
        )
        .attr("identifier", Attribute::block(identifier, 0).required().min_items(1))
        .attr("name", Attribute::block(name, 0).required().min_items(1))
        .attr("soft_delete", Attribute::bool().default(false))
        .attr("version_id", Attribute::string().computed())
        .attr("last_updated", Attribute::string().computed())
});

#[derive(Debug, Default)]
pub struct CdrPractitioner;

/// Overlay the managed elements on `resource`.
fn apply_attributes(resource: &mut Value, data: &ResourceData) -> Result<()> {
    let identifiers: Vec<Identifier> = data.decode_blocks("identifier")?;
    let names: Vec<HumanName> = data.decode_blocks("name")?;
    model::set_array(
        resource,
        "identifier",
        identifiers.iter().map(Identifier::to_json).collect(),
    );
    model::set_array(resource, "name", names.iter().map(HumanName::to_json).collect());
    Ok(())
}

#[async_trait]
impl Resource for CdrPractitioner {
    fn kind(&self) -> &'static str {
        "cdr_practitioner"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn validate(&self, config: &AttrMap) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let version = config.get("version").and_then(AttrValue::as_str).unwrap_or_default();
        let Ok(codec) = codec_for(version) else {
            return diags;
        };
        let Some(value) = config.get("identifier") else {
            return diags;
        };
        match decode_blocks::<Identifier>(value, "identifier") {
            Ok(identifiers) => {
                for (i, identifier) in identifiers.iter().enumerate() {
                    if let Err(err) = codec.check_identifier(identifier) {
                        diags.error(format!("identifier.{i}.use"), err.to_string());
                    }
                }
            }
            Err(err) => diags.error("identifier", err.to_string()),
        }
        diags
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let store = fhir_store(ctx, data)?;
        let mut resource = json!({"resourceType": RESOURCE_TYPE});
        apply_attributes(&mut resource, data)?;

        // a soft-deleted practitioner still exists on the server and is
        // taken over instead of duplicated
        if data.get_bool("soft_delete")
            && let Some(existing) = find_existing(ctx, &store, data).await?
        {
            let id = model::str_field(&existing, "id");
            tracing::info!(id = %id, "adopting existing practitioner");
            data.set_id(id.clone());
            let original = existing;
            let mut modified = original.clone();
            apply_attributes(&mut modified, data)?;
            store.patch(ctx, RESOURCE_TYPE, &id, &original, &modified).await?;
            return Ok(());
        }

        let (created, _) = ctx
            .call(Realm::Iam, &[], || store.create(&resource))
            .await
            .map_err(failed("create practitioner"))?;
        let id = model::str_field(&created, "id");
        if id.is_empty() {
            return Err(ProviderError::Failed(
                "practitioner created but the store returned no ID".to_string(),
            ));
        }
        data.set_id(id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let store = fhir_store(ctx, data)?;
        let retry_on = retry_on_with(&[404]);
        let result = ctx
            .call_with(Realm::Iam, READ_ATTEMPTS, &retry_on, || {
                store.read(RESOURCE_TYPE, &id)
            })
            .await;
        let Some((resource, _)) = found(data, "read practitioner", result)? else {
            return Ok(());
        };
        let identifiers = model::identifiers(&resource);
        let names = model::names(&resource);
        data.set(
            "identifier",
            AttrValue::List(identifiers.iter().map(AttrCodec::encode).collect()),
        );
        data.set(
            "name",
            AttrValue::List(names.iter().map(AttrCodec::encode).collect()),
        );
        let meta = Meta::from_resource(&resource);
        data.set("version_id", meta.version_id);
        data.set("last_updated", meta.last_updated);
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        if !data.has_changes(&["identifier", "name"]) {
            return Ok(());
        }
        let store = fhir_store(ctx, data)?;
        let (original, _) = ctx
            .call(Realm::Iam, &[], || store.read(RESOURCE_TYPE, &id))
            .await
            .map_err(failed("read practitioner for update"))?;
        let mut modified = original.clone();
        apply_attributes(&mut modified, data)?;
        store.patch(ctx, RESOURCE_TYPE, &id, &original, &modified).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let store = fhir_store(ctx, data)?;
        let result = ctx
            .call(Realm::Iam, &FHIR_DELETE_RETRY_ON, || store.delete(RESOURCE_TYPE, &id))
            .await;
        match tolerate_gone(result) {
            Ok(_) => Ok(()),
            Err(err)
                if err.status() == 403
                    && data.get_bool("soft_delete")
                    && store.codec().soft_delete_on_forbidden =>
            {
                data.warn(
                    "practitioner kept in the store",
                    format!(
                        "{RESOURCE_TYPE}/{id} is still referenced and was only removed from state"
                    ),
                );
                Ok(())
            }
            Err(err) => Err(ProviderError::client("delete practitioner", err)),
        }
    }
}

/// Existing practitioner sharing a `usual` identifier.
async fn find_existing(
    ctx: &OpContext,
    store: &FhirStore,
    data: &ResourceData,
) -> Result<Option<Value>> {
    let identifiers: Vec<Identifier> = data.decode_blocks("identifier")?;
    for identifier in identifiers.iter().filter(|i| i.use_ == "usual") {
        let existing = ctx
            .call(Realm::Iam, &[], || {
                store.find_by_identifier(RESOURCE_TYPE, identifier)
            })
            .await
            .map_err(failed("search practitioner"))?;
        if existing.is_some() {
            return Ok(existing);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(version: &str, use_: &str) -> AttrMap {
        let identifier = AttrMap::from([
            ("system".to_string(), "https://ids.example.com".into()),
            ("value".to_string(), "p-42".into()),
            ("use".to_string(), use_.into()),
        ]);
        let name = AttrMap::from([("family".to_string(), "Doe".into())]);
        AttrMap::from([
            ("fhir_store".to_string(), "https://cdr.example.com/store/fhir/org".into()),
            ("version".to_string(), version.into()),
            ("identifier".to_string(), AttrValue::blocks([identifier])),
            ("name".to_string(), AttrValue::blocks([name])),
        ])
    }

    #[test]
    fn test_identifier_use_depends_on_version() {
        assert!(!CdrPractitioner.validate(&config("r4", "old")).has_errors());
        assert!(CdrPractitioner.validate(&config("stu3", "old")).has_errors());
        assert!(!CdrPractitioner.validate(&config("stu3", "official")).has_errors());
    }

    #[test]
    fn test_resource_body() {
        let mut attrs = config("stu3", "usual");
        SCHEMA.apply_defaults(&mut attrs);
        let data = ResourceData::for_create(attrs);
        let mut resource = json!({"resourceType": RESOURCE_TYPE});
        apply_attributes(&mut resource, &data).unwrap();
        assert_eq!(
            resource,
            json!({
                "resourceType": "Practitioner",
                "identifier": [{"system": "https://ids.example.com", "value": "p-42", "use": "usual"}],
                "name": [{"family": "Doe"}]
            })
        );
    }
}
