//! `blr_bucket`: blob repository bucket.
//!
//! The resource ID is `Bucket/<guid>`; `guid` alone addresses the REST item.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};
use octofhir_core::KindId;

use super::{failed, guid_of};
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::blr::{Blr, Bucket, CorsConfiguration};

const KIND: &str = "Bucket";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let cors = Schema::new(0)
        .attr("allowed_origins", Attribute::string_set().required())
        .attr("allowed_methods", Attribute::string_set().required())
        .attr("allowed_headers", Attribute::string_set())
        .attr("expose_headers", Attribute::string_set())
        .attr("max_age_seconds", Attribute::int());
    Schema::new(0)
        .attr("name", Attribute::string().required().force_new())
        .attr("proposition_id", Attribute::string().required().force_new())
        .attr("enable_cdn", Attribute::bool().default(false).force_new())
        .attr("enable_hsdp_domain", Attribute::bool().default(false).force_new())
        .attr(
            "price_class",
            Attribute::string()
                .force_new()
                .validate(crate::one_of!("PriceClass_100", "PriceClass_200", "PriceClass_All")),
        )
        .attr("cache_policy", Attribute::string())
        .attr("cors_configuration", Attribute::block(cors, 1))
        .attr("guid", Attribute::string().computed())
});

impl AttrCodec for CorsConfiguration {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            allowed_origins: field(block, "allowed_origins").strings(),
            allowed_methods: field(block, "allowed_methods").strings(),
            allowed_headers: field(block, "allowed_headers").strings(),
            expose_headers: field(block, "expose_headers").strings(),
            max_age_seconds: i64::decode(
                field(block, "max_age_seconds"),
                &format!("{path}.max_age_seconds"),
            )?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            (
                "allowed_origins".to_string(),
                AttrValue::string_set(self.allowed_origins.iter().cloned()),
            ),
            (
                "allowed_methods".to_string(),
                AttrValue::string_set(self.allowed_methods.iter().cloned()),
            ),
            (
                "allowed_headers".to_string(),
                AttrValue::string_set(self.allowed_headers.iter().cloned()),
            ),
            (
                "expose_headers".to_string(),
                AttrValue::string_set(self.expose_headers.iter().cloned()),
            ),
            ("max_age_seconds".to_string(), self.max_age_seconds.encode()),
        ]))
    }
}

#[derive(Debug, Default)]
pub struct BlrBucket;

#[async_trait]
impl Resource for BlrBucket {
    fn kind(&self) -> &'static str {
        "blr_bucket"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let buckets = Blr::new(ctx).buckets();
        let bucket = Bucket {
            name: data.get_string("name"),
            proposition_id: data.get_string("proposition_id"),
            enable_cdn: data.get_bool("enable_cdn"),
            enable_hsdp_domain: data.get_bool("enable_hsdp_domain"),
            price_class: data.get_string("price_class"),
            cache_policy: data.get_string("cache_policy"),
            cors_configuration: data.decode_block("cors_configuration")?,
            ..Bucket::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || buckets.create(&bucket))
            .await
            .map_err(failed("create bucket"))?;
        data.set_id(KindId::new(KIND, &created.id).to_string());
        data.set("guid", created.id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let buckets = Blr::new(ctx).buckets();
        let result = ctx.call(Realm::Iam, &[], || buckets.get(&guid)).await;
        let Some((bucket, _)) = found(data, "read bucket", result)? else {
            return Ok(());
        };
        data.set("guid", guid);
        data.set("name", bucket.name);
        data.set("proposition_id", bucket.proposition_id);
        data.set("enable_cdn", bucket.enable_cdn);
        data.set("enable_hsdp_domain", bucket.enable_hsdp_domain);
        data.set("price_class", bucket.price_class);
        data.set("cache_policy", bucket.cache_policy);
        match &bucket.cors_configuration {
            Some(cors) => data.set("cors_configuration", AttrValue::List(vec![cors.encode()])),
            None => data.set("cors_configuration", AttrValue::Null),
        }
        Ok(())
    }

    /// GET-modify-PUT. The CORS block replaces the server's wholesale.
    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let buckets = Blr::new(ctx).buckets();
        let (mut bucket, _) = ctx
            .call(Realm::Iam, &[], || buckets.get(&guid))
            .await
            .map_err(failed("read bucket for update"))?;
        bucket.id = guid;
        bucket.cache_policy = data.get_string("cache_policy");
        bucket.cors_configuration = data.decode_block("cors_configuration")?;
        ctx.call(Realm::Iam, &[], || buckets.update(&bucket))
            .await
            .map_err(failed("update bucket"))?;
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let buckets = Blr::new(ctx).buckets();
        let result = ctx.call(Realm::Iam, &[], || buckets.delete(&guid)).await;
        tolerate_gone(result).map_err(failed("delete bucket"))?;
        Ok(())
    }

    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        let id = KindId::parse_expecting(KIND, id)?;
        data.set("guid", id.guid.clone());
        data.set_id(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_block_decodes() {
        let cors = AttrMap::from([
            (
                "allowed_origins".to_string(),
                AttrValue::string_set(["https://a.example.com"]),
            ),
            ("allowed_methods".to_string(), AttrValue::string_set(["GET"])),
            ("max_age_seconds".to_string(), AttrValue::Int(3000)),
        ]);
        let decoded = CorsConfiguration::decode(&AttrValue::Block(cors), "cors").unwrap();
        assert_eq!(decoded.allowed_origins, vec!["https://a.example.com"]);
        assert_eq!(decoded.max_age_seconds, 3000);
        assert!(decoded.allowed_headers.is_empty());
    }

    #[test]
    fn test_only_one_cors_block() {
        let cors = AttrMap::from([
            ("allowed_origins".to_string(), AttrValue::string_set(["*"])),
            ("allowed_methods".to_string(), AttrValue::string_set(["GET"])),
        ]);
        let config = AttrMap::from([
            ("name".to_string(), "bucket".into()),
            ("proposition_id".to_string(), "prop".into()),
            (
                "cors_configuration".to_string(),
                AttrValue::blocks([cors.clone(), cors]),
            ),
        ]);
        assert!(SCHEMA.validate_config(&config).has_errors());
    }
}
