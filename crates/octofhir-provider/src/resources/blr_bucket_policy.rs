//! `blr_bucket_policy`: access policy attached to a bucket.
//!
//! Policies are immutable on the server, so every attribute forces
//! replacement and update never runs.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};
use octofhir_core::KindId;

use super::{at_most, failed, guid_of};
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::blr::{Blr, BucketPolicy, Statement};

const KIND: &str = "BlobStorePolicy";

fn at_most_four(value: &AttrValue) -> std::result::Result<(), String> {
    at_most(value, 4)
}

fn at_most_ten(value: &AttrValue) -> std::result::Result<(), String> {
    at_most(value, 10)
}

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let statement = Schema::new(0)
        .attr(
            "effect",
            Attribute::string()
                .required()
                .validate(crate::one_of!("Allow", "Deny")),
        )
        .attr(
            "action",
            Attribute::string_set().required().validate(at_most_four),
        )
        .attr(
            "principal",
            Attribute::string_set()
                .required()
                .min_items(1)
                .validate(at_most_ten),
        )
        .attr("resource", Attribute::string_set().required().min_items(1));
    let policy = Schema::new(0).attr(
        "statement",
        Attribute::block(statement, 0).required().min_items(1),
    );
    Schema::new(0)
        .attr("bucket_id", Attribute::string().required().force_new())
        .attr(
            "policy",
            Attribute::block(policy, 1).required().force_new(),
        )
        .attr("guid", Attribute::string().computed())
});

impl AttrCodec for Statement {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            effect: String::decode(field(block, "effect"), &format!("{path}.effect"))?,
            action: field(block, "action").strings(),
            principal: field(block, "principal").strings(),
            resource: field(block, "resource").strings(),
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("effect".to_string(), self.effect.encode()),
            (
                "action".to_string(),
                AttrValue::string_set(self.action.iter().cloned()),
            ),
            (
                "principal".to_string(),
                AttrValue::string_set(self.principal.iter().cloned()),
            ),
            (
                "resource".to_string(),
                AttrValue::string_set(self.resource.iter().cloned()),
            ),
        ]))
    }
}

fn statements(data: &ResourceData) -> Result<Vec<Statement>> {
    let policy = data
        .get_block("policy")
        .ok_or_else(|| ProviderError::validation("policy", "a policy block is required"))?;
    crate::attr::codec::decode_blocks(field(policy, "statement"), "policy.0.statement")
}

fn policy_block(statements: &[Statement]) -> AttrValue {
    let statement = AttrValue::List(statements.iter().map(AttrCodec::encode).collect());
    AttrValue::blocks([AttrMap::from([("statement".to_string(), statement)])])
}

#[derive(Debug, Default)]
pub struct BlrBucketPolicy;

#[async_trait]
impl Resource for BlrBucketPolicy {
    fn kind(&self) -> &'static str {
        "blr_bucket_policy"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let policies = Blr::new(ctx).policies();
        let policy = BucketPolicy {
            bucket_id: data.get_string("bucket_id"),
            statement: statements(data)?,
            ..BucketPolicy::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || policies.create(&policy))
            .await
            .map_err(failed("create bucket policy"))?;
        data.set_id(KindId::new(KIND, &created.id).to_string());
        data.set("guid", created.id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let policies = Blr::new(ctx).policies();
        let result = ctx.call(Realm::Iam, &[], || policies.get(&guid)).await;
        let Some((policy, _)) = found(data, "read bucket policy", result)? else {
            return Ok(());
        };
        data.set("guid", guid);
        data.set("bucket_id", policy.bucket_id);
        data.set("policy", policy_block(&policy.statement));
        Ok(())
    }

    async fn update(&self, _ctx: &OpContext, _data: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let guid = guid_of(KIND, &require_id(data)?)?;
        let policies = Blr::new(ctx).policies();
        let result = ctx.call(Realm::Iam, &[], || policies.delete(&guid)).await;
        tolerate_gone(result).map_err(failed("delete bucket policy"))?;
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

    fn statement(actions: &[&str], principals: &[&str]) -> AttrMap {
        AttrMap::from([
            ("effect".to_string(), "Allow".into()),
            ("action".to_string(), AttrValue::string_set(actions.iter().copied())),
            (
                "principal".to_string(),
                AttrValue::string_set(principals.iter().copied()),
            ),
            (
                "resource".to_string(),
                AttrValue::string_set(["bucket/*"]),
            ),
        ])
    }

    fn config(statement: AttrMap) -> AttrMap {
        let policy = AttrMap::from([("statement".to_string(), AttrValue::blocks([statement]))]);
        AttrMap::from([
            ("bucket_id".to_string(), "Bucket/abc".into()),
            ("policy".to_string(), AttrValue::blocks([policy])),
        ])
    }

    #[test]
    fn test_statement_limits() {
        let ok = config(statement(&["GET", "PUT"], &["prn:iam:user/1"]));
        assert!(!SCHEMA.validate_config(&ok).has_errors());

        let too_many_actions = config(statement(
            &["GET", "PUT", "DELETE", "LIST", "HEAD"],
            &["prn:iam:user/1"],
        ));
        assert!(SCHEMA.validate_config(&too_many_actions).has_errors());

        let principals: Vec<String> = (0..11).map(|i| format!("prn:iam:user/{i}")).collect();
        let principals: Vec<&str> = principals.iter().map(String::as_str).collect();
        let too_many_principals = config(statement(&["GET"], &principals));
        assert!(SCHEMA.validate_config(&too_many_principals).has_errors());

        let no_principal = config(statement(&["GET"], &[]));
        assert!(SCHEMA.validate_config(&no_principal).has_errors());
    }

    #[test]
    fn test_statements_round_through_policy_block() {
        let data = ResourceData::for_create(config(statement(&["GET"], &["p1"])));
        let decoded = statements(&data).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].effect, "Allow");
        assert_eq!(decoded[0].principal, vec!["p1"]);
    }
}
