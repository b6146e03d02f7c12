//! `pki_tenant`: certificate issuance tenant for an org/space pair.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::ServiceApi;
use octofhir_core::CoreError;
use serde_json::json;

use super::failed;
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::migrate::{RawAttributes, StateUpgrader, add_default, for_each_block};
use crate::reconcile::{BatchOutcome, SetOp, reconcile_attribute};
use crate::schema::{Attribute, Schema};
use crate::services::pki::{
    CertificateAuthority, Pki, PkiRole, ServiceParameters, Tenant, logical_path,
};

const DEFAULT_CA_TTL: &str = "8760h";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let any = || AttrValue::string_list(["*"]);
    let role = Schema::new(0)
        .attr("name", Attribute::string().required())
        .attr("allow_any_name", Attribute::bool().default(false))
        .attr("allow_ip_sans", Attribute::bool().default(false))
        .attr("allow_subdomains", Attribute::bool().default(false))
        .attr("allowed_domains", Attribute::string_list())
        .attr("allowed_other_sans", Attribute::string_list().default(any()))
        .attr("allowed_uri_sans", Attribute::string_list().default(any()))
        .attr("client_flag", Attribute::bool().default(false))
        .attr("server_flag", Attribute::bool().default(false))
        .attr("enforce_hostnames", Attribute::bool().default(false))
        .attr("key_bits", Attribute::int().default(2048))
        .attr(
            "key_type",
            Attribute::string()
                .default("rsa")
                .validate(crate::one_of!("rsa", "ec")),
        )
        .attr("ttl", Attribute::string())
        .attr("max_ttl", Attribute::string());
    let ca = Schema::new(0)
        .attr("common_name", Attribute::string().required())
        .attr("ttl", Attribute::string().default(DEFAULT_CA_TTL));
    Schema::new(1)
        .attr("organization_name", Attribute::string().required().force_new())
        .attr("space_name", Attribute::string().required().force_new())
        .attr("iam_orgs", Attribute::string_set().required().min_items(1))
        .attr("role", Attribute::block(role, 0).required().min_items(1))
        .attr("ca", Attribute::block(ca, 1).required().force_new())
        .attr("api_endpoint", Attribute::string().computed())
        .attr("logical_path", Attribute::string().computed())
});

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, default_ca_ttl)];

fn default_ca_ttl(mut attrs: RawAttributes) -> Result<RawAttributes> {
    for_each_block(&mut attrs, "ca", |ca| {
        add_default(ca, "ttl", json!(DEFAULT_CA_TTL));
    });
    Ok(attrs)
}

impl AttrCodec for PkiRole {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        let text = |name: &str| String::decode(field(block, name), &format!("{path}.{name}"));
        let flag = |name: &str| bool::decode(field(block, name), &format!("{path}.{name}"));
        Ok(Self {
            name: text("name")?,
            allow_any_name: flag("allow_any_name")?,
            allow_ip_sans: flag("allow_ip_sans")?,
            allow_subdomains: flag("allow_subdomains")?,
            allowed_domains: field(block, "allowed_domains").strings(),
            allowed_other_sans: field(block, "allowed_other_sans").strings(),
            allowed_uri_sans: field(block, "allowed_uri_sans").strings(),
            client_flag: flag("client_flag")?,
            server_flag: flag("server_flag")?,
            enforce_hostnames: flag("enforce_hostnames")?,
            key_bits: i64::decode(field(block, "key_bits"), &format!("{path}.key_bits"))?,
            key_type: text("key_type")?,
            ttl: text("ttl")?,
            max_ttl: text("max_ttl")?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("name".to_string(), self.name.encode()),
            ("allow_any_name".to_string(), self.allow_any_name.encode()),
            ("allow_ip_sans".to_string(), self.allow_ip_sans.encode()),
            ("allow_subdomains".to_string(), self.allow_subdomains.encode()),
            (
                "allowed_domains".to_string(),
                AttrValue::string_list(self.allowed_domains.iter().cloned()),
            ),
            (
                "allowed_other_sans".to_string(),
                AttrValue::string_list(self.allowed_other_sans.iter().cloned()),
            ),
            (
                "allowed_uri_sans".to_string(),
                AttrValue::string_list(self.allowed_uri_sans.iter().cloned()),
            ),
            ("client_flag".to_string(), self.client_flag.encode()),
            ("server_flag".to_string(), self.server_flag.encode()),
            ("enforce_hostnames".to_string(), self.enforce_hostnames.encode()),
            ("key_bits".to_string(), self.key_bits.encode()),
            ("key_type".to_string(), self.key_type.encode()),
            ("ttl".to_string(), self.ttl.encode()),
            ("max_ttl".to_string(), self.max_ttl.encode()),
        ]))
    }
}

impl AttrCodec for CertificateAuthority {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            common_name: String::decode(field(block, "common_name"), &format!("{path}.common_name"))?,
            ttl: String::decode(field(block, "ttl"), &format!("{path}.ttl"))?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("common_name".to_string(), self.common_name.encode()),
            ("ttl".to_string(), self.ttl.encode()),
        ]))
    }
}

fn tenant_from(data: &ResourceData) -> Result<Tenant> {
    let ca = data
        .decode_block::<CertificateAuthority>("ca")?
        .ok_or_else(|| ProviderError::validation("ca", "a ca block is required"))?;
    let params = ServiceParameters {
        iam_orgs: data.get_list("iam_orgs"),
        ca,
        roles: data.decode_blocks("role")?,
    };
    Ok(Tenant::new(
        data.get_str("organization_name").unwrap_or_default(),
        data.get_str("space_name").unwrap_or_default(),
        params,
    ))
}

#[derive(Debug, Default)]
pub struct PkiTenant;

#[async_trait]
impl Resource for PkiTenant {
    fn kind(&self) -> &'static str {
        "pki_tenant"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn upgraders(&self) -> &[StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let tenants = Pki::new(ctx).tenants();
        let tenant = tenant_from(data)?;
        let (created, _) = ctx
            .call(Pki::REALM, &[], || tenants.create(&tenant))
            .await
            .map_err(failed("onboard tenant"))?;
        data.set_id(tenant.id.clone());
        data.set("logical_path", tenant.id);
        data.set("api_endpoint", created.api_endpoint);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let tenants = Pki::new(ctx).tenants();
        let result = ctx.call(Pki::REALM, &[], || tenants.get(&id)).await;
        let Some((tenant, _)) = found(data, "read tenant", result)? else {
            return Ok(());
        };
        let params = tenant.service_parameters;
        data.set("organization_name", tenant.organization_name);
        data.set("space_name", tenant.space_name);
        data.set("iam_orgs", AttrValue::string_set(params.iam_orgs));
        data.set(
            "role",
            AttrValue::List(params.roles.iter().map(AttrCodec::encode).collect()),
        );
        data.set("ca", AttrValue::List(vec![params.ca.encode()]));
        data.set("api_endpoint", tenant.api_endpoint);
        data.set("logical_path", id);
        Ok(())
    }

    /// Organizations are detached before new ones are attached: each side
    /// of the change is its own PUT of the whole tenant.
    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        require_id(data)?;
        let tenants = Pki::new(ctx).tenants();
        let desired = tenant_from(data)?;
        let (old, new) = data.set_change("iam_orgs");

        let put = |orgs: BTreeSet<String>| {
            let mut tenant = desired.clone();
            tenant.service_parameters.iam_orgs = orgs.into_iter().collect();
            let tenants = &tenants;
            async move {
                ctx.call(Pki::REALM, &[], || tenants.update(&tenant))
                    .await
                    .map(|_| BatchOutcome::ok())
            }
        };

        let mut applied = false;
        if data.has_change("iam_orgs") {
            let (old_ref, new_ref) = (&old, &new);
            let result = reconcile_attribute(data, "iam_orgs", |op, items| {
                applied |= op == SetOp::Add;
                let orgs = match op {
                    SetOp::Remove => old_ref
                        .iter()
                        .filter(|org| !items.contains(*org))
                        .cloned()
                        .collect(),
                    SetOp::Add => new_ref.clone(),
                };
                put(orgs)
            })
            .await?;
            data.extend_warnings(result.warnings);
        }
        if !applied && data.has_change("role") {
            put(new)
                .await
                .map_err(failed("update tenant roles"))?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let tenants = Pki::new(ctx).tenants();
        let result = ctx.call(Pki::REALM, &[], || tenants.delete(&id)).await;
        tolerate_gone(result).map_err(failed("offboard tenant"))?;
        Ok(())
    }

    /// Import identifier is the logical path `<organization>/<space>`.
    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        let Some((organization, space)) = id
            .split_once('/')
            .filter(|(o, s)| !o.is_empty() && !s.is_empty() && !s.contains('/'))
        else {
            return Err(CoreError::invalid_import_id(id, "<organization>/<space>").into());
        };
        data.set("organization_name", organization);
        data.set("space_name", space);
        data.set_id(logical_path(organization, space));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{PersistedState, upgrade};

    fn role() -> AttrMap {
        AttrMap::from([("name".to_string(), "ec384".into())])
    }

    fn config() -> AttrMap {
        let ca = AttrMap::from([("common_name".to_string(), "Example CA".into())]);
        AttrMap::from([
            ("organization_name".to_string(), "org".into()),
            ("space_name".to_string(), "space".into()),
            ("iam_orgs".to_string(), AttrValue::string_set(["org-1"])),
            ("role".to_string(), AttrValue::blocks([role()])),
            ("ca".to_string(), AttrValue::blocks([ca])),
        ])
    }

    #[test]
    fn test_role_defaults_allow_any_san() {
        let mut attrs = config();
        SCHEMA.apply_defaults(&mut attrs);
        let tenant = tenant_from(&ResourceData::for_create(attrs)).unwrap();
        let role = &tenant.service_parameters.roles[0];
        assert_eq!(role.allowed_other_sans, vec!["*"]);
        assert_eq!(role.allowed_uri_sans, vec!["*"]);
        assert_eq!(role.key_type, "rsa");
        assert_eq!(tenant.service_parameters.ca.ttl, DEFAULT_CA_TTL);
        assert_eq!(tenant.id, "org/space");
    }

    #[test]
    fn test_at_least_one_role_and_org() {
        let mut attrs = config();
        attrs.insert("role".to_string(), AttrValue::List(Vec::new()));
        attrs.insert("iam_orgs".to_string(), AttrValue::string_set(Vec::<String>::new()));
        let diags = SCHEMA.validate_config(&attrs);
        let paths: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        assert!(paths.contains(&"role".to_string()));
        assert!(paths.contains(&"iam_orgs".to_string()));
    }

    #[test]
    fn test_upgrade_defaults_ca_ttl() {
        let attrs = json!({
            "organization_name": "org",
            "ca": [{"common_name": "Example CA"}]
        });
        let state = PersistedState::new(0, "org/space", attrs.as_object().cloned().unwrap());
        let upgraded = upgrade(state, 1, PkiTenant.upgraders()).unwrap();
        assert_eq!(upgraded.attributes["ca"][0]["ttl"], json!(DEFAULT_CA_TTL));
    }
}
