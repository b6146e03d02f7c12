//! `iam_service`: IAM service identity and its key material.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};
use serde_json::Value;
use time::OffsetDateTime;

use super::{converge_scopes, failed};
use crate::attr::{AttrMap, AttrValue, DiffSuppress};
use crate::credentials::{
    KeyMode, SELF_MANAGED_CERTIFICATE, SELF_MANAGED_EXPIRES_ON, SELF_MANAGED_PRIVATE_KEY,
    ServiceCertificate, ServiceKey, certificate_expiry, check_transition, validate_key_material,
};
use crate::data::ResourceData;
use crate::error::{Diagnostics, Result};
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::migrate::{RawAttributes, StateUpgrader, add_default};
use crate::schema::{Attribute, Schema, validate_rfc3339};
use crate::services::iam::{Iam, ServiceIdentity};

fn validity_months(value: &AttrValue) -> std::result::Result<(), String> {
    match value.as_int() {
        Some(months) if (1..=600).contains(&months) => Ok(()),
        _ => Err("must be between 1 and 600 months".to_string()),
    }
}

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(1)
        .attr("name", Attribute::string().required().force_new())
        .attr("application_id", Attribute::string().required().force_new())
        .attr("description", Attribute::string().force_new())
        .attr(
            "validity",
            Attribute::int()
                .default(12)
                .force_new()
                .validate(validity_months),
        )
        .attr("token_validity", Attribute::int().default(1800).force_new())
        .attr(
            "scopes",
            Attribute::string_set().default(AttrValue::string_set(["openid"])),
        )
        .attr(
            "default_scopes",
            Attribute::string_set().default(AttrValue::string_set(["openid"])),
        )
        .attr(SELF_MANAGED_PRIVATE_KEY, Attribute::string().sensitive())
        .attr(SELF_MANAGED_CERTIFICATE, Attribute::string())
        .attr(
            SELF_MANAGED_EXPIRES_ON,
            Attribute::string()
                .validate(validate_rfc3339)
                .suppress(DiffSuppress::SameTime),
        )
        .attr("service_id", Attribute::string().computed())
        .attr("private_key", Attribute::string().computed().sensitive())
        .attr(
            "expires_on",
            Attribute::string().computed().suppress(DiffSuppress::SameTime),
        )
        .attr("organization_id", Attribute::string().computed())
});

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, carry_expiry)];

/// A self-managed key issued before `self_managed_expires_on` existed used
/// the certificate expiry it was given at the time.
fn carry_expiry(mut attrs: RawAttributes) -> Result<RawAttributes> {
    let has_key = attrs
        .get(SELF_MANAGED_PRIVATE_KEY)
        .and_then(Value::as_str)
        .is_some_and(|pem| !pem.is_empty());
    if has_key && let Some(expires) = attrs.get("expires_on").cloned() {
        add_default(&mut attrs, SELF_MANAGED_EXPIRES_ON, expires);
    }
    Ok(attrs)
}

#[derive(Debug, Default)]
pub struct IamService;

#[async_trait]
impl Resource for IamService {
    fn kind(&self) -> &'static str {
        "iam_service"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn validate(&self, config: &AttrMap) -> Diagnostics {
        validate_key_material(config)
    }

    fn upgraders(&self) -> &[StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let iam = Iam::new(ctx);
        let services = iam.services();
        let service = ServiceIdentity {
            name: data.get_string("name"),
            description: data.get_string("description"),
            application_id: data.get_string("application_id"),
            validity: data.get_int("validity"),
            access_token_lifetime: data.get_int("token_validity"),
            scopes: data.get_list("scopes"),
            default_scopes: data.get_list("default_scopes"),
            ..ServiceIdentity::default()
        };
        let (created, _) = ctx
            .call(Realm::Iam, &[], || services.create(&service))
            .await
            .map_err(failed("create service"))?;
        data.set_id(created.id.clone());
        data.set("service_id", created.service_id.clone());
        data.set("private_key", created.private_key);
        data.set("expires_on", created.expires_on);
        data.set("organization_id", created.organization_id);

        install_key_material(ctx, &iam, data, &created.id, &created.service_id).await
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let iam = Iam::new(ctx);
        let services = iam.services();
        let result = ctx.call(Realm::Iam, &[], || services.get(&id)).await;
        let Some((service, _)) = found(data, "read service", result)? else {
            return Ok(());
        };
        data.set("name", service.name);
        data.set("description", service.description);
        data.set("application_id", service.application_id);
        data.set("validity", service.validity);
        data.set("token_validity", service.access_token_lifetime);
        data.set("scopes", AttrValue::string_set(service.scopes));
        data.set("default_scopes", AttrValue::string_set(service.default_scopes));
        data.set("service_id", service.service_id);
        data.set("expires_on", service.expires_on);
        data.set("organization_id", service.organization_id);
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let prior_mode = KeyMode::of(&prior_attributes(data));
        check_transition(prior_mode, KeyMode::of(data.attributes()))?;

        let iam = Iam::new(ctx);
        converge_scopes(ctx, &iam, &iam.services().item(&id), data).await?;

        if data.has_changes(&[
            SELF_MANAGED_PRIVATE_KEY,
            SELF_MANAGED_CERTIFICATE,
            SELF_MANAGED_EXPIRES_ON,
        ]) {
            let service_id = data.get_string("service_id");
            install_key_material(ctx, &iam, data, &id, &service_id).await?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let services = Iam::new(ctx).services();
        let result = ctx.call(Realm::Iam, &[], || services.delete(&id)).await;
        tolerate_gone(result).map_err(failed("delete service"))?;
        Ok(())
    }
}

fn prior_attributes(data: &ResourceData) -> AttrMap {
    [SELF_MANAGED_PRIVATE_KEY, SELF_MANAGED_CERTIFICATE]
        .into_iter()
        .map(|key| (key.to_string(), data.get_prior(key).clone()))
        .collect()
}

/// Issue or accept a certificate for the configured key mode and install it.
async fn install_key_material(
    ctx: &OpContext,
    iam: &Iam,
    data: &mut ResourceData,
    id: &str,
    service_id: &str,
) -> Result<()> {
    let (certificate, private_key) = match KeyMode::of(data.attributes()) {
        KeyMode::ServerGenerated => return Ok(()),
        KeyMode::SelfManagedKey => {
            let key = ServiceKey::from_pem(&data.get_string(SELF_MANAGED_PRIVATE_KEY))?;
            let not_after = certificate_expiry(
                data.get_str(SELF_MANAGED_EXPIRES_ON),
                OffsetDateTime::now_utc(),
            )?;
            (key.issue_certificate(service_id, not_after)?, Some(key.to_pem()?))
        }
        KeyMode::SelfManagedCertificate => {
            let pem = data.get_string(SELF_MANAGED_CERTIFICATE);
            (ServiceCertificate::from_pem(&pem, service_id)?, None)
        }
    };

    let der = certificate.der_base64();
    ctx.call(Realm::Iam, &[], || iam.update_service_certificate(id, &der))
        .await
        .map_err(failed("update service certificate"))?;
    tracing::info!(service_id, "installed self-managed certificate");

    data.set("private_key", AttrValue::from(private_key));
    data.set(
        "expires_on",
        octofhir_core::format_rfc3339(certificate.not_after)?,
    );
    Ok(())
}
