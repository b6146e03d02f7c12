//! `iam_device`: device identity with its own login.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{CallError, Realm, ServiceApi};

use super::failed;
use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue, DiffSuppress};
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{
    OpContext, Resource, create_or_adopt, ensure_field, found, require_id, tolerate_gone,
};
use crate::schema::{Attribute, Schema, validate_rfc3339};
use crate::services::Collection;
use crate::services::iam::{CodeText, Device, DeviceExtId, Iam};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let external_identifier = Schema::new(0)
        .attr("type_code", Attribute::string())
        .attr("type_text", Attribute::string())
        .attr("value", Attribute::string().required())
        .attr("system", Attribute::string());
    Schema::new(0)
        .attr("login_id", Attribute::string().required().force_new())
        .attr("password", Attribute::string().required().sensitive())
        .attr("external_identifier", Attribute::block(external_identifier, 1))
        .attr("type", Attribute::string().required())
        .attr("organization_id", Attribute::string().required().force_new())
        .attr("application_id", Attribute::string().required().force_new())
        .attr("is_active", Attribute::bool().default(true))
        .attr(
            "debug_until",
            Attribute::string()
                .validate(validate_rfc3339)
                .suppress(DiffSuppress::SameTime),
        )
        .attr("text", Attribute::string())
        .attr("for_test", Attribute::bool().default(false).force_new())
        .attr(
            "global_reference_id",
            Attribute::string().optional_computed().force_new(),
        )
});

impl AttrCodec for DeviceExtId {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            id_type: CodeText {
                code: String::decode(field(block, "type_code"), path)?,
                text: String::decode(field(block, "type_text"), path)?,
            },
            value: String::decode(field(block, "value"), path)?,
            system: String::decode(field(block, "system"), path)?,
        })
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Block(AttrMap::from([
            ("type_code".to_string(), self.id_type.code.encode()),
            ("type_text".to_string(), self.id_type.text.encode()),
            ("value".to_string(), self.value.encode()),
            ("system".to_string(), self.system.encode()),
        ]))
    }
}

#[derive(Debug, Default)]
pub struct IamDevice;

fn device_from(data: &ResourceData) -> Result<Device> {
    Ok(Device {
        id: data.id_or_empty().to_string(),
        login_id: data.get_string("login_id"),
        password: data.get_string("password"),
        device_ext_id: data.decode_block("external_identifier")?,
        device_type: data.get_string("type"),
        application_id: data.get_string("application_id"),
        organization_id: data.get_string("organization_id"),
        is_active: data.get_bool("is_active"),
        debug_until: data.get_string("debug_until"),
        text: data.get_string("text"),
        for_test: data.get_bool("for_test"),
        global_reference_id: data.get_string("global_reference_id"),
    })
}

#[async_trait]
impl Resource for IamDevice {
    fn kind(&self) -> &'static str {
        "iam_device"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        if data.get_str("global_reference_id").is_none_or(str::is_empty) {
            data.set("global_reference_id", octofhir_core::generate_id());
        }
        let devices = Iam::new(ctx).devices();
        let device = device_from(data)?;

        let created = create_or_adopt(
            "create device",
            async {
                ctx.call(Realm::Iam, &[], || devices.create(&device))
                    .await
                    .map(|(created, _)| created)
            },
            || find_device(ctx, &devices, &device.login_id, &device.organization_id),
            |existing: &Device| {
                ensure_field("type", &device.device_type, &existing.device_type, false)?;
                ensure_field(
                    "application_id",
                    &device.application_id,
                    &existing.application_id,
                    false,
                )
            },
        )
        .await?;
        if created.is_adopted() {
            tracing::info!(login_id = %device.login_id, "adopted existing device");
        }
        data.set_id(created.into_inner().id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let devices = Iam::new(ctx).devices();
        let result = ctx.call(Realm::Iam, &[], || devices.get(&id)).await;
        let Some((device, _)) = found(data, "read device", result)? else {
            return Ok(());
        };
        data.set("login_id", device.login_id);
        data.set("type", device.device_type);
        data.set("organization_id", device.organization_id);
        data.set("application_id", device.application_id);
        data.set("is_active", device.is_active);
        data.set("debug_until", device.debug_until);
        data.set("text", device.text);
        data.set("for_test", device.for_test);
        data.set("global_reference_id", device.global_reference_id);
        match &device.device_ext_id {
            Some(ext) => data.set("external_identifier", AttrValue::List(vec![ext.encode()])),
            None => data.set("external_identifier", AttrValue::Null),
        }
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let devices = Iam::new(ctx).devices();
        let (mut device, _) = ctx
            .call(Realm::Iam, &[], || devices.get(&id))
            .await
            .map_err(failed("read device for update"))?;
        let wanted = device_from(data)?;
        device.device_ext_id = wanted.device_ext_id;
        device.device_type = wanted.device_type;
        device.is_active = wanted.is_active;
        device.debug_until = wanted.debug_until;
        device.text = wanted.text;
        // password changes go through a separate flow
        device.password.clear();
        ctx.call(Realm::Iam, &[], || devices.update(&device))
            .await
            .map_err(failed("update device"))?;
        if data.has_change("password") {
            data.warn(
                "password not changed",
                "device passwords can only be set on create; replace the device to rotate it",
            );
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let devices = Iam::new(ctx).devices();
        let result = ctx.call(Realm::Iam, &[], || devices.delete(&id)).await;
        tolerate_gone(result).map_err(failed("delete device"))?;
        Ok(())
    }
}

async fn find_device(
    ctx: &OpContext,
    devices: &Collection<Device>,
    login_id: &str,
    organization: &str,
) -> std::result::Result<Option<Device>, CallError> {
    let params = [("loginId", login_id), ("organizationId", organization)];
    let (candidates, _) = ctx
        .call(Realm::Iam, &[], || devices.search(&params))
        .await?;
    Ok(candidates
        .into_iter()
        .find(|d| d.login_id == login_id && d.organization_id == organization))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AttrMap {
        AttrMap::from([
            ("login_id".to_string(), "sensor-01".into()),
            ("password".to_string(), "Pa55word!".into()),
            ("type".to_string(), "ActivityMonitor".into()),
            ("organization_id".to_string(), "org-1".into()),
            ("application_id".to_string(), "app-1".into()),
        ])
    }

    #[test]
    fn test_debug_until_must_be_rfc3339() {
        let mut attrs = config();
        attrs.insert("debug_until".to_string(), "2030-01-01T00:00:00Z".into());
        assert!(!SCHEMA.validate_config(&attrs).has_errors());

        attrs.insert("debug_until".to_string(), "next tuesday".into());
        assert!(SCHEMA.validate_config(&attrs).has_errors());
    }

    #[test]
    fn test_external_identifier_maps_to_wire_shape() {
        let mut attrs = config();
        let ext = AttrMap::from([
            ("type_code".to_string(), "ID".into()),
            ("type_text".to_string(), "Device Identifier".into()),
            ("value".to_string(), "001".into()),
            ("system".to_string(), "http://example.org/devices".into()),
        ]);
        attrs.insert("external_identifier".to_string(), AttrValue::blocks([ext]));
        SCHEMA.apply_defaults(&mut attrs);
        let device = device_from(&ResourceData::for_create(attrs)).unwrap();

        let ext = device.device_ext_id.unwrap();
        assert_eq!(ext.id_type.code, "ID");
        assert_eq!(ext.value, "001");
        assert!(device.is_active);
    }
}
