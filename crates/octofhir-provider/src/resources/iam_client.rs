//! `iam_client`: OAuth client of an IAM application.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{Realm, ServiceApi};

use super::{converge_scopes, failed};
use crate::attr::AttrValue;
use crate::data::ResourceData;
use crate::error::Result;
use crate::lifecycle::{OpContext, Resource, found, require_id, tolerate_gone};
use crate::schema::{Attribute, Schema};
use crate::services::iam::{Client, Iam};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("name", Attribute::string().required())
        .attr(
            "type",
            Attribute::string()
                .required()
                .force_new()
                .validate(crate::one_of!("Public", "Confidential")),
        )
        .attr("client_id", Attribute::string().required().force_new())
        .attr("password", Attribute::string().required().sensitive().force_new())
        .attr("application_id", Attribute::string().required().force_new())
        .attr("description", Attribute::string())
        .attr("global_reference_id", Attribute::string().optional_computed().force_new())
        .attr("redirection_uris", Attribute::string_list())
        .attr("response_types", Attribute::string_list())
        .attr("scopes", Attribute::string_set().required())
        .attr("default_scopes", Attribute::string_set().required())
        .attr("access_token_lifetime", Attribute::int().default(1800))
        .attr("refresh_token_lifetime", Attribute::int().default(2_592_000))
        .attr("id_token_lifetime", Attribute::int().default(3600))
        .attr("consent_implied", Attribute::bool().default(false))
});

#[derive(Debug, Default)]
pub struct IamClient;

fn client_from(data: &ResourceData) -> Client {
    Client {
        id: data.id_or_empty().to_string(),
        client_id: data.get_string("client_id"),
        client_type: data.get_string("type"),
        name: data.get_string("name"),
        password: data.get_string("password"),
        description: data.get_string("description"),
        redirection_uris: data.get_list("redirection_uris"),
        response_types: data.get_list("response_types"),
        scopes: data.get_list("scopes"),
        default_scopes: data.get_list("default_scopes"),
        application_id: data.get_string("application_id"),
        global_reference_id: data.get_string("global_reference_id"),
        access_token_lifetime: data.get_int("access_token_lifetime"),
        refresh_token_lifetime: data.get_int("refresh_token_lifetime"),
        id_token_lifetime: data.get_int("id_token_lifetime"),
        consent_implied: data.get_bool("consent_implied"),
    }
}

#[async_trait]
impl Resource for IamClient {
    fn kind(&self) -> &'static str {
        "iam_client"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        if data.get_str("global_reference_id").is_none_or(str::is_empty) {
            data.set("global_reference_id", octofhir_core::generate_id());
        }
        let clients = Iam::new(ctx).clients();
        let client = client_from(data);
        // 403 is in the default retry set: a new application takes a while
        // to become visible to the client endpoint
        let (created, _) = ctx
            .call(Realm::Iam, &[], || clients.create(&client))
            .await
            .map_err(failed("create client"))?;
        data.set_id(created.id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let clients = Iam::new(ctx).clients();
        let result = ctx.call(Realm::Iam, &[], || clients.get(&id)).await;
        let Some((client, _)) = found(data, "read client", result)? else {
            return Ok(());
        };
        data.set("name", client.name);
        data.set("type", client.client_type);
        data.set("client_id", client.client_id);
        data.set("description", client.description);
        data.set("application_id", client.application_id);
        data.set("global_reference_id", client.global_reference_id);
        data.set("redirection_uris", AttrValue::string_list(client.redirection_uris));
        data.set("response_types", AttrValue::string_list(client.response_types));
        data.set("scopes", AttrValue::string_set(client.scopes));
        data.set("default_scopes", AttrValue::string_set(client.default_scopes));
        data.set("access_token_lifetime", client.access_token_lifetime);
        data.set("refresh_token_lifetime", client.refresh_token_lifetime);
        data.set("id_token_lifetime", client.id_token_lifetime);
        data.set("consent_implied", client.consent_implied);
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let iam = Iam::new(ctx);
        let clients = iam.clients();

        let plain = [
            "name",
            "description",
            "redirection_uris",
            "response_types",
            "access_token_lifetime",
            "refresh_token_lifetime",
            "id_token_lifetime",
            "consent_implied",
        ];
        if data.has_changes(&plain) {
            let (mut client, _) = ctx
                .call(Realm::Iam, &[], || clients.get(&id))
                .await
                .map_err(failed("read client for update"))?;
            client.name = data.get_string("name");
            client.description = data.get_string("description");
            client.redirection_uris = data.get_list("redirection_uris");
            client.response_types = data.get_list("response_types");
            client.access_token_lifetime = data.get_int("access_token_lifetime");
            client.refresh_token_lifetime = data.get_int("refresh_token_lifetime");
            client.id_token_lifetime = data.get_int("id_token_lifetime");
            client.consent_implied = data.get_bool("consent_implied");
            // the server rejects a PUT that carries the password
            client.password.clear();
            ctx.call(Realm::Iam, &[], || clients.update(&client))
                .await
                .map_err(failed("update client"))?;
        }

        converge_scopes(ctx, &iam, &clients.item(&id), data).await
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let clients = Iam::new(ctx).clients();
        let result = ctx.call(Realm::Iam, &[], || clients.delete(&id)).await;
        tolerate_gone(result).map_err(failed("delete client"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrMap;

    fn config(client_type: &str) -> AttrMap {
        AttrMap::from([
            ("name".to_string(), "portal".into()),
            ("type".to_string(), client_type.into()),
            ("client_id".to_string(), "portal-client".into()),
            ("password".to_string(), "S3cret!pass".into()),
            ("application_id".to_string(), "app-1".into()),
            ("scopes".to_string(), AttrValue::string_set(["cn", "openid"])),
            ("default_scopes".to_string(), AttrValue::string_set(["cn"])),
        ])
    }

    #[test]
    fn test_client_type_is_checked() {
        assert!(!SCHEMA.validate_config(&config("Public")).has_errors());
        assert!(SCHEMA.validate_config(&config("Private")).has_errors());
    }

    #[test]
    fn test_token_lifetime_defaults() {
        let mut attrs = config("Confidential");
        SCHEMA.apply_defaults(&mut attrs);
        assert_eq!(attrs["access_token_lifetime"], AttrValue::Int(1800));
        assert_eq!(attrs["refresh_token_lifetime"], AttrValue::Int(2_592_000));
        assert_eq!(attrs["id_token_lifetime"], AttrValue::Int(3600));
    }

    #[test]
    fn test_client_body_from_data() {
        let mut attrs = config("Public");
        SCHEMA.apply_defaults(&mut attrs);
        let data = ResourceData::for_create(attrs);
        let client = client_from(&data);
        assert_eq!(client.client_type, "Public");
        let mut scopes = client.scopes.clone();
        scopes.sort();
        assert_eq!(scopes, vec!["cn".to_string(), "openid".to_string()]);
        assert!(client.id.is_empty());
    }
}
