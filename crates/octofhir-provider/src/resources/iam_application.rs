//! `iam_application`: application under a proposition.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{CallError, Realm, ServiceApi};

use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{
    OpContext, Resource, create_or_adopt, ensure_field, found, require_id, tolerate_gone,
};
use crate::schema::{Attribute, Schema};
use crate::services::Collection;
use crate::services::iam::{Application, Iam};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(0)
        .attr("name", Attribute::string().required().force_new())
        .attr("proposition_id", Attribute::string().required().force_new())
        .attr("description", Attribute::string().force_new())
        .attr(
            "global_reference_id",
            Attribute::string().optional_computed().force_new(),
        )
});

#[derive(Debug, Default)]
pub struct IamApplication;

#[async_trait]
impl Resource for IamApplication {
    fn kind(&self) -> &'static str {
        "iam_application"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        if data.get_str("global_reference_id").is_none_or(str::is_empty) {
            data.set("global_reference_id", octofhir_core::generate_id());
        }
        let applications = Iam::new(ctx).applications();
        let application = Application {
            name: data.get_string("name"),
            description: data.get_string("description"),
            proposition_id: data.get_string("proposition_id"),
            global_reference_id: data.get_string("global_reference_id"),
            ..Application::default()
        };

        let created = create_or_adopt(
            "create application",
            async {
                ctx.call(Realm::Iam, &[], || applications.create(&application))
                    .await
                    .map(|(created, _)| created)
            },
            || {
                find_application(
                    ctx,
                    &applications,
                    &application.name,
                    &application.proposition_id,
                )
            },
            |existing: &Application| {
                ensure_field(
                    "description",
                    &application.description,
                    &existing.description,
                    false,
                )
            },
        )
        .await?;
        let created = created.into_inner();
        if created.id.is_empty() {
            return Err(ProviderError::Failed(
                "application created but the server returned no ID".to_string(),
            ));
        }
        data.set_id(created.id);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let applications = Iam::new(ctx).applications();
        let result = ctx.call(Realm::Iam, &[], || applications.get(&id)).await;
        let Some((application, _)) = found(data, "read application", result)? else {
            return Ok(());
        };
        data.set("name", application.name);
        data.set("description", application.description);
        data.set("proposition_id", application.proposition_id);
        data.set("global_reference_id", application.global_reference_id);
        Ok(())
    }

    async fn update(&self, _ctx: &OpContext, _data: &mut ResourceData) -> Result<()> {
        // every attribute forces replacement
        Ok(())
    }

    /// Applications cannot be deleted through the API; a 404 means someone
    /// else already removed it.
    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let applications = Iam::new(ctx).applications();
        let result = ctx.call(Realm::Iam, &[], || applications.delete(&id)).await;
        match tolerate_gone(result) {
            Ok(_) => Ok(()),
            Err(err) if err.status() == 405 => {
                data.warn(
                    "application left in place",
                    format!("IAM does not support deleting application {id}"),
                );
                Ok(())
            }
            Err(err) => Err(ProviderError::client("delete application", err)),
        }
    }
}

async fn find_application(
    ctx: &OpContext,
    applications: &Collection<Application>,
    name: &str,
    proposition: &str,
) -> std::result::Result<Option<Application>, CallError> {
    let params = [("name", name), ("propositionId", proposition)];
    let (candidates, _) = ctx
        .call(Realm::Iam, &[], || applications.search(&params))
        .await?;
    Ok(candidates
        .into_iter()
        .find(|a| a.name == name && a.proposition_id == proposition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrMap;

    #[test]
    fn test_every_field_forces_replacement() {
        let prior = AttrMap::from([
            ("name".to_string(), "app".into()),
            ("proposition_id".to_string(), "prop".into()),
            ("description".to_string(), "one".into()),
        ]);
        let mut next = prior.clone();
        next.insert("description".to_string(), "two".into());
        let plan = SCHEMA.plan(Some(&prior), &next);
        assert_eq!(plan.replace, vec!["description".to_string()]);
    }
}
