//! `iam_group`: IAM group with role and member sets.
//!
//! Membership is never replaced wholesale. Each set attribute is converged
//! with add/remove batches, removals first. Reading members back from the
//! server is expensive (one SCIM query per member kind) and only happens
//! with `drift_detection`.

use std::sync::LazyLock;

use async_trait::async_trait;
use octofhir_client::{CallError, Realm, ServiceApi, retry_on_with};
use serde_json::json;

use super::failed;
use crate::attr::{AttrValue, DiffSuppress};
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::lifecycle::{
    OpContext, Resource, create_or_adopt, ensure_field, found, require_id, tolerate_gone,
};
use crate::migrate::{RawAttributes, StateUpgrader, add_default};
use crate::reconcile::{BatchOutcome, SetOp, reconcile_attribute, tolerate_unprocessable};
use crate::schema::{Attribute, Schema};
use crate::services::Collection;
use crate::services::iam::{Group, Iam, MemberKind};

const MEMBERS: [(&str, MemberKind); 3] = [
    ("users", MemberKind::User),
    ("services", MemberKind::Service),
    ("devices", MemberKind::Device),
];

/// Attempts for role assignment, which answers 422 while a freshly
/// enrolled user is still propagating.
const ROLE_ATTEMPTS: u32 = 3;

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(2)
        .attr(
            "name",
            Attribute::string()
                .required()
                .force_new()
                .suppress(DiffSuppress::CaseInsensitive),
        )
        .attr(
            "managing_organization",
            Attribute::string()
                .required()
                .force_new()
                .suppress(DiffSuppress::CaseInsensitive),
        )
        .attr("description", Attribute::string())
        .attr("roles", Attribute::string_set())
        .attr("users", Attribute::string_set())
        .attr("services", Attribute::string_set())
        .attr("devices", Attribute::string_set())
        .attr("drift_detection", Attribute::bool().default(false))
        .attr("iam_device_bug_workaround", Attribute::bool().default(false))
});

static UPGRADERS: [StateUpgrader; 2] = [
    StateUpgrader::new(0, add_drift_detection),
    StateUpgrader::new(1, add_device_workaround),
];

fn add_drift_detection(mut attrs: RawAttributes) -> Result<RawAttributes> {
    add_default(&mut attrs, "drift_detection", json!(false));
    Ok(attrs)
}

fn add_device_workaround(mut attrs: RawAttributes) -> Result<RawAttributes> {
    add_default(&mut attrs, "iam_device_bug_workaround", json!(false));
    Ok(attrs)
}

#[derive(Debug, Default)]
pub struct IamGroup;

#[async_trait]
impl Resource for IamGroup {
    fn kind(&self) -> &'static str {
        "iam_group"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn upgraders(&self) -> &[StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let iam = Iam::new(ctx);
        let groups = iam.groups();
        let group = Group {
            name: data.get_string("name"),
            description: data.get_string("description"),
            managing_organization: data.get_string("managing_organization"),
            ..Group::default()
        };

        let created = create_or_adopt(
            "create group",
            async {
                ctx.call(Realm::Iam, &[], || groups.create(&group))
                    .await
                    .map(|(created, _)| created)
            },
            || find_group(ctx, &groups, &group.name, &group.managing_organization),
            |existing: &Group| {
                ensure_field("description", &group.description, &existing.description, false)
            },
        )
        .await?;
        if created.is_adopted() {
            tracing::info!(name = %group.name, "adopted existing group");
        }
        let id = created.into_inner().id;
        data.set_id(id.clone());

        converge(ctx, &iam, &id, data).await
    }

    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let iam = Iam::new(ctx);
        let groups = iam.groups();
        let result = ctx.call(Realm::Iam, &[], || groups.get(&id)).await;
        let Some((group, _)) = found(data, "read group", result)? else {
            return Ok(());
        };
        data.set("name", group.name);
        data.set("description", group.description);
        data.set("managing_organization", group.managing_organization);

        if data.get_bool("drift_detection") {
            for (attribute, kind) in MEMBERS {
                let members = ctx
                    .call(Realm::Iam, &[], || iam.group_members(&id, kind))
                    .await
                    .map_err(failed("read group members"))?;
                data.set(attribute, AttrValue::string_set(members));
            }
            let roles = ctx
                .call(Realm::Iam, &[], || iam.group_roles(&id))
                .await
                .map_err(failed("read group roles"))?;
            data.set("roles", AttrValue::string_set(roles));
        }
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let iam = Iam::new(ctx);
        if data.has_change("description") {
            let groups = iam.groups();
            let group = Group {
                id: id.clone(),
                name: data.get_string("name"),
                description: data.get_string("description"),
                managing_organization: data.get_string("managing_organization"),
            };
            ctx.call(Realm::Iam, &[], || groups.update(&group))
                .await
                .map_err(failed("update group"))?;
            data.record_applied("description", group.description);
        }
        converge(ctx, &iam, &id, data).await
    }

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let iam = Iam::new(ctx);
        let one_by_one = data.get_bool("iam_device_bug_workaround");

        // the server refuses to delete a group that still has members or roles
        for (attribute, kind) in MEMBERS {
            let members = data.get_list(attribute);
            if members.is_empty() {
                continue;
            }
            let result =
                change_members(ctx, &iam, &id, kind, SetOp::Remove, members, one_by_one).await;
            purged(attribute, result)?;
        }
        let roles = data.get_list("roles");
        if !roles.is_empty() {
            purged("roles", change_roles(ctx, &iam, &id, SetOp::Remove, roles).await)?;
        }

        let groups = iam.groups();
        let result = ctx.call(Realm::Iam, &[], || groups.delete(&id)).await;
        tolerate_gone(result).map_err(failed("delete group"))?;
        Ok(())
    }
}

/// Converge every set attribute that changed between prior and current.
async fn converge(ctx: &OpContext, iam: &Iam, group_id: &str, data: &mut ResourceData) -> Result<()> {
    let one_by_one = data.get_bool("iam_device_bug_workaround");
    for (attribute, kind) in MEMBERS {
        if !data.has_change(attribute) {
            continue;
        }
        let result = reconcile_attribute(data, attribute, |op, ids| {
            change_members(ctx, iam, group_id, kind, op, ids, one_by_one)
        })
        .await?;
        data.extend_warnings(result.warnings);
    }
    if data.has_change("roles") {
        let result = reconcile_attribute(data, "roles", |op, ids| {
            change_roles(ctx, iam, group_id, op, ids)
        })
        .await?;
        data.extend_warnings(result.warnings);
    }
    Ok(())
}

async fn change_members(
    ctx: &OpContext,
    iam: &Iam,
    group_id: &str,
    kind: MemberKind,
    op: SetOp,
    ids: Vec<String>,
    one_by_one: bool,
) -> std::result::Result<BatchOutcome, CallError> {
    if !(one_by_one && kind == MemberKind::Device) {
        return ctx
            .call(Realm::Iam, &[], || iam.change_members(group_id, kind, op, &ids))
            .await;
    }
    // device batches lose members when they carry more than one element
    let mut outcome = BatchOutcome::ok();
    for id in ids {
        let single = [id];
        let result = ctx
            .call(Realm::Iam, &[], || {
                iam.change_members(group_id, kind, op, &single)
            })
            .await;
        match tolerate_unprocessable(result)? {
            Some(batch) => outcome.failures.extend(batch.failures),
            None => tracing::debug!(device = %single[0], op = op.as_str(), "device already in place"),
        }
    }
    Ok(outcome)
}

async fn change_roles(
    ctx: &OpContext,
    iam: &Iam,
    group_id: &str,
    op: SetOp,
    ids: Vec<String>,
) -> std::result::Result<BatchOutcome, CallError> {
    let retry_on = retry_on_with(&[422]);
    ctx.call_with(Realm::Iam, ROLE_ATTEMPTS, &retry_on, || {
        iam.change_roles(group_id, op, &ids)
    })
    .await
}

async fn find_group(
    ctx: &OpContext,
    groups: &Collection<Group>,
    name: &str,
    organization: &str,
) -> std::result::Result<Option<Group>, CallError> {
    let params = [("name", name), ("organizationId", organization)];
    let (candidates, _) = ctx
        .call(Realm::Iam, &[], || groups.search(&params))
        .await?;
    Ok(candidates.into_iter().find(|g| {
        g.name.eq_ignore_ascii_case(name)
            && g.managing_organization.eq_ignore_ascii_case(organization)
    }))
}

fn purged(
    attribute: &str,
    result: std::result::Result<BatchOutcome, CallError>,
) -> Result<()> {
    match tolerate_unprocessable(result) {
        Ok(_) => Ok(()),
        Err(err) if err.is_gone() => Ok(()),
        Err(err) => Err(ProviderError::client(format!("remove {attribute}"), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrMap;
    use crate::migrate::{PersistedState, upgrade};

    #[test]
    fn test_upgrade_from_v0() {
        let attrs = json!({"name": "admins", "users": ["u1"]});
        let state = PersistedState::new(0, "g1", attrs.as_object().cloned().unwrap());
        let upgraded = upgrade(state, SCHEMA.version, IamGroup.upgraders()).unwrap();
        assert_eq!(upgraded.schema_version, 2);
        assert_eq!(upgraded.attributes["drift_detection"], json!(false));
        assert_eq!(upgraded.attributes["iam_device_bug_workaround"], json!(false));
        assert_eq!(upgraded.attributes["users"], json!(["u1"]));
    }

    #[test]
    fn test_name_and_organization_required() {
        let config = AttrMap::from([("description".to_string(), "ops".into())]);
        let diags = SCHEMA.validate_config(&config);
        let attrs: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        assert!(attrs.contains(&"name".to_string()));
        assert!(attrs.contains(&"managing_organization".to_string()));
    }

    #[test]
    fn test_rename_forces_replacement_but_case_does_not() {
        let prior = AttrMap::from([
            ("name".to_string(), "Admins".into()),
            ("managing_organization".to_string(), "org".into()),
        ]);
        let mut same = prior.clone();
        same.insert("name".to_string(), "ADMINS".into());
        assert!(!SCHEMA.plan(Some(&prior), &same).requires_replace());

        let mut renamed = prior.clone();
        renamed.insert("name".to_string(), "ops".into());
        assert!(SCHEMA.plan(Some(&prior), &renamed).requires_replace());
    }
}
