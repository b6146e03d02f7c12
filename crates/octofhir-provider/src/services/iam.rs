//! Identity and access management: groups, service identities, OAuth
//! clients, applications and devices.

use octofhir_client::{CallError, ResponseEnvelope, RestClient, ServiceResult};
use octofhir_config::Service;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Collection, Identified, is_false, is_zero};
use crate::lifecycle::OpContext;
use crate::reconcile::{BatchOutcome, SetOp};

const BASE: &str = "authorize/identity";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub managing_organization: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// IAM service identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub application_id: String,
    /// Months
    #[serde(default, skip_serializing_if = "is_zero")]
    pub validity: i64,
    /// Seconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub access_token_lifetime: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub default_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expires_on: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization_id: String,
}

/// OAuth client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub client_id: String,
    #[serde(rename = "type")]
    pub client_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "redirectionURIs")]
    pub redirection_uris: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub default_scopes: Vec<String>,
    pub application_id: String,
    #[serde(default)]
    pub global_reference_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub access_token_lifetime: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub refresh_token_lifetime: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id_token_lifetime: i64,
    #[serde(default)]
    pub consent_implied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub proposition_id: String,
    #[serde(default)]
    pub global_reference_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeText {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExtId {
    #[serde(rename = "type", default)]
    pub id_type: CodeText,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub system: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub login_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_ext_id: Option<DeviceExtId>,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug_until: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub for_test: bool,
    #[serde(default)]
    pub global_reference_id: String,
}

macro_rules! identified {
    ($($ty:ty),+) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })+
    };
}

identified!(Group, Role, ServiceIdentity, Client, Application, Device);

/// Kinds of group members, each with its own batch endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    User,
    Service,
    Device,
}

impl MemberKind {
    fn operation(&self, op: SetOp) -> &'static str {
        match (self, op) {
            (MemberKind::User, SetOp::Add) => "$add-members",
            (MemberKind::User, SetOp::Remove) => "$remove-members",
            (MemberKind::Service, SetOp::Add) => "$add-services",
            (MemberKind::Service, SetOp::Remove) => "$remove-services",
            (MemberKind::Device, SetOp::Add) => "$add-devices",
            (MemberKind::Device, SetOp::Remove) => "$remove-devices",
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            MemberKind::User => "UserIDCollection",
            MemberKind::Service => "ServiceIDCollection",
            MemberKind::Device => "DeviceIDCollection",
        }
    }

    fn scim_type(&self) -> &'static str {
        match self {
            MemberKind::User => "USER",
            MemberKind::Service => "SERVICE",
            MemberKind::Device => "DEVICE",
        }
    }
}

/// Identity management endpoints, `Api-Version: 1`.
#[derive(Debug, Clone)]
pub struct Iam {
    rest: RestClient,
}

impl Iam {
    pub fn new(ctx: &OpContext) -> Self {
        Self {
            rest: ctx.rest(Service::Idm).with_header("api-version", "1"),
        }
    }

    pub fn groups(&self) -> Collection<Group> {
        Collection::new(self.rest.clone(), format!("{BASE}/Group"))
    }

    pub fn roles(&self) -> Collection<Role> {
        Collection::new(self.rest.clone(), format!("{BASE}/Role"))
    }

    pub fn services(&self) -> Collection<ServiceIdentity> {
        Collection::new(self.rest.clone(), format!("{BASE}/Service"))
    }

    pub fn clients(&self) -> Collection<Client> {
        Collection::new(self.rest.clone(), format!("{BASE}/Client"))
    }

    pub fn applications(&self) -> Collection<Application> {
        Collection::new(self.rest.clone(), format!("{BASE}/Application"))
    }

    pub fn devices(&self) -> Collection<Device> {
        Collection::new(self.rest.clone(), format!("{BASE}/Device"))
    }

    /// Add or remove a batch of members. 200 and 207 both count as success;
    /// a 207 body lists per-member failures.
    pub async fn change_members(
        &self,
        group_id: &str,
        kind: MemberKind,
        op: SetOp,
        ids: &[String],
    ) -> Result<BatchOutcome, CallError> {
        let references: Vec<Value> = ids.iter().map(|id| json!({"reference": id})).collect();
        let body = json!({
            "resourceType": "Parameters",
            "parameter": [{"name": kind.collection(), "references": references}]
        });
        let path = format!("{BASE}/Group/{group_id}/{}", kind.operation(op));
        let (_, envelope): (Value, ResponseEnvelope) = self.rest.post(&path, &body).await?;
        Ok(BatchOutcome::from_envelope(&envelope))
    }

    pub async fn change_roles(
        &self,
        group_id: &str,
        op: SetOp,
        role_ids: &[String],
    ) -> Result<BatchOutcome, CallError> {
        let action = match op {
            SetOp::Add => "$assign-role",
            SetOp::Remove => "$remove-role",
        };
        let path = format!("{BASE}/Group/{group_id}/{action}");
        let (_, envelope): (Value, ResponseEnvelope) =
            self.rest.post(&path, &json!({"roles": role_ids})).await?;
        Ok(BatchOutcome::from_envelope(&envelope))
    }

    /// Member IDs of one kind, via the SCIM view of the group.
    pub async fn group_members(
        &self,
        group_id: &str,
        kind: MemberKind,
    ) -> Result<Vec<String>, CallError> {
        let path = super::with_query(
            &format!("authorize/scim/v2/Groups/{group_id}"),
            &[("includeGroupMembersType", kind.scim_type())],
        );
        let (group, _): (Value, _) = self.rest.get_with(&path, &[("api-version", "2")]).await?;
        Ok(group
            .get("members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| m.get("value").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn group_roles(&self, group_id: &str) -> Result<Vec<String>, CallError> {
        let (roles, _) = self.roles().search(&[("groupId", group_id)]).await?;
        Ok(roles.into_iter().map(|r| r.id).collect())
    }

    /// Add or remove scopes and default scopes of a service identity or client.
    pub async fn change_scopes(
        &self,
        path: &str,
        op: SetOp,
        scopes: &[String],
        default_scopes: &[String],
    ) -> ServiceResult<()> {
        let body = json!({
            "action": op.as_str(),
            "scopes": scopes,
            "defaultScopes": default_scopes,
        });
        let (_, envelope): (Value, _) = self.rest.put(&format!("{path}/$scopes"), &body).await?;
        Ok(((), envelope))
    }

    /// Install a certificate (base64 DER) on a service identity.
    pub async fn update_service_certificate(
        &self,
        service_id: &str,
        certificate_der_b64: &str,
    ) -> ServiceResult<ServiceIdentity> {
        let path = format!("{BASE}/Service/{service_id}/$update-certificate");
        self.rest
            .post(&path, &json!({"cert": certificate_der_b64}))
            .await
    }
}
