//! Certificate issuance tenants. Calls use the UAA token realm.

use octofhir_client::{Realm, RestClient};
use octofhir_config::Service;
use serde::{Deserialize, Serialize};

use super::{Collection, Identified, is_false, is_zero};
use crate::lifecycle::OpContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PkiRole {
    pub name: String,
    #[serde(default)]
    pub allow_any_name: bool,
    #[serde(default)]
    pub allow_ip_sans: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_other_sans: Vec<String>,
    #[serde(default)]
    pub allowed_uri_sans: Vec<String>,
    #[serde(default)]
    pub client_flag: bool,
    #[serde(default)]
    pub server_flag: bool,
    #[serde(default)]
    pub enforce_hostnames: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub key_bits: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_ttl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub common_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceParameters {
    #[serde(default)]
    pub iam_orgs: Vec<String>,
    #[serde(default)]
    pub ca: CertificateAuthority,
    #[serde(default)]
    pub roles: Vec<PkiRole>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Logical path, `<organization>/<space>`
    #[serde(default, skip_serializing)]
    pub id: String,
    pub organization_name: String,
    pub space_name: String,
    #[serde(default = "service_name")]
    pub service_name: String,
    #[serde(default = "plan_name")]
    pub plan_name: String,
    pub service_parameters: ServiceParameters,
    #[serde(default, skip_serializing)]
    pub api_endpoint: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub onboarded: bool,
}

fn service_name() -> String {
    "hsdp-pki".to_string()
}

fn plan_name() -> String {
    "standard".to_string()
}

impl Tenant {
    pub fn new(organization_name: &str, space_name: &str, params: ServiceParameters) -> Self {
        Self {
            id: logical_path(organization_name, space_name),
            organization_name: organization_name.to_string(),
            space_name: space_name.to_string(),
            service_name: service_name(),
            plan_name: plan_name(),
            service_parameters: params,
            api_endpoint: String::new(),
            onboarded: false,
        }
    }
}

impl Identified for Tenant {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn logical_path(organization_name: &str, space_name: &str) -> String {
    format!("{organization_name}/{space_name}")
}

#[derive(Debug, Clone)]
pub struct Pki {
    rest: RestClient,
}

impl Pki {
    pub const REALM: Realm = Realm::Uaa;

    pub fn new(ctx: &OpContext) -> Self {
        Self {
            rest: ctx
                .rest(Service::Pki)
                .with_realm(Self::REALM)
                .with_header("api-version", "1"),
        }
    }

    pub fn tenants(&self) -> Collection<Tenant> {
        Collection::new(self.rest.clone(), "core/pki/tenant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_body_uses_snake_case() {
        let tenant = Tenant::new("org", "space", ServiceParameters::default());
        assert_eq!(tenant.id, "org/space");
        let json = serde_json::to_value(&tenant).unwrap();
        assert_eq!(json["service_name"], "hsdp-pki");
        assert!(json["service_parameters"]["iam_orgs"].is_array());
        assert!(json.get("id").is_none());
    }
}
