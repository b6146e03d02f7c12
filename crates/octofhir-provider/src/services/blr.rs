//! Blob repository: buckets, bucket policies and blobs.

use octofhir_client::RestClient;
use octofhir_config::Service;
use serde::{Deserialize, Serialize};

use super::{Collection, Identified, is_false, is_zero};
use crate::lifecycle::OpContext;

const BASE: &str = "connect/blobrepository";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfiguration {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_age_seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default = "bucket_resource_type")]
    pub resource_type: String,
    pub name: String,
    pub proposition_id: String,
    #[serde(default, rename = "enableCDN")]
    pub enable_cdn: bool,
    #[serde(default, rename = "enableHSDPDomain", skip_serializing_if = "is_false")]
    pub enable_hsdp_domain: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub price_class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_configuration: Option<CorsConfiguration>,
}

fn bucket_resource_type() -> String {
    "Bucket".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Action", default)]
    pub action: Vec<String>,
    #[serde(rename = "Principal", default)]
    pub principal: Vec<String>,
    #[serde(rename = "Resource", default)]
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub bucket_id: String,
    #[serde(default)]
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub bucket: String,
    pub blob_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub virtual_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub attachment_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy: String,
}

impl Identified for Bucket {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for BucketPolicy {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Blob {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone)]
pub struct Blr {
    rest: RestClient,
}

impl Blr {
    pub fn new(ctx: &OpContext) -> Self {
        Self {
            rest: ctx.rest(Service::Blr).with_header("api-version", "1"),
        }
    }

    pub fn buckets(&self) -> Collection<Bucket> {
        Collection::new(self.rest.clone(), format!("{BASE}/Bucket"))
    }

    pub fn policies(&self) -> Collection<BucketPolicy> {
        Collection::new(self.rest.clone(), format!("{BASE}/BlobStorePolicy"))
    }

    pub fn blobs(&self) -> Collection<Blob> {
        Collection::new(self.rest.clone(), format!("{BASE}/Blob"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_statement_wire_format() {
        let policy = BucketPolicy {
            bucket_id: "b1".to_string(),
            statement: vec![Statement {
                effect: "Allow".to_string(),
                action: vec!["GET".to_string()],
                principal: vec!["prn:iam:x".to_string()],
                resource: vec!["*".to_string()],
            }],
            ..BucketPolicy::default()
        };
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["bucketId"], "b1");
        assert_eq!(json["statement"][0]["Effect"], "Allow");
    }

    #[test]
    fn test_bucket_defaults_resource_type() {
        let bucket: Bucket =
            serde_json::from_value(json!({"id": "x", "name": "b", "propositionId": "p"})).unwrap();
        assert_eq!(bucket.resource_type, "Bucket");
        assert!(bucket.cors_configuration.is_none());
    }
}
