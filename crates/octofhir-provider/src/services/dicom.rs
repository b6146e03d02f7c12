//! DICOM store configuration: repositories.
//!
//! The configuration service URL is per store, so every call goes to an
//! absolute URL taken from the resource's `config_url`.

use octofhir_client::{RestClient, ServiceResult};
use octofhir_config::Service;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::is_false;
use crate::lifecycle::OpContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub organization_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub store_as_composite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone)]
pub struct Dicom {
    rest: RestClient,
    base: String,
    organization_id: String,
}

impl Dicom {
    pub fn new(ctx: &OpContext, config_url: &str, organization_id: &str) -> Self {
        Self {
            rest: ctx.rest(Service::Dicom).with_header("api-version", "1"),
            base: format!("{}/config/dicom", config_url.trim_end_matches('/')),
            organization_id: organization_id.to_string(),
        }
    }

    fn headers(&self) -> [(&str, &str); 1] {
        [("organizationid", self.organization_id.as_str())]
    }

    fn repositories(&self) -> String {
        format!("{}/repositories", self.base)
    }

    pub async fn create_repository(&self, repository: &Repository) -> ServiceResult<Repository> {
        self.rest
            .post_with(&self.repositories(), repository, &self.headers())
            .await
    }

    pub async fn get_repository(&self, id: &str) -> ServiceResult<Repository> {
        let path = format!("{}/{id}", self.repositories());
        self.rest.get_with(&path, &self.headers()).await
    }

    pub async fn delete_repository(&self, id: &str) -> ServiceResult<()> {
        let path = format!("{}/{id}", self.repositories());
        self.rest.delete_with(&path, &self.headers()).await
    }

    pub async fn put_notification(&self, id: &str, notification: &Notification) -> ServiceResult<()> {
        let path = format!("{}/{id}/notification", self.repositories());
        let (_, envelope): (Value, _) = self
            .rest
            .put_with(&path, notification, &self.headers())
            .await?;
        Ok(((), envelope))
    }
}
