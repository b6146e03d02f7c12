//! FHIR version dispatch for clinical data store resources.
//!
//! Each supported version has a static codec record; the `version`
//! attribute picks one and every call for that resource goes through it.
//! Updates are read-modify-patch: the current server document is fetched,
//! the declared changes are applied to a copy and the JSON-Patch between
//! the two is sent.

pub mod model;
pub mod patch;
pub mod r4;
pub mod stu3;

use octofhir_client::{CallError, Realm, RestClient, ServiceResult};
use octofhir_config::Service;
use octofhir_core::FhirVersion;
use serde_json::Value;

use crate::error::{ProviderError, Result};
use crate::lifecycle::OpContext;
use model::Identifier;

/// Per-version behaviour of the store.
#[derive(Debug)]
pub struct FhirCodec {
    pub version: FhirVersion,
    /// Sent as both `Accept` and `Content-Type`
    pub media_type: &'static str,
    /// Allowed `identifier.use` codes
    pub identifier_uses: &'static [&'static str],
    /// A 403 on delete means "referenced elsewhere"; with `soft_delete` the
    /// resource is forgotten instead of failing
    pub soft_delete_on_forbidden: bool,
    /// Create may adopt an existing resource found by a `usual` identifier
    pub search_by_identifier: bool,
}

impl FhirCodec {
    pub fn check_identifier(&self, identifier: &Identifier) -> Result<()> {
        if identifier.use_.is_empty() || self.identifier_uses.contains(&identifier.use_.as_str()) {
            Ok(())
        } else {
            Err(ProviderError::validation(
                "identifier.use",
                format!(
                    "'{}' is not valid for FHIR {}, expected one of {:?}",
                    identifier.use_, self.version, self.identifier_uses
                ),
            ))
        }
    }
}

static CODECS: [(FhirVersion, &FhirCodec); 2] = [
    (FhirVersion::Stu3, &stu3::CODEC),
    (FhirVersion::R4, &r4::CODEC),
];

pub fn codec(version: FhirVersion) -> &'static FhirCodec {
    CODECS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, codec)| *codec)
        .unwrap_or(&stu3::CODEC)
}

/// Codec for a `version` attribute; empty selects the default.
pub fn codec_for(version: &str) -> Result<&'static FhirCodec> {
    if version.is_empty() {
        return Ok(codec(FhirVersion::default()));
    }
    let version: FhirVersion = version
        .parse()
        .map_err(|_| ProviderError::validation("version", format!("unsupported FHIR version '{version}'")))?;
    Ok(codec(version))
}

/// One FHIR store endpoint seen through one codec.
#[derive(Debug, Clone)]
pub struct FhirStore {
    rest: RestClient,
    codec: &'static FhirCodec,
    base: String,
}

impl FhirStore {
    pub fn new(ctx: &OpContext, base: &str, codec: &'static FhirCodec) -> Self {
        let rest = ctx
            .rest(Service::Cdr)
            .with_header("accept", codec.media_type)
            .with_header("content-type", codec.media_type);
        Self {
            rest,
            codec,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn codec(&self) -> &'static FhirCodec {
        self.codec
    }

    fn path(&self, resource_type: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{resource_type}/{id}", self.base),
            None => format!("{}/{resource_type}", self.base),
        }
    }

    pub async fn create(&self, resource: &Value) -> ServiceResult<Value> {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.rest.post(&self.path(resource_type, None), resource).await
    }

    /// PUT a resource carrying a client-assigned `id`.
    pub async fn put(&self, resource: &Value) -> ServiceResult<Value> {
        let resource_type = model::str_field(resource, "resourceType");
        let id = model::str_field(resource, "id");
        self.rest
            .put(&self.path(&resource_type, Some(&id)), resource)
            .await
    }

    pub async fn read(&self, resource_type: &str, id: &str) -> ServiceResult<Value> {
        self.rest.get(&self.path(resource_type, Some(id))).await
    }

    /// PATCH with the difference between `original` and `modified`,
    /// retried through the orchestrator. Nothing is sent when they are equal.
    pub async fn patch(
        &self,
        ctx: &OpContext,
        resource_type: &str,
        id: &str,
        original: &Value,
        modified: &Value,
    ) -> Result<Option<Value>> {
        let operations = patch::generate(original, modified)?;
        if operations.0.is_empty() {
            tracing::debug!(resource_type, id, "no changes to patch");
            return Ok(None);
        }
        tracing::debug!(resource_type, id, operations = operations.0.len(), "patching");
        let path = self.path(resource_type, Some(id));
        let (updated, _) = ctx
            .call(Realm::Iam, &[], || self.rest.patch(&path, &operations, &[]))
            .await
            .map_err(|e| ProviderError::client(format!("patch {resource_type}"), e))?;
        Ok(Some(updated))
    }

    pub async fn delete(&self, resource_type: &str, id: &str) -> ServiceResult<()> {
        self.rest.delete(&self.path(resource_type, Some(id))).await
    }

    /// Resources of a search bundle.
    pub async fn search(
        &self,
        resource_type: &str,
        params: &[(&str, &str)],
    ) -> ServiceResult<Vec<Value>> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let path = format!("{}?{query}", self.path(resource_type, None));
        let (bundle, envelope): (Value, _) = self.rest.get(&path).await?;
        let resources = bundle
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("resource").cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok((resources, envelope))
    }

    /// Existing resource carrying `identifier` with use `usual`, if the
    /// codec supports identifier search.
    pub async fn find_by_identifier(
        &self,
        resource_type: &str,
        identifier: &Identifier,
    ) -> std::result::Result<Option<Value>, CallError> {
        if !self.codec.search_by_identifier || identifier.use_ != "usual" {
            return Ok(None);
        }
        let token = format!("{}|{}", identifier.system, identifier.value);
        let (candidates, _) = self
            .search(resource_type, &[("identifier", token.as_str())])
            .await?;
        Ok(candidates.into_iter().find(|candidate| {
            model::identifiers(candidate)
                .iter()
                .any(|existing| existing.use_ == "usual" && existing.same_as(identifier))
        }))
    }
}
