//! Built-in resource kinds.

pub mod ai_inference_job;
pub mod blr_blob;
pub mod blr_bucket;
pub mod blr_bucket_policy;
pub mod cdr_org;
pub mod cdr_practitioner;
pub mod dbs_sqs_subscriber;
pub mod dbs_topic_subscription;
pub mod dicom_repository;
pub mod iam_application;
pub mod iam_client;
pub mod iam_device;
pub mod iam_group;
pub mod iam_service;
pub mod pki_tenant;

use std::sync::Arc;

use octofhir_client::{CallError, Realm};
use octofhir_core::KindId;

use crate::attr::AttrValue;
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::fhir::{FhirStore, codec_for};
use crate::lifecycle::{OpContext, Resource};
use crate::reconcile::{BatchOutcome, reconcile_attribute};
use crate::services::iam::Iam;

/// Every resource kind this provider manages.
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(iam_group::IamGroup),
        Arc::new(iam_service::IamService),
        Arc::new(iam_client::IamClient),
        Arc::new(iam_application::IamApplication),
        Arc::new(iam_device::IamDevice),
        Arc::new(blr_bucket::BlrBucket),
        Arc::new(blr_bucket_policy::BlrBucketPolicy),
        Arc::new(blr_blob::BlrBlob),
        Arc::new(dbs_sqs_subscriber::DbsSqsSubscriber),
        Arc::new(dbs_topic_subscription::DbsTopicSubscription),
        Arc::new(pki_tenant::PkiTenant),
        Arc::new(dicom_repository::DicomRepository),
        Arc::new(cdr_practitioner::CdrPractitioner),
        Arc::new(cdr_org::CdrOrg),
        Arc::new(ai_inference_job::AiInferenceJob),
    ]
}

/// Wrap a failed call with the operation that made it.
pub(crate) fn failed(operation: &'static str) -> impl FnOnce(CallError) -> ProviderError {
    move |err| ProviderError::client(operation, err)
}

/// Converge `scopes` and `default_scopes` of the IAM object at `path`.
pub(crate) async fn converge_scopes(
    ctx: &OpContext,
    iam: &Iam,
    path: &str,
    data: &mut ResourceData,
) -> Result<()> {
    for attribute in ["scopes", "default_scopes"] {
        if !data.has_change(attribute) {
            continue;
        }
        let result = reconcile_attribute(data, attribute, move |op, items| async move {
            let (scopes, defaults) = if attribute == "scopes" {
                (items, Vec::new())
            } else {
                (Vec::new(), items)
            };
            ctx.call(Realm::Iam, &[], || {
                iam.change_scopes(path, op, &scopes, &defaults)
            })
            .await
            .map(|_| BatchOutcome::ok())
        })
        .await?;
        data.extend_warnings(result.warnings);
    }
    Ok(())
}

/// Retry set for FHIR deletes: a 403 there is an answer, not a hiccup.
pub(crate) const FHIR_DELETE_RETRY_ON: [u16; 5] = [429, 500, 502, 503, 504];

/// Store addressed by `fhir_store` through the codec picked by `version`.
pub(crate) fn fhir_store(ctx: &OpContext, data: &ResourceData) -> Result<FhirStore> {
    let codec = codec_for(data.get_str("version").unwrap_or_default())?;
    let base = data.get_string("fhir_store");
    if base.is_empty() {
        return Err(ProviderError::validation("fhir_store", "a FHIR store URL is required"));
    }
    Ok(FhirStore::new(ctx, &base, codec))
}

/// Server GUID behind a `<Kind>/<guid>` resource ID.
pub(crate) fn guid_of(kind: &str, id: &str) -> Result<String> {
    Ok(KindId::parse_expecting(kind, id)?.guid)
}

/// Validator for set and list sizes.
pub(crate) fn at_most(value: &AttrValue, max: usize) -> std::result::Result<(), String> {
    let count = value.elements().len();
    if count > max {
        Err(format!("at most {max} item(s) allowed, got {count}"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_kinds_are_unique() {
        let kinds: Vec<_> = all().iter().map(|r| r.kind()).collect();
        let unique: BTreeSet<_> = kinds.iter().collect();
        assert_eq!(kinds.len(), unique.len());
        assert!(kinds.contains(&"iam_group"));
        assert!(kinds.contains(&"cdr_practitioner"));
    }

    #[test]
    fn test_guid_of() {
        assert_eq!(guid_of("Bucket", "Bucket/abc").unwrap(), "abc");
        assert!(guid_of("Bucket", "abc").is_err());
    }
}
