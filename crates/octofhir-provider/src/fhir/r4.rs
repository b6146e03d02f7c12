//! FHIR R4 codec record.

use octofhir_core::FhirVersion;

use super::FhirCodec;

pub static CODEC: FhirCodec = FhirCodec {
    version: FhirVersion::R4,
    media_type: "application/fhir+json;fhirVersion=4.0",
    identifier_uses: &["usual", "official", "temp", "secondary", "old"],
    soft_delete_on_forbidden: false,
    search_by_identifier: false,
};
