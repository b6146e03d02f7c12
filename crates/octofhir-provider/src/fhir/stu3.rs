//! FHIR STU3 codec record.

use octofhir_core::FhirVersion;

use super::FhirCodec;

pub static CODEC: FhirCodec = FhirCodec {
    version: FhirVersion::Stu3,
    media_type: "application/fhir+json;fhirVersion=3.0",
    identifier_uses: &["usual", "official", "temp", "secondary"],
    // the STU3 store refuses to delete referenced resources with a 403
    soft_delete_on_forbidden: true,
    search_by_identifier: true,
};
