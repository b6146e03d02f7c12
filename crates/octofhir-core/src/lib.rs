pub mod error;
pub mod fhir;
pub mod id;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use fhir::FhirVersion;
pub use id::{generate_id, validate_uuid, KindId, RepositoryId};
pub use time::{
    format_rfc3339, parse_rfc3339, same_instant_or_date, sliding_expires_on,
    sliding_expires_on_rfc3339,
};
