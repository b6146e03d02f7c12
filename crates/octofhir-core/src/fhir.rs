use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FHIR versions supported by the clinical data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FhirVersion {
    #[default]
    Stu3,
    R4,
}

impl FhirVersion {
    pub const ALL: [FhirVersion; 2] = [FhirVersion::Stu3, FhirVersion::R4];

    pub fn as_str(&self) -> &'static str {
        match self {
            FhirVersion::Stu3 => "stu3",
            FhirVersion::R4 => "r4",
        }
    }

    /// Value sent in the `fhirVersion` parameter of the FHIR media type
    pub fn mime_version(&self) -> &'static str {
        match self {
            FhirVersion::Stu3 => "3.0",
            FhirVersion::R4 => "4.0",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FhirVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stu3" | "3.0.1" | "3.0.2" => Ok(FhirVersion::Stu3),
            "r4" | "4.0.0" | "4.0.1" => Ok(FhirVersion::R4),
            _ => Err(CoreError::UnknownFhirVersion(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fhir_version_default_is_stu3() {
        assert_eq!(FhirVersion::default(), FhirVersion::Stu3);
    }

    #[test]
    fn test_fhir_version_from_str() {
        assert_eq!("stu3".parse::<FhirVersion>().unwrap(), FhirVersion::Stu3);
        assert_eq!("R4".parse::<FhirVersion>().unwrap(), FhirVersion::R4);
        assert_eq!("4.0.1".parse::<FhirVersion>().unwrap(), FhirVersion::R4);
        assert!("r5".parse::<FhirVersion>().is_err());
    }

    #[test]
    fn test_fhir_version_display_and_serde() {
        assert_eq!(FhirVersion::R4.to_string(), "r4");
        assert_eq!(serde_json::to_string(&FhirVersion::Stu3).unwrap(), "\"stu3\"");
        let v: FhirVersion = serde_json::from_str("\"r4\"").unwrap();
        assert_eq!(v, FhirVersion::R4);
    }
}
