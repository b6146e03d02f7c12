//! Identifier helpers: UUID generation and the composite import grammars.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate that `id` is a canonical UUID
pub fn validate_uuid(id: &str) -> Result<()> {
    uuid::Uuid::parse_str(id)?;
    Ok(())
}

/// `<Kind>/<id>` identifiers, e.g. `Bucket/...` or `BlobStorePolicy/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindId {
    pub kind: String,
    pub guid: String,
}

impl KindId {
    pub fn new(kind: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            guid: guid.into(),
        }
    }

    /// Parse `value`, requiring the prefix to be exactly `kind`.
    pub fn parse_expecting(kind: &str, value: &str) -> Result<Self> {
        let expected = format!("{kind}/<uuid>");
        let Some((prefix, guid)) = value.split_once('/') else {
            return Err(CoreError::invalid_import_id(value, expected));
        };
        if prefix != kind || guid.is_empty() || guid.contains('/') {
            return Err(CoreError::invalid_import_id(value, expected));
        }
        Ok(Self::new(prefix, guid))
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.guid)
    }
}

impl FromStr for KindId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((kind, guid))
                if !kind.is_empty() && !guid.is_empty() && !guid.contains('/') =>
            {
                Ok(Self::new(kind, guid))
            }
            _ => Err(CoreError::invalid_import_id(s, "<Kind>/<uuid>")),
        }
    }
}

/// `<config_url>,<org_id>,<repo_id>` identifiers used by DICOM repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryId {
    pub config_url: String,
    pub organization_id: String,
    pub repository_id: String,
}

impl RepositoryId {
    pub const GRAMMAR: &'static str = "<config_url>,<org_id>,<repo_id>";

    pub fn new(
        config_url: impl Into<String>,
        organization_id: impl Into<String>,
        repository_id: impl Into<String>,
    ) -> Self {
        Self {
            config_url: config_url.into(),
            organization_id: organization_id.into(),
            repository_id: repository_id.into(),
        }
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.config_url, self.organization_id, self.repository_id
        )
    }
}

impl FromStr for RepositoryId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [config_url, org_id, repo_id]
                if !config_url.is_empty() && !org_id.is_empty() && !repo_id.is_empty() =>
            {
                url::Url::parse(config_url)
                    .map_err(|_| CoreError::invalid_import_id(s, Self::GRAMMAR))?;
                Ok(Self::new(*config_url, *org_id, *repo_id))
            }
            _ => Err(CoreError::invalid_import_id(s, Self::GRAMMAR)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_uuid() {
        let id = generate_id();
        assert!(validate_uuid(&id).is_ok());
        assert_ne!(id, generate_id());
    }

    #[test]
    fn test_blob_store_policy_import() {
        let id = KindId::parse_expecting("BlobStorePolicy", "BlobStorePolicy/abc-123").unwrap();
        assert_eq!(id.guid, "abc-123");
        assert_eq!(id.to_string(), "BlobStorePolicy/abc-123");
    }

    #[test]
    fn test_kind_id_rejects_wrong_prefix() {
        let err = KindId::parse_expecting("Bucket", "BlobStorePolicy/abc").unwrap_err();
        assert!(err.to_string().contains("Bucket/<uuid>"));
        assert!(KindId::parse_expecting("Bucket", "Bucket/").is_err());
        assert!(KindId::parse_expecting("Bucket", "abc").is_err());
        assert!(KindId::parse_expecting("Bucket", "Bucket/a/b").is_err());
    }

    #[test]
    fn test_kind_id_format_parse_roundtrip() {
        let original = KindId::new("TopicSubscription", generate_id());
        let parsed: KindId = original.to_string().parse().unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_repository_id_parse() {
        let id: RepositoryId = "https://dicom.example.com,org-1,repo-9".parse().unwrap();
        assert_eq!(id.config_url, "https://dicom.example.com");
        assert_eq!(id.organization_id, "org-1");
        assert_eq!(id.repository_id, "repo-9");
        assert_eq!(id.to_string(), "https://dicom.example.com,org-1,repo-9");
    }

    #[test]
    fn test_repository_id_errors_name_grammar() {
        for bad in ["", "a,b", "https://x,,c", "not a url,b,c", "a,b,c,d"] {
            let err = bad.parse::<RepositoryId>().unwrap_err();
            assert!(
                err.to_string().contains(RepositoryId::GRAMMAR),
                "unexpected error for {bad:?}: {err}"
            );
        }
    }
}
