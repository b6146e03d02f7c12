use thiserror::Error;

/// Core error types shared by every provider crate
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Invalid import ID '{id}': expected {expected}")]
    InvalidImportId { id: String, expected: String },

    #[error("Invalid RFC3339 timestamp: {0}")]
    InvalidDateTime(String),

    #[error("Unknown FHIR version: {0}")]
    UnknownFhirVersion(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time formatting error: {0}")]
    TimeFormat(#[from] time::error::Format),

    #[error("Time range error: {0}")]
    TimeRange(#[from] time::error::ComponentRange),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl CoreError {
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Import identifier did not match the grammar named by `expected`
    pub fn invalid_import_id(id: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidImportId {
            id: id.into(),
            expected: expected.into(),
        }
    }

    pub fn invalid_date_time(value: impl Into<String>) -> Self {
        Self::InvalidDateTime(value.into())
    }

    /// Get error category for logging and diagnostics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidId(_)
            | Self::InvalidImportId { .. }
            | Self::InvalidDateTime(_)
            | Self::UnknownFhirVersion(_)
            | Self::UrlError(_) => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeFormat(_) | Self::TimeRange(_) | Self::UuidError(_) => ErrorCategory::System,
        }
    }

    /// True when the error was caused by user-supplied input
    pub fn is_user_error(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
    System,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_id_error_names_grammar() {
        let err = CoreError::invalid_import_id("nope", "Bucket/<uuid>");
        assert_eq!(
            err.to_string(),
            "Invalid import ID 'nope': expected Bucket/<uuid>"
        );
        assert!(err.is_user_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::JsonError(_)));
        assert_eq!(err.category(), ErrorCategory::Serialization);
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_uuid_error_conversion() {
        let err: CoreError = uuid::Uuid::parse_str("not-a-uuid").unwrap_err().into();
        assert!(matches!(err, CoreError::UuidError(_)));
        assert_eq!(err.category(), ErrorCategory::System);
    }

    #[test]
    fn test_url_error_conversion() {
        let err: CoreError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, CoreError::UrlError(_)));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::System.to_string(), "system");
    }
}
