//! Provider errors and host-facing diagnostics.

use std::fmt;
use std::time::Duration;

use octofhir_client::{CallError, ErrorKind};
use octofhir_core::CoreError;

/// Errors raised by the engine and by resource implementations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Configuration rejected before any HTTP call.
    #[error("{path}: {message}")]
    Validation { path: String, message: String },

    /// A platform call failed.
    #[error("{operation}: {source}")]
    Client {
        kind: ErrorKind,
        operation: String,
        #[source]
        source: CallError,
    },

    /// Create hit a 409 and the existing remote object differs.
    #[error(
        "a resource with the same identity already exists but {field} differs: expected '{expected}', found '{actual}'"
    )]
    FieldMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Key or certificate material could not be used.
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("State upgrade from schema version {from} failed: {message}")]
    Migration { from: u32, message: String },

    /// Attribute bag value did not have the expected shape.
    #[error("{path}: {message}")]
    Codec { path: String, message: String },

    #[error(transparent)]
    Import(#[from] CoreError),

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The remote operation reached a failed terminal state.
    #[error("{0}")]
    Failed(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn codec(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codec {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn client(operation: impl Into<String>, source: CallError) -> Self {
        Self::Client {
            kind: source.kind(),
            operation: operation.into(),
            source,
        }
    }

    pub fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::FieldMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::client(
            operation,
            CallError::from(octofhir_client::ClientError::Cancelled { attempts: 0 }),
        )
    }

    /// HTTP status behind this error, 0 when none.
    pub fn status(&self) -> u16 {
        match self {
            ProviderError::Client { source, .. } => source.status(),
            _ => 0,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Client { kind, .. } => *kind,
            ProviderError::Validation { .. }
            | ProviderError::Codec { .. }
            | ProviderError::Import(_)
            | ProviderError::Credential(_) => ErrorKind::Validation,
            ProviderError::FieldMismatch { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Other,
        }
    }

    /// Attribute path the error refers to, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            ProviderError::Validation { path, .. } | ProviderError::Codec { path, .. } => {
                Some(path)
            }
            ProviderError::FieldMismatch { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A message returned to the host alongside (or instead of) new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
    /// Attribute path the message is about
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Error diagnostic for a failed CRUD step on `kind`.
    pub fn from_error(kind: &str, operation: &str, err: &ProviderError) -> Self {
        let diag = Self::error(format!("{kind}: {operation} failed")).with_detail(err.to_string());
        match err.attribute() {
            Some(attr) => diag.with_attribute(attr),
            None => diag,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(attr) = &self.attribute {
            write!(f, " [{attr}]")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn error(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.push(Diagnostic::error(summary).with_attribute(attribute));
    }

    pub fn warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic::warning(summary).with_detail(detail));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_client::{ClientError, ResponseEnvelope};

    #[test]
    fn test_client_error_keeps_kind_and_status() {
        let call = CallError::new(
            Some(ResponseEnvelope::new(410, Default::default(), Vec::new())),
            ClientError::status(410, "gone"),
        );
        let err = ProviderError::client("read group", call);
        assert_eq!(err.kind(), ErrorKind::Gone);
        assert_eq!(err.status(), 410);
        assert!(err.to_string().starts_with("read group"));
    }

    #[test]
    fn test_diagnostic_from_error() {
        let err = ProviderError::validation("name", "must not be empty");
        let diag = Diagnostic::from_error("iam_group", "create", &err);
        assert_eq!(diag.summary, "iam_group: create failed");
        assert_eq!(diag.attribute.as_deref(), Some("name"));
        assert_eq!(diag.severity, Severity::Error);
    }

    #[test]
    fn test_diagnostics_partition() {
        let mut diags = Diagnostics::new();
        diags.warning("3 members not added", "user u1: not found");
        assert!(!diags.has_errors());
        diags.error("roles", "unknown role");
        assert!(diags.has_errors());
        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
    }
}
