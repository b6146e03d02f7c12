//! Client error types and the failure taxonomy used by the orchestrator.

use std::fmt;

use crate::envelope::ResponseEnvelope;

/// Errors raised while talking to platform services.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No HTTP round trip happened: connection, DNS or TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The caller's context was cancelled before the call could complete.
    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts issued before cancellation was observed.
        attempts: u32,
    },

    /// All attempts were used up on retryable failures.
    #[error("Giving up after {attempts} attempt(s), last HTTP status {last_status}: {source}")]
    RetriesExhausted {
        /// Number of attempts issued.
        attempts: u32,
        /// Status of the last response, 0 when the last attempt had no round trip.
        last_status: u16,
        /// The last error observed.
        #[source]
        source: Box<ClientError>,
    },

    /// No usable token could be obtained.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The token endpoint rejected the grant.
    #[error("Token request failed: {0}")]
    Token(String),

    /// A successful response could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure kinds, used for diagnostics and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    RateLimited,
    Unavailable,
    Gateway,
    Server,
    AuthPropagation,
    Conflict,
    Gone,
    PermissionDenied,
    Validation,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Classify a status code observed on a single attempt.
    pub fn for_status(status: u16) -> Self {
        match status {
            0 => ErrorKind::Transport,
            401 => ErrorKind::PermissionDenied,
            403 => ErrorKind::AuthPropagation,
            404 | 410 => ErrorKind::Gone,
            409 => ErrorKind::Conflict,
            400 | 422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::Server,
            502 | 504 => ErrorKind::Gateway,
            503 => ErrorKind::Unavailable,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Gateway => "gateway",
            ErrorKind::Server => "server",
            ErrorKind::AuthPropagation => "auth_propagation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Gone => "gone",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl ClientError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Final classification of this error as surfaced to the user.
    ///
    /// A 403 that outlived every retry is a permission problem, not a
    /// propagation delay.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Status { status: 403, .. } => ErrorKind::PermissionDenied,
            ClientError::Status { status, .. } => ErrorKind::for_status(*status),
            ClientError::Cancelled { .. } => ErrorKind::Cancelled,
            ClientError::RetriesExhausted { source, .. } => source.kind(),
            ClientError::MissingCredentials(_) | ClientError::Token(_) => {
                ErrorKind::PermissionDenied
            }
            ClientError::InvalidRequest(_) => ErrorKind::Validation,
            ClientError::Decode(_) => ErrorKind::Other,
        }
    }

    /// Errors that retrying cannot fix even without an HTTP round trip.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidRequest(_)
                | ClientError::Cancelled { .. }
                | ClientError::Decode(_)
                | ClientError::MissingCredentials(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if err.is_builder() {
            ClientError::InvalidRequest(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// A failed service call: the error plus the response that produced it, if any.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CallError {
    /// Absent when no HTTP round trip happened.
    pub envelope: Option<ResponseEnvelope>,
    /// What went wrong.
    pub error: ClientError,
}

impl CallError {
    pub fn new(envelope: Option<ResponseEnvelope>, error: ClientError) -> Self {
        Self { envelope, error }
    }

    /// Error without any response, e.g. a connection failure.
    pub fn without_response(error: ClientError) -> Self {
        Self {
            envelope: None,
            error,
        }
    }

    /// HTTP status of the response, 0 when there was no round trip.
    pub fn status(&self) -> u16 {
        match (&self.envelope, &self.error) {
            (Some(envelope), _) => envelope.status,
            (None, ClientError::RetriesExhausted { last_status, .. }) => *last_status,
            _ => 0,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// 404 or 410: the resource no longer exists.
    pub fn is_gone(&self) -> bool {
        matches!(self.status(), 404 | 410)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == 409
    }
}

impl From<ClientError> for CallError {
    fn from(error: ClientError) -> Self {
        Self::without_response(error)
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kinds() {
        assert_eq!(ErrorKind::for_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::for_status(502), ErrorKind::Gateway);
        assert_eq!(ErrorKind::for_status(504), ErrorKind::Gateway);
        assert_eq!(ErrorKind::for_status(503), ErrorKind::Unavailable);
        assert_eq!(ErrorKind::for_status(403), ErrorKind::AuthPropagation);
        assert_eq!(ErrorKind::for_status(410), ErrorKind::Gone);
    }

    #[test]
    fn test_exhausted_403_is_permission_denied() {
        let err = ClientError::RetriesExhausted {
            attempts: 5,
            last_status: 403,
            source: Box::new(ClientError::status(403, "forbidden")),
        };
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let text = err.to_string();
        assert!(text.contains("5 attempt(s)"));
        assert!(text.contains("403"));
    }

    #[test]
    fn test_call_error_status() {
        let gone = CallError::new(
            Some(ResponseEnvelope::new(404, Default::default(), Vec::new())),
            ClientError::status(404, "not found"),
        );
        assert!(gone.is_gone());
        assert_eq!(gone.kind(), ErrorKind::Gone);

        let transport = CallError::from(ClientError::Transport("connection refused".into()));
        assert_eq!(transport.status(), 0);
        assert!(!transport.is_gone());
    }
}
