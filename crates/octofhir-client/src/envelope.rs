//! Captured HTTP responses: status, headers and body of one platform call.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ClientError;

/// What came back from a single HTTP round trip.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// HTTP status, 0 when no round trip happened
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Placeholder envelope for calls that never reached the server.
    pub fn transport() -> Self {
        Self::new(0, HeaderMap::new(), Vec::new())
    }

    /// Capture status, headers and body of a reqwest response.
    pub async fn read(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self::new(status, headers, body))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body, treating an empty body as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let bytes: &[u8] = if self.body.is_empty() {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Best-effort human readable error message from the body.
    ///
    /// Understands FHIR `OperationOutcome` issues and the `{error, error_description}`
    /// / `{message}` shapes used by the identity services.
    pub fn error_message(&self) -> String {
        let body = self.text();
        let Ok(json) = serde_json::from_str::<Value>(&body) else {
            return truncate(&body);
        };
        if json.get("resourceType").and_then(|v| v.as_str()) == Some("OperationOutcome")
            && let Some(issues) = json.get("issue").and_then(|v| v.as_array())
        {
            let msgs: Vec<&str> = issues
                .iter()
                .filter_map(|i| {
                    i.get("diagnostics")
                        .or_else(|| i.get("details").and_then(|d| d.get("text")))
                        .and_then(|d| d.as_str())
                })
                .collect();
            if !msgs.is_empty() {
                return msgs.join("; ");
            }
        }
        for key in ["error_description", "message", "error", "errorMessage"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
        truncate(&body)
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(status: u16, body: &str) -> ResponseEnvelope {
        ResponseEnvelope::new(status, HeaderMap::new(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_operation_outcome_message() {
        let env = envelope(
            422,
            r#"{"resourceType":"OperationOutcome","issue":[{"diagnostics":"user already member"},{"details":{"text":"second"}}]}"#,
        );
        assert_eq!(env.error_message(), "user already member; second");
    }

    #[test]
    fn test_iam_error_description() {
        let env = envelope(401, r#"{"error":"invalid_client","error_description":"bad secret"}"#);
        assert_eq!(env.error_message(), "bad secret");
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let env = envelope(204, "");
        let value: Value = env.json().unwrap();
        assert!(value.is_null());
        assert!(env.json::<()>().is_ok());
    }

    #[test]
    fn test_transport_envelope() {
        let env = ResponseEnvelope::transport();
        assert_eq!(env.status, 0);
        assert!(!env.is_success());
    }
}
