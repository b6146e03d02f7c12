//! OAuth2 token grants against IAM and UAA.
//!
//! IAM supports three grants, picked from the configured credentials:
//! - `password` when a user principal is configured
//! - `urn:ietf:params:oauth:grant-type:jwt-bearer` when a service identity is configured
//! - `client_credentials` otherwise
//!
//! UAA (PKI only) always uses the password grant with the public `cf` client.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use octofhir_config::{CredentialsConfig, SecretString, Service, ServiceEndpoints, UaaConfig};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::envelope::ResponseEnvelope;
use crate::error::{ClientError, Result};

const IAM_TOKEN_PATH: &str = "authorize/oauth2/token";
const UAA_TOKEN_PATH: &str = "oauth/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 300;
const DEFAULT_EXPIRES_IN: i64 = 1800;

/// A bearer token and the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: SecretString,
    pub expires_at: OffsetDateTime,
}

impl Token {
    /// Tokens are considered stale slightly before their real expiry.
    const LEEWAY_SECS: i64 = 30;

    pub fn new(access_token: impl Into<SecretString>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: OffsetDateTime::now_utc() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() + Duration::seconds(Self::LEEWAY_SECS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// JWT claims for the service-identity assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
}

/// Build a signed RS256 assertion for the JWT-bearer grant.
pub fn service_assertion(service_id: &str, private_key_pem: &str, audience: &str) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| ClientError::Token(format!("invalid service private key: {e}")))?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = AssertionClaims {
        iss: service_id,
        sub: service_id,
        aud: audience,
        exp: now + ASSERTION_LIFETIME_SECS,
        iat: now,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| ClientError::Token(format!("failed to sign assertion: {e}")))
}

/// Obtain an IAM access token using the best grant for `creds`.
pub async fn request_iam_token(
    http: &reqwest::Client,
    endpoints: &ServiceEndpoints,
    creds: &CredentialsConfig,
) -> Result<Token> {
    let url = endpoints.join(Service::Iam, IAM_TOKEN_PATH);
    let mut form: Vec<(&str, String)> = Vec::new();
    let grant = match (&creds.username, &creds.password, &creds.service_id, &creds.service_private_key) {
        (Some(username), Some(password), _, _) => {
            form.push(("username", username.clone()));
            form.push(("password", password.expose().to_string()));
            "password"
        }
        (_, _, Some(service_id), Some(key)) => {
            form.push(("assertion", service_assertion(service_id, key.expose(), &url)?));
            JWT_BEARER_GRANT
        }
        _ => "client_credentials",
    };
    form.push(("grant_type", grant.to_string()));
    tracing::debug!(grant, "requesting IAM token");

    let response = http
        .post(&url)
        .basic_auth(&creds.oauth_client_id, Some(creds.oauth_client_secret.expose()))
        .header("Api-Version", "2")
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;
    parse_token_response(ResponseEnvelope::read(response).await?)
}

/// Obtain a UAA access token for PKI calls.
pub async fn request_uaa_token(
    http: &reqwest::Client,
    endpoints: &ServiceEndpoints,
    uaa: &UaaConfig,
) -> Result<Token> {
    let url = endpoints.join(Service::Uaa, UAA_TOKEN_PATH);
    let form = [
        ("grant_type", "password"),
        ("username", uaa.username.as_str()),
        ("password", uaa.password.expose()),
    ];
    tracing::debug!("requesting UAA token");
    let response = http
        .post(&url)
        .basic_auth("cf", Some(""))
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;
    parse_token_response(ResponseEnvelope::read(response).await?)
}

fn parse_token_response(envelope: ResponseEnvelope) -> Result<Token> {
    if !envelope.is_success() {
        return Err(ClientError::Token(format!(
            "HTTP {}: {}",
            envelope.status,
            envelope.error_message()
        )));
    }
    let parsed: TokenResponse = envelope.json()?;
    if parsed.access_token.is_empty() {
        return Err(ClientError::Token("empty access_token in response".to_string()));
    }
    Ok(Token::new(
        parsed.access_token,
        parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn test_token_expiry_leeway() {
        assert!(Token::new("t", 10).is_expired());
        assert!(!Token::new("t", 3600).is_expired());
    }

    #[test]
    fn test_parse_token_response() {
        let ok = ResponseEnvelope::new(
            200,
            HeaderMap::new(),
            br#"{"access_token":"abc","expires_in":60}"#.to_vec(),
        );
        let token = parse_token_response(ok).unwrap();
        assert_eq!(token.access_token.expose(), "abc");

        let denied = ResponseEnvelope::new(
            401,
            HeaderMap::new(),
            br#"{"error":"invalid_client","error_description":"nope"}"#.to_vec(),
        );
        let err = parse_token_response(denied).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_service_assertion_rejects_garbage_key() {
        let err = service_assertion("svc", "not a key", "https://iam/token").unwrap_err();
        assert!(matches!(err, ClientError::Token(_)));
    }

    #[test]
    fn test_service_assertion_verifies_with_public_key() {
        use jsonwebtoken::{DecodingKey, Validation};
        use rsa::RsaPrivateKey;
        use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();

        let assertion = service_assertion("svc@example", &private_pem, "https://iam/token").unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://iam/token"]);
        let decoded = jsonwebtoken::decode::<serde_json::Value>(
            &assertion,
            &DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims["iss"], "svc@example");
        assert_eq!(decoded.claims["sub"], "svc@example");
    }
}
