//! Shared provider session: HTTP client, endpoints and token slots.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use octofhir_config::{ProviderConfig, ServiceEndpoints};
use tokio::sync::Mutex;

use crate::error::{ClientError, Result};
use crate::grant::{self, Token};
use crate::retry::{Orchestrator, Refresher, RetryPolicy};

const USER_AGENT: &str = concat!("octofhir-provider/", env!("CARGO_PKG_VERSION"));

/// Which token issuer a call authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Realm {
    /// IAM OAuth2, used by every service except PKI
    Iam,
    /// Cloud Foundry UAA, used by PKI
    Uaa,
}

/// Per-provider session shared by every resource operation.
///
/// Tokens live in lock-free slots so concurrent operations read them without
/// contention. Refreshes are single-flight per realm: a caller that waited on
/// the guard while another caller refreshed reuses the new token.
pub struct Session {
    config: ProviderConfig,
    endpoints: ServiceEndpoints,
    http: reqwest::Client,
    iam_token: ArcSwapOption<Token>,
    uaa_token: ArcSwapOption<Token>,
    iam_refresh: Mutex<()>,
    uaa_refresh: Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.config.region)
            .field("environment", &self.config.environment)
            .field("has_iam_token", &self.iam_token.load().is_some())
            .field("has_uaa_token", &self.uaa_token.load().is_some())
            .finish()
    }
}

impl Session {
    /// Validate `config`, derive endpoints and build the HTTP client.
    /// No network traffic happens here.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let endpoints = ServiceEndpoints::resolve(&config)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        tracing::debug!(
            region = %config.region,
            environment = %config.environment,
            "provider session created"
        );
        Ok(Self {
            config,
            endpoints,
            http,
            iam_token: ArcSwapOption::empty(),
            uaa_token: ArcSwapOption::empty(),
            iam_refresh: Mutex::new(()),
            uaa_refresh: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn slot(&self, realm: Realm) -> &ArcSwapOption<Token> {
        match realm {
            Realm::Iam => &self.iam_token,
            Realm::Uaa => &self.uaa_token,
        }
    }

    fn guard(&self, realm: Realm) -> &Mutex<()> {
        match realm {
            Realm::Iam => &self.iam_refresh,
            Realm::Uaa => &self.uaa_refresh,
        }
    }

    /// Install a token directly, e.g. one obtained out of band.
    pub fn set_token(&self, realm: Realm, token: Token) {
        self.slot(realm).store(Some(Arc::new(token)));
    }

    /// Current token for `realm`, fetching one when none is cached or the
    /// cached one has expired.
    pub async fn bearer(&self, realm: Realm) -> Result<Arc<Token>> {
        if let Some(token) = self.slot(realm).load_full()
            && !token.is_expired()
        {
            return Ok(token);
        }
        self.refresh(realm).await
    }

    /// Fetch a fresh token for `realm` and store it.
    pub async fn refresh(&self, realm: Realm) -> Result<Arc<Token>> {
        let before = self.slot(realm).load_full();
        let _guard = self.guard(realm).lock().await;
        let current = self.slot(realm).load_full();
        if let Some(token) = &current {
            let replaced = match &before {
                Some(old) => !Arc::ptr_eq(old, token),
                None => true,
            };
            if replaced && !token.is_expired() {
                return Ok(token.clone());
            }
        }

        let token = match realm {
            Realm::Iam => {
                grant::request_iam_token(&self.http, &self.endpoints, &self.config.credentials)
                    .await?
            }
            Realm::Uaa => {
                let uaa = self.config.uaa.as_ref().ok_or_else(|| {
                    ClientError::MissingCredentials(
                        "UAA credentials are required for PKI resources".to_string(),
                    )
                })?;
                grant::request_uaa_token(&self.http, &self.endpoints, uaa).await?
            }
        };
        let token = Arc::new(token);
        self.slot(realm).store(Some(token.clone()));
        tracing::debug!(realm = ?realm, "token refreshed");
        Ok(token)
    }

    /// Refresher bound to one realm of this session.
    pub fn refresher(self: &Arc<Self>, realm: Realm) -> Arc<dyn Refresher> {
        Arc::new(SessionRefresher {
            session: Arc::clone(self),
            realm,
        })
    }

    /// Orchestrator using the configured retry policy and this session's
    /// refresher for `realm`.
    pub fn orchestrator(self: &Arc<Self>, realm: Realm) -> Orchestrator {
        Orchestrator::new(RetryPolicy::from(&self.config.retry))
            .with_refresher(self.refresher(realm))
    }
}

/// Best-effort token refresh hook for the orchestrator.
pub struct SessionRefresher {
    session: Arc<Session>,
    realm: Realm,
}

#[async_trait]
impl Refresher for SessionRefresher {
    async fn refresh(&self) {
        // Force a new token even if the cached one looks valid: the server
        // just rejected it.
        self.session.slot(self.realm).store(None);
        if let Err(e) = self.session.refresh(self.realm).await {
            tracing::debug!(realm = ?self.realm, error = %e, "token refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_config::CredentialsConfig;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(iam: &str) -> ProviderConfig {
        let mut cfg = ProviderConfig {
            credentials: CredentialsConfig {
                oauth_client_id: "client".to_string(),
                oauth_client_secret: "secret".into(),
                username: Some("alice".to_string()),
                password: Some("pw".into()),
                ..CredentialsConfig::default()
            },
            ..ProviderConfig::default()
        };
        cfg.endpoints.iam = Some(iam.to_string());
        cfg
    }

    #[test]
    fn test_invalid_config_rejected_before_network() {
        let err = Session::new(ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_password_grant_and_caching() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorize/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(config(&server.uri())).unwrap();
        let first = session.bearer(Realm::Iam).await.unwrap();
        let second = session.bearer(Realm::Iam).await.unwrap();
        assert_eq!(first.access_token.expose(), "tok-1");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_uaa_without_credentials() {
        let session = Session::new(config("http://127.0.0.1:1")).unwrap();
        let err = session.bearer(Realm::Uaa).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn test_refresher_swallows_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorize/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"error": "invalid_client", "error_description": "bad"}),
            ))
            .mount(&server)
            .await;

        let session = Arc::new(Session::new(config(&server.uri())).unwrap());
        session.set_token(Realm::Iam, Token::new("stale", 3600));
        session.refresher(Realm::Iam).refresh().await;
        // the rejected token is gone and nothing replaced it
        assert!(session.bearer(Realm::Iam).await.is_err());
    }
}
