//! JSON REST plumbing shared by every service adapter.

use std::sync::Arc;

use async_trait::async_trait;
use octofhir_config::Service;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::envelope::ResponseEnvelope;
use crate::error::{CallError, ClientError};
use crate::session::{Realm, Session};

/// Outcome of a service call: the decoded value plus the raw response, or
/// the failure plus whatever response produced it.
pub type ServiceResult<T> = Result<(T, ResponseEnvelope), CallError>;

pub const JSON: &str = "application/json";
pub const JSON_PATCH: &str = "application/json-patch+json";

/// Uniform CRUD contract implemented by every per-service adapter.
#[async_trait]
pub trait ServiceApi: Send + Sync {
    type Resource: Send + Sync;

    async fn create(&self, resource: &Self::Resource) -> ServiceResult<Self::Resource>;

    async fn get(&self, id: &str) -> ServiceResult<Self::Resource>;

    async fn update(&self, resource: &Self::Resource) -> ServiceResult<Self::Resource>;

    async fn delete(&self, id: &str) -> ServiceResult<()>;
}

/// Authenticated JSON client bound to one service.
#[derive(Clone)]
pub struct RestClient {
    session: Arc<Session>,
    service: Service,
    realm: Realm,
    headers: HeaderMap,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("service", &self.service)
            .field("realm", &self.realm)
            .finish()
    }
}

impl RestClient {
    pub fn new(session: Arc<Session>, service: Service) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        Self {
            session,
            service,
            realm: Realm::Iam,
            headers,
        }
    }

    pub fn with_realm(mut self, realm: Realm) -> Self {
        self.realm = realm;
        self
    }

    /// Add a header sent with every request, e.g. `Api-Version`.
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn realm(&self) -> Realm {
        self.realm
    }

    /// Absolute URLs pass through untouched, anything else is joined onto the
    /// service base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.session.endpoints().join(self.service, path)
        }
    }

    /// Send one request and capture the response.
    ///
    /// `extra` headers replace same-named defaults. Non-2xx responses become
    /// a [`CallError`] carrying the envelope.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        extra: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, CallError> {
        let token = self.session.bearer(self.realm).await?;
        let mut headers = self.headers.clone();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.access_token.expose()))
            .map_err(|_| ClientError::InvalidRequest("token is not a valid header".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let url = self.url(path);
        tracing::trace!(service = %self.service, %method, %url, "sending request");
        let mut request = self.session.http().request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await.map_err(ClientError::from)?;
        let envelope = ResponseEnvelope::read(response).await?;
        if envelope.is_success() {
            Ok(envelope)
        } else {
            let error = ClientError::status(envelope.status, envelope.error_message());
            Err(CallError::new(Some(envelope), error))
        }
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        extra: &[(&str, &str)],
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let bytes = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let envelope = self.send(method, path, bytes, extra).await?;
        match envelope.json::<T>() {
            Ok(value) => Ok((value, envelope)),
            Err(error) => Err(CallError::new(Some(envelope), error)),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<T> {
        self.send_json::<(), T>(Method::GET, path, None, &[]).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> ServiceResult<T> {
        self.send_json::<(), T>(Method::GET, path, None, extra).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Some(body), &[]).await
    }

    pub async fn post_with<B, T>(
        &self,
        path: &str,
        body: &B,
        extra: &[(&str, &str)],
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Some(body), extra).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn put_with<B, T>(
        &self,
        path: &str,
        body: &B,
        extra: &[(&str, &str)],
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, Some(body), extra).await
    }

    /// PATCH with an RFC 6902 document unless `extra` overrides the content type.
    pub async fn patch<B, T>(
        &self,
        path: &str,
        body: &B,
        extra: &[(&str, &str)],
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut headers: Vec<(&str, &str)> = vec![("content-type", JSON_PATCH)];
        headers.extend_from_slice(extra);
        self.send_json(Method::PATCH, path, Some(body), &headers).await
    }

    pub async fn delete(&self, path: &str) -> ServiceResult<()> {
        self.delete_with(path, &[]).await
    }

    pub async fn delete_with(&self, path: &str, extra: &[(&str, &str)]) -> ServiceResult<()> {
        let envelope = self.send(Method::DELETE, path, None, extra).await?;
        Ok(((), envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::Token;
    use octofhir_config::{CredentialsConfig, ProviderConfig};
    use serde_json::{Value, json};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> RestClient {
        let mut cfg = ProviderConfig {
            credentials: CredentialsConfig {
                oauth_client_id: "client".to_string(),
                oauth_client_secret: "secret".into(),
                ..CredentialsConfig::default()
            },
            ..ProviderConfig::default()
        };
        cfg.endpoints.idm = Some(base.to_string());
        let session = Arc::new(Session::new(cfg).unwrap());
        session.set_token(Realm::Iam, Token::new("tok", 3600));
        RestClient::new(session, Service::Idm).with_header("api-version", "1")
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize/identity/Group/g1"))
            .and(header("authorization", "Bearer tok"))
            .and(header("api-version", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g1"})))
            .mount(&server)
            .await;

        let (value, envelope): (Value, _) = client(&server.uri())
            .get("authorize/identity/Group/g1")
            .await
            .unwrap();
        assert_eq!(value["id"], "g1");
        assert_eq!(envelope.status, 200);
    }

    #[tokio::test]
    async fn test_error_status_keeps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authorize/identity/Group"))
            .and(body_json(json!({"name": "g"})))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"diagnostics": "group exists"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .post::<_, Value>("authorize/identity/Group", &json!({"name": "g"}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("group exists"));
    }

    #[tokio::test]
    async fn test_patch_uses_json_patch_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/Practitioner/p1"))
            .and(header("content-type", JSON_PATCH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .mount(&server)
            .await;

        let absolute = format!("{}/Practitioner/p1", server.uri());
        let ops = json!([{"op": "replace", "path": "/active", "value": true}]);
        let result = client(&server.uri())
            .patch::<_, Value>(&absolute, &ops, &[])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_envelope() {
        let err = client("http://127.0.0.1:1")
            .delete("authorize/identity/Group/g1")
            .await
            .unwrap_err();
        assert!(err.envelope.is_none());
        assert_eq!(err.status(), 0);
    }
}
