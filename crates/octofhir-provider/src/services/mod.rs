//! Thin adapters over the platform's REST services.
//!
//! Every adapter exposes its primary object through [`ServiceApi`] via a
//! [`Collection`], plus whatever extra operations the service has
//! (membership batches, scope changes, status polls).

pub mod ai;
pub mod blr;
pub mod dbs;
pub mod dicom;
pub mod iam;
pub mod pki;

use std::marker::PhantomData;

use async_trait::async_trait;
use octofhir_client::{RestClient, ServiceApi, ServiceResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Server-assigned identity of a service object.
pub trait Identified {
    fn id(&self) -> &str;
}

/// A REST collection: `POST path`, `GET/PUT/DELETE path/{id}`.
pub struct Collection<T> {
    rest: RestClient,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            rest: self.rest.clone(),
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("path", &self.path).finish()
    }
}

impl<T> Collection<T> {
    pub fn new(rest: RestClient, path: impl Into<String>) -> Self {
        Self {
            rest,
            path: path.into().trim_end_matches('/').to_string(),
            _marker: PhantomData,
        }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn item(&self, id: &str) -> String {
        format!("{}/{id}", self.path)
    }

    /// `path?query` with the parameters form-encoded.
    pub fn query(&self, params: &[(&str, &str)]) -> String {
        with_query(&self.path, params)
    }
}

impl<T: DeserializeOwned> Collection<T> {
    /// Search the collection; the answer is a bundle (`entry`), a SCIM list
    /// (`Resources`) or a bare array.
    pub async fn search(&self, params: &[(&str, &str)]) -> ServiceResult<Vec<T>> {
        let (body, envelope): (Value, _) = self.rest.get(&self.query(params)).await?;
        let items = entries(body)
            .into_iter()
            .map(|entry| match entry.get("resource") {
                Some(resource) => resource.clone(),
                None => entry,
            })
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::debug!(path = %self.path, error = %e, "skipping undecodable search entry");
                    None
                }
            })
            .collect();
        Ok((items, envelope))
    }
}

#[async_trait]
impl<T> ServiceApi for Collection<T>
where
    T: Identified + Serialize + DeserializeOwned + Send + Sync,
{
    type Resource = T;

    async fn create(&self, resource: &T) -> ServiceResult<T> {
        self.rest.post(&self.path, resource).await
    }

    async fn get(&self, id: &str) -> ServiceResult<T> {
        self.rest.get(&self.item(id)).await
    }

    async fn update(&self, resource: &T) -> ServiceResult<T> {
        self.rest.put(&self.item(resource.id()), resource).await
    }

    async fn delete(&self, id: &str) -> ServiceResult<()> {
        self.rest.delete(&self.item(id)).await
    }
}

pub fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().filter(|(_, v)| !v.is_empty()))
        .finish();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

fn entries(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => ["entry", "Resources", "resources", "data"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub(crate) fn is_zero(n: &i64) -> bool {
    *n == 0
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_skips_empty_values() {
        assert_eq!(
            with_query("Application", &[("name", "my app"), ("propositionId", "")]),
            "Application?name=my+app"
        );
        assert_eq!(with_query("Application", &[]), "Application");
    }

    #[test]
    fn test_entries_shapes() {
        assert_eq!(entries(json!([{"id": "a"}])).len(), 1);
        assert_eq!(entries(json!({"entry": [{"resource": {"id": "a"}}]})).len(), 1);
        assert_eq!(entries(json!({"Resources": [{"id": "a"}, {"id": "b"}]})).len(), 2);
        assert!(entries(json!({"total": 0})).is_empty());
    }
}
