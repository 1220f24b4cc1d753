//! Calls into the knowledge backend authenticated with the cached legacy key.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::storage::{self, SessionStorage};
use crate::error::AuthError;

pub struct BearerClient {
    base_url: String,
    storage: Arc<dyn SessionStorage>,
    http: reqwest::Client,
}

impl BearerClient {
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
            http: reqwest::Client::new(),
        }
    }

    /// Request builder carrying `Authorization: Bearer <vrin_api_key>`.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, AuthError> {
        let api_key = storage::cached_api_key(self.storage.as_ref()).ok_or(AuthError::Unauthorized)?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(api_key))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let resp = self
            .request(Method::GET, path)?
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("backend unreachable: {e}")))?;
        read_json(resp).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let resp = self
            .request(Method::POST, path)?
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("backend unreachable: {e}")))?;
        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AuthError::Unauthorized);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(AuthError::Upstream {
            status: status.as_u16(),
            message,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| AuthError::Internal(format!("malformed backend response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::{MemoryStorage, API_KEY_KEY};
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn attaches_cached_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/stats"))
            .and(header("authorization", "Bearer vrin_key_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nodes": 3 })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStorage::new());
        storage.set(API_KEY_KEY, "vrin_key_1").unwrap();
        let client = BearerClient::new(server.uri(), storage);

        let stats: Value = client.get_json("/graph/stats").await.unwrap();
        assert_eq!(stats["nodes"], 3);
    }

    #[tokio::test]
    async fn no_cached_key_is_unauthorized_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = BearerClient::new(server.uri(), Arc::new(MemoryStorage::new()));
        let err = client.get_json::<Value>("/graph/stats").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }
}
