//! Client for the pre-existing user / API-key backend (AWS API Gateway).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AuthError;

/// Identity handed to the legacy backend for find-or-create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// The legacy account reconciled with an identity-provider member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCredential {
    pub user_id: String,
    pub api_key: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_new_user: bool,
    #[serde(default)]
    pub migrated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enterprise: Option<bool>,
    /// Legacy enterprise tenant id, when the member belongs to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Organization the backend maps an enterprise email to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseOrganization {
    #[serde(alias = "stytch_organization_id")]
    pub organization_id: String,
    #[serde(default)]
    pub organization_name: Option<String>,
}

#[async_trait]
pub trait LegacyBackend: Send + Sync {
    /// Find the legacy user linked to `member_id`, or create one on the free
    /// plan. Enterprise linkage is resolved by the backend.
    async fn sync_member(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError>;

    /// Map an email to its enterprise organization; `None` when the email
    /// belongs to no enterprise tenant.
    async fn enterprise_organization(
        &self,
        email: &str,
    ) -> Result<Option<EnterpriseOrganization>, AuthError>;
}

pub struct HttpLegacyBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LegacyErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpLegacyBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

/// Non-2xx legacy answer → `Upstream` with the same status.
async fn upstream_error(resp: reqwest::Response) -> AuthError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<LegacyErrorBody>(&text)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| format!("Legacy backend returned status {status}"));
    AuthError::Upstream { status, message }
}

#[async_trait]
impl LegacyBackend for HttpLegacyBackend {
    async fn sync_member(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        let resp = self
            .request("/auth/stytch-sync")
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("legacy backend unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(upstream_error(resp).await);
        }

        resp.json::<LegacyCredential>()
            .await
            .map_err(|e| AuthError::Internal(format!("malformed legacy sync response: {e}")))
    }

    async fn enterprise_organization(
        &self,
        email: &str,
    ) -> Result<Option<EnterpriseOrganization>, AuthError> {
        let resp = self
            .request("/enterprise/auth/login")
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("legacy backend unreachable: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(upstream_error(resp).await);
        }

        resp.json::<EnterpriseOrganization>()
            .await
            .map(Some)
            .map_err(|e| AuthError::Internal(format!("malformed enterprise login response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sync_member_posts_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/stytch-sync"))
            .and(header("x-api-key", "gateway-key"))
            .and(body_partial_json(json!({
                "email": "jane.doe@example.com",
                "member_id": "member-test-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "user_id": "user_42",
                "api_key": "vrin_abc",
                "email": "jane.doe@example.com",
                "name": "Jane Doe",
                "is_new_user": true,
                "migrated": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpLegacyBackend::new(server.uri(), Some("gateway-key".into()));
        let credential = backend
            .sync_member(&SyncRequest {
                email: "jane.doe@example.com".into(),
                name: "Jane Doe".into(),
                member_id: "member-test-1".into(),
                organization_id: Some("organization-test-1".into()),
            })
            .await
            .unwrap();

        assert_eq!(credential.user_id, "user_42");
        assert!(credential.is_new_user);
        assert_eq!(credential.is_enterprise, None);
    }

    #[tokio::test]
    async fn sync_member_passes_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/stytch-sync"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "success": false, "error": "Account suspended" })),
            )
            .mount(&server)
            .await;

        let backend = HttpLegacyBackend::new(server.uri(), None);
        let err = backend.sync_member(&SyncRequest::default()).await.unwrap_err();
        match err {
            AuthError::Upstream { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Account suspended");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn enterprise_lookup_maps_not_found_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/enterprise/auth/login"))
            .and(body_partial_json(json!({ "email": "nobody@example.com" })))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/enterprise/auth/login"))
            .and(body_partial_json(json!({ "email": "ops@acme.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stytch_organization_id": "organization-acme",
                "organization_name": "Acme"
            })))
            .mount(&server)
            .await;

        let backend = HttpLegacyBackend::new(server.uri(), None);
        assert_eq!(backend.enterprise_organization("nobody@example.com").await.unwrap(), None);

        let org = backend.enterprise_organization("ops@acme.com").await.unwrap().unwrap();
        assert_eq!(org.organization_id, "organization-acme");
        assert_eq!(org.organization_name.as_deref(), Some("Acme"));
    }
}
