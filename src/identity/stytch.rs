use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::traits::{IdentityError, IdentityProvider};
use super::types::{
    DiscoveryAuthentication, Member, MemberSession, Organization, PasswordMigration,
    SessionCredential,
};

/// Stytch B2B REST client.
///
/// Auth: HTTP basic with `project_id:secret`.
/// Every session minted through this client lives `session_duration_minutes`.
pub struct StytchClient {
    base_url: String,
    project_id: String,
    secret: String,
    session_duration_minutes: u32,
    http: reqwest::Client,
}

// Error envelope returned by every Stytch endpoint on failure.
#[derive(Debug, Deserialize)]
struct StytchErrorBody {
    status_code: Option<u16>,
    error_type: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganizationEnvelope {
    organization: Organization,
}

#[derive(Debug, Deserialize)]
struct MemberEnvelope {
    member: Member,
}

#[derive(Serialize)]
struct PasswordMigrateBody<'a> {
    email_address: &'a str,
    hash: &'a str,
    hash_type: &'static str,
    organization_id: &'a str,
    name: &'a str,
}

impl StytchClient {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        secret: impl Into<String>,
        session_duration_minutes: u32,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            secret: secret.into(),
            session_duration_minutes,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(
            config.stytch_base_url(),
            &config.stytch_project_id,
            &config.stytch_secret,
            config.session_duration_minutes,
        )
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, IdentityError> {
        let url = format!("{}/v1/b2b/{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.project_id, Some(&self.secret))
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }

        resp.json::<T>()
            .await
            .map_err(|e| IdentityError::Decode(format!("{path}: {e}")))
    }
}

/// Turn a non-2xx Stytch response into a typed error. Bodies that are not
/// the standard envelope keep the HTTP status and an `unknown_error` type.
fn api_error(http_status: u16, body: &str) -> IdentityError {
    match serde_json::from_str::<StytchErrorBody>(body) {
        Ok(parsed) => IdentityError::Api {
            status_code: parsed.status_code.unwrap_or(http_status),
            error_type: parsed.error_type.unwrap_or_else(|| "unknown_error".into()),
            error_message: parsed
                .error_message
                .unwrap_or_else(|| format!("request failed with status {http_status}")),
        },
        Err(_) => IdentityError::Api {
            status_code: http_status,
            error_type: "unknown_error".into(),
            error_message: format!("request failed with status {http_status}"),
        },
    }
}

/// URL that starts a discovery OAuth flow in the browser.
pub fn oauth_discovery_start_url(
    base_url: &str,
    provider: &str,
    public_token: &str,
    discovery_redirect_url: &str,
) -> String {
    format!(
        "{base}/v1/b2b/public/oauth/{provider}/discovery/start?public_token={token}&discovery_redirect_url={redirect}",
        base = base_url.trim_end_matches('/'),
        provider = urlencoding(provider),
        token = urlencoding(public_token),
        redirect = urlencoding(discovery_redirect_url),
    )
}

fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[async_trait]
impl IdentityProvider for StytchClient {
    async fn authenticate_discovery_magic_link(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError> {
        self.post(
            "magic_links/discovery/authenticate",
            &json!({ "discovery_magic_links_token": token }),
        )
        .await
    }

    async fn authenticate_discovery_oauth(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError> {
        self.post(
            "oauth/discovery/authenticate",
            &json!({ "discovery_oauth_token": token }),
        )
        .await
    }

    async fn exchange_intermediate_session(
        &self,
        intermediate_session_token: &str,
        organization_id: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.post(
            "discovery/intermediate_sessions/exchange",
            &json!({
                "intermediate_session_token": intermediate_session_token,
                "organization_id": organization_id,
                "session_duration_minutes": self.session_duration_minutes,
            }),
        )
        .await
    }

    async fn create_organization_via_discovery(
        &self,
        intermediate_session_token: &str,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.post(
            "discovery/organizations/create",
            &json!({
                "intermediate_session_token": intermediate_session_token,
                "organization_name": organization_name,
                "organization_slug": organization_slug,
                "session_duration_minutes": self.session_duration_minutes,
            }),
        )
        .await
    }

    async fn authenticate_password(
        &self,
        organization: &str,
        email: &str,
        password: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.post(
            "passwords/authenticate",
            &json!({
                "organization_id": organization,
                "email_address": email,
                "password": password,
                "session_duration_minutes": self.session_duration_minutes,
            }),
        )
        .await
    }

    async fn create_organization(
        &self,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<Organization, IdentityError> {
        let envelope: OrganizationEnvelope = self
            .post(
                "organizations",
                &json!({
                    "organization_name": organization_name,
                    "organization_slug": organization_slug,
                }),
            )
            .await?;
        Ok(envelope.organization)
    }

    async fn migrate_password(
        &self,
        migration: &PasswordMigration,
    ) -> Result<Member, IdentityError> {
        let body = PasswordMigrateBody {
            email_address: &migration.email_address,
            hash: &migration.hash,
            hash_type: "bcrypt",
            organization_id: &migration.organization_id,
            name: &migration.name,
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| IdentityError::Decode(format!("password migrate body: {e}")))?;
        let envelope: MemberEnvelope = self.post("passwords/migrate", &body).await?;
        Ok(envelope.member)
    }

    async fn authenticate_session(
        &self,
        credential: SessionCredential<'_>,
    ) -> Result<MemberSession, IdentityError> {
        let body = match credential {
            SessionCredential::Token(token) => json!({ "session_token": token }),
            SessionCredential::Jwt(jwt) => json!({ "session_jwt": jwt }),
        };
        self.post("sessions/authenticate", &body).await
    }

    async fn revoke_session(&self, session_token: &str) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .post("sessions/revoke", &json!({ "session_token": session_token }))
            .await?;
        Ok(())
    }

    async fn send_discovery_magic_link(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .post(
                "magic_links/email/discovery/send",
                &json!({
                    "email_address": email,
                    "discovery_redirect_url": redirect_url,
                }),
            )
            .await?;
        Ok(())
    }
}
