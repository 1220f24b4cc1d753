//! Scripted doubles for the identity provider and the legacy backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::identity::types::DiscoveredMembership;
use crate::identity::{
    DiscoveredOrganization, DiscoveryAuthentication, IdentityError, IdentityProvider, Member,
    MemberSession, Organization, PasswordMigration, SessionCredential, TrustedMetadata,
};
use crate::legacy::{EnterpriseOrganization, LegacyBackend, LegacyCredential, SyncRequest};
use crate::session::CredentialSync;

pub const EMAIL: &str = "jane.doe@example.com";

pub fn api_error(status_code: u16, error_type: &str) -> IdentityError {
    IdentityError::Api {
        status_code,
        error_type: error_type.to_string(),
        error_message: format!("{error_type} error"),
    }
}

pub fn organization(organization_id: &str) -> Organization {
    Organization {
        organization_id: organization_id.to_string(),
        organization_name: format!("{organization_id} name"),
        organization_slug: format!("{organization_id}-slug"),
    }
}

pub fn member(member_id: &str, organization_id: &str) -> Member {
    Member {
        member_id: member_id.to_string(),
        email_address: EMAIL.to_string(),
        name: "Jane Doe".to_string(),
        organization_id: organization_id.to_string(),
        trusted_metadata: TrustedMetadata::default(),
    }
}

pub fn session_for(member_id: &str, organization_id: &str) -> MemberSession {
    MemberSession {
        member: member(member_id, organization_id),
        organization: organization(organization_id),
        session_token: format!("session-token-{member_id}"),
        session_jwt: format!("session-jwt-{member_id}"),
        member_session: None,
    }
}

/// Discovery result with intermediate token `ist-123` and `full_name` "Jane Doe".
pub fn discovery(email: &str, organization_ids: &[&str]) -> DiscoveryAuthentication {
    DiscoveryAuthentication {
        intermediate_session_token: Some("ist-123".to_string()),
        email_address: email.to_string(),
        full_name: Some("Jane Doe".to_string()),
        discovered_organizations: organization_ids
            .iter()
            .map(|id| DiscoveredOrganization {
                organization: organization(id),
                membership: Some(DiscoveredMembership {
                    kind: "active_member".to_string(),
                }),
            })
            .collect(),
    }
}

/// Identity provider double. Every call is logged as
/// `"<operation>:<arg>:<arg>..."`; results come from the builder, or succeed.
pub struct FakeIdentity {
    calls: Mutex<Vec<String>>,
    delay: Duration,
    magic_link: Result<DiscoveryAuthentication, IdentityError>,
    oauth: Result<DiscoveryAuthentication, IdentityError>,
    passwords: Mutex<VecDeque<Result<MemberSession, IdentityError>>>,
    create_organization: Result<Organization, IdentityError>,
    migrate: Result<Member, IdentityError>,
    session: Result<MemberSession, IdentityError>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            magic_link: Err(api_error(404, "magic_link_not_found")),
            oauth: Err(api_error(404, "oauth_token_not_found")),
            passwords: Mutex::new(VecDeque::new()),
            create_organization: Ok(organization("organization-new")),
            migrate: Ok(member("member-1", "organization-new")),
            session: Err(api_error(404, "session_not_found")),
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn with_magic_link(mut self, result: Result<DiscoveryAuthentication, IdentityError>) -> Self {
        self.magic_link = result;
        self
    }

    pub fn with_oauth(mut self, result: Result<DiscoveryAuthentication, IdentityError>) -> Self {
        self.oauth = result;
        self
    }

    /// Results of successive `authenticate_password` calls; once exhausted,
    /// calls succeed.
    pub fn with_passwords(self, results: Vec<Result<MemberSession, IdentityError>>) -> Self {
        *self.passwords.lock().unwrap() = results.into();
        self
    }

    pub fn with_create_organization(mut self, result: Result<Organization, IdentityError>) -> Self {
        self.create_organization = result;
        self
    }

    pub fn with_migrate(mut self, result: Result<Member, IdentityError>) -> Self {
        self.migrate = result;
        self
    }

    pub fn with_session(mut self, result: Result<MemberSession, IdentityError>) -> Self {
        self.session = result;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation}:");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    async fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn authenticate_discovery_magic_link(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError> {
        self.record(format!("authenticate_discovery_magic_link:{token}")).await;
        self.magic_link.clone()
    }

    async fn authenticate_discovery_oauth(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError> {
        self.record(format!("authenticate_discovery_oauth:{token}")).await;
        self.oauth.clone()
    }

    async fn exchange_intermediate_session(
        &self,
        intermediate_session_token: &str,
        organization_id: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.record(format!(
            "exchange_intermediate_session:{intermediate_session_token}:{organization_id}"
        ))
        .await;
        Ok(session_for("member-1", organization_id))
    }

    async fn create_organization_via_discovery(
        &self,
        intermediate_session_token: &str,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.record(format!(
            "create_organization_via_discovery:{intermediate_session_token}:{organization_name}:{organization_slug}"
        ))
        .await;
        let mut session = session_for("member-1", "organization-new");
        session.organization.organization_name = organization_name.to_string();
        session.organization.organization_slug = organization_slug.to_string();
        Ok(session)
    }

    async fn authenticate_password(
        &self,
        organization: &str,
        email: &str,
        _password: &str,
    ) -> Result<MemberSession, IdentityError> {
        self.record(format!("authenticate_password:{organization}:{email}"))
            .await;
        let scripted = self.passwords.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(session_for("member-1", organization)))
    }

    async fn create_organization(
        &self,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<Organization, IdentityError> {
        self.record(format!(
            "create_organization:{organization_name}:{organization_slug}"
        ))
        .await;
        self.create_organization.clone()
    }

    async fn migrate_password(
        &self,
        migration: &PasswordMigration,
    ) -> Result<Member, IdentityError> {
        self.record(format!(
            "migrate_password:{}:{}:{}",
            migration.email_address, migration.organization_id, migration.name
        ))
        .await;
        self.migrate.clone()
    }

    async fn authenticate_session(
        &self,
        credential: SessionCredential<'_>,
    ) -> Result<MemberSession, IdentityError> {
        let call = match credential {
            SessionCredential::Token(t) => format!("authenticate_session:token:{t}"),
            SessionCredential::Jwt(j) => format!("authenticate_session:jwt:{j}"),
        };
        self.record(call).await;
        self.session.clone()
    }

    async fn revoke_session(&self, session_token: &str) -> Result<(), IdentityError> {
        self.record(format!("revoke_session:{session_token}")).await;
        Ok(())
    }

    async fn send_discovery_magic_link(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), IdentityError> {
        self.record(format!("send_discovery_magic_link:{email}:{redirect_url}"))
            .await;
        Ok(())
    }
}

/// Legacy backend double that issues a fresh account on every sync call,
/// the way a non-idempotent backend would.
pub struct FakeLegacy {
    issued: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    stable_account: bool,
    failure: Mutex<Option<(u16, String)>>,
    enterprises: HashMap<String, EnterpriseOrganization>,
}

impl FakeLegacy {
    pub fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            stable_account: false,
            failure: Mutex::new(None),
            enterprises: HashMap::new(),
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Always answer with `user_1`, rotating only the API key.
    pub fn with_stable_account(mut self) -> Self {
        self.stable_account = true;
        self
    }

    pub fn failing(self, status: u16, message: &str) -> Self {
        self.start_failing(status, message);
        self
    }

    pub fn start_failing(&self, status: u16, message: &str) {
        *self.failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn with_enterprise(mut self, email: &str, organization_id: &str) -> Self {
        self.enterprises.insert(
            email.to_lowercase(),
            EnterpriseOrganization {
                organization_id: organization_id.to_string(),
                organization_name: Some("Acme Corp".to_string()),
            },
        );
        self
    }

    pub fn sync_calls(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Most sync calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> Option<AuthError> {
        self.failure
            .lock()
            .unwrap()
            .clone()
            .map(|(status, message)| AuthError::Upstream { status, message })
    }
}

#[async_trait]
impl LegacyBackend for FakeLegacy {
    async fn sync_member(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let user = if self.stable_account { 1 } else { n };
        Ok(LegacyCredential {
            user_id: format!("user_{user}"),
            api_key: format!("vrin_key_{n}"),
            email: request.email.clone(),
            name: request.name.clone(),
            is_new_user: true,
            migrated: false,
            is_enterprise: None,
            organization_id: None,
            role: None,
        })
    }

    async fn enterprise_organization(
        &self,
        email: &str,
    ) -> Result<Option<EnterpriseOrganization>, AuthError> {
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        Ok(self.enterprises.get(&email.to_lowercase()).cloned())
    }
}

/// `CredentialSync` double for client-side tests.
pub struct FakeSync {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeSync {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSync for FakeSync {
    async fn sync(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(AuthError::Upstream {
                status: 502,
                message: "bridge down".to_string(),
            });
        }
        Ok(LegacyCredential {
            user_id: format!("user_{n}"),
            api_key: format!("vrin_key_{n}"),
            email: request.email.clone(),
            name: request.name.clone(),
            is_new_user: n == 1,
            migrated: false,
            is_enterprise: None,
            organization_id: None,
            role: None,
        })
    }
}
