use async_trait::async_trait;

use super::types::{
    DiscoveryAuthentication, Member, MemberSession, Organization, PasswordMigration,
    SessionCredential,
};

/// Failure talking to the identity provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    /// The provider answered with an error payload.
    #[error("{error_message}")]
    Api {
        status_code: u16,
        error_type: String,
        error_message: String,
    },

    #[error("Identity provider unreachable: {0}")]
    Transport(String),

    #[error("Unexpected identity provider response: {0}")]
    Decode(String),
}

impl IdentityError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IdentityError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        match self {
            IdentityError::Api { error_type, .. } => Some(error_type),
            _ => None,
        }
    }
}

/// Operations the sign-in flow needs from the B2B identity provider.
///
/// Constructed once at start-up and handed around as `Arc<dyn IdentityProvider>`
/// so that tests can swap in a scripted double.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a discovery magic-link token for the caller's verified email
    /// and the organizations it belongs to.
    async fn authenticate_discovery_magic_link(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError>;

    /// Same as above for a discovery OAuth token.
    async fn authenticate_discovery_oauth(
        &self,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError>;

    /// Trade an intermediate session for a full session in `organization_id`.
    async fn exchange_intermediate_session(
        &self,
        intermediate_session_token: &str,
        organization_id: &str,
    ) -> Result<MemberSession, IdentityError>;

    /// Create a new organization from an intermediate session; the caller
    /// becomes its first member.
    async fn create_organization_via_discovery(
        &self,
        intermediate_session_token: &str,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<MemberSession, IdentityError>;

    /// Password sign-in. `organization` may be an organization id or slug.
    async fn authenticate_password(
        &self,
        organization: &str,
        email: &str,
        password: &str,
    ) -> Result<MemberSession, IdentityError>;

    async fn create_organization(
        &self,
        organization_name: &str,
        organization_slug: &str,
    ) -> Result<Organization, IdentityError>;

    /// Import a password hash, creating the member if needed.
    async fn migrate_password(&self, migration: &PasswordMigration)
        -> Result<Member, IdentityError>;

    async fn authenticate_session(
        &self,
        credential: SessionCredential<'_>,
    ) -> Result<MemberSession, IdentityError>;

    async fn revoke_session(&self, session_token: &str) -> Result<(), IdentityError>;

    async fn send_discovery_magic_link(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), IdentityError>;
}
