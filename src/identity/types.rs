//! Typed shapes of the Stytch B2B responses this service consumes.
//!
//! Only the fields the sign-in flow reads are modelled; everything else in
//! the provider's payloads is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Fixed cookie name carrying the opaque session token.
pub const SESSION_COOKIE: &str = "stytch_session";
/// Fixed cookie name carrying the session JWT.
pub const SESSION_JWT_COOKIE: &str = "stytch_session_jwt";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// A person inside one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub email_address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub organization_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trusted_metadata: TrustedMetadata,
}

/// Tenant boundary ("workspace").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub organization_id: String,
    pub organization_name: String,
    pub organization_slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredMembership {
    /// e.g. `active_member`, `pending_member`, `eligible_to_join_by_email_domain`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredOrganization {
    pub organization: Organization,
    #[serde(default)]
    pub membership: Option<DiscoveredMembership>,
}

/// Result of a discovery magic-link or discovery OAuth token exchange: the
/// email is verified but no organization has been chosen yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryAuthentication {
    #[serde(default)]
    pub intermediate_session_token: Option<String>,
    pub email_address: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub discovered_organizations: Vec<DiscoveredOrganization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSessionInfo {
    pub member_session_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A full, organization-scoped session. Returned by every call that mints
/// one: intermediate-session exchange, discovery organization create,
/// password authenticate and session authenticate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSession {
    pub member: Member,
    pub organization: Organization,
    pub session_token: String,
    pub session_jwt: String,
    #[serde(default)]
    pub member_session: Option<MemberSessionInfo>,
}

impl MemberSession {
    pub fn tokens(&self) -> SessionTokens {
        SessionTokens {
            session_token: self.session_token.clone(),
            session_jwt: self.session_jwt.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub session_token: String,
    pub session_jwt: String,
}

/// Input for moving an externally produced password hash into the provider.
#[derive(Debug, Clone)]
pub struct PasswordMigration {
    pub email_address: String,
    pub organization_id: String,
    pub name: String,
    /// bcrypt hash (`$2b$10$...`).
    pub hash: String,
}

/// Which credential identifies an existing session.
#[derive(Debug, Clone, Copy)]
pub enum SessionCredential<'a> {
    Token(&'a str),
    Jwt(&'a str),
}

/// Stytch sends `null` for several fields that are semantically "empty".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
