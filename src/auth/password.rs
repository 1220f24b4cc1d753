//! Password sign-in: authenticate first, fall back to signup.
//!
//! A returning user is found by the organization slug derived from their
//! email (individual) or by the enterprise organization the legacy backend
//! maps the email to (enterprise). Only a "not found" answer from the
//! identity provider leads to signup; a wrong password or a passwordless
//! account never creates anything.

use serde::{Deserialize, Serialize};

use super::slug;
use crate::error::AuthError;
use crate::identity::{IdentityError, IdentityProvider, MemberSession, PasswordMigration};
use crate::legacy::LegacyBackend;

const BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl PasswordRequest {
    fn validate(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() {
            return Err(AuthError::BadRequest("email is required".into()));
        }
        if self.password.is_empty() {
            return Err(AuthError::BadRequest("password is required".into()));
        }
        Ok(())
    }

    fn email(&self) -> &str {
        self.email.trim()
    }

    /// `"First Last"`, or the email local part when neither is given.
    fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            slug::default_name(self.email())
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswordSuccess {
    pub member_id: String,
    pub email: String,
    pub name: String,
    pub organization_id: String,
    pub session_token: String,
    pub session_jwt: String,
    pub is_new_user: bool,
}

impl PasswordSuccess {
    fn from_session(session: MemberSession, is_new_user: bool) -> Self {
        Self {
            member_id: session.member.member_id,
            email: session.member.email_address,
            name: session.member.name,
            organization_id: session.organization.organization_id,
            session_token: session.session_token,
            session_jwt: session.session_jwt,
            is_new_user,
        }
    }
}

/// What a failed password authenticate means for the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    WrongPassword,
    PasswordNotSet,
    /// No such organization or member: sign the user up.
    NotFound,
    Other,
}

pub fn classify_failure(err: &IdentityError) -> FailureKind {
    let error_type = err.error_type().unwrap_or_default();
    let status = err.status_code();

    if error_type == "unauthorized_credentials" {
        FailureKind::WrongPassword
    } else if error_type == "password_not_set" {
        FailureKind::PasswordNotSet
    } else if status == Some(401) {
        FailureKind::WrongPassword
    } else if error_type.contains("not_found")
        || error_type.contains("no_password")
        || status == Some(404)
    {
        FailureKind::NotFound
    } else {
        FailureKind::Other
    }
}

/// Where the signup branch puts the new member.
enum SignupTarget {
    /// Create an organization with this slug first.
    NewOrganization { org_slug: String },
    /// Enterprise: the organization already exists.
    Existing { organization_id: String },
}

/// `POST /api/auth/password`.
pub async fn sign_in(
    identity: &dyn IdentityProvider,
    request: &PasswordRequest,
) -> Result<PasswordSuccess, AuthError> {
    request.validate()?;
    let org_slug = slug::org_slug(request.email());
    authenticate_or_signup(
        identity,
        request,
        &org_slug,
        SignupTarget::NewOrganization {
            org_slug: org_slug.clone(),
        },
    )
    .await
}

/// `POST /api/auth/enterprise/password`.
pub async fn sign_in_enterprise(
    identity: &dyn IdentityProvider,
    legacy: &dyn LegacyBackend,
    request: &PasswordRequest,
) -> Result<PasswordSuccess, AuthError> {
    request.validate()?;
    let organization = legacy
        .enterprise_organization(request.email())
        .await?
        .ok_or_else(|| AuthError::NotFound("No enterprise organization found for this email".into()))?;

    tracing::debug!(
        email = %request.email(),
        organization_id = %organization.organization_id,
        "password: enterprise organization resolved"
    );
    authenticate_or_signup(
        identity,
        request,
        &organization.organization_id,
        SignupTarget::Existing {
            organization_id: organization.organization_id.clone(),
        },
    )
    .await
}

async fn authenticate_or_signup(
    identity: &dyn IdentityProvider,
    request: &PasswordRequest,
    organization: &str,
    target: SignupTarget,
) -> Result<PasswordSuccess, AuthError> {
    let email = request.email();
    let err = match identity
        .authenticate_password(organization, email, &request.password)
        .await
    {
        Ok(session) => {
            tracing::info!(member_id = %session.member.member_id, "password: signed in");
            return Ok(PasswordSuccess::from_session(session, false));
        }
        Err(e) => e,
    };

    match classify_failure(&err) {
        FailureKind::WrongPassword => Err(AuthError::IncorrectPassword),
        FailureKind::PasswordNotSet => Err(AuthError::PasswordNotSet),
        FailureKind::Other => Err(AuthError::Identity(err)),
        FailureKind::NotFound => {
            tracing::info!(%email, %organization, "password: no account, signing up");
            signup(identity, request, target).await
        }
    }
}

async fn signup(
    identity: &dyn IdentityProvider,
    request: &PasswordRequest,
    target: SignupTarget,
) -> Result<PasswordSuccess, AuthError> {
    let email = request.email();
    let full_name = request.full_name();

    let organization_id = match target {
        SignupTarget::Existing { organization_id } => organization_id,
        SignupTarget::NewOrganization { org_slug } => identity
            .create_organization(&slug::workspace_name(&full_name), &org_slug)
            .await
            .map_err(|e| {
                if e.error_type().is_some_and(|t| t.contains("slug_already_exists")) {
                    AuthError::Conflict(
                        "An account may exist under a different sign-in method".into(),
                    )
                } else {
                    AuthError::Identity(e)
                }
            })?
            .organization_id,
    };

    let hash = hash_password(&request.password).await?;
    identity
        .migrate_password(&PasswordMigration {
            email_address: email.to_string(),
            organization_id: organization_id.clone(),
            name: full_name,
            hash,
        })
        .await?;

    let session = identity
        .authenticate_password(&organization_id, email, &request.password)
        .await?;
    tracing::info!(
        member_id = %session.member.member_id,
        %organization_id,
        "password: signed up"
    );
    Ok(PasswordSuccess::from_session(session, true))
}

async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| AuthError::Crypto(format!("bcrypt: {e}")))
}
