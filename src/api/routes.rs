//! API route handlers for vrin-auth.
//!
//! All handlers receive `SharedState` via Axum state extraction and return
//! `Result<_, AuthError>`, so every failure renders as
//! `{"success": false, "error": ...}`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::cookies::{self, CookieSettings};
use super::extract::JsonBody;
use crate::auth::password::{self, PasswordRequest, PasswordSuccess};
use crate::error::AuthError;
use crate::identity::{stytch, MemberSession, SessionCredential, VerifiedSession};
use crate::legacy::{LegacyCredential, SyncRequest};
use crate::session::controller::SUCCESS_REDIRECT_DELAY;
use crate::session::storage::CREDENTIAL_KEYS;
use crate::session::{
    AuthenticateController, CallbackParams, CredentialSync, Loadable, MemoryStorage, PageState,
    SessionReconciler,
};
use crate::SharedState;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Password sign-in ─────────────────────────────────────────────
        .route("/auth/password", post(password_sign_in))
        .route("/auth/enterprise/password", post(enterprise_password_sign_in))
        // ── Legacy Credential Bridge ─────────────────────────────────────
        .route("/auth/stytch-sync", post(stytch_sync))
        // ── Discovery flow ───────────────────────────────────────────────
        .route("/auth/magic-link", post(magic_link_send))
        .route("/auth/oauth/{provider}/start", get(oauth_start))
        .route("/auth/authenticate", get(authenticate_callback))
        // ── Session ──────────────────────────────────────────────────────
        .route("/auth/session", get(session_info))
        .route("/auth/logout", post(logout))
        .with_state(state)
}

/// `{"success": true, ...fields}`.
#[derive(Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "vrin-auth",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Password sign-in
// =============================================================================

/// POST /api/auth/password: authenticate, else sign up, then set cookies.
async fn password_sign_in(
    State(state): State<SharedState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<PasswordRequest>,
) -> Result<(CookieJar, Json<Success<PasswordSuccess>>), AuthError> {
    let signed_in = password::sign_in(state.identity.as_ref(), &body).await?;
    Ok(with_cookies(&state, jar, signed_in))
}

/// POST /api/auth/enterprise/password: same contract, organization from the
/// legacy backend.
async fn enterprise_password_sign_in(
    State(state): State<SharedState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<PasswordRequest>,
) -> Result<(CookieJar, Json<Success<PasswordSuccess>>), AuthError> {
    let signed_in =
        password::sign_in_enterprise(state.identity.as_ref(), state.legacy.as_ref(), &body).await?;
    Ok(with_cookies(&state, jar, signed_in))
}

fn with_cookies(
    state: &SharedState,
    jar: CookieJar,
    signed_in: PasswordSuccess,
) -> (CookieJar, Json<Success<PasswordSuccess>>) {
    let tokens = crate::identity::SessionTokens {
        session_token: signed_in.session_token.clone(),
        session_jwt: signed_in.session_jwt.clone(),
    };
    let jar = cookies::set_session(jar, &tokens, CookieSettings::from_config(&state.config));
    (jar, success(signed_in))
}

// =============================================================================
// Legacy Credential Bridge
// =============================================================================

/// POST /api/auth/stytch-sync: find-or-create the legacy account for a member.
async fn stytch_sync(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<SyncRequest>,
) -> Result<Json<Success<LegacyCredential>>, AuthError> {
    let credential = state.bridge.sync(&body).await?;
    Ok(success(credential))
}

// =============================================================================
// Discovery flow
// =============================================================================

#[derive(Deserialize)]
struct MagicLinkRequest {
    #[serde(default)]
    email: String,
}

/// POST /api/auth/magic-link: email a discovery magic link.
async fn magic_link_send(
    State(state): State<SharedState>,
    JsonBody(body): JsonBody<MagicLinkRequest>,
) -> Result<Json<Value>, AuthError> {
    let email = body.email.trim();
    if email.is_empty() {
        return Err(AuthError::BadRequest("email is required".into()));
    }
    state
        .identity
        .send_discovery_magic_link(email, &state.config.authenticate_url())
        .await?;
    tracing::info!(%email, "discovery magic link sent");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/auth/oauth/{provider}/start: redirect into the provider's
/// discovery OAuth flow.
async fn oauth_start(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AuthError> {
    let public_token = state
        .config
        .stytch_public_token
        .as_deref()
        .ok_or_else(|| AuthError::BadRequest("STYTCH_PUBLIC_TOKEN is not configured".into()))?;

    let url = stytch::oauth_discovery_start_url(
        &state.config.stytch_base_url(),
        &provider,
        public_token,
        &state.config.authenticate_url(),
    );
    tracing::debug!(%provider, "starting discovery OAuth");
    Ok(Redirect::temporary(&url))
}

#[derive(Serialize)]
struct CallbackResponse {
    success: bool,
    state: PageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_after_ms: Option<u64>,
    /// Key/value pairs the browser mirrors into local storage.
    storage: std::collections::BTreeMap<String, String>,
}

/// GET /api/auth/authenticate: the discovery callback, run server-side.
async fn authenticate_callback(
    State(state): State<SharedState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AuthError> {
    let cookie_settings = CookieSettings::from_config(&state.config);
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        if !state.consumed_tokens.consume(token).await {
            tracing::warn!("authenticate: callback token replayed");
            let page = PageState::Error {
                message: "This sign-in link has already been used".into(),
            };
            return Ok(callback_response(jar, page, None, cookie_settings, Default::default()));
        }
    }

    let existing = match cookies::session_token(&jar) {
        Some(token) => state
            .identity
            .authenticate_session(SessionCredential::Token(&token))
            .await
            .map_err(|e| tracing::debug!("authenticate: existing session rejected: {e}"))
            .ok(),
        None => None,
    };

    let storage = Arc::new(MemoryStorage::new());
    let bridge: Arc<dyn CredentialSync> = state.bridge.clone();
    let reconciler = Arc::new(SessionReconciler::new(bridge, storage.clone()));
    let controller = AuthenticateController::new(
        state.identity.clone(),
        reconciler,
        state.config.default_redirect.clone(),
    );

    let completion = controller
        .run(&params, Loadable::Ready(existing))
        .await
        .ok_or_else(|| AuthError::Internal("authenticate controller did not run".into()))?;

    Ok(callback_response(
        jar,
        completion.state,
        completion.session.as_ref(),
        cookie_settings,
        storage.snapshot(),
    ))
}

fn callback_response(
    jar: CookieJar,
    page: PageState,
    session: Option<&MemberSession>,
    cookie_settings: CookieSettings,
    storage: std::collections::BTreeMap<String, String>,
) -> Response {
    let (status, redirect_to, redirect_after_ms) = match &page {
        PageState::Success { redirect_to } => (
            StatusCode::OK,
            Some(redirect_to.clone()),
            Some(SUCCESS_REDIRECT_DELAY.as_millis() as u64),
        ),
        _ => (StatusCode::UNAUTHORIZED, None, None),
    };

    let jar = match (status, session) {
        (StatusCode::OK, Some(session)) => {
            cookies::set_session(jar, &session.tokens(), cookie_settings)
        }
        _ => jar,
    };

    let body = CallbackResponse {
        success: status == StatusCode::OK,
        state: page,
        redirect_to,
        redirect_after_ms,
        storage,
    };
    (status, jar, Json(body)).into_response()
}

// =============================================================================
// Session
// =============================================================================

/// Body of `GET /api/auth/session`. Both lookup paths produce the same keys;
/// fields only the remote path knows are `null` after a local JWT check.
#[derive(Debug, Serialize)]
struct SessionInfo {
    member: SessionMember,
    organization: SessionOrganization,
    session: SessionWindow,
}

#[derive(Debug, Serialize)]
struct SessionMember {
    member_id: String,
    email_address: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionOrganization {
    organization_id: String,
    organization_slug: Option<String>,
    organization_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionWindow {
    member_session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<VerifiedSession> for SessionInfo {
    fn from(verified: VerifiedSession) -> Self {
        Self {
            member: SessionMember {
                member_id: verified.member_id,
                email_address: None,
                name: None,
            },
            organization: SessionOrganization {
                organization_id: verified.organization_id,
                organization_slug: verified.organization_slug,
                organization_name: None,
            },
            session: SessionWindow {
                member_session_id: Some(verified.member_session_id),
                started_at: verified.started_at,
                expires_at: verified.expires_at,
            },
        }
    }
}

impl From<MemberSession> for SessionInfo {
    fn from(session: MemberSession) -> Self {
        let window = session.member_session;
        Self {
            member: SessionMember {
                member_id: session.member.member_id,
                email_address: Some(session.member.email_address),
                name: Some(session.member.name).filter(|n| !n.is_empty()),
            },
            organization: SessionOrganization {
                organization_id: session.organization.organization_id,
                organization_slug: Some(session.organization.organization_slug),
                organization_name: Some(session.organization.organization_name),
            },
            session: SessionWindow {
                member_session_id: window.as_ref().map(|w| w.member_session_id.clone()),
                started_at: None,
                expires_at: window.and_then(|w| w.expires_at),
            },
        }
    }
}

/// GET /api/auth/session: who is signed in, from the session cookies.
async fn session_info(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<Json<Success<SessionInfo>>, AuthError> {
    if let (Some(jwks), Some(jwt)) = (&state.jwks, cookies::session_jwt(&jar)) {
        match jwks.verify(&jwt).await {
            Ok(verified) => return Ok(success(verified.into())),
            Err(e) => tracing::debug!("session JWT not verified locally: {e}"),
        }
    }

    let token = cookies::session_token(&jar);
    let jwt = cookies::session_jwt(&jar);
    let credential = match (&token, &jwt) {
        (Some(token), _) => SessionCredential::Token(token),
        (None, Some(jwt)) => SessionCredential::Jwt(jwt),
        (None, None) => return Err(AuthError::Unauthorized),
    };

    let session = state
        .identity
        .authenticate_session(credential)
        .await
        .map_err(|e| {
            tracing::debug!("session rejected by identity provider: {e}");
            AuthError::Unauthorized
        })?;

    Ok(success(session.into()))
}

/// POST /api/auth/logout: revoke the session and expire its cookies.
async fn logout(State(state): State<SharedState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(token) = cookies::session_token(&jar) {
        if let Err(e) = state.identity.revoke_session(&token).await {
            tracing::warn!("logout: session revoke failed: {e}");
        }
    }
    let jar = cookies::clear_session(jar);
    (
        jar,
        Json(json!({
            "success": true,
            "clear_storage": CREDENTIAL_KEYS,
        })),
    )
}
