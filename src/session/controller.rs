//! Authenticate Page Controller: the discovery callback state machine.
//!
//! ```text
//! Loading ──► exchange token ──► pick / create organization ──► reconcile ──► Success
//!    │               │                      │                        │
//!    └───────────────┴──────────────────────┴────────────────────────┴──────► Error
//! ```
//!
//! Both terminal states are final; a controller runs at most once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::reconcile::SessionReconciler;
use super::storage::{self, CachedAuthBundle};
use crate::auth::slug;
use crate::identity::{DiscoveryAuthentication, IdentityError, IdentityProvider, MemberSession};

/// How long the success page stays up before redirecting.
pub const SUCCESS_REDIRECT_DELAY: Duration = Duration::from_secs(1);

/// Class of the callback token, from the `stytch_token_type` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Discovery,
    OAuth,
    Unknown,
}

/// One way of trading a callback token for a discovery result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStrategy {
    MagicLink,
    OAuth,
}

impl TokenType {
    pub fn classify(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("discovery") | Some("multi_tenant_magic_links") => TokenType::Discovery,
            Some("oauth") | Some("discovery_oauth") => TokenType::OAuth,
            _ => TokenType::Unknown,
        }
    }

    /// Strategies to try, in order, for this class of token.
    pub fn strategies(self) -> &'static [ExchangeStrategy] {
        match self {
            TokenType::Discovery => &[ExchangeStrategy::MagicLink],
            TokenType::OAuth => &[ExchangeStrategy::OAuth],
            TokenType::Unknown => &[ExchangeStrategy::OAuth, ExchangeStrategy::MagicLink],
        }
    }
}

impl ExchangeStrategy {
    async fn exchange(
        self,
        identity: &dyn IdentityProvider,
        token: &str,
    ) -> Result<DiscoveryAuthentication, IdentityError> {
        match self {
            ExchangeStrategy::MagicLink => identity.authenticate_discovery_magic_link(token).await,
            ExchangeStrategy::OAuth => identity.authenticate_discovery_oauth(token).await,
        }
    }
}

/// A value the identity SDK may not have produced yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Loading,
    Ready(T),
}

/// Query parameters of the `/authenticate` landing page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "stytch_token_type")]
    pub token_type: Option<String>,
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageState {
    Loading,
    Success { redirect_to: String },
    Error { message: String },
}

/// Accept `return_to` only when it is a path on this origin.
pub fn safe_redirect(return_to: Option<&str>, default: &str) -> String {
    match return_to.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => default.to_string(),
    }
}

/// Terminal result of one controller run.
#[derive(Debug, Clone)]
pub struct Completion {
    pub state: PageState,
    /// Session minted (or found) during the run.
    pub session: Option<MemberSession>,
    pub bundle: Option<CachedAuthBundle>,
}

#[derive(Debug, thiserror::Error)]
enum FlowError {
    #[error("No authentication token found")]
    NoToken,

    #[error("Authentication incomplete")]
    Incomplete,

    #[error("Failed to complete sign-in")]
    SignInFailed,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub struct AuthenticateController {
    identity: Arc<dyn IdentityProvider>,
    reconciler: Arc<SessionReconciler>,
    default_redirect: String,
    started: AtomicBool,
    state: Mutex<PageState>,
}

impl AuthenticateController {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        reconciler: Arc<SessionReconciler>,
        default_redirect: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            reconciler,
            default_redirect: default_redirect.into(),
            started: AtomicBool::new(false),
            state: Mutex::new(PageState::Loading),
        }
    }

    pub fn state(&self) -> PageState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drive the page to a terminal state.
    ///
    /// Returns `None` without side effects while the identity session is
    /// still loading, and for every call after the first one that got past
    /// that point.
    pub async fn run(
        &self,
        params: &CallbackParams,
        existing: Loadable<Option<MemberSession>>,
    ) -> Option<Completion> {
        let existing = match existing {
            Loadable::Loading => return None,
            Loadable::Ready(session) => session,
        };
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("authenticate: already running, ignoring second trigger");
            return None;
        }

        let completion = match self.drive(params, existing).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!("authenticate: {e}");
                Completion {
                    state: PageState::Error {
                        message: e.to_string(),
                    },
                    session: None,
                    bundle: None,
                }
            }
        };

        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = completion.state.clone();
        Some(completion)
    }

    async fn drive(
        &self,
        params: &CallbackParams,
        existing: Option<MemberSession>,
    ) -> Result<Completion, FlowError> {
        if let Some(session) = &existing {
            if storage::cached_api_key(self.reconciler.storage()).is_some() {
                tracing::debug!(member_id = %session.member.member_id, "authenticate: already signed in");
                return Ok(Completion {
                    state: self.success(params),
                    session: Some(session.clone()),
                    bundle: storage::read_bundle(self.reconciler.storage()),
                });
            }
        }

        let token = params.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let Some(token) = token else {
            return match existing {
                Some(session) => self.finish(params, session).await,
                None => Err(FlowError::NoToken),
            };
        };

        let kind = TokenType::classify(params.token_type.as_deref());
        let discovery = self.exchange(token, kind).await?;

        let intermediate = discovery
            .intermediate_session_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(FlowError::Incomplete)?;
        let email = discovery.email_address.as_str();
        let full_name = discovery
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| slug::default_name(email));

        let session = match discovery.discovered_organizations.first() {
            None => {
                let org_slug = slug::org_slug(email);
                tracing::info!(%email, %org_slug, "authenticate: no organizations, creating one");
                self.identity
                    .create_organization_via_discovery(
                        intermediate,
                        &slug::workspace_name(&full_name),
                        &org_slug,
                    )
                    .await?
            }
            Some(first) => {
                let organization_id = &first.organization.organization_id;
                tracing::info!(
                    %email,
                    %organization_id,
                    discovered = discovery.discovered_organizations.len(),
                    "authenticate: selecting first organization"
                );
                self.identity
                    .exchange_intermediate_session(intermediate, organization_id)
                    .await?
            }
        };

        self.finish(params, session).await
    }

    async fn exchange(
        &self,
        token: &str,
        kind: TokenType,
    ) -> Result<DiscoveryAuthentication, FlowError> {
        let mut last_error = None;
        for strategy in kind.strategies() {
            match strategy.exchange(self.identity.as_ref(), token).await {
                Ok(discovery) => return Ok(discovery),
                Err(e) => {
                    tracing::debug!(?strategy, "authenticate: exchange failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.map(FlowError::Identity).unwrap_or(FlowError::Incomplete))
    }

    async fn finish(
        &self,
        params: &CallbackParams,
        session: MemberSession,
    ) -> Result<Completion, FlowError> {
        let bundle = self
            .reconciler
            .reconcile(Some(&session.member), Some(&session.organization))
            .await
            .ok_or(FlowError::SignInFailed)?;

        Ok(Completion {
            state: self.success(params),
            session: Some(session),
            bundle: Some(bundle),
        })
    }

    fn success(&self, params: &CallbackParams) -> PageState {
        PageState::Success {
            redirect_to: safe_redirect(params.return_to.as_deref(), &self.default_redirect),
        }
    }
}
