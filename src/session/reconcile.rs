//! Session Reconciliation: keeps a legacy API key cached for whichever
//! Stytch member is signed in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;

use super::storage::{self, CachedAuthBundle, SessionStorage};
use crate::auth::slug;
use crate::error::AuthError;
use crate::identity::{Member, Organization};
use crate::legacy::{LegacyCredential, SyncRequest};

/// Anything that can run the Legacy Credential Bridge.
#[async_trait]
pub trait CredentialSync: Send + Sync {
    async fn sync(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError>;
}

/// Calls a remote `/api/auth/stytch-sync` endpoint.
pub struct HttpCredentialSync {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BridgeFailure {
    #[serde(default)]
    error: Option<String>,
}

impl HttpCredentialSync {
    pub fn new(bridge_url: impl Into<String>) -> Self {
        Self {
            url: bridge_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CredentialSync for HttpCredentialSync {
    async fn sync(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        let resp = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("bridge unreachable: {e}")))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp
                .json::<BridgeFailure>()
                .await
                .ok()
                .and_then(|f| f.error)
                .unwrap_or_else(|| format!("bridge returned status {status}"));
            return Err(AuthError::Upstream { status, message });
        }

        resp.json::<LegacyCredential>()
            .await
            .map_err(|e| AuthError::Internal(format!("malformed bridge response: {e}")))
    }
}

/// Reconciles the signed-in member with the legacy credential system.
///
/// Failures never propagate: the reconciler logs and leaves the cache empty,
/// and the caller decides what to show.
pub struct SessionReconciler {
    bridge: Arc<dyn CredentialSync>,
    storage: Arc<dyn SessionStorage>,
    current: Mutex<Option<CachedAuthBundle>>,
    loading: AtomicBool,
}

impl SessionReconciler {
    pub fn new(bridge: Arc<dyn CredentialSync>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            bridge,
            storage,
            current: Mutex::new(None),
            loading: AtomicBool::new(true),
        }
    }

    pub fn storage(&self) -> &dyn SessionStorage {
        self.storage.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Bundle from the last reconciliation, if it produced one.
    pub fn current(&self) -> Option<CachedAuthBundle> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_current(&self, bundle: Option<CachedAuthBundle>) {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = bundle;
        self.loading.store(false, Ordering::SeqCst);
    }

    /// Run on every session change. `member == None` means signed out.
    pub async fn reconcile(
        &self,
        member: Option<&Member>,
        organization: Option<&Organization>,
    ) -> Option<CachedAuthBundle> {
        let Some(member) = member else {
            self.set_current(None);
            return None;
        };

        if let Some(cached) = storage::read_bundle(self.storage.as_ref()) {
            if cached.member_id == member.member_id && cached.is_complete() {
                tracing::debug!(member_id = %member.member_id, "reconcile: cache hit");
                self.persist(&cached);
                self.set_current(Some(cached.clone()));
                return Some(cached);
            }
        }

        let organization_id = organization
            .map(|o| o.organization_id.clone())
            .unwrap_or_else(|| member.organization_id.clone());
        let name = if member.name.trim().is_empty() {
            slug::default_name(&member.email_address)
        } else {
            member.name.clone()
        };
        let request = SyncRequest {
            email: member.email_address.clone(),
            name,
            member_id: member.member_id.clone(),
            organization_id: Some(organization_id.clone()),
        };

        match self.bridge.sync(&request).await {
            Ok(credential) => {
                let bundle = CachedAuthBundle {
                    member_id: member.member_id.clone(),
                    organization_id,
                    user_id: credential.user_id,
                    api_key: credential.api_key,
                    email: credential.email,
                    name: credential.name,
                };
                tracing::info!(
                    member_id = %bundle.member_id,
                    user_id = %bundle.user_id,
                    "reconcile: legacy credential cached"
                );
                self.persist(&bundle);
                self.set_current(Some(bundle.clone()));
                Some(bundle)
            }
            Err(e) => {
                tracing::warn!(member_id = %member.member_id, "reconcile: bridge failed: {e}");
                self.set_current(None);
                None
            }
        }
    }

    fn persist(&self, bundle: &CachedAuthBundle) {
        if let Err(e) = storage::write_bundle(self.storage.as_ref(), bundle) {
            tracing::warn!("reconcile: could not persist credential bundle: {e}");
        }
    }
}
