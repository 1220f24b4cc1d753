//! Client-side half of the sign-in flow.
//!
//! - `storage`:    persistent key/value store and the cached auth bundle
//! - `reconcile`:  Session Reconciliation Hook
//! - `controller`: Authenticate Page Controller
//! - `api`:        bearer-authenticated calls with the cached key

pub mod api;
pub mod controller;
pub mod reconcile;
pub mod storage;

pub use api::BearerClient;
pub use controller::{
    AuthenticateController, CallbackParams, Completion, Loadable, PageState, TokenType,
};
pub use reconcile::{CredentialSync, HttpCredentialSync, SessionReconciler};
pub use storage::{CachedAuthBundle, FileStorage, MemoryStorage, SessionStorage};

use crate::error::AuthError;
use crate::identity::IdentityProvider;

/// Sign out: revoke the identity session (best effort) and forget every
/// cached credential.
pub async fn logout(
    identity: &dyn IdentityProvider,
    storage: &dyn SessionStorage,
    session_token: Option<&str>,
) -> Result<(), AuthError> {
    if let Some(token) = session_token.filter(|t| !t.is_empty()) {
        if let Err(e) = identity.revoke_session(token).await {
            tracing::warn!("logout: session revoke failed: {e}");
        }
    }
    storage::clear_credentials(storage)
        .map_err(|e| AuthError::Internal(format!("could not clear session storage: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeIdentity;

    #[tokio::test]
    async fn logout_revokes_and_clears() {
        let identity = FakeIdentity::new();
        let store = MemoryStorage::new();
        store.set(storage::API_KEY_KEY, "vrin_key_1").unwrap();
        store.set(storage::CHAT_SESSION_KEY, "chat-1").unwrap();

        logout(&identity, &store, Some("session-token-1")).await.unwrap();

        assert_eq!(identity.calls_to("revoke_session"), vec!["revoke_session:session-token-1"]);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn logout_without_session_still_clears() {
        let identity = FakeIdentity::new();
        let store = MemoryStorage::new();
        store.set(storage::USER_KEY, "{}").unwrap();

        logout(&identity, &store, None).await.unwrap();
        assert!(identity.calls().is_empty());
        assert_eq!(store.get(storage::USER_KEY), None);
    }
}
