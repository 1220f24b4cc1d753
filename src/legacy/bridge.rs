//! Legacy Credential Bridge.
//!
//! Turns a verified Stytch member into a legacy account + API key. Every call
//! goes to the legacy backend, so a suspended account or a rotated key shows
//! up immediately. The ledger pins each member to the first account issued,
//! and concurrent calls for one member are serialized so the backend never
//! runs two find-or-creates for the same member at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::backend::{LegacyBackend, LegacyCredential, SyncRequest};
use crate::error::AuthError;
use crate::session::CredentialSync;
use crate::store::CredentialLedger;

pub struct CredentialBridge {
    backend: Arc<dyn LegacyBackend>,
    ledger: Arc<dyn CredentialLedger>,
    member_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialBridge {
    pub fn new(backend: Arc<dyn LegacyBackend>, ledger: Arc<dyn CredentialLedger>) -> Self {
        Self {
            backend,
            ledger,
            member_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, member_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .member_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(member_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release(&self, member_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .member_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map and `lock` itself still point at it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(member_id);
        }
    }

    /// Find-or-create the legacy credential for `request.member_id`.
    pub async fn sync(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        validate(request)?;

        let lock = self.lock_for(&request.member_id);
        let result = {
            let _guard = lock.lock().await;
            self.sync_locked(request).await
        };
        self.release(&request.member_id, lock);
        result
    }

    async fn sync_locked(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        tracing::info!(
            member_id = %request.member_id,
            email = %request.email,
            "bridge: syncing member with legacy backend"
        );
        let issued = self.backend.sync_member(request).await?;

        let stored = self
            .ledger
            .claim(
                &request.member_id,
                request.organization_id.as_deref(),
                &issued,
            )
            .await?;

        if stored.user_id != issued.user_id {
            tracing::warn!(
                member_id = %request.member_id,
                issued = %issued.user_id,
                kept = %stored.user_id,
                "bridge: legacy backend issued a second account; keeping the first"
            );
        }

        Ok(stored)
    }
}

fn validate(request: &SyncRequest) -> Result<(), AuthError> {
    if request.email.trim().is_empty() {
        return Err(AuthError::BadRequest("email is required".into()));
    }
    if request.member_id.trim().is_empty() {
        return Err(AuthError::BadRequest("member_id is required".into()));
    }
    Ok(())
}

#[async_trait]
impl CredentialSync for CredentialBridge {
    async fn sync(&self, request: &SyncRequest) -> Result<LegacyCredential, AuthError> {
        CredentialBridge::sync(self, request).await
    }
}
