use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::legacy::LegacyCredential;

/// Record of the legacy account issued for each identity-provider member.
///
/// Invariant: at most one legacy `user_id` per `member_id`. `claim` never
/// re-points a member at another account; it only refreshes the API key when
/// the backend answers with the account already recorded.
#[async_trait]
pub trait CredentialLedger: Send + Sync {
    /// Record `credential` for `member_id` and return the credential the member
    /// owns. `is_new_user` is only kept when this call performed the insert.
    async fn claim(
        &self,
        member_id: &str,
        stytch_organization_id: Option<&str>,
        credential: &LegacyCredential,
    ) -> Result<LegacyCredential, AuthError>;
}

/// Returned for a member that was already in the ledger.
pub(crate) fn as_returning(mut credential: LegacyCredential) -> LegacyCredential {
    credential.is_new_user = false;
    credential.migrated = false;
    credential
}

/// Process-local ledger, used when no database is configured.
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<String, LegacyCredential>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CredentialLedger for MemoryLedger {
    async fn claim(
        &self,
        member_id: &str,
        _stytch_organization_id: Option<&str>,
        credential: &LegacyCredential,
    ) -> Result<LegacyCredential, AuthError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(member_id) {
            Some(existing) if existing.user_id == credential.user_id => {
                existing.api_key = credential.api_key.clone();
                Ok(as_returning(existing.clone()))
            }
            Some(existing) => Ok(as_returning(existing.clone())),
            None => {
                entries.insert(member_id.to_string(), credential.clone());
                Ok(credential.clone())
            }
        }
    }
}
