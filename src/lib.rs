pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod legacy;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::AuthError;

use std::sync::Arc;

use api::consumed::ConsumedTokens;
use identity::{IdentityProvider, JwksKeyStore};
use legacy::{CredentialBridge, LegacyBackend};
use store::CredentialLedger;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub legacy: Arc<dyn LegacyBackend>,
    pub bridge: Arc<CredentialBridge>,
    /// Local session-JWT verification; `None` falls back to the remote call.
    pub jwks: Option<JwksKeyStore>,
    /// Callback tokens already handed to the identity provider.
    pub consumed_tokens: ConsumedTokens,
}

impl AppState {
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        legacy: Arc<dyn LegacyBackend>,
        ledger: Arc<dyn CredentialLedger>,
        jwks: Option<JwksKeyStore>,
    ) -> Self {
        let bridge = Arc::new(CredentialBridge::new(legacy.clone(), ledger));
        Self {
            config,
            identity,
            legacy,
            bridge,
            jwks,
            consumed_tokens: ConsumedTokens::default(),
        }
    }
}

pub type SharedState = Arc<AppState>;
