//! Legacy user / API-key system and the bridge that keeps it in step with
//! Stytch members.

pub mod backend;
pub mod bridge;

pub use backend::{
    EnterpriseOrganization, HttpLegacyBackend, LegacyBackend, LegacyCredential, SyncRequest,
};
pub use bridge::CredentialBridge;
