//! Identity Provider Client: Stytch B2B.
//!
//! - `traits`: the `IdentityProvider` seam and its error type
//! - `types`:  typed response shapes (member, organization, sessions)
//! - `stytch`: reqwest implementation against the Stytch REST API
//! - `jwks`:   local session-JWT verification

pub mod jwks;
pub mod stytch;
pub mod traits;
pub mod types;

pub use jwks::{JwksKeyStore, VerifiedSession};
pub use stytch::StytchClient;
pub use traits::{IdentityError, IdentityProvider};
pub use types::{
    DiscoveredOrganization, DiscoveryAuthentication, Member, MemberSession, Organization,
    PasswordMigration, SessionCredential, SessionTokens, TrustedMetadata, SESSION_COOKIE,
    SESSION_JWT_COOKIE,
};
